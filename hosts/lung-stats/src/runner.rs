//! 程序运行函数.

use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use lung_berry::pipeline::CaseRequest;
use lung_berry::{AnalysisConfig, Pipeline};
use utils::loader::NiftiStore;
use utils::seeds::SeedDir;
use utils::HostResult;

use crate::result::{CsvSink, RunResult};

/// 一次运行涉及的目录.
#[derive(Clone, Debug)]
pub struct Paths {
    /// nifti 体数据与肺掩码目录.
    pub images: PathBuf,

    /// 种子点文件目录.
    pub seeds: PathBuf,

    /// 输出目录.
    pub output: PathBuf,
}

impl Paths {
    /// 以 `root/images`, `root/seeds` 和 `root/output` 为目录.
    pub fn under<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            images: root.join("images"),
            seeds: root.join("seeds"),
            output: root.join("output"),
        }
    }
}

/// 读取 json 格式的配置文件. 缺失的字段取默认值.
pub fn load_config<P: AsRef<Path>>(path: P) -> HostResult<AnalysisConfig> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// 病例 `name` 的请求. 若图像目录中存在 `{name}_lungs` 肺掩码, 则直接使用它.
fn request_for(store: &NiftiStore, name: &str) -> CaseRequest {
    let mask_id = format!("{name}_lungs");
    CaseRequest {
        volume: name.to_string(),
        mask: store.locate(&mask_id).is_ok().then_some(mask_id),
    }
}

/// 实际运行.
pub fn run(config: &AnalysisConfig, paths: &Paths, cases: &[String]) -> HostResult<RunResult> {
    let pipeline = Pipeline::new(config)?;
    let mut store = NiftiStore::new(&paths.images, &paths.output)?;
    let mut seeds = SeedDir::new(&paths.seeds);
    let mut sink = CsvSink::new(&paths.output);

    info!("Running {} cases...", cases.len());
    let results = cases.iter().map(|name| {
        let case = request_for(&store, name);
        sink.begin(name);
        let r = pipeline
            .run_with(&case, &mut store, &mut seeds, &mut sink)
            .map(|out| *out.statistics.summary());
        if let Err(e) = &r {
            error!("{name}: {e}");
        }
        (name.clone(), r)
    });
    Ok(RunResult::from_iter(results.collect::<Vec<_>>()))
}
