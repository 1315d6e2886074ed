//! 肺部 CT 体积统计命令行工具.
//!
//! 用法: `lung-stats CASE...`
//!
//! - `$LUNG_DATA_DIR`: 数据根目录, 默认为 `$HOME/dataset/lung`;
//! - `$LUNG_CONFIG`: json 配置文件, 缺省时使用默认配置;
//! - `$LUNG_LOG`: 日志级别, 默认为 `info`.

use std::env;
use std::process::ExitCode;

use log::LevelFilter;
use lung_berry::AnalysisConfig;
use simple_logger::SimpleLogger;

mod result;
mod runner;

fn main() -> ExitCode {
    let level = env::var("LUNG_LOG")
        .ok()
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    if let Err(e) = SimpleLogger::new().with_level(level).init() {
        eprintln!("cannot initialize logger: {e}");
    }

    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(utils::cpus())
        .build_global()
    {
        log::warn!("global thread pool: {e}");
    }

    let cases: Vec<String> = env::args().skip(1).collect();
    if cases.is_empty() {
        eprintln!("usage: lung-stats CASE...");
        return ExitCode::FAILURE;
    }

    let outcome = utils::data_dir_from_env_or_home().and_then(|root| {
        let config = match env::var("LUNG_CONFIG") {
            Ok(p) => runner::load_config(p)?,
            Err(_) => AnalysisConfig::default(),
        };
        runner::run(&config, &runner::Paths::under(root), &cases)
    });

    match outcome {
        Ok(r) => {
            if let Err(e) = r.analyze() {
                eprintln!("{e}");
            }
            if r.failures() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
