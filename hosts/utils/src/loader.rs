//! 基于目录的 nifti 图像存储.
//!
//! 体数据与肺掩码按 `{id}.nii.gz` 或 `{id}.nii` 查找. 标签网格保存为
//! `{name}.npy`, 标签字典另存为同名的 `{name}.labels.json`.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use lung_berry::anatomy::Region;
use lung_berry::data::Affine;
use lung_berry::host::ImageStore;
use lung_berry::{GridAttr, GridGeometry, LabelGrid, VoxelGrid};
use ndarray::{Array3, ArrayD, Ix3};
use nifti::{InMemNiftiVolume, IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::{HostError, HostResult};

const EXTENSIONS: [&str; 2] = ["nii.gz", "nii"];

/// 从 nifti header 获取 `[z, h, w]` 排列的体素分辨率.
fn pix_dim_from_header(h: &NiftiHeader) -> [f64; 3] {
    let [_, w, hh, z, ..] = h.pixdim;
    [z as f64, hh as f64, w as f64]
}

/// 从 nifti header 获取仿射变换. `sform_code` 为 0 时退回按分辨率对齐.
fn affine_from_header(h: &NiftiHeader) -> HostResult<Option<Affine>> {
    if h.sform_code <= 0 {
        return Ok(None);
    }
    let row = |r: [f32; 4]| r.map(f64::from);
    Ok(Some(Affine::from_srows(
        row(h.srow_x),
        row(h.srow_y),
        row(h.srow_z),
    )?))
}

/// `[w, h, z]` 排列的 nifti 数组转换为 `[z, h, w]`.
fn to_zhw<T: Clone>(data: ArrayD<T>) -> HostResult<Array3<T>> {
    let data = data
        .permuted_axes([2, 1, 0].as_slice())
        .into_dimensionality::<Ix3>()?;
    Ok(data.as_standard_layout().into_owned())
}

/// 读取 nifti 文件, 得到 header 与体数据.
fn read_nifti(path: &Path) -> HostResult<(NiftiHeader, InMemNiftiVolume)> {
    let obj = ReaderOptions::new().read_file(path)?;
    let header = obj.header().clone();
    Ok((header, obj.into_volume()))
}

/// 由 header 与 `[z, h, w]` 形状构造几何信息.
fn geometry_of(header: &NiftiHeader, shape: (usize, usize, usize)) -> HostResult<GridGeometry> {
    let geometry = GridGeometry::new(shape, pix_dim_from_header(header))?;
    Ok(match affine_from_header(header)? {
        Some(affine) => geometry.with_affine(affine),
        None => geometry,
    })
}

/// 基于目录的图像存储. 从 `input` 读取, 向 `output` 写入.
#[derive(Clone, Debug)]
pub struct NiftiStore {
    input: PathBuf,
    output: PathBuf,
}

impl NiftiStore {
    /// 创建存储. `output` 不存在时自动创建.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output: Q) -> HostResult<Self> {
        let output = output.as_ref().to_owned();
        fs::create_dir_all(&output)?;
        Ok(Self {
            input: input.as_ref().to_owned(),
            output,
        })
    }

    /// 输出目录.
    #[inline]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// 在输入目录下查找 `id` 对应的 nifti 文件.
    pub fn locate(&self, id: &str) -> HostResult<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.input.join(format!("{id}.{ext}")))
            .find(|p| p.is_file())
            .ok_or_else(|| HostError::NotFound {
                id: id.to_string(),
                dir: self.input.clone(),
            })
    }
}

impl ImageStore for NiftiStore {
    type Error = HostError;

    fn load_volume(&mut self, id: &str) -> HostResult<VoxelGrid> {
        let path = self.locate(id)?;
        let (header, volume) = read_nifti(&path)?;
        let data = to_zhw(volume.into_ndarray::<f32>()?)?;
        let geometry = geometry_of(&header, data.dim())?;
        let scan = VoxelGrid::from_array(data, geometry)?;
        info!(
            "loaded {} {:?}, spacing {:?} mm",
            path.display(),
            scan.shape(),
            scan.pix_dim()
        );
        Ok(scan)
    }

    fn load_mask(&mut self, id: &str) -> HostResult<LabelGrid> {
        let path = self.locate(id)?;
        let (header, volume) = read_nifti(&path)?;
        let data = to_zhw(volume.into_ndarray::<u16>()?)?;
        let geometry = geometry_of(&header, data.dim())?;
        let names: BTreeMap<u16, String> = [Region::RightLung, Region::LeftLung, Region::Airway]
            .into_iter()
            .map(|r| (r.label(), r.name().to_string()))
            .collect();
        debug!("loaded lung mask {}", path.display());
        Ok(LabelGrid::from_parts(data, geometry, names)?)
    }

    fn save_label_grid(&mut self, grid: &LabelGrid, name: &str) -> HostResult<()> {
        let npy = self.output.join(format!("{name}.npy"));
        ndarray_npy::write_npy(&npy, &grid.data())?;

        let dict = File::create(self.output.join(format!("{name}.labels.json")))?;
        let mut dict = BufWriter::new(dict);
        serde_json::to_writer(&mut dict, grid.names())?;
        dict.flush()?;
        info!("saved {}", npy.display());
        Ok(())
    }
}
