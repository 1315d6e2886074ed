//! 宿主错误.

use std::io;
use std::path::PathBuf;

use lung_berry::LungError;
use thiserror::Error;

/// 宿主侧的全部错误. 核心库错误经 `From<LungError>` 原样包装.
#[derive(Debug, Error)]
pub enum HostError {
    /// 核心流程错误.
    #[error(transparent)]
    Core(#[from] LungError),

    /// nifti 文件读取失败.
    #[error("cannot read nifti file: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// npy 文件写入失败.
    #[error("cannot write npy file: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    /// nifti 体数据不是三维的.
    #[error("volume is not 3-dimensional: {0}")]
    Dimension(#[from] ndarray::ShapeError),

    /// 一般 IO 错误.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// 找不到对应文件.
    #[error("no file for `{id}` under {dir}")]
    NotFound {
        /// 查询的 id.
        id: String,
        /// 查询的目录.
        dir: PathBuf,
    },

    /// json 文件 (种子点, 标签字典, 配置) 读写失败.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// 找不到用户主目录.
    #[error("cannot locate home directory")]
    NoHomeDir,
}

/// 宿主侧结果.
pub type HostResult<T> = Result<T, HostError>;
