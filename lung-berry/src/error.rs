//! 运行时错误.

use crate::anatomy::Region;
use crate::Idx3d;
use thiserror::Error;

/// 核心流程运行时错误.
///
/// 所有错误均是输入的确定性函数, 在开始体素级计算之前或在失败处立即返回,
/// 不做任何内部重试.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LungError {
    /// 密度分级表非法 (为空, 不连续, 非递增或分级过多).
    ///
    /// `index` 为出错的分级序号.
    #[error("invalid band table at band #{index}: {reason}")]
    InvalidBandTable {
        /// 出错的分级序号.
        index: usize,
        /// 出错原因.
        reason: String,
    },

    /// 同一次调用中传入的网格形状不一致.
    #[error("shape mismatch on {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// 出错的网格.
        what: &'static str,
        /// 期望形状 `(z, h, w)`.
        expected: Idx3d,
        /// 实际形状 `(z, h, w)`.
        found: Idx3d,
    },

    /// 必需区域缺少种子点, 或种子点未覆盖任何可用体素.
    #[error("insufficient seeds for {region}: {reason}")]
    InsufficientSeeds {
        /// 出错的区域.
        region: Region,
        /// 出错原因.
        reason: &'static str,
    },

    /// 可用体素掩码为空.
    #[error("admissible mask of {what} is empty")]
    DegenerateMask {
        /// 出错的掩码.
        what: &'static str,
    },

    /// 种子集合之间相互冲突 (区域重复或坐标重合).
    #[error("conflicting seed sets: {0}")]
    ConflictingSeeds(String),

    /// 网格本身不合法 (数据长度不符, 体素间距非正, 仿射矩阵奇异等).
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    /// 配置不合法.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// 标签不属于当前的标签体系.
    #[error("label {0} is not part of the label taxonomy")]
    UnknownLabel(u16),
}

/// 核心流程运行时结果.
pub type LungResult<T> = Result<T, LungError>;
