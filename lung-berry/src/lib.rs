#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 对胸部 CT 体数据进行肺实质密度分级, 左右肺 (及气道) 分离,
//! 解剖分区与体积统计.
//!
//! 该 crate 只提供 `safe` 接口, 不解析任何图像文件格式. 网格的读写,
//! 种子点来源以及报告去向由宿主通过 [`host`] 中的 trait 提供.
//!
//! # 约定
//!
//! 1. 体素索引按 `(z, h, w)` 排列, 体素分辨率按 `[z, h, w]` 排列, 单位为毫米.
//! 2. 物理坐标系为 RAS: `+x` 指向患者右侧, `+y` 指向前方, `+z` 指向头侧.
//!   仿射变换按 nifti 惯例作用于 `(w, h, z, 1)`.
//! 3. 左右肺分离结果中 `1` 为右肺, `2` 为左肺, `3` 为气道.
//! 4. 分类结果中的标签为 `侧别编码 * 10 + 分级序号 + 1`, 如右肺第 0 个分级为 `11`.
//! 5. 所有算法都不修改输入网格, 结果总是新建的网格.
//!
//! # 流程
//!
//! ### 左右肺分离 ✅
//!
//! 从种子球出发的多源竞争生长 (Dijkstra), 边代价随 HU 差增大.
//!
//! 实现位于 `lung-berry/src/grow`.
//!
//! ### 密度分级 ✅
//!
//! 逐体素查表, 按侧别编码. 默认分级: 肺气肿, 正常通气, 浸润, 实变, 血管.
//!
//! 实现位于 `lung-berry/src/band.rs` 与 `lung-berry/src/classify.rs`.
//!
//! ### 解剖分区 ✅
//!
//! 每侧一个有向包围盒, 沿前后轴与头足轴切出腹侧/背侧与上/中/下共 5 个分区.
//!
//! 实现位于 `lung-berry/src/zone`.
//!
//! ### 体积统计 ✅
//!
//! 每侧每分级, 双肺, 分区明细以及功能/受累体积汇总.
//!
//! 实现位于 `lung-berry/src/stats`.
//!
//! ### 流程编排 ✅
//!
//! 实现位于 `lung-berry/src/pipeline.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

pub mod anatomy;
pub mod band;
pub mod classify;
pub mod config;
pub mod consts;

/// 3D 网格基础数据结构.
pub mod data;

pub mod error;
pub mod grow;
pub mod host;
pub mod pipeline;
pub mod prelude;
pub mod stats;
pub mod zone;

pub use config::AnalysisConfig;
pub use data::{CtWindow, GridAttr, GridGeometry, LabelGrid, MaskGrid, VoxelGrid};
pub use error::{LungError, LungResult};
pub use pipeline::{CaseRequest, LungSource, Pipeline, PipelineInput, PipelineOutput};
