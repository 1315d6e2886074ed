//! 宿主协作方接口.
//!
//! 核心库不解析任何图像文件格式, 也不负责报告渲染. 网格的读写, 种子点的来源
//! 以及统计结果的去向都由宿主通过以下 trait 提供.

use crate::data::{LabelGrid, VoxelGrid};
use crate::grow::SeedSet;
use crate::stats::{ReportSchema, Statistics};

/// 宿主图像存储: 读取体数据与已有的肺掩码, 保存标签网格.
pub trait ImageStore {
    /// 宿主错误类型.
    type Error;

    /// 读取 id 为 `id` 的 CT 体数据.
    fn load_volume(&mut self, id: &str) -> Result<VoxelGrid, Self::Error>;

    /// 读取 id 为 `id` 的左右肺标签网格 (`1` 右肺, `2` 左肺, `3` 气道).
    fn load_mask(&mut self, id: &str) -> Result<LabelGrid, Self::Error>;

    /// 以名称 `name` 保存标签网格.
    fn save_label_grid(&mut self, grid: &LabelGrid, name: &str) -> Result<(), Self::Error>;
}

/// 宿主种子点来源.
pub trait SeedSource {
    /// 宿主错误类型.
    type Error;

    /// 获取病例 `case` 的全部种子集合 (物理坐标).
    fn seed_sets(&mut self, case: &str) -> Result<Vec<SeedSet>, Self::Error>;
}

/// 报告输出端: 接收完整的统计结果及其列定义.
pub trait ReportSink {
    /// 宿主错误类型.
    type Error;

    /// 接收一次统计的结果.
    fn receive(&mut self, schema: &ReportSchema, stats: &Statistics) -> Result<(), Self::Error>;
}
