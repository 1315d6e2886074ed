//! 通用常量.

/// 标签值.
pub mod label {
    /// 背景 (未分配) 体素的标签值.
    pub const BACKGROUND: u16 = 0;

    /// 左右肺分离结果中, 右肺的标签值.
    pub const RIGHT_LUNG: u16 = 1;

    /// 左右肺分离结果中, 左肺的标签值.
    pub const LEFT_LUNG: u16 = 2;

    /// 左右肺分离结果中, 气道的标签值.
    pub const AIRWAY: u16 = 3;

    /// 密度分级标签编码中, 每一侧占用的标签跨度.
    ///
    /// 分级标签为 `side * BAND_STRIDE + band_index + 1`.
    pub const BAND_STRIDE: u16 = 10;

    /// 单个密度分级表中最多允许的分级个数.
    pub const MAX_BANDS: usize = (BAND_STRIDE - 1) as usize;

    /// 体素是否是背景?
    #[inline]
    pub const fn is_background(l: u16) -> bool {
        l == BACKGROUND
    }
}

/// 默认密度分级门限 (HU), 共 6 个边界, 依次划分出
/// 肺气肿/肺大疱, 通气, 浸润, 塌陷, 血管五个分级.
pub const DEFAULT_THRESHOLDS: [f64; 6] = [-1050.0, -950.0, -775.0, -400.0, 0.0, 3000.0];

/// 未提供可用体素掩码时, 由该 HU 窗口 (下限) 推导.
pub const DEFAULT_LUNG_WINDOW_LOWER: f32 = -1100.0;

/// 未提供可用体素掩码时, 由该 HU 窗口 (上限, 不含) 推导.
pub const DEFAULT_LUNG_WINDOW_UPPER: f32 = -200.0;

/// 肺种子球默认半径, 单位为毫米.
pub const DEFAULT_LUNG_SEED_RADIUS_MM: f64 = 10.0;

/// 气道种子球默认半径, 单位为毫米.
pub const DEFAULT_AIRWAY_SEED_RADIUS_MM: f64 = 3.0;

/// 竞争生长代价中, 相邻体素 HU 差值的归一化尺度.
pub const DEFAULT_INTENSITY_SCALE: f64 = 100.0;

/// 解剖分区裁剪时, 非切割面外扩的默认安全边距, 单位为毫米.
pub const DEFAULT_ZONE_MARGIN_MM: f64 = 50.0;

/// 百分比分母为零时使用的哨兵值.
pub const PERCENT_SENTINEL: f64 = -1.0;

/// 1 毫升对应的立方毫米数.
pub const MM3_PER_ML: f64 = 1000.0;
