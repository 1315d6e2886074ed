//! 体积统计.
//!
//! 由分类后的标签网格计算各 (侧别, 分级[, 分区]) 组合的体素数与体积,
//! 再派生出百分比与临床指标. 百分比分母为零时得到哨兵值 [`PERCENT_SENTINEL`],
//! 不会引发除零错误.

use itertools::izip;
use log::debug;

use crate::anatomy::{Side, Zone};
use crate::band::{decode, label_name, Band, BandKind, BandTable};
use crate::consts::label::is_background;
use crate::consts::PERCENT_SENTINEL;
use crate::data::LabelGrid;
use crate::error::{LungError, LungResult};
use crate::zone::{check_zone_shapes, ZoneTable};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod report;

pub use report::{ReportRow, ReportSchema};

/// 计算 `part` 占 `whole` 的百分比. `whole` 为零时返回哨兵值 `-1`.
#[inline]
pub fn percent(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        PERCENT_SENTINEL
    } else {
        100.0 * part / whole
    }
}

/// 四舍五入到 `decimals` 位小数. 哨兵值保持不变.
#[inline]
pub fn round_to(v: f64, decimals: i32) -> f64 {
    if v == PERCENT_SENTINEL {
        return v;
    }
    let k = 10f64.powi(decimals);
    (v * k).round() / k
}

/// 肺气肿 (肺大疱) 分级计入哪一类体积.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BullaPolicy {
    /// 计入受累体积.
    Affected,

    /// 计入功能体积.
    #[default]
    Functional,
}

/// 统计表中的一行. 一次统计运行中创建后即不可变.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResultRow {
    /// 行名称, 如 `"Ventilated right"`, `"left lung"`, `"total"`.
    pub segment: String,

    /// 侧别. 双肺汇总行为 `None`.
    pub side: Option<Side>,

    /// 分级. 侧别/总体行为 `None`.
    pub band: Option<BandKind>,

    /// 分区. 无分区的行为 `None`.
    pub zone: Option<Zone>,

    /// 分级下限 (HU). 非分级行为 `None`.
    pub min_threshold: Option<f64>,

    /// 分级上限 (HU). 非分级行为 `None`.
    pub max_threshold: Option<f64>,

    /// 体素个数.
    pub voxel_count: u64,

    /// 体积 (毫升), 未取整.
    pub volume_ml: f64,

    /// 占上级体积的百分比, 未取整. 上级体积为零时为 `-1`.
    pub percent: f64,
}

/// 一侧 (或双肺) 的功能/受累体积汇总.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Burden {
    /// 侧别. 双肺为 `None`.
    pub side: Option<Side>,

    /// 全部分级的体积 (毫升).
    pub total_ml: f64,

    /// 功能体积 (毫升).
    pub functional_ml: f64,

    /// 受累体积 (毫升).
    pub affected_ml: f64,

    /// 功能体积占总体积的百分比.
    pub functional_percent: f64,

    /// 受累体积占总体积的百分比.
    pub affected_percent: f64,

    /// 受累体积占总体积的比例, 保留 2 位小数.
    pub affected_fraction: f64,

    /// 受累体积与功能体积之比, 保留 2 位小数.
    pub affected_to_functional: f64,
}

impl Burden {
    fn new(side: Option<Side>, total_ml: f64, functional_ml: f64, affected_ml: f64) -> Self {
        let ratio = |a: f64, b: f64| {
            if b == 0.0 {
                PERCENT_SENTINEL
            } else {
                round_to(a / b, 2)
            }
        };
        Self {
            side,
            total_ml,
            functional_ml,
            affected_ml,
            functional_percent: percent(functional_ml, total_ml),
            affected_percent: percent(affected_ml, total_ml),
            affected_fraction: ratio(affected_ml, total_ml),
            affected_to_functional: ratio(affected_ml, functional_ml),
        }
    }
}

/// 临床指标汇总: 左右肺及双肺.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClinicalSummary {
    /// 所用的肺气肿归类策略.
    pub policy: BullaPolicy,

    /// 右肺.
    pub right: Burden,

    /// 左肺.
    pub left: Burden,

    /// 双肺.
    pub total: Burden,
}

impl ClinicalSummary {
    /// 获取某侧的汇总.
    #[inline]
    pub fn side(&self, side: Side) -> &Burden {
        match side {
            Side::Right => &self.right,
            Side::Left => &self.left,
        }
    }
}

/// 一次统计的完整结果.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Statistics {
    rows: Vec<ResultRow>,
    summary: ClinicalSummary,
}

impl Statistics {
    /// 全部结果行, 按报告顺序排列.
    #[inline]
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// 临床指标汇总.
    #[inline]
    pub fn summary(&self) -> &ClinicalSummary {
        &self.summary
    }

    /// 按行名称查找.
    pub fn row(&self, segment: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.segment == segment)
    }

    /// 消费自身, 获得结果行.
    #[inline]
    pub fn into_rows(self) -> Vec<ResultRow> {
        self.rows
    }
}

/// 每侧每分级的体素数, `counts[side][band]`.
type SideCounts = [Vec<u64>; 2];

#[inline]
const fn side_slot(side: Side) -> usize {
    match side {
        Side::Right => 0,
        Side::Left => 1,
    }
}

/// 将标签直方图拆成每侧每分级的体素数. 直方图中出现分级表外的标签时报错.
fn split_histogram(hist: &[u64], bands: &BandTable) -> LungResult<SideCounts> {
    let mut counts = [vec![0u64; bands.len()], vec![0u64; bands.len()]];
    for (l, &c) in hist.iter().enumerate() {
        let l = l as u16;
        if c == 0 || is_background(l) {
            continue;
        }
        match decode(l) {
            Some((side, i)) if i < bands.len() => counts[side_slot(side)][i] += c,
            _ => return Err(LungError::UnknownLabel(l)),
        }
    }
    Ok(counts)
}

fn band_row(
    segment: String,
    side: Option<Side>,
    zone: Option<Zone>,
    band: &Band,
    count: u64,
    voxel_ml: f64,
    whole_ml: f64,
) -> ResultRow {
    let volume_ml = count as f64 * voxel_ml;
    ResultRow {
        segment,
        side,
        band: Some(band.kind),
        zone,
        min_threshold: Some(band.lower),
        max_threshold: Some(band.upper),
        voxel_count: count,
        volume_ml,
        percent: percent(volume_ml, whole_ml),
    }
}

fn region_row(
    segment: String,
    side: Option<Side>,
    zone: Option<Zone>,
    count: u64,
    voxel_ml: f64,
    whole_ml: f64,
) -> ResultRow {
    let volume_ml = count as f64 * voxel_ml;
    ResultRow {
        segment,
        side,
        band: None,
        zone,
        min_threshold: None,
        max_threshold: None,
        voxel_count: count,
        volume_ml,
        percent: percent(volume_ml, whole_ml),
    }
}

/// 按 `policy` 累计一组分级体素数中的功能与受累体积.
fn burden_of(
    side: Option<Side>,
    counts: &[u64],
    bands: &BandTable,
    voxel_ml: f64,
    policy: BullaPolicy,
) -> Burden {
    let mut functional = 0u64;
    let mut affected = 0u64;
    for (b, &c) in bands.bands().iter().zip(counts) {
        match (b.kind, policy) {
            (BandKind::Ventilated, _) | (BandKind::Emphysema, BullaPolicy::Functional) => {
                functional += c
            }
            (BandKind::Infiltrated | BandKind::Collapsed, _)
            | (BandKind::Emphysema, BullaPolicy::Affected) => affected += c,
            (BandKind::Vascular, _) => {}
        }
    }
    let total: u64 = counts.iter().sum();
    Burden::new(
        side,
        total as f64 * voxel_ml,
        functional as f64 * voxel_ml,
        affected as f64 * voxel_ml,
    )
}

/// 由分类后的标签网格计算统计结果.
///
/// `labels` 的非背景标签必须是按 `bands` 编码的分级标签. `voxel_ml` 为单个体素的体积 (毫升).
/// 提供 `zones` 时追加每侧每分区的明细行.
///
/// # 返回值
///
/// - `voxel_ml` 非正或非有限, 返回 `Err(LungError::InvalidGrid)`;
/// - 出现分级表外的标签, 返回 `Err(LungError::UnknownLabel)`;
/// - 分区掩码形状与 `labels` 不一致, 返回 `Err(LungError::ShapeMismatch)`.
///
/// 任何错误都在生成结果行之前返回.
pub fn aggregate(
    labels: &LabelGrid,
    voxel_ml: f64,
    bands: &BandTable,
    zones: Option<&ZoneTable>,
    policy: BullaPolicy,
) -> LungResult<Statistics> {
    if !(voxel_ml.is_finite() && voxel_ml > 0.0) {
        return Err(LungError::InvalidGrid(format!(
            "voxel volume must be positive, found {voxel_ml} ml"
        )));
    }
    if let Some(z) = zones {
        check_zone_shapes(z, labels)?;
    }

    #[cfg(feature = "rayon")]
    let hist = labels.par_histogram();
    #[cfg(not(feature = "rayon"))]
    let hist = labels.histogram();
    let counts = split_histogram(&hist, bands)?;

    let mut zone_counts = Vec::new();
    if let Some(table) = zones {
        for (side, zone, mask) in table.iter() {
            let h = labels.histogram_within(mask)?;
            let c = split_histogram(&h, bands)?;
            zone_counts.push((side, zone, c[side_slot(side)].clone()));
        }
    }

    let side_total = |s: Side| -> u64 { counts[side_slot(s)].iter().sum() };
    let total_count = side_total(Side::Right) + side_total(Side::Left);
    let total_ml = total_count as f64 * voxel_ml;
    let mut rows = Vec::new();

    // 每侧每分级, 占该侧体积
    for side in Side::BOTH {
        let whole = side_total(side) as f64 * voxel_ml;
        for (i, b) in bands.bands().iter().enumerate() {
            rows.push(band_row(
                label_name(side, b.kind),
                Some(side),
                None,
                b,
                counts[side_slot(side)][i],
                voxel_ml,
                whole,
            ));
        }
    }

    // 双肺每分级, 占总体积
    for (i, b) in bands.bands().iter().enumerate() {
        let c = counts[0][i] + counts[1][i];
        rows.push(band_row(
            b.kind.name().to_string(),
            None,
            None,
            b,
            c,
            voxel_ml,
            total_ml,
        ));
    }

    // 每侧, 占总体积
    for side in Side::BOTH {
        rows.push(region_row(
            side.region_name().to_string(),
            Some(side),
            None,
            side_total(side),
            voxel_ml,
            total_ml,
        ));
    }
    rows.push(region_row(
        "total".to_string(),
        None,
        None,
        total_count,
        voxel_ml,
        total_ml,
    ));

    // 分区明细: 分区占该侧体积, 分区内各分级占分区体积
    for (side, zone, c) in zone_counts.iter() {
        let zone_count: u64 = c.iter().sum();
        let zone_ml = zone_count as f64 * voxel_ml;
        rows.push(region_row(
            format!("{} {zone}", side.region_name()),
            Some(*side),
            Some(*zone),
            zone_count,
            voxel_ml,
            side_total(*side) as f64 * voxel_ml,
        ));
        for (i, b) in bands.bands().iter().enumerate() {
            rows.push(band_row(
                format!("{} {zone}", label_name(*side, b.kind)),
                Some(*side),
                Some(*zone),
                b,
                c[i],
                voxel_ml,
                zone_ml,
            ));
        }
    }

    let both: Vec<u64> = izip!(&counts[0], &counts[1]).map(|(a, b)| a + b).collect();
    let summary = ClinicalSummary {
        policy,
        right: burden_of(Some(Side::Right), &counts[0], bands, voxel_ml, policy),
        left: burden_of(Some(Side::Left), &counts[1], bands, voxel_ml, policy),
        total: burden_of(None, &both, bands, voxel_ml, policy),
    };
    debug!(
        "aggregated {} rows, total volume {total_ml:.1} ml, affected fraction {}",
        rows.len(),
        summary.total.affected_fraction
    );
    Ok(Statistics { rows, summary })
}
