//! 肺组织密度分级.
//!
//! 一个密度分级表由若干首尾相接的左闭右开 HU 区间组成,
//! 每个区间对应一类组织 ([`BandKind`]).

use crate::anatomy::Side;
use crate::consts::label::{BAND_STRIDE, MAX_BANDS};
use crate::consts::DEFAULT_THRESHOLDS;
use crate::error::{LungError, LungResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 组织分级类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BandKind {
    /// 肺气肿 / 肺大疱, 近乎真空.
    Emphysema,

    /// 正常通气.
    Ventilated,

    /// 浸润 (通气不良).
    Infiltrated,

    /// 塌陷 (不通气).
    Collapsed,

    /// 血管.
    Vascular,
}

impl BandKind {
    /// 默认分级表中的类型顺序.
    pub const DEFAULT_ORDER: [BandKind; 5] = [
        BandKind::Emphysema,
        BandKind::Ventilated,
        BandKind::Infiltrated,
        BandKind::Collapsed,
        BandKind::Vascular,
    ];

    /// 显示名称.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            BandKind::Emphysema => "Emphysema",
            BandKind::Ventilated => "Ventilated",
            BandKind::Infiltrated => "Infiltrated",
            BandKind::Collapsed => "Collapsed",
            BandKind::Vascular => "Vessels",
        }
    }

    /// 显示颜色 (RGB). 仅供宿主渲染参考.
    #[inline]
    pub const fn color(&self) -> [u8; 3] {
        match self {
            BandKind::Emphysema => [0, 0, 0],
            BandKind::Ventilated => [0, 0, 255],
            BandKind::Infiltrated => [255, 255, 0],
            BandKind::Collapsed => [255, 0, 255],
            BandKind::Vascular => [255, 0, 0],
        }
    }
}

/// 一个密度分级: 类型与左闭右开区间 `[lower, upper)`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Band {
    /// 组织类型.
    pub kind: BandKind,

    /// 区间下限 (含).
    pub lower: f64,

    /// 区间上限 (不含).
    pub upper: f64,
}

impl Band {
    /// 构造分级.
    #[inline]
    pub const fn new(kind: BandKind, lower: f64, upper: f64) -> Self {
        Self { kind, lower, upper }
    }

    /// `hu` 是否落在 `[lower, upper)` 内.
    #[inline]
    pub fn contains(&self, hu: f64) -> bool {
        self.lower <= hu && hu < self.upper
    }
}

/// 校验过的密度分级表.
///
/// 不变量: 非空, 至多 [`MAX_BANDS`] 个分级, 每个分级 `lower < upper`,
/// 且对所有相邻分级有 `band[i].upper == band[i + 1].lower`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<Band>", into = "Vec<Band>"))]
pub struct BandTable {
    bands: Vec<Band>,
}

impl TryFrom<Vec<Band>> for BandTable {
    type Error = LungError;

    #[inline]
    fn try_from(value: Vec<Band>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BandTable> for Vec<Band> {
    #[inline]
    fn from(value: BandTable) -> Self {
        value.bands
    }
}

impl Default for BandTable {
    fn default() -> Self {
        Self {
            bands: thresholds_to_bands(&DEFAULT_THRESHOLDS),
        }
    }
}

/// 6 个门限按默认类型顺序展开成 5 个分级.
fn thresholds_to_bands(th: &[f64; 6]) -> Vec<Band> {
    BandKind::DEFAULT_ORDER
        .iter()
        .zip(th.windows(2))
        .map(|(kind, w)| Band::new(*kind, w[0], w[1]))
        .collect()
}

impl BandTable {
    /// 校验并构造分级表.
    ///
    /// 任何不变量被破坏时返回 `Err(LungError::InvalidBandTable)`, 并指出出错的分级序号.
    pub fn new(bands: Vec<Band>) -> LungResult<Self> {
        let invalid = |index: usize, reason: String| LungError::InvalidBandTable { index, reason };

        if bands.is_empty() {
            return Err(invalid(0, "band table is empty".into()));
        }
        if bands.len() > MAX_BANDS {
            return Err(invalid(
                MAX_BANDS,
                format!("at most {MAX_BANDS} bands are supported, found {}", bands.len()),
            ));
        }
        for (i, b) in bands.iter().enumerate() {
            if b.lower.is_nan() || b.upper.is_nan() {
                return Err(invalid(i, format!("{} has NaN bounds", b.kind.name())));
            }
            if b.lower >= b.upper {
                return Err(invalid(
                    i,
                    format!(
                        "{} is empty or reversed: [{}, {})",
                        b.kind.name(),
                        b.lower,
                        b.upper
                    ),
                ));
            }
        }
        for (i, w) in bands.windows(2).enumerate() {
            if w[0].upper != w[1].lower {
                return Err(invalid(
                    i + 1,
                    format!(
                        "{} starts at {} but {} ends at {}",
                        w[1].kind.name(),
                        w[1].lower,
                        w[0].kind.name(),
                        w[0].upper
                    ),
                ));
            }
        }
        for (i, b) in bands.iter().enumerate() {
            if bands[..i].iter().any(|o| o.kind == b.kind) {
                return Err(invalid(i, format!("{} appears twice", b.kind.name())));
            }
        }
        Ok(Self { bands })
    }

    /// 由 6 个递增门限构造默认类型顺序的 5 级分级表.
    #[inline]
    pub fn from_thresholds(th: &[f64; 6]) -> LungResult<Self> {
        Self::new(thresholds_to_bands(th))
    }

    /// 获取全部分级.
    #[inline]
    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// 分级个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.bands.len()
    }

    /// 是否为空. 校验过的分级表永远非空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// 整个分级表的下限.
    #[inline]
    pub fn lower_bound(&self) -> f64 {
        self.bands[0].lower
    }

    /// 整个分级表的上限 (不含).
    #[inline]
    pub fn upper_bound(&self) -> f64 {
        self.bands[self.bands.len() - 1].upper
    }

    /// 找到包含 `hu` 的唯一分级序号. 不在 `[lower_bound, upper_bound)` 内时返回 `None`.
    ///
    /// 分级相互连续, 故可二分查找.
    pub fn locate(&self, hu: f64) -> Option<usize> {
        if !(self.lower_bound() <= hu && hu < self.upper_bound()) {
            return None;
        }
        let i = self.bands.partition_point(|b| b.upper <= hu);
        debug_assert!(self.bands[i].contains(hu));
        Some(i)
    }

    /// 类型为 `kind` 的分级序号.
    #[inline]
    pub fn index_of(&self, kind: BandKind) -> Option<usize> {
        self.bands.iter().position(|b| b.kind == kind)
    }

    /// 返回将最低分级下限下调到 `min` 的新分级表. 若 `min` 不低于当前下限, 返回自身的拷贝.
    pub fn with_lowered_floor(&self, min: f64) -> Self {
        let mut ans = self.clone();
        if min < ans.bands[0].lower {
            ans.bands[0].lower = min;
        }
        ans
    }
}

/// 将 `(side, band_index)` 编码为标签值.
#[inline]
pub const fn encode(side: Side, band_index: usize) -> u16 {
    side.code() * BAND_STRIDE + band_index as u16 + 1
}

/// 将标签值解码为 `(side, band_index)`. 非密度分级标签返回 `None`.
#[inline]
pub const fn decode(label: u16) -> Option<(Side, usize)> {
    let rem = label % BAND_STRIDE;
    if rem == 0 {
        return None;
    }
    match Side::from_code(label / BAND_STRIDE) {
        Some(side) => Some((side, (rem - 1) as usize)),
        None => None,
    }
}

/// 标签名称, 如 `"Ventilated right"`.
#[inline]
pub fn label_name(side: Side, kind: BandKind) -> String {
    format!("{} {}", kind.name(), side.short())
}
