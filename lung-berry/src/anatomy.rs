//! 解剖学身份: 肺的左右侧, 分离区域, 解剖分区与物理坐标轴.
//!
//! 物理坐标系约定为 RAS: `+x` 指向患者右侧, `+y` 指向前方 (ventral),
//! `+z` 指向头侧 (cranial).

use crate::consts::label::{AIRWAY, LEFT_LUNG, RIGHT_LUNG};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 肺的左右侧.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    /// 右肺.
    Right,

    /// 左肺.
    Left,
}

impl Side {
    /// 两侧, 按报告顺序排列.
    pub const BOTH: [Side; 2] = [Side::Right, Side::Left];

    /// 侧别编码. 同时也是左右肺分离结果中对应肺的标签值.
    #[inline]
    pub const fn code(&self) -> u16 {
        match self {
            Side::Right => RIGHT_LUNG,
            Side::Left => LEFT_LUNG,
        }
    }

    /// 从侧别编码还原. 非法编码返回 `None`.
    #[inline]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            RIGHT_LUNG => Some(Side::Right),
            LEFT_LUNG => Some(Side::Left),
            _ => None,
        }
    }

    /// 区域名, 如 `"right lung"`.
    #[inline]
    pub const fn region_name(&self) -> &'static str {
        match self {
            Side::Right => "right lung",
            Side::Left => "left lung",
        }
    }

    /// 简称, 用作分级/分区名后缀.
    #[inline]
    pub const fn short(&self) -> &'static str {
        match self {
            Side::Right => "right",
            Side::Left => "left",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.region_name())
    }
}

/// 种子点分离出的区域.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Region {
    /// 右肺.
    RightLung,

    /// 左肺.
    LeftLung,

    /// 气道.
    Airway,
}

impl Region {
    /// 必须提供种子点的区域.
    pub const REQUIRED: [Region; 2] = [Region::RightLung, Region::LeftLung];

    /// 分离结果中的标签值.
    #[inline]
    pub const fn label(&self) -> u16 {
        match self {
            Region::RightLung => RIGHT_LUNG,
            Region::LeftLung => LEFT_LUNG,
            Region::Airway => AIRWAY,
        }
    }

    /// 区域名.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Region::RightLung => "right lung",
            Region::LeftLung => "left lung",
            Region::Airway => "airway",
        }
    }

    /// 区域对应的肺侧. 气道不属于任何一侧.
    #[inline]
    pub const fn side(&self) -> Option<Side> {
        match self {
            Region::RightLung => Some(Side::Right),
            Region::LeftLung => Some(Side::Left),
            Region::Airway => None,
        }
    }

    /// 由区域名解析, 大小写不敏感. 未知名称返回 `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        [Region::RightLung, Region::LeftLung, Region::Airway]
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 物理坐标轴 (RAS).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AnatomicalAxis {
    /// 左右方向, `+x` 指向右侧.
    LeftRight,

    /// 前后方向, `+y` 指向前方.
    Anteroposterior,

    /// 头足方向, `+z` 指向头侧.
    Craniocaudal,
}

impl AnatomicalAxis {
    /// 该轴正方向在物理坐标系中的单位向量.
    #[inline]
    pub const fn direction(&self) -> [f64; 3] {
        match self {
            AnatomicalAxis::LeftRight => [1.0, 0.0, 0.0],
            AnatomicalAxis::Anteroposterior => [0.0, 1.0, 0.0],
            AnatomicalAxis::Craniocaudal => [0.0, 0.0, 1.0],
        }
    }
}

/// 解剖分区.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Zone {
    /// 腹侧 (前部).
    Ventral,

    /// 背侧 (后部).
    Dorsal,

    /// 上部.
    Upper,

    /// 中部.
    Middle,

    /// 下部.
    Lower,
}

impl Zone {
    /// 全部分区, 按报告顺序排列.
    pub const ALL: [Zone; 5] = [
        Zone::Ventral,
        Zone::Dorsal,
        Zone::Upper,
        Zone::Middle,
        Zone::Lower,
    ];

    /// 分区名.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Zone::Ventral => "ventral",
            Zone::Dorsal => "dorsal",
            Zone::Upper => "upper",
            Zone::Middle => "middle",
            Zone::Lower => "lower",
        }
    }

    /// 切割所沿的物理坐标轴.
    #[inline]
    pub const fn axis(&self) -> AnatomicalAxis {
        match self {
            Zone::Ventral | Zone::Dorsal => AnatomicalAxis::Anteroposterior,
            Zone::Upper | Zone::Middle | Zone::Lower => AnatomicalAxis::Craniocaudal,
        }
    }

    /// 由分区名解析, 大小写不敏感.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|z| z.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
