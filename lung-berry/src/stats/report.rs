//! 交给报告输出端的版本化表格.

use std::fmt;

use super::{round_to, ResultRow};
use crate::consts::PERCENT_SENTINEL;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 报告表格的列定义. 版本号随列的增删递增.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReportSchema {
    version: u32,
    columns: &'static [&'static str],
}

impl ReportSchema {
    /// 第 1 版: 分段名称, 分级上下限, 体积 (毫升), 体积百分比.
    pub const V1: ReportSchema = ReportSchema {
        version: 1,
        columns: &[
            "segment",
            "min_threshold",
            "max_threshold",
            "volume_ml",
            "volume_percent",
        ],
    };

    /// 版本号.
    #[inline]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// 列名.
    #[inline]
    pub const fn columns(&self) -> &'static [&'static str] {
        self.columns
    }

    /// 将一行渲染为与 [`Self::columns`] 一一对应的字符串.
    pub fn render(&self, row: &ReportRow) -> Vec<String> {
        let threshold = |t: Option<f64>| t.map_or_else(String::new, |v| v.to_string());
        vec![
            row.segment.clone(),
            threshold(row.min_threshold),
            threshold(row.max_threshold),
            format!("{:.0}", row.volume_ml),
            if row.volume_percent == PERCENT_SENTINEL {
                "-1".to_string()
            } else {
                format!("{:.1}", row.volume_percent)
            },
        ]
    }
}

impl Default for ReportSchema {
    #[inline]
    fn default() -> Self {
        Self::V1
    }
}

impl fmt::Display for ReportSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} [{}]", self.version, self.columns.join(", "))
    }
}

/// 报告中的一行: [`ResultRow`] 按显示精度取整后的结果.
///
/// 体积取整到 1 毫升, 百分比取整到 0.1, 哨兵值 `-1` 原样保留.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReportRow {
    /// 分段名称.
    pub segment: String,

    /// 分级下限 (HU).
    pub min_threshold: Option<f64>,

    /// 分级上限 (HU).
    pub max_threshold: Option<f64>,

    /// 体积 (毫升), 已取整.
    pub volume_ml: f64,

    /// 体积百分比, 已取整.
    pub volume_percent: f64,
}

impl From<&ResultRow> for ReportRow {
    fn from(r: &ResultRow) -> Self {
        Self {
            segment: r.segment.clone(),
            min_threshold: r.min_threshold,
            max_threshold: r.max_threshold,
            volume_ml: round_to(r.volume_ml, 0),
            volume_percent: round_to(r.percent, 1),
        }
    }
}
