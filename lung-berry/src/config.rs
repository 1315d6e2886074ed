//! 流程配置.

use crate::band::BandTable;
use crate::consts::DEFAULT_THRESHOLDS;
use crate::data::CtWindow;
use crate::error::{LungError, LungResult};
use crate::grow::{GrowthParams, SeedRadii};
use crate::stats::BullaPolicy;
use crate::zone::ZoneParams;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一次分析所需的全部参数. 构造后只读, 按引用传入 [`Pipeline`](crate::Pipeline).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    /// 6 个递增的密度分级门限 (HU), 划分出 5 个分级.
    pub thresholds: [f64; 6],

    /// 未提供可用体素掩码时, 由该窗口推导.
    pub lung_window: CtWindow,

    /// 种子球半径.
    pub seed_radii: SeedRadii,

    /// 竞争生长参数.
    pub growth: GrowthParams,

    /// 分区切割参数.
    pub zones: ZoneParams,

    /// 肺气肿归类策略.
    pub bulla_policy: BullaPolicy,

    /// 是否生成每侧每分区的明细统计.
    pub detailed_zones: bool,

    /// 分类前是否填充肺掩码中的空洞 (血管).
    pub fill_holes: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            thresholds: DEFAULT_THRESHOLDS,
            lung_window: CtWindow::default(),
            seed_radii: SeedRadii::default(),
            growth: GrowthParams::default(),
            zones: ZoneParams::default(),
            bulla_policy: BullaPolicy::default(),
            detailed_zones: false,
            fill_holes: true,
        }
    }
}

impl AnalysisConfig {
    /// 由门限构造分级表.
    #[inline]
    pub fn band_table(&self) -> LungResult<BandTable> {
        BandTable::from_thresholds(&self.thresholds)
    }

    /// 检查全部参数.
    ///
    /// 门限非法时返回 `Err(LungError::InvalidBandTable)`, 其他参数非法时返回
    /// `Err(LungError::InvalidConfig)`.
    pub fn validate(&self) -> LungResult<()> {
        self.band_table()?;
        let w = &self.lung_window;
        if CtWindow::new(w.level(), w.width()).is_none() {
            return Err(LungError::InvalidConfig(format!(
                "lung window out of range: level {}, width {}",
                w.level(),
                w.width()
            )));
        }
        self.seed_radii.validate()?;
        self.growth.validate()?;
        self.zones.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_is_valid() {
        let c = AnalysisConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.band_table().unwrap(), BandTable::default());
        assert!(c.fill_holes);
        assert!(!c.detailed_zones);
        assert_eq!(c.bulla_policy, BullaPolicy::Functional);
    }

    #[test]
    fn test_config_invalid() {
        let mut c = AnalysisConfig::default();
        c.thresholds[3] = -800.0;
        assert!(matches!(
            c.validate(),
            Err(LungError::InvalidBandTable { index: 2, .. })
        ));

        let mut c = AnalysisConfig::default();
        c.growth.intensity_scale = -1.0;
        assert!(matches!(c.validate(), Err(LungError::InvalidConfig(_))));

        let mut c = AnalysisConfig::default();
        c.zones.margin_mm = f64::INFINITY;
        assert!(matches!(c.validate(), Err(LungError::InvalidConfig(_))));
    }
}
