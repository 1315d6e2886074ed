#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// CT 窗口, 包含窗位 (window level) 和窗宽 (window width).
///
/// 在本 crate 中, 窗口用于从 CT 扫描直接推导可用体素掩码: 落在
/// `[lower_bound, upper_bound)` 左闭右开区间内的体素是可用的.
///
/// 该窗口是只读的. 若要修改窗口参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CtWindow {
    level: f32,
    width: f32,
}

impl CtWindow {
    /// 构建 CT 窗.
    ///
    /// `level` 和 `width` 必须在合理范围内, 否则返回 `None`.
    pub fn new(level: f32, width: f32) -> Option<CtWindow> {
        if (-1e5..=1e5).contains(&level) && 0.0 < width && width <= 1e5 {
            Some(Self { level, width })
        } else {
            None
        }
    }

    /// 由窗下限和窗上限构建 CT 窗. 要求 `lower < upper`, 否则返回 `None`.
    #[inline]
    pub fn from_bounds(lower: f32, upper: f32) -> Option<CtWindow> {
        Self::new((lower + upper) / 2.0, upper - lower)
    }

    /// 构建一个便于分离含气肺组织的 CT 窗口. 该窗口的窗下限为 -1100, 窗上限为 -200.
    #[inline]
    pub const fn from_lung_parenchyma() -> CtWindow {
        Self {
            level: -650.0,
            width: 900.0,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn lower_bound(&self) -> f32 {
        self.level - self.width / 2.0
    }

    /// 窗上限.
    #[inline]
    pub fn upper_bound(&self) -> f32 {
        self.level + self.width / 2.0
    }

    /// 窗位.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.width
    }

    /// `ct` HU 值是否落在 `[lower_bound, upper_bound)` 区间内.
    ///
    /// 如果 `ct` 无意义 (如 inf, NaN), 则返回 `false`.
    #[inline]
    pub fn contains(&self, ct: f32) -> bool {
        ct.is_finite() && self.lower_bound() <= ct && ct < self.upper_bound()
    }
}

impl Default for CtWindow {
    #[inline]
    fn default() -> Self {
        Self::from_lung_parenchyma()
    }
}

#[cfg(test)]
mod tests {
    use super::CtWindow;
    use crate::consts::{DEFAULT_LUNG_WINDOW_LOWER, DEFAULT_LUNG_WINDOW_UPPER};

    fn is_valid_init(level: f32, width: f32) -> bool {
        CtWindow::new(level, width).is_some()
    }

    #[test]
    fn test_ct_window_invalid_input() {
        assert!(!is_valid_init(0.0, -1.0));
        assert!(!is_valid_init(0.0, 0.0));
        assert!(CtWindow::from_bounds(-200.0, -1100.0).is_none());
    }

    #[test]
    fn test_ct_window_lung_default() {
        let w = CtWindow::default();
        assert_eq!(w.lower_bound(), DEFAULT_LUNG_WINDOW_LOWER);
        assert_eq!(w.upper_bound(), DEFAULT_LUNG_WINDOW_UPPER);
        assert_eq!(
            CtWindow::from_bounds(DEFAULT_LUNG_WINDOW_LOWER, DEFAULT_LUNG_WINDOW_UPPER),
            Some(w)
        );
    }

    #[test]
    fn test_ct_window_contains() {
        // [60, 100)
        let ct = CtWindow::new(80.0, 40.0).unwrap();
        assert!(!ct.contains(f32::NAN));
        assert!(!ct.contains(f32::NEG_INFINITY));
        assert!(!ct.contains(59.9));
        assert!(ct.contains(60.0));
        assert!(ct.contains(99.999));
        assert!(!ct.contains(100.0));
    }
}
