//! 3D 布尔掩码.

use std::collections::VecDeque;
use std::ops::{Index, IndexMut};

use ndarray::{Array3, ArrayView, ArrayViewMut, ArrayViewMut2, Axis, Ix3, Zip};

use super::{CtWindow, GridAttr, GridGeometry, VoxelGrid};
use crate::error::{LungError, LungResult};
use crate::{Idx2d, Idx3d};

/// 3D 布尔掩码, 与 [`VoxelGrid`] 共享几何信息. `true` 代表体素属于该区域.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskGrid {
    geometry: GridGeometry,
    data: Array3<bool>,
}

impl GridAttr for MaskGrid {
    #[inline]
    fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }
}

impl Index<Idx3d> for MaskGrid {
    type Output = bool;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for MaskGrid {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl MaskGrid {
    /// 创建与 `geometry` 匹配的全背景掩码.
    #[inline]
    pub fn empty(geometry: GridGeometry) -> Self {
        let data = Array3::from_elem(geometry.shape(), false);
        Self { geometry, data }
    }

    /// 创建与 `geometry` 匹配的全前景掩码.
    #[inline]
    pub fn full(geometry: GridGeometry) -> Self {
        let data = Array3::from_elem(geometry.shape(), true);
        Self { geometry, data }
    }

    /// 由已有的 `(z, h, w)` 数组和几何信息构造.
    ///
    /// 若两者形状不一致, 返回 `Err(LungError::ShapeMismatch)`.
    pub fn from_array(data: Array3<bool>, geometry: GridGeometry) -> LungResult<Self> {
        let found = data.dim();
        if found != geometry.shape() {
            return Err(LungError::ShapeMismatch {
                what: "mask data",
                expected: geometry.shape(),
                found,
            });
        }
        Ok(Self { geometry, data })
    }

    /// 内部方法, 由调用者保证形状一致.
    #[inline]
    pub(super) fn from_parts(data: Array3<bool>, geometry: GridGeometry) -> Self {
        debug_assert_eq!(data.dim(), geometry.shape());
        Self { geometry, data }
    }

    /// 将 `scan` 中落在 `window` 范围内的体素标记为前景.
    pub fn from_window(scan: &VoxelGrid, window: &CtWindow) -> Self {
        let data = scan.data().mapv(|hu| window.contains(hu));
        Self {
            geometry: scan.geometry().clone(),
            data,
        }
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, bool, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, bool, Ix3> {
        self.data.view_mut()
    }

    /// 前景体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.data.iter().filter(|p| **p).count()
    }

    /// 是否不含任何前景体素?
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|p| *p)
    }

    /// 收集所有前景体素对应的下标, 结果按行优先存储.
    pub fn positions(&self) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(pos, p)| p.then_some(pos))
            .collect()
    }

    /// 与 `other` 求交, 结果写回自身.
    ///
    /// 若形状不一致, 返回 `Err(LungError::ShapeMismatch)`, 自身不被修改.
    pub fn intersect_with(&mut self, other: &MaskGrid) -> LungResult<()> {
        self.ensure_same_shape(other, "intersected mask")?;
        Zip::from(&mut self.data)
            .and(&other.data)
            .for_each(|a, &b| *a = *a && b);
        Ok(())
    }

    /// 从自身中去掉 `other` 的前景, 结果写回自身.
    ///
    /// 若形状不一致, 返回 `Err(LungError::ShapeMismatch)`, 自身不被修改.
    pub fn difference_with(&mut self, other: &MaskGrid) -> LungResult<()> {
        self.ensure_same_shape(other, "subtracted mask")?;
        Zip::from(&mut self.data)
            .and(&other.data)
            .for_each(|a, &b| *a = *a && !b);
        Ok(())
    }

    /// 将每个水平切片中的前景空洞 (即不与切片边缘 4-连通的背景区域)
    /// 填充为前景. 如果以此法修改了掩码则返回 `true`, 否则返回 `false`.
    ///
    /// 肺实质掩码中被排除在 HU 窗口之外的血管即以此法补回.
    pub fn fill_holes(&mut self) -> bool {
        let mut non_trivial = false;
        for sli in self.data.axis_iter_mut(Axis(0)) {
            non_trivial |= fill_slice_holes(sli);
        }
        non_trivial
    }

    /// 消费自身, 获得底层数据.
    #[inline]
    pub fn into_raw(self) -> (GridGeometry, Array3<bool>) {
        (self.geometry, self.data)
    }
}

/// 获取二维切片上 `pos` 上下左右四个点中不越界的坐标.
#[inline]
fn n4_positions((sh, sw): Idx2d, (h, w): Idx2d) -> impl Iterator<Item = Idx2d> {
    [
        (h.wrapping_sub(1), w),
        (h.saturating_add(1), w),
        (h, w.wrapping_sub(1)),
        (h, w.saturating_add(1)),
    ]
    .into_iter()
    .filter(move |(a, b)| *a < sh && *b < sw)
}

/// 单个水平切片的空洞填充.
fn fill_slice_holes(mut sli: ArrayViewMut2<bool>) -> bool {
    let shape = sli.dim();
    let (h, w) = shape;
    if h == 0 || w == 0 {
        return false;
    }

    // 从切片边缘的背景像素出发, 按 4-相邻规则标记所有可达背景.
    let mut outside = ndarray::Array2::from_elem(shape, false);
    let mut q: VecDeque<Idx2d> = sli
        .indexed_iter()
        .filter_map(|((a, b), &p)| {
            (!p && (a == 0 || b == 0 || a == h - 1 || b == w - 1)).then_some((a, b))
        })
        .collect();
    q.iter().for_each(|p| outside[*p] = true);

    while let Some(cur) = q.pop_front() {
        for n in n4_positions(shape, cur) {
            if !sli[n] && !outside[n] {
                outside[n] = true;
                q.push_back(n);
            }
        }
    }

    let mut non_trivial = false;
    Zip::from(&mut sli).and(&outside).for_each(|p, &out| {
        if !*p && !out {
            *p = true;
            non_trivial = true;
        }
    });
    non_trivial
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use std::sync::atomic::{AtomicBool, Ordering};
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl MaskGrid {
    /// 借助 `rayon`, 使用多任务模式运行 `self.fill_holes`.
    pub fn par_fill_holes(&mut self) -> bool {
        let non_trivial = AtomicBool::new(false);
        self.data
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|sli| {
                non_trivial.fetch_or(fill_slice_holes(sli), Ordering::Release);
            });
        non_trivial.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_mask() -> MaskGrid {
        // 每个切片都是 5x5 的方环, 中心 3x3 中只有正中心为空洞.
        let g = GridGeometry::new((2, 5, 5), [1.0; 3]).unwrap();
        let mut m = MaskGrid::empty(g);
        for z in 0..2 {
            for h in 1..4 {
                for w in 1..4 {
                    m[(z, h, w)] = true;
                }
            }
            m[(z, 2, 2)] = false;
        }
        m
    }

    #[test]
    fn test_mask_fill_holes() {
        let mut m = ring_mask();
        assert_eq!(m.count(), 16);
        assert!(m.fill_holes());
        assert_eq!(m.count(), 18);
        assert!(m[(0, 2, 2)] && m[(1, 2, 2)]);
        // 与边缘连通的背景保持不变.
        assert!(!m[(0, 0, 0)]);
        assert!(!m.fill_holes());
    }

    #[test]
    fn test_mask_fill_holes_open_to_border() {
        let mut m = ring_mask();
        // 打通到切片边缘后, 中心不再是空洞.
        m[(0, 2, 1)] = false;
        m[(0, 2, 0)] = false;
        assert!(m.fill_holes());
        assert!(!m[(0, 2, 2)]);
        assert!(m[(1, 2, 2)]);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_mask_par_fill_holes() {
        let mut a = ring_mask();
        let mut b = ring_mask();
        assert_eq!(a.fill_holes(), b.par_fill_holes());
        assert_eq!(a, b);
    }

    #[test]
    fn test_mask_from_window_and_intersect() {
        let mut scan = VoxelGrid::filled((1, 2, 2), [1.0; 3], -900.0).unwrap();
        scan[(0, 0, 1)] = 40.0;
        scan[(0, 1, 1)] = -1200.0;
        let mut m = MaskGrid::from_window(&scan, &CtWindow::default());
        assert_eq!(m.positions(), vec![(0, 0, 0), (0, 1, 0)]);

        let mut other = MaskGrid::empty(scan.geometry().clone());
        other[(0, 1, 0)] = true;
        m.intersect_with(&other).unwrap();
        assert_eq!(m.positions(), vec![(0, 1, 0)]);

        let g = GridGeometry::new((1, 1, 1), [1.0; 3]).unwrap();
        assert!(m.intersect_with(&MaskGrid::full(g)).is_err());
        assert!(!m.is_empty());

        m.difference_with(&other).unwrap();
        assert!(m.is_empty());
    }
}
