use std::ops::{Index, IndexMut};

use nalgebra::Point3;
use ndarray::{Array3, ArrayView, ArrayViewMut, Ix3};

use crate::consts::MM3_PER_ML;
use crate::error::{LungError, LungResult};
use crate::{Idx2d, Idx3d};

pub mod affine;
pub mod label;
pub mod mask;
pub mod window;

pub use affine::Affine;
pub use label::LabelGrid;
pub use mask::MaskGrid;
pub use window::CtWindow;

/// 网格的几何信息: 形状, 体素分辨率与仿射变换.
///
/// 形状按 `(z, h, w)` 排列, 分辨率按 `[z, h, w]` 排列, 以毫米为单位.
/// 同一次流程中派生的所有网格共享同一份几何信息.
#[derive(Clone, Debug, PartialEq)]
pub struct GridGeometry {
    shape: Idx3d,
    pix_dim: [f64; 3],
    affine: Affine,
}

impl GridGeometry {
    /// 由形状与体素分辨率构造, 仿射变换与索引轴对齐.
    ///
    /// 若 `pix_dim` 任一分量非正或非有限, 返回 `Err(LungError::InvalidGrid)`.
    pub fn new(shape: Idx3d, pix_dim: [f64; 3]) -> LungResult<Self> {
        if pix_dim.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(LungError::InvalidGrid(format!(
                "voxel spacing must be positive, found {pix_dim:?}"
            )));
        }
        Ok(Self {
            shape,
            pix_dim,
            affine: Affine::from_spacing(pix_dim),
        })
    }

    /// 替换仿射变换.
    ///
    /// 仿射变换仅用于物理坐标换算, 体素体积仍由 `pix_dim` 决定.
    #[inline]
    pub fn with_affine(mut self, affine: Affine) -> Self {
        self.affine = affine;
        self
    }

    /// 数据形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.shape
    }

    /// 体素分辨率, `[z, h, w]`.
    #[inline]
    pub fn pix_dim(&self) -> [f64; 3] {
        self.pix_dim
    }

    /// 仿射变换.
    #[inline]
    pub fn affine(&self) -> &Affine {
        &self.affine
    }
}

/// 三维网格的共用属性和部分通用操作.
pub trait GridAttr {
    /// 获取几何信息.
    fn geometry(&self) -> &GridGeometry;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        self.geometry().shape
    }

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        self.geometry().pix_dim
    }

    /// 获取 width 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn width_mm(&self) -> f64 {
        self.pix_dim()[2]
    }

    /// 获取 height 方向体素分辨率, 以毫米为单位.
    #[inline]
    fn height_mm(&self) -> f64 {
        self.pix_dim()[1]
    }

    /// 获取空间方向 (相邻 2D 切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.pix_dim()[0]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 获取体素的实际体积值, 以毫升为单位.
    #[inline]
    fn voxel_ml(&self) -> f64 {
        self.voxel() / MM3_PER_ML
    }

    /// 获取体素中心的物理坐标 (毫米, RAS).
    #[inline]
    fn physical(&self, pos: Idx3d) -> Point3<f64> {
        self.geometry().affine.voxel_to_physical(pos)
    }

    /// 检查 `other` 与自身形状一致, 否则返回 `Err(LungError::ShapeMismatch)`.
    /// `what` 用于描述 `other`.
    fn ensure_same_shape<G: GridAttr + ?Sized>(
        &self,
        other: &G,
        what: &'static str,
    ) -> LungResult<()> {
        if self.shape() == other.shape() {
            Ok(())
        } else {
            Err(LungError::ShapeMismatch {
                what,
                expected: self.shape(),
                found: other.shape(),
            })
        }
    }
}

/// 获取 `pos` 前后上下左右六个点的坐标.
///
/// 在形状 `shape` 范围外的坐标会被过滤掉, 不会出现在迭代结果中.
#[inline]
pub fn diamond_neighbours(shape: Idx3d, (z, h, w): Idx3d) -> impl Iterator<Item = Idx3d> {
    let (sz, sh, sw) = shape;
    [
        (z.wrapping_sub(1), h, w),
        (z.saturating_add(1), h, w),
        (z, h.wrapping_sub(1), w),
        (z, h.saturating_add(1), w),
        (z, h, w.wrapping_sub(1)),
        (z, h, w.saturating_add(1)),
    ]
    .into_iter()
    .filter(move |(a, b, c)| *a < sz && *b < sh && *c < sw)
}

/// 3D 体数据 (CT 扫描), 体素值为有符号 HU 值, 以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    geometry: GridGeometry,
    data: Array3<f32>,
}

impl GridAttr for VoxelGrid {
    #[inline]
    fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }
}

impl Index<Idx3d> for VoxelGrid {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for VoxelGrid {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl VoxelGrid {
    /// 由形状 `(z, h, w)`, 分辨率 `[z, h, w]` 和按行优先存储的体素值构造.
    ///
    /// 若 `data.len() != z * h * w` 或分辨率非法, 返回 `Err(LungError::InvalidGrid)`.
    pub fn new(shape: Idx3d, pix_dim: [f64; 3], data: Vec<f32>) -> LungResult<Self> {
        let geometry = GridGeometry::new(shape, pix_dim)?;
        let len = data.len();
        let data = Array3::from_shape_vec(shape, data).map_err(|_| {
            LungError::InvalidGrid(format!(
                "data length {len} does not match shape {shape:?}"
            ))
        })?;
        Ok(Self { geometry, data })
    }

    /// 由已有的 `(z, h, w)` 数组和几何信息构造.
    ///
    /// 若两者形状不一致, 返回 `Err(LungError::ShapeMismatch)`.
    pub fn from_array(data: Array3<f32>, geometry: GridGeometry) -> LungResult<Self> {
        let found = data.dim();
        if found != geometry.shape {
            return Err(LungError::ShapeMismatch {
                what: "voxel data",
                expected: geometry.shape,
                found,
            });
        }
        Ok(Self { geometry, data })
    }

    /// 以常量 `value` 填充整个网格.
    pub fn filled(shape: Idx3d, pix_dim: [f64; 3], value: f32) -> LungResult<Self> {
        let geometry = GridGeometry::new(shape, pix_dim)?;
        Ok(Self {
            geometry,
            data: Array3::from_elem(shape, value),
        })
    }

    /// 替换仿射变换.
    #[inline]
    pub fn with_affine(mut self, affine: Affine) -> Self {
        self.geometry = self.geometry.with_affine(affine);
        self
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }

    /// 最小的有限体素值. 若不存在有限值, 返回 `None`.
    pub fn min_value(&self) -> Option<f32> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .reduce(f32::min)
    }

    /// 消费自身, 获得底层数据.
    #[inline]
    pub fn into_raw(self) -> (GridGeometry, Array3<f32>) {
        (self.geometry, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_grid_invalid_input() {
        let err = VoxelGrid::new((2, 2, 2), [1.0; 3], vec![0.0; 7]).unwrap_err();
        assert!(matches!(err, LungError::InvalidGrid(_)));

        let err = VoxelGrid::new((1, 1, 1), [1.0, 0.0, 1.0], vec![0.0]).unwrap_err();
        assert!(matches!(err, LungError::InvalidGrid(_)));

        let g = GridGeometry::new((1, 2, 3), [1.0; 3]).unwrap();
        let err = VoxelGrid::from_array(Array3::zeros((3, 2, 1)), g).unwrap_err();
        assert!(matches!(err, LungError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_voxel_grid_attr() {
        let mut grid = VoxelGrid::filled((4, 3, 2), [2.0, 0.5, 0.5], -500.0).unwrap();
        assert_eq!(grid.size(), 24);
        assert_eq!(grid.slice_shape(), (3, 2));
        assert!((grid.voxel() - 0.5).abs() < 1e-12);
        assert!((grid.voxel_ml() - 0.0005).abs() < 1e-12);
        assert!(grid.check(&(3, 2, 1)));
        assert!(!grid.check(&(4, 0, 0)));

        grid[(1, 1, 1)] = -1200.0;
        grid[(0, 0, 0)] = f32::NAN;
        grid[(3, 2, 1)] = 40.0;
        assert_eq!(grid.min_value(), Some(-1200.0));
    }

    #[test]
    fn test_diamond_neighbours() {
        let shape = (3, 3, 3);
        assert_eq!(diamond_neighbours(shape, (1, 1, 1)).count(), 6);
        assert_eq!(diamond_neighbours(shape, (0, 0, 0)).count(), 3);
        let mut v: Vec<_> = diamond_neighbours(shape, (2, 0, 1)).collect();
        v.sort();
        assert_eq!(v, vec![(1, 0, 1), (2, 0, 0), (2, 0, 2), (2, 1, 1)]);
    }

    #[test]
    fn test_ensure_same_shape() {
        let a = VoxelGrid::filled((2, 2, 2), [1.0; 3], 0.0).unwrap();
        let b = VoxelGrid::filled((2, 2, 3), [1.0; 3], 0.0).unwrap();
        assert!(a.ensure_same_shape(&a, "self").is_ok());
        let err = a.ensure_same_shape(&b, "other").unwrap_err();
        assert_eq!(
            err,
            LungError::ShapeMismatch {
                what: "other",
                expected: (2, 2, 2),
                found: (2, 2, 3)
            }
        );
    }
}
