//! 区域的有向包围盒.

use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};

use crate::anatomy::AnatomicalAxis;
use crate::data::{GridAttr, MaskGrid};
use crate::error::{LungError, LungResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 包围盒坐标轴的确定方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisMode {
    /// 与物理坐标轴 (RAS) 对齐. 适用于图像本身已按解剖方向摆正的情形.
    #[default]
    Anatomical,

    /// 体素中心坐标的主成分方向.
    Principal,
}

/// 有向包围盒: 中心, 三个正交单位轴及沿各轴的全长 (毫米).
///
/// 第 `i` 个轴与第 `i` 个解剖轴 (左右, 前后, 头足) 匹配, 且与其正方向夹角不超过 90 度.
#[derive(Clone, Debug, PartialEq)]
pub struct OrientedBoundingBox {
    center: Point3<f64>,
    axes: Matrix3<f64>,
    extents: Vector3<f64>,
}

const ANATOMICAL_AXES: [AnatomicalAxis; 3] = [
    AnatomicalAxis::LeftRight,
    AnatomicalAxis::Anteroposterior,
    AnatomicalAxis::Craniocaudal,
];

#[inline]
const fn axis_index(axis: AnatomicalAxis) -> usize {
    match axis {
        AnatomicalAxis::LeftRight => 0,
        AnatomicalAxis::Anteroposterior => 1,
        AnatomicalAxis::Craniocaudal => 2,
    }
}

impl OrientedBoundingBox {
    /// 由中心与全长构造与物理坐标轴对齐的包围盒.
    ///
    /// 全长任一分量为负或非有限时返回 `Err(LungError::InvalidGrid)`.
    pub fn axis_aligned(center: [f64; 3], extents: [f64; 3]) -> LungResult<Self> {
        if extents.iter().any(|e| !e.is_finite() || *e < 0.0) {
            return Err(LungError::InvalidGrid(format!(
                "bounding box extents must be non-negative, found {extents:?}"
            )));
        }
        Ok(Self {
            center: Point3::from(center),
            axes: Matrix3::identity(),
            extents: Vector3::from(extents),
        })
    }

    /// 由掩码前景体素中心计算包围盒.
    ///
    /// 若掩码为空, 返回 `Err(LungError::DegenerateMask)`.
    pub fn from_mask(mask: &MaskGrid, mode: AxisMode) -> LungResult<Self> {
        let points: Vec<Point3<f64>> = mask
            .positions()
            .into_iter()
            .map(|pos| mask.physical(pos))
            .collect();
        if points.is_empty() {
            return Err(LungError::DegenerateMask {
                what: "bounding box region",
            });
        }

        let axes = match mode {
            AxisMode::Anatomical => Matrix3::identity(),
            AxisMode::Principal => principal_axes(&points),
        };

        // 在局部坐标系中求轴对齐包围盒.
        let mut local_min = Vector3::repeat(f64::INFINITY);
        let mut local_max = Vector3::repeat(f64::NEG_INFINITY);
        for p in points.iter() {
            let local = axes.transpose() * p.coords;
            local_min = local_min.inf(&local);
            local_max = local_max.sup(&local);
        }
        let local_center = (local_min + local_max) / 2.0;
        Ok(Self {
            center: Point3::from(axes * local_center),
            axes,
            extents: local_max - local_min,
        })
    }

    /// 中心点 (物理坐标).
    #[inline]
    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    /// 与解剖轴 `axis` 匹配的单位轴.
    #[inline]
    pub fn axis(&self, axis: AnatomicalAxis) -> Vector3<f64> {
        self.axes.column(axis_index(axis)).into_owned()
    }

    /// 沿解剖轴 `axis` 的全长 (毫米).
    #[inline]
    pub fn extent(&self, axis: AnatomicalAxis) -> f64 {
        self.extents[axis_index(axis)]
    }

    /// 物理坐标 `p` 在包围盒局部坐标系中的坐标, 按 (左右, 前后, 头足) 排列.
    #[inline]
    pub fn to_local(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.axes.transpose() * (p - self.center)
    }
}

/// 体素中心坐标协方差矩阵的特征向量, 按列与解剖轴匹配并校正方向.
fn principal_axes(points: &[Point3<f64>]) -> Matrix3<f64> {
    let n = points.len() as f64;
    let centroid: Vector3<f64> = points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / n;
    let cov = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p.coords - centroid;
        acc + d * d.transpose()
    }) / n;

    let eigen = SymmetricEigen::new(cov);
    match_anatomical_axes(&eigen.eigenvectors)
}

/// 将三个正交方向 (矩阵的列) 重新排列, 使第 `i` 列与第 `i` 个解剖轴的
/// 绝对点积之和最大, 再翻转与解剖轴正方向相反的列.
fn match_anatomical_axes(vectors: &Matrix3<f64>) -> Matrix3<f64> {
    const PERMUTATIONS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    let score = |perm: &[usize; 3]| -> f64 {
        ANATOMICAL_AXES
            .iter()
            .zip(perm.iter())
            .map(|(a, &c)| vectors.column(c).dot(&Vector3::from(a.direction())).abs())
            .sum()
    };
    let best = PERMUTATIONS
        .iter()
        .max_by(|a, b| score(a).total_cmp(&score(b)))
        .copied()
        .unwrap_or([0, 1, 2]);

    let mut ans = Matrix3::zeros();
    for (i, (a, &c)) in ANATOMICAL_AXES.iter().zip(best.iter()).enumerate() {
        let mut v = vectors.column(c).normalize();
        if v.dot(&Vector3::from(a.direction())) < 0.0 {
            v = -v;
        }
        ans.set_column(i, &v);
    }
    ans
}
