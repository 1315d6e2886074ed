//! 体素索引到物理空间 (毫米, RAS) 的仿射变换.
//!
//! 仿射矩阵按 nifti 惯例作用于列向量 `(w, h, z, 1)`, 即先宽, 再高, 最后切片方向.
//! 该 crate 内部的索引是 `(z, h, w)`, 转换在本模块内部完成.

use crate::error::{LungError, LungResult};
use crate::Idx3d;
use nalgebra::{Matrix4, Point3};

/// 体素到物理空间的仿射变换. 构造时即求逆, 之后只读.
#[derive(Clone, Debug, PartialEq)]
pub struct Affine {
    forward: Matrix4<f64>,
    inverse: Matrix4<f64>,
}

impl Affine {
    /// 由按行排列的 4x4 矩阵构造.
    ///
    /// 最后一行必须为 `[0, 0, 0, 1]`, 且矩阵必须可逆, 否则返回 `Err(LungError::InvalidGrid)`.
    pub fn new(rows: [[f64; 4]; 4]) -> LungResult<Self> {
        if rows[3] != [0.0, 0.0, 0.0, 1.0] {
            return Err(LungError::InvalidGrid(format!(
                "affine last row must be [0, 0, 0, 1], found {:?}",
                rows[3]
            )));
        }
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(LungError::InvalidGrid(
                "affine has non-finite entries".into(),
            ));
        }
        let forward = Matrix4::from_fn(|r, c| rows[r][c]);
        let inverse = forward
            .try_inverse()
            .ok_or_else(|| LungError::InvalidGrid("affine is singular".into()))?;
        Ok(Self { forward, inverse })
    }

    /// 由 nifti header 中的 `srow_{x, y, z}` 三行构造.
    #[inline]
    pub fn from_srows(x: [f64; 4], y: [f64; 4], z: [f64; 4]) -> LungResult<Self> {
        Self::new([x, y, z, [0.0, 0.0, 0.0, 1.0]])
    }

    /// 以原点为 `(0, 0, 0)`, 坐标轴与索引轴对齐的方式, 由体素间距构造.
    ///
    /// `pix_dim` 按 `[z, h, w]` 排列, 且各分量必须为正 (由调用者保证).
    pub fn from_spacing(pix_dim: [f64; 3]) -> Self {
        let [z, h, w] = pix_dim;
        debug_assert!(z > 0.0 && h > 0.0 && w > 0.0);
        let forward = Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(w, h, z));
        let inverse =
            Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(1.0 / w, 1.0 / h, 1.0 / z));
        Self { forward, inverse }
    }

    /// 体素中心 `pos` 的物理坐标 (毫米).
    #[inline]
    pub fn voxel_to_physical(&self, (z, h, w): Idx3d) -> Point3<f64> {
        self.forward
            .transform_point(&Point3::new(w as f64, h as f64, z as f64))
    }

    /// 物理坐标 `p` 对应的连续体素索引, 按 `[z, h, w]` 排列. 结果可能越界或为负.
    #[inline]
    pub fn physical_to_continuous(&self, p: &Point3<f64>) -> [f64; 3] {
        let v = self.inverse.transform_point(p);
        [v.z, v.y, v.x]
    }

    /// 按行获取矩阵.
    pub fn rows(&self) -> [[f64; 4]; 4] {
        let mut ans = [[0.0; 4]; 4];
        for (r, row) in ans.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = self.forward[(r, c)];
            }
        }
        ans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_affine_from_spacing() {
        let a = Affine::from_spacing([5.0, 0.5, 0.75]);
        let p = a.voxel_to_physical((2, 4, 8));
        assert!(f64_eq(p.x, 6.0));
        assert!(f64_eq(p.y, 2.0));
        assert!(f64_eq(p.z, 10.0));

        let [z, h, w] = a.physical_to_continuous(&p);
        assert!(f64_eq(z, 2.0) && f64_eq(h, 4.0) && f64_eq(w, 8.0));
    }

    #[test]
    fn test_affine_with_origin_and_flip() {
        // 高方向翻转 (nifti 中常见的 LPS -> RAS 情形), 并带原点偏移.
        let a = Affine::new([
            [1.0, 0.0, 0.0, -100.0],
            [0.0, -1.0, 0.0, 50.0],
            [0.0, 0.0, 2.0, 10.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap();
        let p = a.voxel_to_physical((1, 10, 20));
        assert!(f64_eq(p.x, -80.0));
        assert!(f64_eq(p.y, 40.0));
        assert!(f64_eq(p.z, 12.0));
        let [z, h, w] = a.physical_to_continuous(&p);
        assert!(f64_eq(z, 1.0) && f64_eq(h, 10.0) && f64_eq(w, 20.0));
        assert_eq!(a.rows()[1], [0.0, -1.0, 0.0, 50.0]);
    }

    #[test]
    fn test_affine_rejects_singular() {
        let err = Affine::new([
            [1.0, 0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
        .unwrap_err();
        assert!(matches!(err, LungError::InvalidGrid(_)));

        let err = Affine::new([[1.0, 0.0, 0.0, 0.0]; 4]).unwrap_err();
        assert!(matches!(err, LungError::InvalidGrid(_)));
    }
}
