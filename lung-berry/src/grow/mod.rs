//! 基于种子点的左右肺及气道分离.
//!
//! 种子点先被栅格化为小球并与可用掩码求交, 随后各区域从初始体素出发竞争生长,
//! 直到所有可达的可用体素都被归属. 生长代价同时考虑步长与相邻体素的密度差,
//! 使含气体素倾向于归入肺而不是越过纵隔.

use log::{debug, info};

use crate::consts::DEFAULT_INTENSITY_SCALE;
use crate::data::{GridAttr, LabelGrid, MaskGrid, VoxelGrid};
use crate::error::{LungError, LungResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod front;
mod seed;

pub use front::{GrowthFront, MAX_RANKS};
pub use seed::{initial_voxels, rasterize_sphere, validate_seed_sets, SeedRadii, SeedSet};

/// 竞争生长参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GrowthParams {
    /// 相邻体素 HU 差值的归一化尺度. 越小则密度差的惩罚越重.
    pub intensity_scale: f64,
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            intensity_scale: DEFAULT_INTENSITY_SCALE,
        }
    }
}

impl GrowthParams {
    /// `intensity_scale` 必须为正且有限.
    pub fn validate(&self) -> LungResult<()> {
        let s = self.intensity_scale;
        if s.is_finite() && s > 0.0 {
            Ok(())
        } else {
            Err(LungError::InvalidConfig(format!(
                "intensity scale must be positive, found {s}"
            )))
        }
    }
}

/// 从种子集合出发, 在 `admissible` 内竞争生长出互不相交的区域.
///
/// 结果标签即各区域的 [`Region::label`](crate::anatomy::Region::label),
/// 与任何种子都不连通的可用体素保持背景.
///
/// # 返回值
///
/// - 种子集合非法时, 返回 [`validate_seed_sets`] 的错误;
/// - `admissible` 与 `scan` 形状不一致, 返回 `Err(LungError::ShapeMismatch)`;
/// - `admissible` 为空, 返回 `Err(LungError::DegenerateMask)`;
/// - 必需区域的种子球不含可用体素, 返回 `Err(LungError::InsufficientSeeds)`.
pub fn separate(
    scan: &VoxelGrid,
    admissible: &MaskGrid,
    sets: &[SeedSet],
    radii: &SeedRadii,
    params: &GrowthParams,
) -> LungResult<LabelGrid> {
    validate_seed_sets(sets)?;
    scan.ensure_same_shape(admissible, "admissible mask")?;
    if admissible.is_empty() {
        return Err(LungError::DegenerateMask {
            what: "seeded separation",
        });
    }

    let init = initial_voxels(admissible, sets, radii)?;
    let mut front = GrowthFront::new(scan, admissible, params);
    for (rank, voxels) in init.iter().enumerate() {
        let rank = u8::try_from(rank)
            .ok()
            .filter(|&r| usize::from(r) < MAX_RANKS)
            .ok_or_else(|| {
                LungError::ConflictingSeeds(format!("more than {MAX_RANKS} seed sets"))
            })?;
        let region = sets[usize::from(rank)].region();
        debug!("{region}: {} initial voxels", voxels.len());
        for pos in voxels.iter() {
            front.seed(rank, *pos);
        }
    }
    let reached = front.run();
    info!(
        "seeded separation reached {reached} of {} admissible voxels",
        admissible.count()
    );

    let labels: Vec<u16> = sets.iter().map(|s| s.region().label()).collect();
    let data = front.into_labels(&labels);
    let names = sets
        .iter()
        .map(|s| (s.region().label(), s.region().name().to_string()))
        .collect();
    Ok(LabelGrid::from_parts_unchecked(
        data,
        scan.geometry().clone(),
        names,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anatomy::Region;
    use crate::consts::label::{AIRWAY, BACKGROUND, LEFT_LUNG, RIGHT_LUNG};
    use crate::data::GridGeometry;

    fn default_separate(
        scan: &VoxelGrid,
        admissible: &MaskGrid,
        sets: &[SeedSet],
    ) -> LungResult<LabelGrid> {
        separate(
            scan,
            admissible,
            sets,
            &SeedRadii::default(),
            &GrowthParams::default(),
        )
    }

    #[test]
    fn test_separate_two_spheres_in_cube() {
        // 200mm 立方体, 5mm 体素, 两个半径 10mm 的种子球相距 60mm.
        let scan = VoxelGrid::filled((40, 40, 40), [5.0; 3], -850.0).unwrap();
        let admissible = MaskGrid::full(scan.geometry().clone());
        let sets = vec![
            SeedSet::new(Region::RightLung, vec![[70.0, 100.0, 100.0]]),
            SeedSet::new(Region::LeftLung, vec![[130.0, 100.0, 100.0]]),
        ];
        let labels = default_separate(&scan, &admissible, &sets).unwrap();

        let right = labels.count(RIGHT_LUNG);
        let left = labels.count(LEFT_LUNG);
        assert_eq!(right + left, admissible.count());

        // 两个种子的中垂面位于 w = 20 (x = 100mm), 该面上同代价的体素归属在前的右肺.
        for ((_, _, w), &l) in labels.data().indexed_iter() {
            if w <= 20 {
                assert_eq!(l, RIGHT_LUNG);
            } else {
                assert_eq!(l, LEFT_LUNG);
            }
        }
        assert_eq!(labels.name(RIGHT_LUNG), Some("right lung"));
    }

    #[test]
    fn test_separate_leaves_unreachable_as_background() {
        let scan = VoxelGrid::filled((1, 3, 9), [1.0; 3], -850.0).unwrap();
        let mut admissible = MaskGrid::full(scan.geometry().clone());
        // w = 6 处整列不可用, 右侧的 w = 7, 8 与任何种子都不连通.
        for h in 0..3 {
            admissible[(0, h, 6)] = false;
        }
        let sets = vec![
            SeedSet::new(Region::RightLung, vec![[0.0, 1.0, 0.0]]),
            SeedSet::new(Region::LeftLung, vec![[4.0, 1.0, 0.0]]),
            SeedSet::new(Region::Airway, vec![[2.0, 0.0, 0.0]]),
        ];
        let radii = SeedRadii {
            lung_mm: 0.5,
            airway_mm: 0.5,
        };
        let labels = separate(&scan, &admissible, &sets, &radii, &GrowthParams::default()).unwrap();
        assert_eq!(labels[(0, 1, 0)], RIGHT_LUNG);
        assert_eq!(labels[(0, 1, 4)], LEFT_LUNG);
        assert_eq!(labels[(0, 0, 2)], AIRWAY);
        assert_eq!(labels[(0, 1, 6)], BACKGROUND);
        assert_eq!(labels[(0, 2, 7)], BACKGROUND);
        assert_eq!(labels[(0, 0, 8)], BACKGROUND);
        assert_eq!(
            labels.count(RIGHT_LUNG) + labels.count(LEFT_LUNG) + labels.count(AIRWAY),
            18
        );
    }

    #[test]
    fn test_separate_errors() {
        let scan = VoxelGrid::filled((2, 2, 2), [1.0; 3], -850.0).unwrap();
        let admissible = MaskGrid::full(scan.geometry().clone());
        let sets = vec![SeedSet::new(Region::RightLung, vec![[0.0; 3]])];
        let err = default_separate(&scan, &admissible, &sets).unwrap_err();
        assert!(matches!(
            err,
            LungError::InsufficientSeeds {
                region: Region::LeftLung,
                ..
            }
        ));

        let sets = vec![
            SeedSet::new(Region::RightLung, vec![[0.0; 3]]),
            SeedSet::new(Region::LeftLung, vec![[1.0; 3]]),
        ];
        let empty = MaskGrid::empty(scan.geometry().clone());
        let err = default_separate(&scan, &empty, &sets).unwrap_err();
        assert!(matches!(err, LungError::DegenerateMask { .. }));

        let other = MaskGrid::full(GridGeometry::new((2, 2, 1), [1.0; 3]).unwrap());
        let err = default_separate(&scan, &other, &sets).unwrap_err();
        assert!(matches!(err, LungError::ShapeMismatch { .. }));

        assert!(GrowthParams {
            intensity_scale: 0.0
        }
        .validate()
        .is_err());
    }
}
