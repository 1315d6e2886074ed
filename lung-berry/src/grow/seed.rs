//! 种子点集合, 校验及种子球栅格化.

use std::collections::HashSet;

use binary_heap_plus::BinaryHeap;
use log::warn;
use nalgebra::Point3;
use num::ToPrimitive;

use crate::anatomy::Region;
use crate::consts::{DEFAULT_AIRWAY_SEED_RADIUS_MM, DEFAULT_LUNG_SEED_RADIUS_MM};
use crate::data::{diamond_neighbours, GridAttr, MaskGrid};
use crate::error::{LungError, LungResult};
use crate::Idx3d;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 一组标记同一区域内部的物理坐标点 (毫米, RAS).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeedSet {
    region: Region,
    points: Vec<[f64; 3]>,
}

impl SeedSet {
    /// 构造种子集合. 点坐标按 `[x, y, z]` 排列.
    #[inline]
    pub fn new(region: Region, points: Vec<[f64; 3]>) -> Self {
        Self { region, points }
    }

    /// 所属区域.
    #[inline]
    pub fn region(&self) -> Region {
        self.region
    }

    /// 所有种子点.
    #[inline]
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// 是否不含任何种子点.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// 不同区域种子球的半径, 单位为毫米.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeedRadii {
    /// 左右肺种子球半径.
    pub lung_mm: f64,

    /// 气道种子球半径.
    pub airway_mm: f64,
}

impl Default for SeedRadii {
    fn default() -> Self {
        Self {
            lung_mm: DEFAULT_LUNG_SEED_RADIUS_MM,
            airway_mm: DEFAULT_AIRWAY_SEED_RADIUS_MM,
        }
    }
}

impl SeedRadii {
    /// 区域 `region` 的种子球半径.
    #[inline]
    pub fn radius_for(&self, region: Region) -> f64 {
        match region {
            Region::RightLung | Region::LeftLung => self.lung_mm,
            Region::Airway => self.airway_mm,
        }
    }

    /// 半径必须为正且有限.
    pub fn validate(&self) -> LungResult<()> {
        for (what, r) in [("lung", self.lung_mm), ("airway", self.airway_mm)] {
            if !r.is_finite() || r <= 0.0 {
                return Err(LungError::InvalidConfig(format!(
                    "{what} seed radius must be positive, found {r}"
                )));
            }
        }
        Ok(())
    }
}

/// 校验一组种子集合.
///
/// # 返回值
///
/// - 区域重复, 或不同集合中存在坐标完全相同的点, 返回 `Err(LungError::ConflictingSeeds)`;
/// - 左右肺任一缺少种子点, 返回 `Err(LungError::InsufficientSeeds)`;
/// - 存在非有限坐标, 返回 `Err(LungError::InvalidConfig)`.
pub fn validate_seed_sets(sets: &[SeedSet]) -> LungResult<()> {
    for (i, s) in sets.iter().enumerate() {
        if sets[..i].iter().any(|o| o.region == s.region) {
            return Err(LungError::ConflictingSeeds(format!(
                "{} appears in more than one seed set",
                s.region
            )));
        }
        if s.points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(LungError::InvalidConfig(format!(
                "seed point of {} is not finite",
                s.region
            )));
        }
    }

    for region in Region::REQUIRED {
        if !sets.iter().any(|s| s.region == region && !s.is_empty()) {
            return Err(LungError::InsufficientSeeds {
                region,
                reason: "no seed point",
            });
        }
    }

    // 坐标已确认有限, 按位比较即可.
    let mut seen = HashSet::new();
    for s in sets {
        let own: HashSet<[u64; 3]> = s.points.iter().map(|p| p.map(f64::to_bits)).collect();
        for key in own {
            if !seen.insert(key) {
                return Err(LungError::ConflictingSeeds(format!(
                    "{} shares a seed point with another region",
                    s.region
                )));
            }
        }
    }
    Ok(())
}

/// 以物理坐标 `center` 为球心, 提取半径不大于 `radius` (单位: mm) 的球内所有体素索引.
///
/// 球心所在的最近体素总被包含在内, 即便 `radius` 小于体素间距.
/// 球心落在网格之外时返回空集.
pub fn rasterize_sphere<G: GridAttr + ?Sized>(
    grid: &G,
    center: [f64; 3],
    radius: f64,
) -> Vec<Idx3d> {
    let p = Point3::from(center);
    let Some(start) = nearest_voxel(grid, &p) else {
        return Vec::new();
    };
    let distance_squared = |pos: &Idx3d| (grid.physical(*pos) - p).norm_squared();

    // 堆顶距球心最近
    let mut heap: BinaryHeap<Idx3d, _> = BinaryHeap::new_by(|a, b| {
        distance_squared(b).total_cmp(&distance_squared(a))
    });
    heap.reserve(64);
    heap.push(start);
    let mut ans = vec![start];
    let mut visited = HashSet::<Idx3d>::with_capacity(64);
    visited.insert(start);

    while let Some(pos) = heap.pop() {
        for neigh in diamond_neighbours(grid.shape(), pos) {
            if visited.insert(neigh) && distance_squared(&neigh) <= radius.powi(2) {
                ans.push(neigh);
                heap.push(neigh);
            }
        }
    }
    ans.sort_unstable();
    ans
}

/// 物理坐标最近的体素. 越界时返回 `None`.
fn nearest_voxel<G: GridAttr + ?Sized>(grid: &G, p: &Point3<f64>) -> Option<Idx3d> {
    let c = grid.geometry().affine().physical_to_continuous(p);
    let (sz, sh, sw) = grid.shape();
    let [z, h, w] = c;
    let index = |v: f64, s: usize| v.round().to_usize().filter(|i| *i < s);
    Some((index(z, sz)?, index(h, sh)?, index(w, sw)?))
}

/// 将每个种子集合栅格化为初始体素集, 并与 `admissible` 求交.
///
/// 不同集合的种子球重叠时, 重叠体素归属在前的集合. 返回值与 `sets` 一一对应.
///
/// 必需区域的初始体素集为空时, 返回 `Err(LungError::InsufficientSeeds)`;
/// 可选区域 (气道) 为空时仅记录警告.
pub fn initial_voxels(
    admissible: &MaskGrid,
    sets: &[SeedSet],
    radii: &SeedRadii,
) -> LungResult<Vec<Vec<Idx3d>>> {
    let mut claimed = HashSet::<Idx3d>::new();
    let mut ans = Vec::with_capacity(sets.len());

    for s in sets {
        let radius = radii.radius_for(s.region);
        let mut voxels = Vec::new();
        for point in s.points.iter() {
            let sphere = rasterize_sphere(admissible, *point, radius);
            if sphere.is_empty() {
                warn!("seed point {point:?} of {} lies outside the grid", s.region);
            }
            voxels.extend(
                sphere
                    .into_iter()
                    .filter(|pos| admissible[*pos] && !claimed.contains(pos)),
            );
        }
        voxels.sort_unstable();
        voxels.dedup();
        claimed.extend(voxels.iter().copied());

        if voxels.is_empty() {
            if Region::REQUIRED.contains(&s.region) {
                return Err(LungError::InsufficientSeeds {
                    region: s.region,
                    reason: "seed spheres contain no admissible voxel",
                });
            }
            warn!("seed spheres of {} contain no admissible voxel", s.region);
        }
        ans.push(voxels);
    }
    Ok(ans)
}
