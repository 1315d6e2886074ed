//! 由有向包围盒驱动的解剖分区.
//!
//! 每个分区由沿前后轴或头足轴的一到两个半空间切割定义, 切割位置是包围盒全长的固定比例.
//! 非切割面在包围盒基础上外扩一个安全边距, 以免误裁区域.

use std::collections::BTreeMap;

use log::{debug, warn};
use ndarray::Zip;

use crate::anatomy::{AnatomicalAxis, Side, Zone};
use crate::consts::DEFAULT_ZONE_MARGIN_MM;
use crate::data::{GridAttr, MaskGrid};
use crate::error::{LungError, LungResult};
use crate::Idx3d;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod obb;

pub use obb::{AxisMode, OrientedBoundingBox};

/// 边界判定的容差, 单位为毫米.
const EPS_MM: f64 = 1e-9;

/// 分区切割参数.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ZoneParams {
    /// 腹背切割面相对包围盒中心的位置, 以前后方向全长为单位. `0` 即从中间切开.
    pub ap_split: f64,

    /// 中部带宽, 以头足方向全长为单位. 默认 `1/3`, 即三等分.
    pub cc_band: f64,

    /// 非切割面的安全边距, 单位为毫米.
    pub margin_mm: f64,

    /// 包围盒坐标轴的确定方式.
    pub axis_mode: AxisMode,
}

impl Default for ZoneParams {
    fn default() -> Self {
        Self {
            ap_split: 0.0,
            cc_band: 1.0 / 3.0,
            margin_mm: DEFAULT_ZONE_MARGIN_MM,
            axis_mode: AxisMode::default(),
        }
    }
}

impl ZoneParams {
    /// 检查参数范围: `ap_split` 在 `(-0.5, 0.5)` 内, `cc_band` 在 `(0, 1)` 内, 边距非负.
    pub fn validate(&self) -> LungResult<()> {
        let invalid = |what: &str, v: f64| {
            Err(LungError::InvalidConfig(format!(
                "zone {what} out of range: {v}"
            )))
        };
        if !(self.ap_split > -0.5 && self.ap_split < 0.5) {
            return invalid("ap_split", self.ap_split);
        }
        if !(self.cc_band > 0.0 && self.cc_band < 1.0) {
            return invalid("cc_band", self.cc_band);
        }
        if !(self.margin_mm.is_finite() && self.margin_mm >= 0.0) {
            return invalid("margin", self.margin_mm);
        }
        Ok(())
    }
}

/// 判定局部坐标 `local` (左右, 前后, 头足) 是否落在分区 `zone` 内.
fn admits(obb: &OrientedBoundingBox, zone: Zone, params: &ZoneParams, local: [f64; 3]) -> bool {
    const AXES: [AnatomicalAxis; 3] = [
        AnatomicalAxis::LeftRight,
        AnatomicalAxis::Anteroposterior,
        AnatomicalAxis::Craniocaudal,
    ];
    let within_margin = AXES
        .iter()
        .zip(local)
        .all(|(a, v)| v.abs() <= obb.extent(*a) / 2.0 + params.margin_mm + EPS_MM);
    if !within_margin {
        return false;
    }

    let [_, ap, cc] = local;
    let ap_cut = params.ap_split * obb.extent(AnatomicalAxis::Anteroposterior) - EPS_MM;
    let cc_cut = params.cc_band * obb.extent(AnatomicalAxis::Craniocaudal) / 2.0 + EPS_MM;
    match zone {
        Zone::Ventral => ap >= ap_cut,
        Zone::Dorsal => ap < ap_cut,
        Zone::Upper => cc > cc_cut,
        Zone::Middle => cc.abs() <= cc_cut,
        Zone::Lower => cc < -cc_cut,
    }
}

#[inline]
fn admits_voxel(
    region: &MaskGrid,
    obb: &OrientedBoundingBox,
    zone: Zone,
    params: &ZoneParams,
    pos: Idx3d,
) -> bool {
    let local = obb.to_local(&region.physical(pos));
    admits(obb, zone, params, [local.x, local.y, local.z])
}

/// 在包围盒 `obb` 的参考系下, 裁剪出 `region` 中属于分区 `zone` 的部分.
///
/// 结果是 `region` 的子集: 被切割保留一侧的体素与输入相同, 其余为背景.
/// 对同一分区重复调用得到完全相同的结果.
pub fn partition(
    region: &MaskGrid,
    obb: &OrientedBoundingBox,
    zone: Zone,
    params: &ZoneParams,
) -> MaskGrid {
    let mut ans = region.clone();
    Zip::indexed(ans.data_mut()).for_each(|pos, p| {
        if *p {
            *p = admits_voxel(region, obb, zone, params, pos);
        }
    });
    ans
}

/// 借助 `rayon`, 使用多任务模式运行 [`partition`].
#[cfg(feature = "rayon")]
pub fn par_partition(
    region: &MaskGrid,
    obb: &OrientedBoundingBox,
    zone: Zone,
    params: &ZoneParams,
) -> MaskGrid {
    let mut ans = region.clone();
    Zip::indexed(ans.data_mut()).par_for_each(|pos, p| {
        if *p {
            *p = admits_voxel(region, obb, zone, params, pos);
        }
    });
    ans
}

/// 每一侧肺的全部分区掩码.
#[derive(Clone, Debug, Default)]
pub struct ZoneTable {
    zones: BTreeMap<(Side, Zone), MaskGrid>,
}

impl ZoneTable {
    /// 为每一侧计算包围盒并裁剪出全部 5 个分区.
    ///
    /// 空的一侧不计算包围盒, 其各分区均为空掩码.
    pub fn build<'a, I>(sides: I, params: &ZoneParams) -> LungResult<Self>
    where
        I: IntoIterator<Item = (Side, &'a MaskGrid)>,
    {
        let mut zones = BTreeMap::new();
        for (side, mask) in sides {
            if mask.is_empty() {
                warn!("{side} is empty, all of its zones are empty");
                for zone in Zone::ALL {
                    zones.insert((side, zone), MaskGrid::empty(mask.geometry().clone()));
                }
                continue;
            }
            let obb = OrientedBoundingBox::from_mask(mask, params.axis_mode)?;
            for zone in Zone::ALL {
                #[cfg(feature = "rayon")]
                let cropped = par_partition(mask, &obb, zone, params);
                #[cfg(not(feature = "rayon"))]
                let cropped = partition(mask, &obb, zone, params);
                debug!("{side} {zone}: {} voxels", cropped.count());
                zones.insert((side, zone), cropped);
            }
        }
        Ok(Self { zones })
    }

    /// 获取某侧某分区的掩码.
    #[inline]
    pub fn get(&self, side: Side, zone: Zone) -> Option<&MaskGrid> {
        self.zones.get(&(side, zone))
    }

    /// 按 (侧别, 分区) 顺序遍历.
    pub fn iter(&self) -> impl Iterator<Item = (Side, Zone, &MaskGrid)> {
        self.zones.iter().map(|((s, z), m)| (*s, *z, m))
    }

    /// 分区个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// 分区掩码统一形状检查, 供统计模块使用.
pub(crate) fn check_zone_shapes<G: GridAttr + ?Sized>(
    table: &ZoneTable,
    grid: &G,
) -> LungResult<()> {
    table
        .iter()
        .try_for_each(|(_, _, m)| grid.ensure_same_shape(m, "zone mask"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GridGeometry;

    /// 19 个切片, 层间距 10mm: 头足方向全长 180mm.
    fn column() -> MaskGrid {
        MaskGrid::full(GridGeometry::new((19, 2, 2), [10.0, 1.0, 1.0]).unwrap())
    }

    #[test]
    fn test_partition_middle_keeps_central_third() {
        let region = column();
        let obb = OrientedBoundingBox::from_mask(&region, AxisMode::Anatomical).unwrap();
        assert_eq!(obb.extent(AnatomicalAxis::Craniocaudal), 180.0);

        let middle = partition(&region, &obb, Zone::Middle, &ZoneParams::default());
        for z in 0..19 {
            let kept = (z as f64 * 10.0 - 90.0).abs() <= 30.0;
            assert_eq!(middle[(z, 0, 0)], kept, "slice {z}");
        }
        assert_eq!(middle.count(), 7 * 4);
    }

    #[test]
    fn test_partition_families_tile_region() {
        let region = column();
        let obb = OrientedBoundingBox::from_mask(&region, AxisMode::Anatomical).unwrap();
        let params = ZoneParams::default();
        let count = |z| partition(&region, &obb, z, &params).count();
        assert_eq!(
            count(Zone::Upper) + count(Zone::Middle) + count(Zone::Lower),
            region.count()
        );
        assert_eq!(count(Zone::Upper), 6 * 4);
        assert_eq!(count(Zone::Ventral) + count(Zone::Dorsal), region.count());
        // 前后方向 y = 0, 1, 中心 0.5: 背侧 y = 0, 腹侧 y = 1.
        let ventral = partition(&region, &obb, Zone::Ventral, &params);
        assert!(ventral[(3, 1, 0)] && !ventral[(3, 0, 0)]);
    }

    #[test]
    fn test_partition_idempotent() {
        let mut region = column();
        region[(4, 1, 1)] = false;
        let obb = OrientedBoundingBox::from_mask(&region, AxisMode::Principal).unwrap();
        let params = ZoneParams::default();
        for zone in Zone::ALL {
            let once = partition(&region, &obb, zone, &params);
            let twice = partition(&once, &obb, zone, &params);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_partition_margin_clips_far_voxels() {
        let region = column();
        // 一个只覆盖头侧 40mm 的包围盒, 边距为 0 时远离它的体素被裁掉.
        let obb = OrientedBoundingBox::axis_aligned([0.5, 0.5, 160.0], [1.0, 1.0, 40.0]).unwrap();
        let params = ZoneParams {
            margin_mm: 0.0,
            ..Default::default()
        };
        let ventral = partition(&region, &obb, Zone::Ventral, &params);
        assert_eq!(ventral.count(), 5 * 2);
        let params = ZoneParams::default();
        let ventral = partition(&region, &obb, Zone::Ventral, &params);
        assert_eq!(ventral.count(), 10 * 2);
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_par_partition() {
        let region = column();
        let obb = OrientedBoundingBox::from_mask(&region, AxisMode::Anatomical).unwrap();
        let params = ZoneParams::default();
        for zone in Zone::ALL {
            assert_eq!(
                partition(&region, &obb, zone, &params),
                par_partition(&region, &obb, zone, &params)
            );
        }
    }

    #[test]
    fn test_zone_table() {
        let right = column();
        let left = MaskGrid::empty(right.geometry().clone());
        let sides = [(Side::Right, &right), (Side::Left, &left)];
        let table = ZoneTable::build(sides, &ZoneParams::default()).unwrap();
        assert_eq!(table.len(), 10);
        let count = |side, zone| table.get(side, zone).map(MaskGrid::count);
        assert_eq!(count(Side::Left, Zone::Upper), Some(0));
        assert_eq!(count(Side::Right, Zone::Middle), Some(28));
        assert!(check_zone_shapes(&table, &right).is_ok());
    }

    #[test]
    fn test_zone_params_validate() {
        assert!(ZoneParams::default().validate().is_ok());
        let p = ZoneParams {
            cc_band: 1.0,
            ..Default::default()
        };
        assert!(p.validate().is_err());
        let p = ZoneParams {
            ap_split: f64::NAN,
            ..Default::default()
        };
        assert!(p.validate().is_err());
    }
}
