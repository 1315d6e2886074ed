//! 按密度分级表对肺实质体素进行分类.
//!
//! 分类是逐体素独立的: 对可用掩码内的每个体素, 找到唯一包含其 HU 值的分级,
//! 并以 [`encode`] 编码为标签. 掩码外, 低于整个分级表下限或不低于上限的体素保持背景.

use std::collections::BTreeMap;

use log::{debug, info};
use ndarray::{Array3, Zip};

use crate::anatomy::Side;
use crate::band::{encode, label_name, BandTable};
use crate::consts::label::BACKGROUND;
use crate::data::{GridAttr, LabelGrid, MaskGrid, VoxelGrid};
use crate::error::LungResult;

/// 分类前的准备: 检查形状, 按网格最小值下调最低分级下限, 生成标签字典.
fn prepare(
    scan: &VoxelGrid,
    admissible: &MaskGrid,
    bands: &BandTable,
    side: Side,
) -> LungResult<(BandTable, BTreeMap<u16, String>)> {
    scan.ensure_same_shape(admissible, "admissible mask")?;

    let table = match scan.min_value() {
        Some(min) if (min as f64) < bands.lower_bound() => {
            info!(
                "{side}: lowest threshold {} lowered to grid minimum {min}",
                bands.lower_bound()
            );
            bands.with_lowered_floor(min as f64)
        }
        _ => bands.clone(),
    };

    let names = table
        .bands()
        .iter()
        .enumerate()
        .map(|(i, b)| (encode(side, i), label_name(side, b.kind)))
        .collect();
    Ok((table, names))
}

#[inline]
fn label_of(table: &BandTable, side: Side, hu: f32, inside: bool) -> u16 {
    if !inside {
        return BACKGROUND;
    }
    table
        .locate(hu as f64)
        .map_or(BACKGROUND, |i| encode(side, i))
}

/// 对 `scan` 中被 `admissible` 标记的体素按 `bands` 分类, 结果标签按 `side` 编码.
///
/// 最低分级的下限会被下调到 `scan` 的最小有限值 (若后者更低), 以免近似真空的体素被漏掉.
/// 标签字典登记了分级表中的每个分级, 即使某个分级没有体素.
///
/// # 返回值
///
/// 若 `admissible` 与 `scan` 形状不一致, 返回 `Err(LungError::ShapeMismatch)`.
///
/// # 示例
///
/// ```
/// use lung_berry::prelude::*;
///
/// let scan = VoxelGrid::filled((2, 2, 2), [1.0; 3], -975.0).unwrap();
/// let mask = MaskGrid::full(scan.geometry().clone());
/// let labels = classify(&scan, &mask, &BandTable::default(), Side::Right).unwrap();
/// assert_eq!(labels.count(11), 8);
/// assert_eq!(labels.name(11), Some("Emphysema right"));
/// ```
pub fn classify(
    scan: &VoxelGrid,
    admissible: &MaskGrid,
    bands: &BandTable,
    side: Side,
) -> LungResult<LabelGrid> {
    let (table, names) = prepare(scan, admissible, bands, side)?;

    let mut data = Array3::<u16>::zeros(scan.shape());
    Zip::from(&mut data)
        .and(scan.data())
        .and(admissible.data())
        .for_each(|l, &hu, &inside| *l = label_of(&table, side, hu, inside));

    debug!("{side}: classified {} admissible voxels", admissible.count());
    Ok(LabelGrid::from_parts_unchecked(
        data,
        scan.geometry().clone(),
        names,
    ))
}

/// 借助 `rayon`, 使用多任务模式运行 [`classify`]. 结果与后者完全一致.
#[cfg(feature = "rayon")]
pub fn par_classify(
    scan: &VoxelGrid,
    admissible: &MaskGrid,
    bands: &BandTable,
    side: Side,
) -> LungResult<LabelGrid> {
    let (table, names) = prepare(scan, admissible, bands, side)?;

    let mut data = Array3::<u16>::zeros(scan.shape());
    Zip::from(&mut data)
        .and(scan.data())
        .and(admissible.data())
        .par_for_each(|l, &hu, &inside| *l = label_of(&table, side, hu, inside));

    Ok(LabelGrid::from_parts_unchecked(
        data,
        scan.geometry().clone(),
        names,
    ))
}
