//! 完整分析流程: 分离 → 分类 → (可选) 分区 → 统计.

use log::{debug, info, warn};

use crate::anatomy::{Region, Side};
use crate::band::BandTable;
use crate::config::AnalysisConfig;
use crate::consts::label::AIRWAY;
use crate::data::{GridAttr, LabelGrid, MaskGrid, VoxelGrid};
use crate::error::{LungError, LungResult};
use crate::grow::{separate, SeedSet};
use crate::host::{ImageStore, ReportSink, SeedSource};
use crate::stats::{aggregate, ReportSchema, Statistics};
use crate::zone::ZoneTable;

#[cfg(not(feature = "rayon"))]
use crate::classify::classify;
#[cfg(feature = "rayon")]
use crate::classify::par_classify;

/// 左右肺的来源.
#[derive(Copy, Clone, Debug)]
pub enum LungSource<'a> {
    /// 由种子点竞争生长分离.
    Seeds(&'a [SeedSet]),

    /// 直接使用已有的左右肺标签网格 (`1` 右肺, `2` 左肺, `3` 气道).
    Mask(&'a LabelGrid),
}

/// 一次流程的输入. 所有网格只读借用, 流程不会修改它们.
#[derive(Copy, Clone, Debug)]
pub struct PipelineInput<'a> {
    /// CT 体数据.
    pub scan: &'a VoxelGrid,

    /// 种子点分离时的可用体素掩码. 为 `None` 时由配置中的肺窗推导.
    ///
    /// 使用已有标签网格 ([`LungSource::Mask`]) 时不参与计算, 也不做形状检查.
    pub admissible: Option<&'a MaskGrid>,

    /// 左右肺的来源.
    pub lungs: LungSource<'a>,
}

/// 一次流程的输出. 全部为新建的网格, 与输入没有任何共享.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    /// 左右肺 (及气道) 分离结果.
    pub separation: LabelGrid,

    /// 按侧别与密度分级编码的分类结果.
    pub classified: LabelGrid,

    /// 分区掩码. 仅在启用分区明细统计时存在.
    pub zones: Option<ZoneTable>,

    /// 统计结果.
    pub statistics: Statistics,
}

/// 宿主驱动流程时的病例描述.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaseRequest {
    /// 体数据 id, 同时作为种子点查询键和输出名称前缀.
    pub volume: String,

    /// 已有左右肺标签网格的 id. 为 `None` 时使用种子点分离.
    pub mask: Option<String>,
}

/// 分析流程. 持有只读配置, 每次调用互不影响.
#[derive(Clone, Debug)]
pub struct Pipeline<'a> {
    config: &'a AnalysisConfig,
    bands: BandTable,
}

impl<'a> Pipeline<'a> {
    /// 校验配置并创建流程.
    pub fn new(config: &'a AnalysisConfig) -> LungResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            bands: config.band_table()?,
        })
    }

    /// 所用配置.
    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        self.config
    }

    /// 所用分级表.
    #[inline]
    pub fn bands(&self) -> &BandTable {
        &self.bands
    }

    /// 运行完整流程.
    ///
    /// 任何一步失败都会立即返回对应错误, 不会产生部分结果.
    pub fn run(&self, input: PipelineInput<'_>) -> LungResult<PipelineOutput> {
        let scan = input.scan;
        let separation = match input.lungs {
            LungSource::Seeds(sets) => {
                let derived;
                let admissible = match input.admissible {
                    Some(m) => m,
                    None => {
                        derived = MaskGrid::from_window(scan, &self.config.lung_window);
                        &derived
                    }
                };
                separate(
                    scan,
                    admissible,
                    sets,
                    &self.config.seed_radii,
                    &self.config.growth,
                )?
            }
            LungSource::Mask(mask) => {
                if input.admissible.is_some() {
                    debug!("admissible mask ignored for imported lungs");
                }
                imported_lungs(scan, mask)?
            }
        };
        info!(
            "separation: right {} voxels, left {} voxels, airway {} voxels",
            separation.count(Side::Right.code()),
            separation.count(Side::Left.code()),
            separation.count(AIRWAY)
        );

        let [right, left] = self.side_masks(&separation)?;

        let mut classified = LabelGrid::background(scan.geometry().clone());
        for (side, mask) in [(Side::Right, &right), (Side::Left, &left)] {
            #[cfg(feature = "rayon")]
            let labels = par_classify(scan, mask, &self.bands, side)?;
            #[cfg(not(feature = "rayon"))]
            let labels = classify(scan, mask, &self.bands, side)?;
            classified.merge_disjoint(&labels)?;
        }

        let zones = if self.config.detailed_zones {
            Some(ZoneTable::build(
                [(Side::Right, &right), (Side::Left, &left)],
                &self.config.zones,
            )?)
        } else {
            None
        };

        let statistics = aggregate(
            &classified,
            scan.voxel_ml(),
            &self.bands,
            zones.as_ref(),
            self.config.bulla_policy,
        )?;
        info!(
            "total lung volume {:.0} ml, affected fraction {}",
            statistics.summary().total.total_ml,
            statistics.summary().total.affected_fraction
        );

        Ok(PipelineOutput {
            separation,
            classified,
            zones,
            statistics,
        })
    }

    /// 从分离结果中取出左右肺掩码, 按配置填充空洞.
    ///
    /// 填充后去掉气道体素 (被肺包围的气道腔在水平切片中同样是空洞),
    /// 两侧重叠的体素归右肺.
    fn side_masks(&self, separation: &LabelGrid) -> LungResult<[MaskGrid; 2]> {
        let mut right = separation.mask_of(Side::Right.code());
        let mut left = separation.mask_of(Side::Left.code());
        if self.config.fill_holes {
            for (side, mask) in [(Side::Right, &mut right), (Side::Left, &mut left)] {
                #[cfg(feature = "rayon")]
                let filled = mask.par_fill_holes();
                #[cfg(not(feature = "rayon"))]
                let filled = mask.fill_holes();
                if filled {
                    info!("{side}: holes filled, {} voxels", mask.count());
                }
            }
            let airway = separation.mask_of(AIRWAY);
            right.difference_with(&airway)?;
            left.difference_with(&airway)?;
            left.difference_with(&right)?;
        }
        Ok([right, left])
    }

    /// 由宿主协作方驱动完整流程: 读取病例, 分析, 保存标签网格并交付报告.
    ///
    /// 核心错误经 `From<LungError>` 转为宿主错误.
    pub fn run_with<S, Q, R, E>(
        &self,
        case: &CaseRequest,
        store: &mut S,
        seeds: &mut Q,
        sink: &mut R,
    ) -> Result<PipelineOutput, E>
    where
        S: ImageStore<Error = E>,
        Q: SeedSource<Error = E>,
        R: ReportSink<Error = E>,
        E: From<LungError>,
    {
        let scan = store.load_volume(&case.volume)?;
        let output = match case.mask.as_deref() {
            Some(id) => {
                let mask = store.load_mask(id)?;
                self.run(PipelineInput {
                    scan: &scan,
                    admissible: None,
                    lungs: LungSource::Mask(&mask),
                })?
            }
            None => {
                let sets = seeds.seed_sets(&case.volume)?;
                self.run(PipelineInput {
                    scan: &scan,
                    admissible: None,
                    lungs: LungSource::Seeds(&sets),
                })?
            }
        };

        store.save_label_grid(&output.separation, &format!("{}_lungs", case.volume))?;
        store.save_label_grid(&output.classified, &format!("{}_bands", case.volume))?;
        sink.receive(&ReportSchema::V1, &output.statistics)?;
        Ok(output)
    }
}

/// 检查宿主提供的左右肺标签网格, 返回其副本. 气道标签保留但不参与后续统计.
///
/// 出现 `0..=3` 以外的标签时返回 `Err(LungError::UnknownLabel)`.
fn imported_lungs(scan: &VoxelGrid, mask: &LabelGrid) -> LungResult<LabelGrid> {
    scan.ensure_same_shape(mask, "imported lung mask")?;
    if let Some(l) = mask
        .histogram()
        .iter()
        .enumerate()
        .skip(AIRWAY as usize + 1)
        .find_map(|(l, c)| (*c != 0).then_some(l as u16))
    {
        return Err(LungError::UnknownLabel(l));
    }
    let mut ans = mask.clone();
    for region in [Region::RightLung, Region::LeftLung, Region::Airway] {
        if ans.name(region.label()).is_none() {
            ans.insert_name(region.label(), region.name());
        }
    }
    if ans.count(AIRWAY) != 0 {
        warn!("imported mask carries an airway, it is excluded from the statistics");
    }
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::encode;
    use crate::data::GridGeometry;

    /// 20x20x20 的体数据, 体素 5mm. 左右两块低密度肺实质, 中间一堵软组织墙.
    fn phantom() -> VoxelGrid {
        let mut scan = VoxelGrid::filled((20, 20, 20), [5.0; 3], 40.0).unwrap();
        for z in 2..18 {
            for h in 2..18 {
                for w in 2..18 {
                    if w != 9 && w != 10 {
                        scan[(z, h, w)] = if z < 6 { -980.0 } else { -850.0 };
                    }
                }
            }
        }
        scan
    }

    fn seeds() -> Vec<SeedSet> {
        vec![
            SeedSet::new(Region::RightLung, vec![[25.0, 50.0, 50.0]]),
            SeedSet::new(Region::LeftLung, vec![[70.0, 50.0, 50.0]]),
        ]
    }

    #[test]
    fn test_pipeline_seeded_run() {
        let config = AnalysisConfig::default();
        let pipeline = Pipeline::new(&config).unwrap();
        let scan = phantom();
        let sets = seeds();
        let out = pipeline
            .run(PipelineInput {
                scan: &scan,
                admissible: None,
                lungs: LungSource::Seeds(&sets),
            })
            .unwrap();

        // 每块肺 16 * 16 * 7 个体素.
        let block = 16 * 16 * 7;
        assert_eq!(out.separation.count(Side::Right.code()), block);
        assert_eq!(out.separation.count(Side::Left.code()), block);
        assert_eq!(out.classified.count(encode(Side::Right, 0)), 16 * 4 * 7);
        assert_eq!(out.classified.count(encode(Side::Right, 1)), 16 * 12 * 7);
        assert!(out.zones.is_none());

        let total = out.statistics.row("total").unwrap();
        assert_eq!(total.voxel_count, 2 * block as u64);
        assert!((total.volume_ml - 2.0 * block as f64 * 0.125).abs() < 1e-9);
        let emph = out.statistics.row("Emphysema right").unwrap();
        assert!((emph.percent - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_pipeline_imported_mask_with_zones() {
        let config = AnalysisConfig {
            detailed_zones: true,
            ..Default::default()
        };
        let pipeline = Pipeline::new(&config).unwrap();
        let scan = phantom();
        let mut lungs = LabelGrid::background(scan.geometry().clone());
        let window = MaskGrid::from_window(&scan, &config.lung_window);
        for pos in window.positions() {
            lungs[pos] = if pos.2 < 9 { 1 } else { 2 };
        }
        lungs.insert_name(1, "right lung");
        lungs.insert_name(2, "left lung");

        let out = pipeline
            .run(PipelineInput {
                scan: &scan,
                admissible: None,
                lungs: LungSource::Mask(&lungs),
            })
            .unwrap();
        assert_eq!(out.separation.data(), lungs.data());
        assert_eq!(out.separation.name(3), Some("airway"));
        assert_eq!(out.zones.as_ref().map(ZoneTable::len), Some(10));
        assert!(out.statistics.row("left lung dorsal").is_some());
        assert_eq!(
            out.statistics.row("right lung").unwrap().voxel_count,
            out.statistics.row("left lung").unwrap().voxel_count
        );
    }

    #[test]
    fn test_pipeline_rejects_foreign_mask_labels() {
        let config = AnalysisConfig::default();
        let pipeline = Pipeline::new(&config).unwrap();
        let scan = VoxelGrid::filled((2, 2, 2), [1.0; 3], -900.0).unwrap();
        let mut lungs = LabelGrid::background(scan.geometry().clone());
        lungs.insert_name(7, "liver");
        lungs[(0, 0, 0)] = 7;
        let err = pipeline
            .run(PipelineInput {
                scan: &scan,
                admissible: None,
                lungs: LungSource::Mask(&lungs),
            })
            .unwrap_err();
        assert_eq!(err, LungError::UnknownLabel(7));

        let other = MaskGrid::full(GridGeometry::new((1, 2, 2), [1.0; 3]).unwrap());
        let sets = vec![
            SeedSet::new(Region::RightLung, vec![[0.0; 3]]),
            SeedSet::new(Region::LeftLung, vec![[1.0, 0.0, 0.0]]),
        ];
        let err = pipeline
            .run(PipelineInput {
                scan: &scan,
                admissible: Some(&other),
                lungs: LungSource::Seeds(&sets),
            })
            .unwrap_err();
        assert!(matches!(err, LungError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_pipeline_imported_mask_ignores_admissible() {
        let config = AnalysisConfig::default();
        let pipeline = Pipeline::new(&config).unwrap();
        let scan = phantom();
        let mut lungs = LabelGrid::background(scan.geometry().clone());
        lungs[(10, 10, 5)] = 1;
        lungs[(10, 10, 14)] = 2;

        // 形状不同且为空的掩码: 若参与计算则会报错或清空结果.
        let other = MaskGrid::empty(GridGeometry::new((1, 2, 2), [1.0; 3]).unwrap());
        let out = pipeline
            .run(PipelineInput {
                scan: &scan,
                admissible: Some(&other),
                lungs: LungSource::Mask(&lungs),
            })
            .unwrap();
        assert_eq!(out.classified.count(encode(Side::Right, 1)), 1);
        assert_eq!(out.classified.count(encode(Side::Left, 1)), 1);
    }

    #[test]
    fn test_pipeline_excludes_enclosed_airway() {
        let config = AnalysisConfig::default();
        let pipeline = Pipeline::new(&config).unwrap();
        // 右肺中一根贯穿全部切片的气管: 软组织管壁包围 -1000 HU 的管腔,
        // 管腔在每个水平切片中都被肺实质包围.
        let mut scan = phantom();
        for z in 0..20 {
            for h in 7..10 {
                for w in 4..7 {
                    scan[(z, h, w)] = 40.0;
                }
            }
            scan[(z, 8, 5)] = -1000.0;
        }
        let sets = vec![
            SeedSet::new(Region::RightLung, vec![[25.0, 70.0, 50.0]]),
            SeedSet::new(Region::LeftLung, vec![[70.0, 50.0, 50.0]]),
            SeedSet::new(Region::Airway, vec![[25.0, 40.0, 50.0]]),
        ];
        let out = pipeline
            .run(PipelineInput {
                scan: &scan,
                admissible: None,
                lungs: LungSource::Seeds(&sets),
            })
            .unwrap();

        assert_eq!(out.separation.count(AIRWAY), 20);
        let airway = out.separation.mask_of(AIRWAY);
        for pos in airway.positions() {
            assert_eq!(out.classified[pos], 0, "airway voxel {pos:?} classified");
        }
        // 肺气肿只来自 z < 6 的肺实质, 每个切片扣掉 9 个管壁与管腔体素.
        let emphysema = 4 * (16 * 7 - 9);
        assert_eq!(out.classified.count(encode(Side::Right, 0)), emphysema);
        // 管壁作为被包围的空洞补回, 归入血管分级.
        assert_eq!(out.classified.count(encode(Side::Right, 4)), 16 * 8);
        let emph = out.statistics.row("Emphysema right").unwrap();
        assert_eq!(emph.voxel_count, emphysema as u64);
    }

    #[test]
    fn test_pipeline_fills_vessels() {
        let config = AnalysisConfig::default();
        let pipeline = Pipeline::new(&config).unwrap();
        let mut scan = phantom();
        // 右肺中的一根血管: 不在肺窗内, 但被肺实质完全包围.
        for z in 2..18 {
            scan[(z, 8, 5)] = 60.0;
        }
        let sets = seeds();
        let out = pipeline
            .run(PipelineInput {
                scan: &scan,
                admissible: None,
                lungs: LungSource::Seeds(&sets),
            })
            .unwrap();
        assert_eq!(out.classified.count(encode(Side::Right, 4)), 16);
        assert_eq!(out.separation[(5, 8, 5)], 0);

        let config = AnalysisConfig {
            fill_holes: false,
            ..Default::default()
        };
        let out = Pipeline::new(&config)
            .unwrap()
            .run(PipelineInput {
                scan: &scan,
                admissible: None,
                lungs: LungSource::Seeds(&sets),
            })
            .unwrap();
        assert_eq!(out.classified.count(encode(Side::Right, 4)), 0);
    }
}
