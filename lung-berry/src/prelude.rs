//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::anatomy::{AnatomicalAxis, Region, Side, Zone};
pub use crate::band::{Band, BandKind, BandTable};
pub use crate::classify::classify;
#[cfg(feature = "rayon")]
pub use crate::classify::par_classify;
pub use crate::config::AnalysisConfig;
pub use crate::data::{Affine, CtWindow, GridAttr, GridGeometry, LabelGrid, MaskGrid, VoxelGrid};
pub use crate::error::{LungError, LungResult};
pub use crate::grow::{separate, GrowthParams, SeedRadii, SeedSet};
pub use crate::host::{ImageStore, ReportSink, SeedSource};
pub use crate::pipeline::{CaseRequest, LungSource, Pipeline, PipelineInput, PipelineOutput};
pub use crate::stats::{aggregate, BullaPolicy, ReportRow, ReportSchema, Statistics};
pub use crate::zone::{AxisMode, OrientedBoundingBox, ZoneParams, ZoneTable};
