pub mod clense;
pub mod flux_smooth;
pub mod median;
pub mod remove_grain;
pub mod repair;
pub mod scene_detect;
pub mod temporal_median;
pub mod temporal_repair;
pub mod temporal_soften;
pub mod ttemp_smooth;
pub mod vertical_cleaner;

pub use clense::{Clense, ClenseKind};
pub use flux_smooth::{FluxKind, FluxSmooth};
pub use median::{RankFilter, RankKind};
pub use remove_grain::RemoveGrain;
pub use repair::Repair;
pub use scene_detect::{FramePropsCuts, NoSceneCuts, SceneCutProvider, SceneDetect, SceneDetector};
pub use temporal_median::TemporalMedian;
pub use temporal_repair::TemporalRepair;
pub use temporal_soften::TemporalSoften;
pub use ttemp_smooth::{TTempSmooth, WeightTable};
pub use vertical_cleaner::VerticalCleaner;
