//! 数据模型：Observation / Analysis / Decision / CycleRecord 与长期学生档案

pub mod analysis;
pub mod decision;
pub mod observation;
pub mod profile;
pub mod record;

pub use analysis::{Analysis, ErrorSeverity, ErrorType, StudentState};
pub use decision::{ActionKind, Decision, Strategy};
pub use observation::{truncate_field, truncate_field_tail, Observation};
pub use profile::{
    CompetencyLevel, HintPreference, LearningStyle, PatienceLevel, PedagogyProfile, ProfileNote,
    ProfileView, StudentProfile, DEFAULT_INTERVENTION_DELAY,
};
pub use record::{CycleFailure, CycleRecord, DriveMode};
