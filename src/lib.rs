pub mod assign;
pub mod config;
pub mod data;
pub mod dates;
pub mod error;
pub mod layers;
pub mod mapping;
pub mod report;
pub mod tree;
pub mod types;

pub use assign::{assign_missing_areas, AreaIndex, Reason, ReportEntry};
pub use error::{AssignError, GeometryError};
pub use types::{RecordId, ReferenceArea, TargetRecord};
