use thiserror::Error;

/// Failures that abort an assignment call. The caller has to fix the
/// reference input before retrying.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AssignError {
    #[error("no reference areas supplied")]
    NoReferenceAreas,
    #[error("reference area #{index} has a blank code")]
    BlankReferenceCode { index: usize },
}

/// Why a record geometry cannot be tested for containment.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("geometry is missing")]
    Missing,
    #[error("unsupported geometry type: {0}")]
    Unsupported(&'static str),
    #[error("geometry is empty")]
    Empty,
    #[error("geometry has non-finite coordinates")]
    NonFinite,
    #[error("polygon ring is not closed or has fewer than 4 coordinates")]
    InvalidRing,
}
