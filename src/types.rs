use geo::{Geometry, MultiPolygon};
use std::fmt;

/// Stable reference to a row of the layer a record was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub usize);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ReferenceArea {
    pub code: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    pub id: RecordId,
    // None when the source row had no geometry or one we could not decode
    pub geometry: Option<Geometry<f64>>,
    pub area_code: Option<String>,
}

impl TargetRecord {
    /// The declared code, or None when the field is absent or whitespace only.
    pub fn declared_code(&self) -> Option<&str> {
        self.area_code.as_deref().filter(|code| !is_blank(code))
    }
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;

    fn record(code: Option<&str>) -> TargetRecord {
        TargetRecord {
            id: RecordId(0),
            geometry: Some(Point::new(0.0, 0.0).into()),
            area_code: code.map(str::to_string),
        }
    }

    #[test]
    fn blank_and_absent_codes_are_both_undeclared() {
        assert_eq!(record(None).declared_code(), None);
        assert_eq!(record(Some("")).declared_code(), None);
        assert_eq!(record(Some(" ")).declared_code(), None);
        assert_eq!(record(Some("\t\n")).declared_code(), None);
    }

    #[test]
    fn declared_code_is_returned_verbatim() {
        assert_eq!(record(Some("GR-04")).declared_code(), Some("GR-04"));
        assert_eq!(record(Some(" GR05 ")).declared_code(), Some(" GR05 "));
    }
}
