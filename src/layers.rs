use crate::data::Layer;
use geo::Geometry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GeometryClass {
    Point,
    Line,
    Polygon,
}

impl GeometryClass {
    /// Label used in vocabulary and mapping files.
    pub fn label(self) -> &'static str {
        match self {
            GeometryClass::Point => "Point",
            GeometryClass::Line => "MultiLineString",
            GeometryClass::Polygon => "MultiPolygon",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Point" | "MultiPoint" => Some(GeometryClass::Point),
            "Line" | "LineString" | "MultiLineString" => Some(GeometryClass::Line),
            "Polygon" | "MultiPolygon" => Some(GeometryClass::Polygon),
            _ => None,
        }
    }

    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(GeometryClass::Point),
            Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => {
                Some(GeometryClass::Line)
            }
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => Some(GeometryClass::Polygon),
            Geometry::GeometryCollection(gc) => gc.iter().find_map(GeometryClass::of),
        }
    }
}

impl fmt::Display for GeometryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Geometry(GeometryClass),
    /// No geometry; ArcGIS attachment tables carry `ATTACH` in their name.
    Attachment,
    Empty,
}

/// Classify by the first feature that has a geometry.
pub fn classify(layer: &Layer) -> LayerKind {
    let class = layer
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .find_map(GeometryClass::of);

    match class {
        Some(class) => LayerKind::Geometry(class),
        None if layer.name.contains("ATTACH") => LayerKind::Attachment,
        None => LayerKind::Empty,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldName {
    pub name: String,
    /// True when every layer of this geometry class has the field.
    pub common: bool,
}

/// Field names per geometry class across `layers`, sorted by name.
/// Layers without geometry are ignored.
pub fn survey_field_names(layers: &[Layer]) -> BTreeMap<GeometryClass, Vec<FieldName>> {
    let mut per_class: BTreeMap<GeometryClass, Vec<BTreeSet<&str>>> = BTreeMap::new();
    for layer in layers {
        if let LayerKind::Geometry(class) = classify(layer) {
            per_class.entry(class).or_default().push(layer.field_names());
        }
    }

    per_class
        .into_iter()
        .map(|(class, sets)| {
            let all: BTreeSet<&str> = sets.iter().flatten().copied().collect();
            let names = all
                .into_iter()
                .map(|name| FieldName {
                    name: name.to_string(),
                    common: sets.iter().all(|s| s.contains(name)),
                })
                .collect();
            (class, names)
        })
        .collect()
}
