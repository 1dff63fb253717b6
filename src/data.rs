use crate::types::{is_blank, RecordId, ReferenceArea, TargetRecord};
use anyhow::{anyhow, Context, Result};
use geo::{Geometry, MultiPolygon};
use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::{Map as JsonMap, Value as JsonValue};
use shapefile::dbase::FieldValue;
use shapefile::{Reader, Shape};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{info, warn};

/// One vector layer decoded into geometries plus attribute maps. Row
/// order is the file's feature order and doubles as the record id.
#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub name: String,
    pub features: Vec<LayerFeature>,
}

#[derive(Debug, Clone, Default)]
pub struct LayerFeature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: JsonMap<String, JsonValue>,
}

impl Layer {
    /// Union of the attribute names used by any feature.
    pub fn field_names(&self) -> BTreeSet<&str> {
        self.features
            .iter()
            .flat_map(|f| f.properties.keys().map(String::as_str))
            .collect()
    }
}

pub fn load_layer(path: &Path) -> Result<Layer> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Layer file has no extension: {:?}", path))?;

    let layer = match extension.as_str() {
        "shp" => load_shapefile(path)?,
        "json" | "geojson" => load_geojson(path)?,
        _ => return Err(anyhow!("Unsupported layer format: {}", extension)),
    };

    info!("Loaded layer '{}' with {} features", layer.name, layer.features.len());
    Ok(layer)
}

fn layer_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn load_shapefile(path: &Path) -> Result<Layer> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut features = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let geometry = match shape {
            Shape::NullShape => None,
            shape => match Geometry::<f64>::try_from(shape) {
                Ok(geometry) => Some(geometry),
                Err(e) => {
                    warn!("Row {} of {:?}: unconvertible shape: {:?}", features.len(), path, e);
                    None
                }
            },
        };

        let properties = record
            .into_iter()
            .map(|(name, value)| (name, field_to_json(value)))
            .collect();

        features.push(LayerFeature { geometry, properties });
    }

    Ok(Layer {
        name: layer_name(path),
        features,
    })
}

fn field_to_json(value: FieldValue) -> JsonValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => JsonValue::String(s),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
            JsonValue::from(n)
        }
        FieldValue::Float(Some(n)) => JsonValue::from(n as f64),
        FieldValue::Integer(n) => JsonValue::from(n),
        FieldValue::Logical(Some(b)) => JsonValue::Bool(b),
        FieldValue::Date(Some(date)) => JsonValue::String(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        )),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None)
        | FieldValue::Date(None) => JsonValue::Null,
        other => JsonValue::String(format!("{:?}", other)),
    }
}

fn load_geojson(path: &Path) -> Result<Layer> {
    let file = File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    // Whole file is held in memory
    read_geojson(&layer_name(path), BufReader::new(file))
        .with_context(|| format!("Failed to parse GeoJSON: {:?}", path))
}

pub fn read_geojson<R: Read>(name: &str, reader: R) -> Result<Layer> {
    let collection = match GeoJson::from_reader(reader)? {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let features = collection
        .features
        .into_iter()
        .enumerate()
        .map(|(row, feature)| {
            let geometry = feature.geometry.and_then(|geom| {
                match Geometry::<f64>::try_from(geom.value) {
                    Ok(geometry) => Some(geometry),
                    Err(e) => {
                        warn!("Row {} of '{}': unconvertible geometry: {}", row, name, e);
                        None
                    }
                }
            });
            LayerFeature {
                geometry,
                properties: feature.properties.unwrap_or_default(),
            }
        })
        .collect();

    Ok(Layer {
        name: name.to_string(),
        features,
    })
}

/// Attribute value as text: strings verbatim, numbers printed, null or
/// missing as None.
pub fn text_value(value: Option<&JsonValue>) -> Option<String> {
    match value? {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Polygonal features of `layer` keyed by `code_field`. Rows without a
/// usable code or polygon geometry are skipped.
pub fn reference_areas(layer: &Layer, code_field: &str) -> Vec<ReferenceArea> {
    let mut areas = Vec::new();
    let mut skipped_codes = 0usize;

    for (row, feature) in layer.features.iter().enumerate() {
        let code = match text_value(feature.properties.get(code_field)) {
            Some(code) if !is_blank(&code) => code,
            _ => {
                skipped_codes += 1;
                continue;
            }
        };

        let geometry = match &feature.geometry {
            Some(Geometry::MultiPolygon(mp)) => mp.clone(),
            Some(Geometry::Polygon(p)) => MultiPolygon::new(vec![p.clone()]),
            _ => {
                warn!("Reference row {} ('{}') is not a polygon, skipped", row, code);
                continue;
            }
        };

        areas.push(ReferenceArea { code, geometry });
    }

    if skipped_codes > 0 {
        warn!(
            "Skipped {} reference polygons without a '{}' value in '{}'",
            skipped_codes, code_field, layer.name
        );
    }
    areas
}

pub fn target_records(layer: &Layer, code_field: &str) -> Vec<TargetRecord> {
    layer
        .features
        .iter()
        .enumerate()
        .map(|(row, feature)| TargetRecord {
            id: RecordId(row),
            geometry: feature.geometry.clone(),
            area_code: text_value(feature.properties.get(code_field)),
        })
        .collect()
}

/// Write the (possibly imputed) codes of `records` back into the layer.
/// Attributes whose text already matches are left as they are, so
/// numeric codes keep their type.
pub fn apply_area_codes(layer: &mut Layer, code_field: &str, records: &[TargetRecord]) {
    for record in records {
        let Some(feature) = layer.features.get_mut(record.id.0) else {
            warn!("Record {} has no row in '{}'", record.id, layer.name);
            continue;
        };
        if text_value(feature.properties.get(code_field)) != record.area_code {
            let value = record
                .area_code
                .clone()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null);
            feature.properties.insert(code_field.to_string(), value);
        }
    }
}

pub fn to_feature_collection(layer: &Layer) -> FeatureCollection {
    let features = layer
        .features
        .iter()
        .map(|f| Feature {
            bbox: None,
            geometry: f
                .geometry
                .as_ref()
                .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
            id: None,
            properties: Some(f.properties.clone()),
            foreign_members: None,
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

pub fn write_geojson(layer: &Layer, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {:?}", parent))?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    writer.write_all(GeoJson::FeatureCollection(to_feature_collection(layer)).to_string().as_bytes())?;
    writer.flush()?;
    info!("Wrote {} features to {:?}", layer.features.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::Point;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"GEB": "GR-03", "Velddatum": null},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
            {"type": "Feature", "properties": {"GEB": " "},
             "geometry": {"type": "Point", "coordinates": [5.5, 4.25]}},
            {"type": "Feature", "properties": {"GEB": 12},
             "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}},
            {"type": "Feature", "properties": {"OTHER": true}, "geometry": null}
        ]
    }"#;

    fn sample() -> Layer {
        read_geojson("sample", SAMPLE.as_bytes()).unwrap()
    }

    #[test]
    fn reads_features_in_file_order() {
        let layer = sample();
        assert_eq!(layer.name, "sample");
        assert_eq!(layer.features.len(), 4);
        match &layer.features[1].geometry {
            Some(Geometry::Point(p)) => {
                assert_relative_eq!(p.x(), 5.5);
                assert_relative_eq!(p.y(), 4.25);
            }
            other => panic!("expected point, got {other:?}"),
        }
        assert!(layer.features[3].geometry.is_none());
    }

    #[test]
    fn rejects_bare_geometry_documents() {
        let doc = r#"{"type": "Point", "coordinates": [1, 2]}"#;
        assert!(read_geojson("bare", doc.as_bytes()).is_err());
    }

    #[test]
    fn field_names_are_collected_across_features() {
        let layer = sample();
        let names: Vec<_> = layer.field_names().into_iter().collect();
        assert_eq!(names, vec!["GEB", "OTHER", "Velddatum"]);
    }

    #[test]
    fn reference_areas_keep_only_coded_polygons() {
        let areas = reference_areas(&sample(), "GEB");
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].code, "GR-03");
        assert_eq!(areas[0].geometry.0.len(), 1);
    }

    #[test]
    fn target_records_stringify_codes() {
        let records = target_records(&sample(), "GEB");
        let codes: Vec<_> = records.iter().map(|r| r.area_code.clone()).collect();
        assert_eq!(
            codes,
            vec![Some("GR-03".into()), Some(" ".into()), Some("12".into()), None]
        );
        assert_eq!(records[2].id, RecordId(2));
    }

    #[test]
    fn applying_codes_touches_only_changed_rows() {
        let mut layer = sample();
        let mut records = target_records(&layer, "GEB");
        records[1].area_code = Some("GR-03".into());
        records[3].area_code = None;
        apply_area_codes(&mut layer, "GEB", &records);

        assert_eq!(layer.features[1].properties["GEB"], JsonValue::String("GR-03".into()));
        assert_eq!(layer.features[2].properties["GEB"], JsonValue::from(12));
        assert!(!layer.features[3].properties.contains_key("GEB"));
    }

    #[test]
    fn written_layer_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("points_fixed.geojson");
        let layer = Layer {
            name: "points".into(),
            features: vec![LayerFeature {
                geometry: Some(Point::new(1.0, 2.0).into()),
                properties: [("GEB".to_string(), JsonValue::from("GR-04"))].into_iter().collect(),
            }],
        };
        write_geojson(&layer, &path).unwrap();

        let back = load_layer(&path).unwrap();
        assert_eq!(back.name, "points_fixed");
        assert_eq!(back.features[0].properties["GEB"], JsonValue::from("GR-04"));
        assert_eq!(back.features[0].geometry, layer.features[0].geometry);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_layer(Path::new("data/layer.gpkg")).unwrap_err();
        assert!(err.to_string().contains("Unsupported layer format"));
    }
}
