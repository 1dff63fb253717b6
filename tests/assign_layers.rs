use serde_json::json;
use std::fs;
use survey_areas::config::AppConfig;
use survey_areas::report::{write_report, LayerReport};
use survey_areas::{data, AreaIndex};

const AREAS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"GEB": "GR-03"},
         "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}},
        {"type": "Feature", "properties": {"GEB": "GR-04"},
         "geometry": {"type": "MultiPolygon", "coordinates": [[[[20,0],[30,0],[30,10],[20,10],[20,0]]]]}},
        {"type": "Feature", "properties": {"GEB": " "},
         "geometry": {"type": "Polygon", "coordinates": [[[40,0],[50,0],[50,10],[40,10],[40,0]]]}}
    ]
}"#;

const POINTS: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"GEB": " ", "Soort": "a"},
         "geometry": {"type": "Point", "coordinates": [5, 5]}},
        {"type": "Feature", "properties": {"GEB": null, "Soort": "b"},
         "geometry": {"type": "Point", "coordinates": [45, 5]}},
        {"type": "Feature", "properties": {"GEB": "GR-04", "Soort": "c"},
         "geometry": {"type": "Point", "coordinates": [5, 5]}},
        {"type": "Feature", "properties": {"Soort": "d"},
         "geometry": {"type": "Point", "coordinates": [25, 10]}}
    ]
}"#;

#[test]
fn imputes_codes_and_reports_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let areas_path = dir.path().join("gebieden.geojson");
    let points_path = dir.path().join("punten.geojson");
    fs::write(&areas_path, AREAS).unwrap();
    fs::write(&points_path, POINTS).unwrap();

    let config = AppConfig::parse(&format!(
        "[input]\nreference = {:?}\ntargets = [{:?}]\n[output]\ndir = {:?}\n",
        areas_path,
        points_path,
        dir.path().join("fixed_files"),
    ))
    .unwrap();

    let reference = data::load_layer(&config.input.reference).unwrap();
    let areas = data::reference_areas(&reference, &config.input.reference_code_field);
    assert_eq!(areas.len(), 2);
    let index = AreaIndex::build(&areas).unwrap();

    let mut layer = data::load_layer(&points_path).unwrap();
    let (records, report) = index.assign(data::target_records(&layer, "GEB"));
    data::apply_area_codes(&mut layer, "GEB", &records);
    let fixed = config.fixed_path(&points_path);
    data::write_geojson(&layer, &fixed).unwrap();

    let written = data::load_layer(&fixed).unwrap();
    let codes: Vec<_> = written
        .features
        .iter()
        .map(|f| f.properties.get("GEB").cloned())
        .collect();
    assert_eq!(
        codes,
        vec![
            Some(json!("GR-03")),
            Some(json!(null)),
            Some(json!("GR-04")),
            Some(json!("GR-04")),
        ]
    );
    assert_eq!(written.features[1].properties["Soort"], json!("b"));

    let mut out = Vec::new();
    write_report(&mut out, b';', &[LayerReport { layer: &layer.name, entries: &report }]).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "layer;record;reason;candidates\n\
         punten;1;no enclosing area;\n\
         punten;2;declared area mismatch;\n"
    );
}
