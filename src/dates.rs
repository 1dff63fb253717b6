use crate::data::{text_value, Layer};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::warn;

/// OLE Automation epoch, written by ArcGIS into survey date fields it could not fill.
pub const DEFAULT_PLACEHOLDER: &str = "1899-12-30";

const OUTPUT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DateSummary {
    pub filled: usize,
    /// Missing or placeholder dates whose area has no known survey year.
    pub unresolved: usize,
    pub unparseable: usize,
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

/// Survey date stand-in for an area monitored in `year`: the first of July.
pub fn survey_date(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 7, 1)
}

/// Replace null, blank and placeholder dates in `date_field` with the
/// survey date of the record's area. Other values are kept; unparseable
/// ones are counted and logged.
pub fn fill_survey_dates(
    layer: &mut Layer,
    date_field: &str,
    code_field: &str,
    placeholder: NaiveDate,
    survey_years: &HashMap<String, i32>,
) -> DateSummary {
    let mut summary = DateSummary::default();

    for (row, feature) in layer.features.iter_mut().enumerate() {
        let needs_date = match text_value(feature.properties.get(date_field)) {
            None => true,
            Some(value) if value.trim().is_empty() => true,
            Some(value) => match parse_date(&value) {
                Some(date) => date == placeholder,
                None => {
                    warn!("Row {} of '{}': cannot parse {} '{}'", row, layer.name, date_field, value);
                    summary.unparseable += 1;
                    false
                }
            },
        };
        if !needs_date {
            continue;
        }

        let date = text_value(feature.properties.get(code_field))
            .and_then(|code| survey_years.get(&code).copied())
            .and_then(survey_date);

        match date {
            Some(date) => {
                let stamp = date.and_hms_opt(0, 0, 0).map(|dt| dt.format(OUTPUT_FORMAT).to_string());
                if let Some(stamp) = stamp {
                    feature.properties.insert(date_field.to_string(), JsonValue::String(stamp));
                    summary.filled += 1;
                }
            }
            None => summary.unresolved += 1,
        }
    }

    summary
}
