use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub dates: Option<DatesConfig>,
    pub names: Option<NamesConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub reference: PathBuf,
    #[serde(default = "default_code_field")]
    pub reference_code_field: String,
    pub targets: Vec<PathBuf>,
    #[serde(default = "default_code_field")]
    pub target_code_field: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default = "default_report")]
    pub report: PathBuf,
    #[serde(default = "default_separator")]
    pub separator: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatesConfig {
    #[serde(default = "default_date_field")]
    pub field: String,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
    // area code -> year the area was monitored
    #[serde(default)]
    pub survey_years: HashMap<String, i32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NamesConfig {
    pub layers: Vec<PathBuf>,
    pub vocabulary: PathBuf,
    #[serde(default = "default_progress")]
    pub progress: PathBuf,
    #[serde(default = "default_mapping")]
    pub mapping: PathBuf,
}

fn default_code_field() -> String {
    "GEB".to_string()
}

fn default_report() -> PathBuf {
    PathBuf::from("area_report.csv")
}

fn default_separator() -> String {
    ";".to_string()
}

fn default_date_field() -> String {
    "Velddatum".to_string()
}

fn default_placeholder() -> String {
    crate::dates::DEFAULT_PLACEHOLDER.to_string()
}

fn default_progress() -> PathBuf {
    PathBuf::from("tmp_mapping.csv")
}

fn default_mapping() -> PathBuf {
    PathBuf::from("mapping.csv")
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.separator()?;

        let mut outputs = HashSet::new();
        for target in &config.input.targets {
            if !outputs.insert(config.fixed_path(target)) {
                return Err(anyhow!(
                    "target {:?} would share the same output as an earlier target",
                    target
                ));
            }
        }
        Ok(config)
    }

    /// Single-byte field separator for every delimited file we write.
    pub fn separator(&self) -> Result<u8> {
        match self.output.separator.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(anyhow!(
                "separator must be a single ASCII character, got {:?}",
                self.output.separator
            )),
        }
    }

    /// Where the corrected copy of `target` is written. The target's folders
    /// are mirrored below the output dir so equally named exports stay apart.
    pub fn fixed_path(&self, target: &Path) -> PathBuf {
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut path = self.output.dir.clone();
        if let Some(parent) = target.parent() {
            path.extend(normal_components(parent));
        }
        path.join(format!("{stem}_fixed.geojson"))
    }
}

fn normal_components(path: &Path) -> impl Iterator<Item = &std::ffi::OsStr> {
    path.components().filter_map(|c| match c {
        Component::Normal(part) => Some(part),
        _ => None,
    })
}

/// Name of a target in the report: its path with `/` separators.
pub fn layer_label(target: &Path) -> String {
    normal_components(target)
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [input]
        reference = "gebieden.shp"
        targets = ["punten.geojson", "vlakken.shp"]

        [output]
        dir = "fixed_files"

        [dates]
        placeholder = "1899-12-30"
        [dates.survey_years]
        "GR-03" = 2020
        "GR-04" = 2021

        [names]
        layers = ["punten.geojson"]
        vocabulary = "mkle_names.txt"
    "#;

    #[test]
    fn parses_with_defaults() {
        let config = AppConfig::parse(FULL).unwrap();
        assert_eq!(config.input.reference_code_field, "GEB");
        assert_eq!(config.input.targets.len(), 2);
        assert_eq!(config.separator().unwrap(), b';');
        assert_eq!(config.output.report, PathBuf::from("area_report.csv"));

        let dates = config.dates.as_ref().unwrap();
        assert_eq!(dates.field, "Velddatum");
        assert_eq!(dates.survey_years["GR-04"], 2021);

        let names = config.names.as_ref().unwrap();
        assert_eq!(names.progress, PathBuf::from("tmp_mapping.csv"));
    }

    #[test]
    fn optional_sections_may_be_left_out() {
        let config = AppConfig::parse(
            "[input]\nreference = \"a.geojson\"\ntargets = []\n[output]\ndir = \"out\"\nseparator = \",\"\n",
        )
        .unwrap();
        assert!(config.dates.is_none());
        assert!(config.names.is_none());
        assert_eq!(config.separator().unwrap(), b',');
    }

    #[test]
    fn multi_character_separator_is_rejected() {
        let err = AppConfig::parse(
            "[input]\nreference = \"a.geojson\"\ntargets = []\n[output]\ndir = \"out\"\nseparator = \";;\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("separator"));
    }

    #[test]
    fn fixed_copies_land_in_the_output_dir() {
        let config = AppConfig::parse(FULL).unwrap();
        assert_eq!(
            config.fixed_path(Path::new("data/vlakken.shp")),
            PathBuf::from("fixed_files/data/vlakken_fixed.geojson")
        );
        assert_eq!(
            config.fixed_path(Path::new("punten.geojson")),
            PathBuf::from("fixed_files/punten_fixed.geojson")
        );
    }

    #[test]
    fn equally_named_exports_get_their_own_copy() {
        let config = AppConfig::parse(FULL).unwrap();
        let first = Path::new("2021/MAC_export/e1dda71f.shp");
        let second = Path::new("2021/MAC_export (1)/e1dda71f.shp");

        assert_ne!(config.fixed_path(first), config.fixed_path(second));
        assert_eq!(
            config.fixed_path(second),
            PathBuf::from("fixed_files/2021/MAC_export (1)/e1dda71f_fixed.geojson")
        );
        assert_ne!(layer_label(first), layer_label(second));
        assert_eq!(layer_label(first), "2021/MAC_export/e1dda71f.shp");
    }

    #[test]
    fn targets_sharing_an_output_are_rejected() {
        let err = AppConfig::parse(
            "[input]\nreference = \"a.geojson\"\ntargets = [\"data/x.shp\", \"data/x.geojson\"]\n[output]\ndir = \"out\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("same output"));
    }
}
