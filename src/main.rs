use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use std::io;
use std::path::PathBuf;
use survey_areas::config::{layer_label, AppConfig};
use survey_areas::layers::{self, LayerKind};
use survey_areas::mapping::{self, LineChooser, MappingStore, Outcome, Vocabulary};
use survey_areas::report::{self, LayerReport};
use survey_areas::{data, dates, tree, AreaIndex, ReportEntry};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill in missing area codes from the reference polygons
    Assign {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Replace missing and placeholder survey dates
    Dates {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Map legacy field names onto the target vocabulary (resumable)
    Names {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Classify layers by geometry type
    Layers {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Write a CSV tree of the survey files under a directory
    Tree {
        #[arg(short, long)]
        dir: PathBuf,
        #[arg(short, long, default_value = "file_tree.csv")]
        out: PathBuf,
        #[arg(short, long, default_value_t = ';')]
        separator: char,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Assign { config } => run_assign(&AppConfig::load_from_file(config)?),
        Commands::Dates { config } => run_dates(&AppConfig::load_from_file(config)?),
        Commands::Names { config } => run_names(&AppConfig::load_from_file(config)?),
        Commands::Layers { paths } => run_layers(paths),
        Commands::Tree { dir, out, separator } => {
            tree::write_tree_file(dir, out, tree::separator_byte(*separator)?)
        }
    }
}

fn run_assign(config: &AppConfig) -> Result<()> {
    let separator = config.separator()?;

    // 1. Group reference areas once
    let reference = data::load_layer(&config.input.reference)?;
    let areas = data::reference_areas(&reference, &config.input.reference_code_field);
    let index = AreaIndex::build(&areas)
        .with_context(|| format!("Invalid reference layer: {:?}", config.input.reference))?;
    info!(
        "Indexed {} reference polygons as {} areas",
        areas.len(),
        index.regions().len()
    );

    // 2. Impute each target layer against the shared index
    let code_field = config.input.target_code_field.as_str();
    let results: Vec<(String, Vec<ReportEntry>)> = config
        .input
        .targets
        .par_iter()
        .map(|target| -> Result<(String, Vec<ReportEntry>)> {
            let mut layer = data::load_layer(target)?;
            let records = data::target_records(&layer, code_field);
            let (records, report) = index.assign(records);
            data::apply_area_codes(&mut layer, code_field, &records);
            data::write_geojson(&layer, &config.fixed_path(target))?;
            let label = layer_label(target);
            info!("Layer '{}': {} records need review", label, report.len());
            Ok((label, report))
        })
        .collect::<Result<Vec<_>>>()?;

    // 3. Report
    let reports: Vec<LayerReport<'_>> = results
        .iter()
        .map(|(layer, entries)| LayerReport { layer, entries })
        .collect();
    let report_path = config.output.dir.join(&config.output.report);
    report::write_report_file(&report_path, separator, &reports)?;

    let total: usize = results.iter().map(|(_, entries)| entries.len()).sum();
    info!("Wrote {} report entries to {:?}", total, report_path);
    Ok(())
}

fn run_dates(config: &AppConfig) -> Result<()> {
    let settings = config
        .dates
        .as_ref()
        .ok_or_else(|| anyhow!("Configuration has no [dates] section"))?;
    let placeholder = dates::parse_date(&settings.placeholder)
        .ok_or_else(|| anyhow!("Cannot parse placeholder date '{}'", settings.placeholder))?;

    for target in &config.input.targets {
        // Prefer the copy that already has its area codes filled in
        let fixed = config.fixed_path(target);
        let source = if fixed.exists() { fixed.clone() } else { target.clone() };

        let mut layer = data::load_layer(&source)?;
        let summary = dates::fill_survey_dates(
            &mut layer,
            &settings.field,
            &config.input.target_code_field,
            placeholder,
            &settings.survey_years,
        );
        info!(
            "{:?}: filled {}, unresolved {}, unparseable {}",
            source, summary.filled, summary.unresolved, summary.unparseable
        );
        data::write_geojson(&layer, &fixed)?;
    }
    Ok(())
}

fn run_names(config: &AppConfig) -> Result<()> {
    let separator = config.separator()?;
    let settings = config
        .names
        .as_ref()
        .ok_or_else(|| anyhow!("Configuration has no [names] section"))?;

    let loaded = settings
        .layers
        .iter()
        .map(|path| data::load_layer(path))
        .collect::<Result<Vec<_>>>()?;
    let survey = layers::survey_field_names(&loaded);
    let vocabulary = Vocabulary::load(&settings.vocabulary)?;
    let mut store = MappingStore::open(&settings.progress, separator)?;

    let stdin = io::stdin();
    let mut chooser = LineChooser::new(stdin.lock(), io::stdout());
    match mapping::run_mapping(&survey, &vocabulary, &mut store, &mut chooser)? {
        Outcome::Completed => {
            mapping::write_mapping_file(&settings.mapping, separator, &survey, &store)?;
            info!("Wrote mapping file {:?}", settings.mapping);
        }
        Outcome::Aborted => warn!(
            "Stopped before all names were mapped; rerun to continue from {:?}",
            settings.progress
        ),
    }
    Ok(())
}

fn run_layers(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let layer = data::load_layer(path)?;
        match layers::classify(&layer) {
            LayerKind::Geometry(class) => info!("{:?}: {}", path, class),
            LayerKind::Attachment => info!("{:?}: attachment table", path),
            LayerKind::Empty => warn!("{:?}: no geometry", path),
        }
    }
    Ok(())
}
