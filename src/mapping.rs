//! Manual mapping of legacy field names onto a target vocabulary.
//!
//! Answers are appended to a progress file as soon as they are given, so
//! an interrupted session picks up where it stopped.

use crate::layers::{FieldName, GeometryClass};
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const UNDECIDED: &str = "###-nader_bepalen";
pub const DROPPED: &str = "###-laten_vervallen";

/// Allowed target names per geometry class, read from lines like
/// `Point: name_a, name_b`.
#[derive(Debug, Default, Clone)]
pub struct Vocabulary {
    names: BTreeMap<GeometryClass, Vec<String>>,
}

impl Vocabulary {
    pub fn parse(text: &str) -> Result<Self> {
        let mut names = BTreeMap::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (label, list) = line
                .split_once(':')
                .ok_or_else(|| anyhow!("line {}: expected 'GeometryType: name, ...'", number + 1))?;
            let class = GeometryClass::from_label(label)
                .ok_or_else(|| anyhow!("line {}: unknown geometry type '{}'", number + 1, label.trim()))?;
            let entries: &mut Vec<String> = names.entry(class).or_default();
            entries.extend(
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(Vocabulary { names })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vocabulary: {:?}", path))?;
        Self::parse(&text).with_context(|| format!("Failed to parse vocabulary: {:?}", path))
    }

    /// Numbered choices offered for a field of `class`.
    pub fn options(&self, class: GeometryClass) -> Vec<String> {
        let mut options = vec![UNDECIDED.to_string(), DROPPED.to_string()];
        if let Some(names) = self.names.get(&class) {
            options.extend(names.iter().cloned());
        }
        options
    }
}

/// Answers given so far, backed by an append-only delimited file.
pub struct MappingStore {
    path: PathBuf,
    separator: u8,
    answers: BTreeMap<(GeometryClass, String), String>,
}

impl MappingStore {
    pub fn open(path: &Path, separator: u8) -> Result<Self> {
        let mut answers = BTreeMap::new();

        if path.exists() {
            let mut rdr = ReaderBuilder::new()
                .delimiter(separator)
                .trim(csv::Trim::All)
                .from_path(path)
                .with_context(|| format!("Failed to open mapping progress: {:?}", path))?;
            for result in rdr.records() {
                let record = result?;
                let (Some(label), Some(source), Some(target)) = (record.get(0), record.get(1), record.get(2))
                else {
                    return Err(anyhow!("Malformed row in {:?}: {:?}", path, record));
                };
                let class = GeometryClass::from_label(label)
                    .ok_or_else(|| anyhow!("Unknown geometry type '{}' in {:?}", label, path))?;
                answers.insert((class, source.to_string()), target.to_string());
            }
            info!("Resuming with {} stored answers from {:?}", answers.len(), path);
        } else {
            let mut wtr = WriterBuilder::new()
                .delimiter(separator)
                .from_path(path)
                .with_context(|| format!("Failed to create mapping progress: {:?}", path))?;
            wtr.write_record(["geom_type", "source", "target"])?;
            wtr.flush()?;
            info!("Created new mapping progress file {:?}", path);
        }

        Ok(MappingStore {
            path: path.to_path_buf(),
            separator,
            answers,
        })
    }

    pub fn get(&self, class: GeometryClass, source: &str) -> Option<&str> {
        self.answers
            .get(&(class, source.to_string()))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Persist one answer before remembering it.
    pub fn record(&mut self, class: GeometryClass, source: &str, target: &str) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to append to {:?}", self.path))?;
        let mut wtr = WriterBuilder::new()
            .delimiter(self.separator)
            .has_headers(false)
            .from_writer(file);
        wtr.write_record([class.label(), source, target])?;
        wtr.flush()?;

        self.answers
            .insert((class, source.to_string()), target.to_string());
        Ok(())
    }
}

/// Source of answers. `Ok(None)` means the input is exhausted and the
/// session should stop.
pub trait Chooser {
    fn answer(&mut self, question: &str, options: &[String]) -> Result<Option<String>>;
}

/// Line-based prompt: prints the numbered options, reads one line per answer.
pub struct LineChooser<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LineChooser<R, W> {
    pub fn new(input: R, output: W) -> Self {
        LineChooser { input, output }
    }
}

impl<R: BufRead, W: Write> Chooser for LineChooser<R, W> {
    fn answer(&mut self, question: &str, options: &[String]) -> Result<Option<String>> {
        for (number, option) in options.iter().enumerate() {
            writeln!(self.output, "{number}: {option}")?;
        }
        write!(self.output, "{question} Pick a number listed above and press enter: ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Aborted,
}

/// Ask for every surveyed field that has no stored answer yet.
pub fn run_mapping(
    survey: &BTreeMap<GeometryClass, Vec<FieldName>>,
    vocabulary: &Vocabulary,
    store: &mut MappingStore,
    chooser: &mut dyn Chooser,
) -> Result<Outcome> {
    for (&class, names) in survey {
        let options = vocabulary.options(class);

        for field in names {
            if store.get(class, &field.name).is_some() {
                continue;
            }

            let question = format!(
                "What target name does {} correspond to for geometry type {}?",
                field.name, class
            );
            loop {
                let Some(raw) = chooser.answer(&question, &options)? else {
                    info!("Mapping aborted; {} answers stored", store.len());
                    return Ok(Outcome::Aborted);
                };
                match raw.trim().parse::<usize>() {
                    Ok(choice) if choice < options.len() => {
                        let target = &options[choice];
                        store.record(class, &field.name, target)?;
                        info!("{} is now mapped to {} for geometry type {}", field.name, target, class);
                        break;
                    }
                    _ => warn!(
                        "Incorrect input '{}'. Enter a number between 0 and {}",
                        raw.trim(),
                        options.len() - 1
                    ),
                }
            }
        }
    }

    Ok(Outcome::Completed)
}

pub fn write_mapping<W: Write>(
    writer: W,
    separator: u8,
    survey: &BTreeMap<GeometryClass, Vec<FieldName>>,
    store: &MappingStore,
) -> Result<()> {
    let mut wtr = WriterBuilder::new().delimiter(separator).from_writer(writer);
    wtr.write_record(["geom_type", "source", "target", "common"])?;

    for (&class, names) in survey {
        for field in names {
            let target = store
                .get(class, &field.name)
                .ok_or_else(|| anyhow!("No mapping for {} ({})", field.name, class))?;
            let common = if field.common { "common" } else { "not common" };
            wtr.write_record([class.label(), field.name.as_str(), target, common])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_mapping_file(
    path: &Path,
    separator: u8,
    survey: &BTreeMap<GeometryClass, Vec<FieldName>>,
    store: &MappingStore,
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    write_mapping(file, separator, survey, store)
        .with_context(|| format!("Failed to write mapping: {:?}", path))
}
