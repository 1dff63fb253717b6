use anyhow::{anyhow, Context, Result};
use csv::WriterBuilder;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const EXTENSIONS_OF_INTEREST: [&str; 5] = ["shp", "mdb", "gml", "gdb", "zip"];

fn is_of_interest(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXTENSIONS_OF_INTEREST.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Files and directories (a `.gdb` is a directory) below `root` with a
/// relevant extension, relative to `root` and sorted. Symlinks are listed
/// but not followed.
pub fn discover(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {:?}", root))?;
        if is_of_interest(entry.path()) {
            found.push(entry.path().strip_prefix(root)?.to_path_buf());
        }
    }

    info!("Found {} relevant paths under {:?}", found.len(), root);
    Ok(found)
}

/// Tree files are read back as text, so the separator has to be one ASCII byte.
pub fn separator_byte(separator: char) -> Result<u8> {
    if !separator.is_ascii() {
        return Err(anyhow!("separator must be an ASCII character, got {:?}", separator));
    }
    Ok(separator as u8)
}

/// One row per newly entered path component. The first column is left
/// free for notes; the component sits in the column of its depth.
pub fn tree_rows(paths: &[PathBuf]) -> Vec<Vec<String>> {
    let depth = paths.iter().map(|p| p.components().count()).max().unwrap_or(0);
    let mut rows = Vec::new();
    let mut previous: Vec<String> = Vec::new();

    for path in paths {
        let parts: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let shared = previous
            .iter()
            .zip(&parts)
            .take_while(|(a, b)| a == b)
            .count();

        for (n, part) in parts.iter().enumerate().skip(shared) {
            let mut row = vec![String::new(); depth + 1];
            row[n + 1] = part.clone();
            rows.push(row);
        }
        previous = parts;
    }

    debug!("Tree has {} rows, {} levels deep", rows.len(), depth);
    rows
}

pub fn write_tree<W: Write>(writer: W, separator: u8, paths: &[PathBuf]) -> Result<()> {
    let mut wtr = WriterBuilder::new()
        .delimiter(separator)
        .has_headers(false)
        .from_writer(writer);
    for row in tree_rows(paths) {
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_tree_file(root: &Path, out: &Path, separator: u8) -> Result<()> {
    let paths = discover(root)?;
    let file = fs::File::create(out).with_context(|| format!("Failed to create {:?}", out))?;
    write_tree(file, separator, &paths).with_context(|| format!("Failed to write tree: {:?}", out))?;
    info!("Wrote file tree to {:?}", out);
    Ok(())
}
