//! Catalog import from JSON data files
//!
//! Walks a directory for `*.json` files, each holding any mix of items,
//! facilities and recipes, and upserts them into the catalog database.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db;
use crate::models::{Facility, Item, Recipe};

/// Contents of one catalog data file
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub facilities: Vec<Facility>,
    #[serde(default)]
    pub recipes: Vec<Recipe>,
}

impl CatalogData {
    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.facilities.is_empty() && self.recipes.is_empty()
    }
}

/// Find all *.json files below `dir`, sorted by path
pub fn find_data_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }

    Ok(files)
}

/// Parse a single data file
pub fn parse_data_file(path: &Path) -> Result<CatalogData> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Import every data file below `dir`.
///
/// A file that fails to parse is counted and skipped; database errors abort.
pub fn import_directory(conn: &Connection, dir: &Path) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    info!(dir = %dir.display(), "scanning for catalog data");
    let files = find_data_files(dir)?;
    debug!(files = files.len(), "found catalog data files");

    for path in &files {
        match parse_data_file(path) {
            Ok(data) if data.is_empty() => {
                stats.skipped += 1;
            }
            Ok(data) => {
                store(conn, &data)?;
                stats.items += data.items.len();
                stats.facilities += data.facilities.len();
                stats.recipes += data.recipes.len();
                stats.files += 1;
                debug!(
                    file = %path.display(),
                    items = data.items.len(),
                    facilities = data.facilities.len(),
                    recipes = data.recipes.len(),
                    "imported"
                );
            }
            Err(e) => {
                warn!("{e:#}");
                stats.errors += 1;
            }
        }
    }

    Ok(stats)
}

fn store(conn: &Connection, data: &CatalogData) -> Result<()> {
    for item in &data.items {
        db::upsert_item(conn, item)?;
    }
    for facility in &data.facilities {
        db::upsert_facility(conn, facility)?;
    }
    for recipe in &data.recipes {
        db::upsert_recipe(conn, recipe)
            .with_context(|| format!("Failed to store recipe {}", recipe.id))?;
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub files: usize,
    pub items: usize,
    pub facilities: usize,
    pub recipes: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Imported {} files ({} items, {} facilities, {} recipes). Skipped: {}, Errors: {}",
            self.files, self.items, self.facilities, self.recipes, self.skipped, self.errors
        )
    }
}
