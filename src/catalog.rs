//! Lighting asset catalog.
//!
//! The catalog is read-only while sessions run; one handle is shared by every
//! concurrent session without locking.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Current schema version for catalog JSON files.
pub const CATALOG_SCHEMA_VERSION: u32 = 1;

/// One environment-lighting asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LightingAsset {
    pub name: String,
    /// Lowercased, duplicates collapsed, first-seen order kept.
    pub tags: Vec<String>,
    pub file: PathBuf,
    pub resolution: String,
}

impl LightingAsset {
    pub fn new<I, S>(name: impl Into<String>, tags: I, file: impl Into<PathBuf>, resolution: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.as_ref().trim().to_ascii_lowercase();
            if !tag.is_empty() && !unique.contains(&tag) {
                unique.push(tag);
            }
        }
        Self {
            name: name.into(),
            tags: unique,
            file: file.into(),
            resolution: resolution.trim().to_ascii_lowercase(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|own| own == tag)
    }
}

/// Queryable, read-only store of lighting assets.
pub trait AssetCatalog: Send + Sync {
    /// Every asset in insertion order.
    fn assets(&self) -> &[LightingAsset];

    /// Assets carrying at least one of `tags`, most matches first; ties keep
    /// insertion order.
    fn search_by_tags(&self, tags: &[String], limit: usize) -> Vec<LightingAsset> {
        let wanted: Vec<String> = tags.iter().map(|tag| tag.trim().to_ascii_lowercase()).collect();
        let mut matches: Vec<(usize, &LightingAsset)> = self
            .assets()
            .iter()
            .map(|asset| {
                let hits = wanted.iter().filter(|tag| asset.has_tag(tag)).count();
                (hits, asset)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        matches
            .into_iter()
            .take(limit)
            .map(|(_, asset)| asset.clone())
            .collect()
    }
}

/// Catalog held in memory, loaded from a JSON file or built in code.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    assets: Vec<LightingAsset>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    schema_version: u32,
    #[serde(default)]
    assets: Vec<CatalogFileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFileEntry {
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    file: PathBuf,
    #[serde(default = "default_resolution")]
    resolution: String,
}

fn default_resolution() -> String {
    "2k".to_string()
}

impl StaticCatalog {
    /// Build a catalog, rejecting duplicate asset names.
    pub fn new(assets: Vec<LightingAsset>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for asset in &assets {
            if asset.name.trim().is_empty() {
                return Err(anyhow!("catalog asset names must be non-empty"));
            }
            if !seen.insert(asset.name.as_str()) {
                return Err(anyhow!("duplicate catalog asset name {:?}", asset.name));
            }
        }
        Ok(Self { assets })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Load a catalog JSON file. Relative asset paths resolve against the
    /// catalog file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read catalog {}", path.display()))?;
        let file: CatalogFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse catalog {}", path.display()))?;
        if file.schema_version != CATALOG_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported catalog schema_version {}",
                file.schema_version
            ));
        }
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let assets = file
            .assets
            .into_iter()
            .map(|entry| {
                let file = if entry.file.is_absolute() {
                    entry.file
                } else {
                    base.join(entry.file)
                };
                LightingAsset::new(entry.name, entry.tags, file, &entry.resolution)
            })
            .collect();
        Self::new(assets).with_context(|| format!("validate catalog {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetCatalog for StaticCatalog {
    fn assets(&self) -> &[LightingAsset] {
        &self.assets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(name: &str, tags: &[&str]) -> LightingAsset {
        LightingAsset::new(name, tags.iter().copied(), format!("/hdri/{name}.hdr"), "2k")
    }

    #[test]
    fn tags_are_lowercased_and_deduplicated() {
        let asset = asset("loft", &["Indoor", "warm", "indoor", " warm ", ""]);
        assert_eq!(asset.tags, ["indoor", "warm"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = StaticCatalog::new(vec![asset("a", &[]), asset("a", &["x"])]).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn search_orders_by_match_count_then_insertion() {
        let catalog = StaticCatalog::new(vec![
            asset("one", &["warm"]),
            asset("two", &["warm", "indoor"]),
            asset("three", &["outdoor"]),
            asset("four", &["indoor"]),
        ])
        .unwrap();
        let tags = vec!["indoor".to_string(), "WARM".to_string()];
        let names: Vec<String> = catalog
            .search_by_tags(&tags, 10)
            .into_iter()
            .map(|asset| asset.name)
            .collect();
        assert_eq!(names, ["two", "one", "four"]);
        assert_eq!(catalog.search_by_tags(&tags, 1).len(), 1);
    }

    #[test]
    fn load_resolves_relative_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"schema_version": 1, "assets": [
                {"name": "studio_small", "tags": ["studio", "indoor"], "file": "hdri/studio.hdr"},
                {"name": "sky", "tags": ["outdoor"], "file": "/abs/sky.exr", "resolution": "4K"}
            ]}"#,
        )
        .unwrap();
        let catalog = StaticCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.assets()[0].file, dir.path().join("hdri/studio.hdr"));
        assert_eq!(catalog.assets()[0].resolution, "2k");
        assert_eq!(catalog.assets()[1].file, PathBuf::from("/abs/sky.exr"));
        assert_eq!(catalog.assets()[1].resolution, "4k");
    }

    #[test]
    fn load_rejects_unknown_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, r#"{"schema_version": 9, "assets": []}"#).unwrap();
        assert!(StaticCatalog::load(&path).is_err());
    }
}
