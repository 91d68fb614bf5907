//! Bundled and discovered domain packs

use crate::catalog::{CatalogError, DomainPack};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Packs compiled into the binary, as `(domain, document)`
pub const BUILTIN: &[(&str, &str)] = &[
    ("biome", include_str!("../packs/biome.yaml")),
    ("docker", include_str!("../packs/docker.yaml")),
    ("go", include_str!("../packs/go.yaml")),
    ("nextjs", include_str!("../packs/nextjs.yaml")),
    ("vitest", include_str!("../packs/vitest.yaml")),
];

/// Names of the bundled packs
pub fn builtin_names() -> Vec<&'static str> {
    BUILTIN.iter().map(|(name, _)| *name).collect()
}

/// Load one bundled pack
pub fn builtin(name: &str) -> Option<Result<DomainPack, CatalogError>> {
    BUILTIN
        .iter()
        .find(|(domain, _)| *domain == name)
        .map(|(domain, content)| DomainPack::parse(content, &format!("<builtin:{}>", domain)))
}

/// Load every bundled pack
pub fn builtin_packs() -> Result<Vec<DomainPack>, CatalogError> {
    BUILTIN
        .iter()
        .map(|(domain, content)| DomainPack::parse(content, &format!("<builtin:{}>", domain)))
        .collect()
}

/// Default pack search paths: project-local, then the user config directory
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".confaudit").join("packs")];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("confaudit").join("packs"));
    }
    paths
}

fn is_pack_file(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml" | "yml" | "json")
        )
}

/// Load all pack files from existing search paths, in file name order
pub fn discover(search_paths: &[PathBuf]) -> Result<Vec<DomainPack>, CatalogError> {
    let mut packs = Vec::new();
    for search_path in search_paths {
        if !search_path.is_dir() {
            continue;
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(search_path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_pack_file(path))
            .collect();
        files.sort();

        for file in files {
            log::debug!("Loading pack {}", file.display());
            packs.push(DomainPack::load(&file)?);
        }
    }
    Ok(packs)
}

/// Assembles the pack set for a run
///
/// Later sources replace earlier packs of the same domain: bundled packs,
/// then discovered packs, then explicitly named files.
#[derive(Debug, Default)]
pub struct PackSet {
    packs: BTreeMap<String, DomainPack>,
}

impl PackSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pack: DomainPack) {
        let domain = pack.domain().to_string();
        if self.packs.insert(domain.clone(), pack).is_some() {
            log::info!("Pack '{}' overrides an earlier definition", domain);
        }
    }

    pub fn with_builtin(mut self) -> Result<Self, CatalogError> {
        for pack in builtin_packs()? {
            self.add(pack);
        }
        Ok(self)
    }

    pub fn with_search_paths(mut self, search_paths: &[PathBuf]) -> Result<Self, CatalogError> {
        for pack in discover(search_paths)? {
            self.add(pack);
        }
        Ok(self)
    }

    pub fn with_files(mut self, files: &[PathBuf]) -> Result<Self, CatalogError> {
        for file in files {
            self.add(DomainPack::load(file)?);
        }
        Ok(self)
    }

    pub fn domains(&self) -> Vec<&str> {
        self.packs.keys().map(String::as_str).collect()
    }

    pub fn get(&self, domain: &str) -> Option<&DomainPack> {
        self.packs.get(domain)
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Packs ordered by domain
    pub fn into_packs(self) -> Vec<DomainPack> {
        self.packs.into_values().collect()
    }
}
