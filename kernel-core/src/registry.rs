//! Installation registry: `<plugins_dir>/registry.json`, the on-disk
//! record of which packages have been extracted where.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, PackageError, Result};
use crate::package::PluginPackage;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryEntry {
    pub plugin_id: String,
    pub version: String,
    pub install_path: PathBuf,
    pub installed_at: DateTime<Utc>,
    pub package_hash: String,
}

/// Tracks installed packages under one `plugins_dir`. `registry.json`
/// itself is a plain JSON array of [`RegistryEntry`]; `plugins_dir` is
/// runtime context, not part of the serialized form.
#[derive(Debug, Clone)]
pub struct InstallationRegistry {
    plugins_dir: PathBuf,
    entries: Vec<RegistryEntry>,
}

impl InstallationRegistry {
    pub fn registry_path(plugins_dir: &Path) -> PathBuf {
        plugins_dir.join("registry.json")
    }

    /// Loads `registry.json` if present. Entries whose `install_path`
    /// no longer exists are dropped silently, per spec.
    pub fn load(plugins_dir: impl Into<PathBuf>) -> Result<Self> {
        let plugins_dir = plugins_dir.into();
        let path = Self::registry_path(&plugins_dir);
        let entries: Vec<RegistryEntry> = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            Vec::new()
        };
        let entries = entries
            .into_iter()
            .filter(|entry| entry.install_path.exists())
            .collect();
        Ok(Self { plugins_dir, entries })
    }

    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.plugins_dir)?;
        let text = serde_json::to_vec_pretty(&self.entries)?;
        std::fs::write(Self::registry_path(&self.plugins_dir), text)?;
        Ok(())
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn find(&self, plugin_id: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|entry| entry.plugin_id == plugin_id)
    }

    /// Extracts every entry of the archive `package` was opened from
    /// into `<plugins_dir>/<plugin_id>`, records it, and persists the
    /// registry. Replaces any prior entry for the same plugin id.
    pub fn install(&mut self, package: &PluginPackage, archive_bytes: &[u8]) -> Result<PathBuf> {
        let install_path = self.plugins_dir.join(&package.manifest.id);
        std::fs::create_dir_all(&install_path)?;

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(archive_bytes))
            .map_err(|e| Error::Package(PackageError::Corrupted(e.to_string())))?;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| Error::Package(PackageError::Corrupted(e.to_string())))?;
            let name = entry.name().to_string();
            let dest = install_path.join(&name);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            std::fs::write(&dest, buf)?;
        }

        self.entries.retain(|entry| entry.plugin_id != package.manifest.id);
        self.entries.push(RegistryEntry {
            plugin_id: package.manifest.id.clone(),
            version: package.manifest.version.clone(),
            install_path: install_path.clone(),
            installed_at: Utc::now(),
            package_hash: package.content_hash.clone(),
        });
        self.save()?;
        Ok(install_path)
    }

    /// Removes the installed directory and the registry entry. Returns
    /// `false` if the plugin id was not installed.
    pub fn uninstall(&mut self, plugin_id: &str) -> Result<bool> {
        let Some(pos) = self.entries.iter().position(|entry| entry.plugin_id == plugin_id) else {
            return Ok(false);
        };
        let entry = self.entries.remove(pos);
        if entry.install_path.exists() {
            std::fs::remove_dir_all(&entry.install_path)?;
        }
        self.save()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PluginManifest;
    use crate::package::PackageBuilder;

    fn sample_package_bytes() -> (Vec<u8>, PluginPackage) {
        let manifest = PluginManifest::new("com.x.greeter", "1.0.0", "Greeter", "X", "Greets");
        let (bytes, _hash) = PackageBuilder::new(manifest, "MIT")
            .with_asset("assets/icon.png", vec![9, 9, 9])
            .build()
            .unwrap();
        let package = PluginPackage::open(&bytes).unwrap();
        (bytes, package)
    }

    #[test]
    fn install_extracts_and_records_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = InstallationRegistry::load(dir.path()).unwrap();
        let (bytes, package) = sample_package_bytes();

        let install_path = registry.install(&package, &bytes).unwrap();
        assert!(install_path.join("manifest.json").exists());
        assert!(install_path.join("assets/icon.png").exists());
        assert_eq!(registry.entries().len(), 1);
        assert!(InstallationRegistry::registry_path(dir.path()).exists());
    }

    #[test]
    fn reloading_drops_entries_whose_path_vanished() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = InstallationRegistry::load(dir.path()).unwrap();
        let (bytes, package) = sample_package_bytes();
        let install_path = registry.install(&package, &bytes).unwrap();

        std::fs::remove_dir_all(&install_path).unwrap();
        let reloaded = InstallationRegistry::load(dir.path()).unwrap();
        assert!(reloaded.entries().is_empty());
    }

    #[test]
    fn uninstall_removes_directory_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = InstallationRegistry::load(dir.path()).unwrap();
        let (bytes, package) = sample_package_bytes();
        let install_path = registry.install(&package, &bytes).unwrap();

        assert!(registry.uninstall("com.x.greeter").unwrap());
        assert!(!install_path.exists());
        assert!(registry.entries().is_empty());
        assert!(!registry.uninstall("com.x.greeter").unwrap());
    }
}
