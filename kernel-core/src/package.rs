//! `.icplugin` package archives: opening, building, content hashing.
//!
//! Not directly grounded in the teacher (the Lion plugin system ships
//! plugins as directories plus a TOML manifest, never an archive
//! format); sourced from the broader ecosystem's standard archive
//! handling (`zip`, `sha2`) the way the corpus reaches for dedicated
//! crates for dedicated concerns elsewhere.

use std::io::{Cursor, Read};

use sha2::{Digest, Sha256};

use crate::error::{PackageError, Result};
use crate::manifest::PluginManifest;

pub const MAX_PACKAGE_BYTES: u64 = 50 * 1024 * 1024;

const FORBIDDEN_EXTENSIONS: &[&str] = &[
    "exe", "bat", "cmd", "ps1", "vbs", "js", "msi", "msp", "com", "scr", "pif",
];

/// A parsed, validated `.icplugin` package.
#[derive(Debug, Clone)]
pub struct PluginPackage {
    pub manifest: PluginManifest,
    pub license_text: String,
    pub signature: Option<Vec<u8>>,
    pub asset_paths: Vec<String>,
    pub content_hash: String,
}

impl PluginPackage {
    /// Open and validate an in-memory `.icplugin` archive.
    pub fn open(bytes: &[u8]) -> Result<Self> {
        if bytes.len() as u64 > MAX_PACKAGE_BYTES {
            return Err(PackageError::TooLarge(bytes.len() as u64).into());
        }

        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            hex_encode(&hasher.finalize())
        };

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| PackageError::Corrupted(e.to_string()))?;

        let mut manifest_bytes = None;
        let mut license_text = None;
        let mut signature = None;
        let mut asset_paths = Vec::new();

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| PackageError::Corrupted(e.to_string()))?;
            let name = entry.name().to_string();

            if let Some(ext) = name.rsplit('.').next() {
                if FORBIDDEN_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                    return Err(PackageError::ForbiddenFile(name).into());
                }
            }

            let mut buf = Vec::new();
            entry
                .read_to_end(&mut buf)
                .map_err(|e| PackageError::Corrupted(e.to_string()))?;

            match name.as_str() {
                "manifest.json" => manifest_bytes = Some(buf),
                "LICENSE" => license_text = Some(String::from_utf8_lossy(&buf).into_owned()),
                "SIGNATURE" => signature = Some(buf),
                other if other.starts_with("assets/") => asset_paths.push(other.to_string()),
                _ => {}
            }
        }

        let manifest_bytes =
            manifest_bytes.ok_or(PackageError::MissingEntry("manifest.json"))?;
        let license_text = license_text.ok_or(PackageError::MissingEntry("LICENSE"))?;

        let manifest: PluginManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| PackageError::Corrupted(format!("manifest.json: {e}")))?;
        let report = manifest.validate();
        if !report.is_valid() {
            return Err(PackageError::InvalidManifest(
                report.errors.into_iter().next().expect("non-empty"),
            )
            .into());
        }

        Ok(Self {
            manifest,
            license_text,
            signature,
            asset_paths,
            content_hash,
        })
    }
}

/// Builds a `.icplugin` archive from its constituent parts — the
/// inverse of [`PluginPackage::open`].
pub struct PackageBuilder {
    manifest: PluginManifest,
    license_text: String,
    signature: Option<Vec<u8>>,
    assets: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new(manifest: PluginManifest, license_text: impl Into<String>) -> Self {
        Self {
            manifest,
            license_text: license_text.into(),
            signature: None,
            assets: Vec::new(),
        }
    }

    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_asset(mut self, path: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.assets.push((path.into(), bytes));
        self
    }

    /// Build the archive bytes and the content hash those bytes hash to.
    pub fn build(&self) -> Result<(Vec<u8>, String)> {
        let report = self.manifest.validate();
        if !report.is_valid() {
            return Err(PackageError::InvalidManifest(
                report.errors.into_iter().next().expect("non-empty"),
            )
            .into());
        }

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::FileOptions::default();

            writer
                .start_file("manifest.json", options)
                .map_err(|e| PackageError::Corrupted(e.to_string()))?;
            let manifest_json = serde_json::to_vec_pretty(&self.manifest)?;
            std::io::Write::write_all(&mut writer, &manifest_json)?;

            writer
                .start_file("LICENSE", options)
                .map_err(|e| PackageError::Corrupted(e.to_string()))?;
            std::io::Write::write_all(&mut writer, self.license_text.as_bytes())?;

            if let Some(signature) = &self.signature {
                writer
                    .start_file("SIGNATURE", options)
                    .map_err(|e| PackageError::Corrupted(e.to_string()))?;
                std::io::Write::write_all(&mut writer, signature)?;
            }

            for (path, bytes) in &self.assets {
                writer
                    .start_file(path, options)
                    .map_err(|e| PackageError::Corrupted(e.to_string()))?;
                std::io::Write::write_all(&mut writer, bytes)?;
            }

            writer
                .finish()
                .map_err(|e| PackageError::Corrupted(e.to_string()))?;
        }

        let bytes = buffer.into_inner();
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            hex_encode(&hasher.finalize())
        };
        Ok((bytes, content_hash))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
