//! Configuration for the OCR pipeline.
//!
//! Values come from three layers, later ones winning:
//! 1. Built-in defaults
//! 2. A config file (`--config`, `./bangla-ocr.toml`, or
//!    `<config dir>/bangla-ocr/config.toml`)
//! 3. Environment variables (`TESSERACT_PATH`, `OCR_LANGUAGE`, ...)
//!
//! The environment is read once here. Nothing downstream looks at it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ocr::DEFAULT_DPI;
use crate::services::{default_workers, FailurePolicy};

/// Config file name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "bangla-ocr.toml";

/// Directory under the user config dir holding `config.toml`.
pub const CONFIG_DIR_NAME: &str = "bangla-ocr";

/// Tesseract language used when nothing else is configured.
pub const DEFAULT_LANGUAGE: &str = "ben";

/// PDF transcribed when the CLI is run without an input.
pub const DEFAULT_SAMPLE_PDF: &str = "data/Freedom Fight.pdf";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tesseract language tag, e.g. `ben` or `ben+eng`.
    pub language: String,
    /// Tesseract binary (or its directory).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tesseract_path: Option<PathBuf>,
    /// Directory containing Poppler's `pdftoppm`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poppler_path: Option<PathBuf>,
    /// Extra tessdata directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tessdata_prefix: Option<PathBuf>,
    /// Concurrent OCR calls; defaults to the CPU count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Rasterization resolution.
    pub dpi: u32,
    /// Input used when none is given on the command line.
    pub default_pdf: PathBuf,
    /// Prefix each page's text with `--- Page N ---`.
    pub page_markers: bool,
    pub failure_policy: FailurePolicy,

    /// File this config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            tesseract_path: None,
            poppler_path: None,
            tessdata_prefix: None,
            workers: None,
            dpi: DEFAULT_DPI,
            default_pdf: PathBuf::from(DEFAULT_SAMPLE_PDF),
            page_markers: false,
            failure_policy: FailurePolicy::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load from `explicit` or the first discovered config file, then apply
    /// the process environment.
    ///
    /// An explicit file that can't be read is an error; a missing discovered
    /// file just means defaults.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config = match explicit {
            Some(path) => Self::load_from_path(path).await?,
            None => match Self::discover() {
                Some(path) => Self::load_from_path(&path).await?,
                None => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.with_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// First existing config file in the standard locations.
    pub fn discover() -> Option<PathBuf> {
        Self::candidate_paths().into_iter().find(|p| p.is_file())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(CONFIG_DIR_NAME).join("config.toml"));
        }
        candidates
    }

    /// Load a config file, choosing the format from its extension.
    ///
    /// Relative paths inside the file are resolved against its directory.
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

        let mut config: Config = match ext {
            "json" => serde_json::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse YAML config: {}", e)))?,
            _ => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e)))?,
        };

        tracing::debug!("Loaded config from {}", path.display());
        config.source_path = Some(path.to_path_buf());

        if let Some(base_dir) = config.base_dir() {
            config.tesseract_path = config
                .tesseract_path
                .map(|p| resolve_path(&p, &base_dir));
            config.poppler_path = config.poppler_path.map(|p| resolve_path(&p, &base_dir));
            config.tessdata_prefix = config
                .tessdata_prefix
                .map(|p| resolve_path(&p, &base_dir));
        }

        Ok(config)
    }

    /// Directory of the config file, if loaded from one.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Empty values are ignored. Unparseable numbers are an error rather than
    /// being silently dropped.
    pub fn with_env_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = get("TESSERACT_PATH") {
            self.tesseract_path = Some(expand(&path));
        }
        if let Some(path) = get("POPPLER_PATH") {
            self.poppler_path = Some(expand(&path));
        }
        if let Some(path) = get("TESSDATA_PREFIX") {
            self.tessdata_prefix = Some(expand(&path));
        }
        if let Some(language) = get("OCR_LANGUAGE") {
            self.language = language.trim().to_string();
        }
        if let Some(path) = get("OCR_DEFAULT_PDF") {
            self.default_pdf = expand(&path);
        }
        if let Some(raw) = get("OCR_WORKERS") {
            self.workers = Some(parse_number("OCR_WORKERS", &raw)?);
        }
        if let Some(raw) = get("OCR_DPI") {
            self.dpi = parse_number("OCR_DPI", &raw)?;
        }

        Ok(self)
    }

    /// Worker limit, falling back to the CPU count. Never zero.
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers).max(1)
    }
}

/// Expand `~` and resolve relative paths against `base_dir`.
pub fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
    let expanded = expand(&path.to_string_lossy());
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw.trim()).into_owned())
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a positive number, got '{}'", key, raw)))
}
