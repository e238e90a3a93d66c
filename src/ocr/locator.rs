//! Discovery of the external tools the pipeline shells out to.
//!
//! Lookup order for each tool:
//! 1. Explicit path from configuration (`TESSERACT_PATH`, `POPPLER_PATH`)
//! 2. The `PATH` search list
//! 3. Well-known install directories
//!
//! The locator only reads the values handed to it in [`LocatorConfig`], so
//! tests can point it at an empty world.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result, Tool};

/// Inputs for tool discovery.
#[derive(Debug, Clone, Default)]
pub struct LocatorConfig {
    /// Explicit tesseract binary (or a directory containing it).
    pub tesseract: Option<PathBuf>,
    /// Explicit directory containing Poppler's `pdftoppm`.
    pub poppler_dir: Option<PathBuf>,
    /// Value in `PATH` format to search.
    pub search_path: Option<OsString>,
    /// Extra directories checked after the search path.
    pub common_dirs: Vec<PathBuf>,
    /// Additional tessdata directory (`TESSDATA_PREFIX`).
    pub tessdata_prefix: Option<PathBuf>,
}

impl LocatorConfig {
    /// Build from application config plus the process `PATH`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            tesseract: config.tesseract_path.clone(),
            poppler_dir: config.poppler_path.clone(),
            search_path: std::env::var_os("PATH"),
            common_dirs: default_common_dirs(),
            tessdata_prefix: config.tessdata_prefix.clone(),
        }
    }

    /// A locator input that searches nowhere.
    pub fn isolated() -> Self {
        Self::default()
    }
}

/// Well-known install locations on Linux, macOS and Windows.
pub fn default_common_dirs() -> Vec<PathBuf> {
    let mut dirs_list: Vec<PathBuf> = Vec::new();

    if cfg!(windows) {
        let program_files = std::env::var_os("ProgramFiles")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("C:/Program Files"));
        let program_files_x86 = std::env::var_os("ProgramFiles(x86)")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("C:/Program Files (x86)"));
        dirs_list.push(program_files.join("Tesseract-OCR"));
        dirs_list.push(program_files_x86.join("Tesseract-OCR"));
        dirs_list.push(program_files.join("poppler").join("Library").join("bin"));
        dirs_list.push(PathBuf::from(
            "C:/Program Files/poppler/poppler-24.08.0/Library/bin",
        ));
        dirs_list.push(program_files);
        dirs_list.push(program_files_x86);
    } else {
        for dir in [
            "/usr/bin",
            "/usr/local/bin",
            "/opt/homebrew/bin",
            "/opt/local/bin",
            "/snap/bin",
            "/opt",
        ] {
            dirs_list.push(PathBuf::from(dir));
        }
    }

    if let Some(home) = dirs::home_dir() {
        dirs_list.push(home.join(".local").join("bin"));
        dirs_list.push(home.join("Downloads"));
    }

    dirs_list
}

/// Resolved locations of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub tesseract: PathBuf,
    pub pdftoppm: PathBuf,
    /// Used to validate page counts up front; optional.
    pub pdfinfo: Option<PathBuf>,
}

impl ToolPaths {
    /// Directory holding the Poppler binaries.
    pub fn poppler_dir(&self) -> Option<&Path> {
        self.pdftoppm.parent()
    }
}

/// Availability of one tool, for the `check` command.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub tool: Tool,
    pub path: Option<PathBuf>,
    pub required: bool,
}

/// Finds tesseract and Poppler binaries.
#[derive(Debug, Clone)]
pub struct ToolLocator {
    config: LocatorConfig,
}

impl ToolLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    /// Search the configured `PATH` list and well-known directories.
    pub fn find_program(&self, program: &str) -> Option<PathBuf> {
        debug!("Searching for {}", program);

        if let Some(ref search_path) = self.config.search_path {
            for dir in std::env::split_paths(search_path) {
                if let Some(found) = find_in_dir(program, &dir) {
                    info!("Found {} in PATH: {}", program, found.display());
                    return Some(found);
                }
            }
        }

        for dir in &self.config.common_dirs {
            if let Some(found) = find_in_dir(program, dir) {
                info!("Found {} in common directory: {}", program, found.display());
                return Some(found);
            }
        }

        debug!("{} not found", program);
        None
    }

    /// Locate the tesseract binary.
    pub fn find_tesseract(&self) -> Result<PathBuf> {
        if let Some(ref explicit) = self.config.tesseract {
            if explicit.is_file() {
                return Ok(explicit.clone());
            }
            if explicit.is_dir() {
                if let Some(found) = find_in_dir(Tool::Tesseract.as_str(), explicit) {
                    return Ok(found);
                }
            }
            return Err(Error::DependencyMissing {
                tool: Tool::Tesseract,
                hint: format!(
                    "TESSERACT_PATH is set to {}, which is not a tesseract binary",
                    explicit.display()
                ),
            });
        }

        self.find_program(Tool::Tesseract.as_str())
            .ok_or_else(|| Error::DependencyMissing {
                tool: Tool::Tesseract,
                hint: format!(
                    "{}, make sure it's in your PATH, or set TESSERACT_PATH",
                    Tool::Tesseract.package_hint()
                ),
            })
    }

    /// Locate Poppler's `pdftoppm`.
    pub fn find_pdftoppm(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.config.poppler_dir {
            return find_in_dir(Tool::Pdftoppm.as_str(), dir).ok_or_else(|| {
                Error::DependencyMissing {
                    tool: Tool::Pdftoppm,
                    hint: format!(
                        "POPPLER_PATH is set to {}, which does not contain pdftoppm",
                        dir.display()
                    ),
                }
            });
        }

        self.find_program(Tool::Pdftoppm.as_str())
            .ok_or_else(|| Error::DependencyMissing {
                tool: Tool::Pdftoppm,
                hint: format!(
                    "{}, make sure it's in your PATH, or set POPPLER_PATH",
                    Tool::Pdftoppm.package_hint()
                ),
            })
    }

    /// Locate `pdfinfo`, preferring the directory `pdftoppm` lives in.
    pub fn find_pdfinfo(&self, pdftoppm: &Path) -> Option<PathBuf> {
        pdftoppm
            .parent()
            .and_then(|dir| find_in_dir(Tool::Pdfinfo.as_str(), dir))
            .or_else(|| self.find_program(Tool::Pdfinfo.as_str()))
    }

    /// Resolve every tool, failing on the first required one that is missing.
    pub fn locate(&self) -> Result<ToolPaths> {
        let tesseract = self.find_tesseract()?;
        let pdftoppm = self.find_pdftoppm()?;
        let pdfinfo = self.find_pdfinfo(&pdftoppm);
        if pdfinfo.is_none() {
            warn!("pdfinfo not found; page counts will not be checked before rasterizing");
        }

        Ok(ToolPaths {
            tesseract,
            pdftoppm,
            pdfinfo,
        })
    }

    /// Report availability of every tool without failing.
    pub fn check_tools(&self) -> Vec<ToolStatus> {
        let tesseract = self.find_tesseract().ok();
        let pdftoppm = self.find_pdftoppm().ok();
        let pdfinfo = pdftoppm
            .as_deref()
            .and_then(|p| self.find_pdfinfo(p))
            .or_else(|| self.find_program(Tool::Pdfinfo.as_str()));

        vec![
            ToolStatus {
                tool: Tool::Tesseract,
                path: tesseract,
                required: true,
            },
            ToolStatus {
                tool: Tool::Pdftoppm,
                path: pdftoppm,
                required: true,
            },
            ToolStatus {
                tool: Tool::Pdfinfo,
                path: pdfinfo,
                required: false,
            },
        ]
    }

    /// Candidate tessdata directories, in search order.
    pub fn tessdata_dirs(&self, tesseract: Option<&Path>) -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = Vec::new();

        if let Some(ref prefix) = self.config.tessdata_prefix {
            candidates.push(prefix.clone());
            candidates.push(prefix.join("tessdata"));
        }
        if let Some(dir) = tesseract.and_then(Path::parent) {
            candidates.push(dir.join("tessdata"));
            if let Some(up) = dir.parent() {
                candidates.push(up.join("share").join("tessdata"));
            }
        }
        for dir in [
            "/usr/share/tesseract-ocr/5/tessdata",
            "/usr/share/tesseract-ocr/4.00/tessdata",
            "/usr/share/tessdata",
            "/usr/local/share/tessdata",
            "/opt/homebrew/share/tessdata",
        ] {
            candidates.push(PathBuf::from(dir));
        }
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".local").join("share").join("tessdata"));
        }

        candidates
    }

    /// Find `<language>.traineddata`.
    pub fn find_traineddata(&self, tesseract: Option<&Path>, language: &str) -> Option<PathBuf> {
        let filename = format!("{}.traineddata", language);
        let found = self
            .tessdata_dirs(tesseract)
            .into_iter()
            .map(|dir| dir.join(&filename))
            .find(|path| path.is_file());

        match found {
            Some(ref path) => info!("Found {} traineddata at: {}", language, path.display()),
            None => warn!("{} traineddata not found", language),
        }
        found
    }
}

/// Look for an executable named `program` directly inside `dir`.
fn find_in_dir(program: &str, dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    which::which_in(program, Some(dir.as_os_str()), dir).ok()
}
