//! Tesseract OCR engine.
//!
//! Runs the Tesseract command-line binary once per page image.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::backend::{handle_cmd_output, OcrEngine, OcrError};

/// Tesseract OCR engine bound to a located binary.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
}

impl TesseractEngine {
    /// Create an engine that runs the given tesseract binary.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Path of the binary this engine runs.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// List the language packs Tesseract reports as installed.
    pub fn available_languages(&self) -> Result<Vec<String>, OcrError> {
        let output = Command::new(&self.binary).arg("--list-langs").output();
        let stdout = handle_cmd_output(output, "tesseract")?;
        Ok(parse_language_list(&stdout))
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image_path: &Path, language: &str) -> Result<String, OcrError> {
        tracing::debug!(
            "Running {} on {} (-l {})",
            self.binary.display(),
            image_path.display(),
            language
        );
        let output = Command::new(&self.binary)
            .arg(image_path)
            .arg("stdout")
            .args(["-l", language])
            .output();

        let text = handle_cmd_output(output, "tesseract")?;
        Ok(clean_page_text(&text))
    }
}

/// Strip the form feed and trailing whitespace tesseract appends to each page.
pub fn clean_page_text(raw: &str) -> String {
    raw.trim_end_matches(|c: char| c == '\u{c}' || c.is_whitespace())
        .to_string()
}

/// Parse `tesseract --list-langs` output.
///
/// The first line is a header like
/// `List of available languages in "/usr/share/tessdata/" (3):`.
pub fn parse_language_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}
