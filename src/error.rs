//! Crate-wide error type.

use std::path::PathBuf;

use thiserror::Error;

use crate::ocr::OcrError;
use crate::services::Transcript;

/// External programs the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Tesseract OCR engine.
    Tesseract,
    /// Poppler's PDF rasterizer.
    Pdftoppm,
    /// Poppler's PDF metadata reader (optional).
    Pdfinfo,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Tesseract => "tesseract",
            Tool::Pdftoppm => "pdftoppm",
            Tool::Pdfinfo => "pdfinfo",
        }
    }

    /// Package that ships this tool on common systems.
    pub fn package_hint(&self) -> &'static str {
        match self {
            Tool::Tesseract => "install tesseract-ocr",
            Tool::Pdftoppm | Tool::Pdfinfo => "install poppler-utils",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors from PDF text extraction.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{tool} not found: {hint}")]
    DependencyMissing { tool: Tool, hint: String },

    #[error("Input PDF not found: {}", .0.display())]
    InputMissing(PathBuf),

    #[error("Input is not a readable PDF: {}: {reason}", .path.display())]
    InputInvalid { path: PathBuf, reason: String },

    #[error("PDF has no pages: {}", .0.display())]
    EmptyDocument(PathBuf),

    #[error("OCR failed on page {page}: {source}")]
    PageFailed {
        /// 1-based page number in the source document.
        page: u32,
        #[source]
        source: OcrError,
    },

    #[error("Transcription cancelled after {completed} of {total} pages")]
    Cancelled {
        completed: usize,
        total: usize,
        partial: Box<Transcript>,
    },

    /// The text was extracted but could not be saved. It is carried here so
    /// callers don't lose the work.
    #[error("Failed to write output to {}: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        text: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was raised before any page reached the OCR engine.
    pub fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            Error::DependencyMissing { .. }
                | Error::InputMissing(_)
                | Error::InputInvalid { .. }
                | Error::EmptyDocument(_)
                | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
