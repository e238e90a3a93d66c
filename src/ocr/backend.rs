//! OCR engine abstraction.
//!
//! The transcriber only needs "image + language in, text out", so any engine
//! that can do that (Tesseract, a stub in tests) plugs in through
//! [`OcrEngine`].

use std::path::Path;

use thiserror::Error;

/// Errors from a single OCR invocation.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),

    #[error("OCR engine failed: {0}")]
    EngineFailed(String),

    #[error("OCR worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An OCR engine that turns one page image into text.
pub trait OcrEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Recognize the text in an image file.
    ///
    /// `language` is passed through to the engine untouched.
    fn recognize(&self, image_path: &Path, language: &str) -> Result<String, OcrError>;
}

/// Decode process output and surface stderr on failure.
pub(crate) fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
) -> Result<String, OcrError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(OcrError::EngineFailed(format!(
                    "{} exited with {}: {}",
                    tool_name,
                    output.status,
                    stderr.trim()
                )))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::EngineUnavailable(
            format!("{} not found (install tesseract-ocr)", tool_name),
        )),
        Err(e) => Err(OcrError::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_maps_to_unavailable() {
        let result = std::process::Command::new("definitely-not-a-real-ocr-binary").output();
        let err = handle_cmd_output(result, "definitely-not-a-real-ocr-binary").unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable(_)));
    }
}
