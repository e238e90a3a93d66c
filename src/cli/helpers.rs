//! Shared helper functions for CLI commands.

use std::path::{Path, PathBuf};

use indicatif::ProgressStyle;

/// Progress bar style shared by long-running commands.
pub fn progress_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░")
}

/// Output file used when none is given: the input with a `.txt` extension.
pub fn default_output_path(pdf: &Path) -> PathBuf {
    pdf.with_extension("txt")
}

/// Find the sample PDF used when no input is given.
///
/// Relative paths are tried in the working directory, then next to the
/// executable.
pub fn locate_sample(sample: &Path, exe_dir: Option<&Path>) -> Option<PathBuf> {
    if sample.is_file() {
        return Some(sample.to_path_buf());
    }
    if sample.is_absolute() {
        return None;
    }
    exe_dir.map(|dir| dir.join(sample)).filter(|p| p.is_file())
}

/// Manual install steps for the external tools on `os`
/// (a `std::env::consts::OS` value).
pub fn install_instructions(os: &str) -> Vec<&'static str> {
    match os {
        "linux" => vec![
            "For Linux (Ubuntu/Debian):",
            "1. Install Tesseract OCR with Bengali data:",
            "   sudo apt-get update",
            "   sudo apt-get install tesseract-ocr tesseract-ocr-ben",
            "2. Install Poppler utils:",
            "   sudo apt-get install poppler-utils",
        ],
        "macos" => vec![
            "For macOS (Homebrew):",
            "1. Install Tesseract OCR with language data:",
            "   brew install tesseract tesseract-lang",
            "2. Install Poppler:",
            "   brew install poppler",
        ],
        "windows" => vec![
            "For Windows:",
            "1. Install Tesseract OCR:",
            "   - Download the installer from https://github.com/UB-Mannheim/tesseract/wiki",
            "   - Select Bengali under additional language data, and add Tesseract to your PATH",
            "2. Install Poppler:",
            "   - Download a release from https://github.com/oschwartz10612/poppler-windows/releases",
            "   - Extract it to C:\\Program Files\\poppler",
            "   - Add C:\\Program Files\\poppler\\Library\\bin to your PATH (or set POPPLER_PATH)",
            "3. Restart your terminal after changing PATH",
        ],
        _ => vec![
            "Install tesseract (with Bengali traineddata) and Poppler's pdftoppm using your system's package manager.",
        ],
    }
}
