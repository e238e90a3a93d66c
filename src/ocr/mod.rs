//! External tool integration.
//!
//! - `locator`: finds tesseract and Poppler binaries
//! - `pdf`: renders PDF pages to PNG with pdftoppm
//! - `backend`: the [`OcrEngine`] trait the transcriber runs pages through
//! - `tesseract`: Tesseract command-line engine

mod backend;
pub mod locator;
pub mod pdf;
mod tesseract;

pub use backend::{OcrEngine, OcrError};
pub use locator::{LocatorConfig, ToolLocator, ToolPaths, ToolStatus};
pub use pdf::{PageSelection, PdfRasterizer, DEFAULT_DPI};
pub use tesseract::{clean_page_text, parse_language_list, TesseractEngine};
