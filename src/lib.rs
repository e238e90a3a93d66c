//! Bangla OCR - text extraction from scanned Bengali PDFs.
//!
//! Pages are rendered with Poppler's `pdftoppm`, recognized with Tesseract,
//! and joined back together in page order. Most callers want
//! [`process_pdf`]; [`services::Extractor`] exposes the same pipeline with
//! explicit configuration, progress events and cancellation.

pub mod cli;
pub mod config;
pub mod error;
pub mod ocr;
pub mod services;

pub use config::Config;
pub use error::{Error, Result, Tool};
pub use services::{process_pdf, process_pdf_with};
