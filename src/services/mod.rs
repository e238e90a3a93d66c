//! Extraction services.
//!
//! Separated from UI concerns; progress goes out as [`TranscribeEvent`]s.

pub mod extract;
pub mod transcribe;

pub use extract::{process_pdf, process_pdf_with, write_output, Extractor};
pub use transcribe::{
    default_workers, FailurePolicy, Page, PageFailure, PageText, TranscribeEvent, Transcriber,
    Transcript, PAGE_SEPARATOR,
};
