//! Transcription types and events.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Separator placed between page texts in the output.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// A rasterized page waiting for OCR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Zero-based position in the transcription sequence.
    pub index: usize,
    /// 1-based page number in the source document.
    pub number: u32,
    /// Rendered page image.
    pub image: PathBuf,
}

impl Page {
    pub fn new(index: usize, number: u32, image: impl Into<PathBuf>) -> Self {
        Self {
            index,
            number,
            image: image.into(),
        }
    }

    /// Build pages numbered in sequence from a list of images.
    pub fn sequence<I, P>(images: I) -> Vec<Page>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        images
            .into_iter()
            .enumerate()
            .map(|(index, image)| Page::new(index, index as u32 + 1, image))
            .collect()
    }
}

/// What to do when a page fails OCR.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Keep going; omit failed pages from the text and report them.
    #[default]
    Skip,
    /// Stop dispatching after the first failure and fail the whole run.
    Abort,
}

/// Recognized text of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub index: usize,
    pub number: u32,
    pub text: String,
}

/// A page whose OCR call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFailure {
    pub index: usize,
    pub number: u32,
    pub error: String,
}

/// Ordered output of a transcription run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    /// Page texts joined in page order.
    pub text: String,
    /// Successful pages, ascending by index.
    pub pages: Vec<PageText>,
    /// Failed pages, ascending by index.
    pub failures: Vec<PageFailure>,
    /// Number of pages submitted.
    pub total_pages: usize,
}

impl Transcript {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every submitted page produced text.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.pages.len() == self.total_pages
    }
}

/// Events emitted while pages are being transcribed.
///
/// Page events arrive in completion order, not page order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscribeEvent {
    /// Transcription started
    Started { total_pages: usize },
    /// A page was recognized
    PageCompleted {
        index: usize,
        page_number: u32,
        chars: usize,
    },
    /// A page's OCR call failed
    PageFailed {
        index: usize,
        page_number: u32,
        error: String,
    },
    /// All dispatched pages have finished
    Finished { succeeded: usize, failed: usize },
}
