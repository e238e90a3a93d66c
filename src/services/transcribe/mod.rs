//! Ordered parallel page transcription.
//!
//! Pages are dispatched to the OCR engine on the blocking pool, at most
//! `workers` at a time. Each result lands in the slot of its page index, and
//! the output is assembled in one ascending pass after every dispatched call
//! has drained, so completion order never leaks into the text.

mod types;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::ocr::{OcrEngine, OcrError};

pub use types::{
    FailurePolicy, Page, PageFailure, PageText, TranscribeEvent, Transcript, PAGE_SEPARATOR,
};

type PageOutcome = (usize, std::result::Result<String, OcrError>);

/// Worker count derived from the available CPUs.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Runs pages through an OCR engine and reassembles them in order.
#[derive(Clone)]
pub struct Transcriber {
    engine: Arc<dyn OcrEngine>,
    language: String,
    workers: usize,
    policy: FailurePolicy,
    page_markers: bool,
}

impl Transcriber {
    pub fn new(engine: Arc<dyn OcrEngine>, language: impl Into<String>) -> Self {
        Self {
            engine,
            language: language.into(),
            workers: default_workers(),
            policy: FailurePolicy::default(),
            page_markers: false,
        }
    }

    /// Maximum concurrent OCR calls. Zero is treated as one.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Prefix each page with a `--- Page N ---` line.
    pub fn with_page_markers(mut self, enabled: bool) -> Self {
        self.page_markers = enabled;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Transcribe `pages` and join their text in index order.
    ///
    /// If a sender is given, its receiver must be drained while this runs:
    /// sends wait for channel capacity, so an undrained bounded channel
    /// stalls transcription. A closed receiver is ignored. Cancelling
    /// `cancel` stops new dispatches and returns [`Error::Cancelled`] with
    /// whatever finished.
    pub async fn transcribe(
        &self,
        pages: Vec<Page>,
        event_tx: Option<&mpsc::Sender<TranscribeEvent>>,
        cancel: &CancellationToken,
    ) -> Result<Transcript> {
        let total = pages.len();
        send_event(event_tx, TranscribeEvent::Started { total_pages: total }).await;

        if total == 0 {
            send_event(
                event_tx,
                TranscribeEvent::Finished {
                    succeeded: 0,
                    failed: 0,
                },
            )
            .await;
            return Ok(Transcript::empty());
        }

        tracing::info!(
            "Transcribing {} pages with {} (language: {}, workers: {})",
            total,
            self.engine.name(),
            self.language,
            self.workers
        );

        let numbers: Vec<u32> = pages.iter().map(|p| p.number).collect();
        let mut slots: Vec<Option<std::result::Result<String, OcrError>>> =
            (0..total).map(|_| None).collect();

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<PageOutcome> = JoinSet::new();
        let mut task_pages: HashMap<Id, usize> = HashMap::with_capacity(total);
        let mut cancelled = false;
        let mut saw_failure = false;
        // Raised by a worker before it releases its permit, so a failure is
        // visible to the next dispatch even if its task hasn't been joined.
        let failed = Arc::new(AtomicBool::new(false));

        for (index, page) in pages.into_iter().enumerate() {
            debug_assert_eq!(
                page.index, index,
                "page index must match its position in the input"
            );
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            while let Some(joined) = tasks.try_join_next_with_id() {
                if let Some(outcome) = unpack(joined, &task_pages) {
                    saw_failure |= store(&mut slots, &numbers, outcome, event_tx).await;
                }
            }

            saw_failure |= failed.load(Ordering::SeqCst);
            if saw_failure && self.policy == FailurePolicy::Abort {
                tracing::debug!("Page failure seen, not dispatching remaining pages");
                break;
            }

            let engine = Arc::clone(&self.engine);
            let language = self.language.clone();
            let failed = Arc::clone(&failed);
            let handle = tasks.spawn_blocking(move || {
                tracing::debug!("Processing page {}", page.number);
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    engine.recognize(&page.image, &language)
                }))
                .unwrap_or_else(|_| {
                    Err(OcrError::WorkerPanicked(format!(
                        "OCR engine panicked on page {}",
                        page.number
                    )))
                });
                if result.is_err() {
                    failed.store(true, Ordering::SeqCst);
                }
                drop(permit);
                (index, result)
            });
            task_pages.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            if let Some(outcome) = unpack(joined, &task_pages) {
                store(&mut slots, &numbers, outcome, event_tx).await;
            }
        }

        let completed = slots.iter().filter(|slot| slot.is_some()).count();
        let (transcript, first_failure) = assemble(slots, &numbers, self.page_markers);

        send_event(
            event_tx,
            TranscribeEvent::Finished {
                succeeded: transcript.pages.len(),
                failed: transcript.failures.len(),
            },
        )
        .await;

        if cancelled {
            return Err(Error::Cancelled {
                completed,
                total,
                partial: Box::new(transcript),
            });
        }

        if self.policy == FailurePolicy::Abort {
            if let Some((page, source)) = first_failure {
                return Err(Error::PageFailed { page, source });
            }
        }

        for failure in &transcript.failures {
            tracing::warn!(
                "Page {} omitted from output: {}",
                failure.number,
                failure.error
            );
        }

        Ok(transcript)
    }
}

/// Turn a finished task into `(index, result)`, mapping panics to errors.
fn unpack(
    joined: std::result::Result<(Id, PageOutcome), JoinError>,
    task_pages: &HashMap<Id, usize>,
) -> Option<PageOutcome> {
    match joined {
        Ok((_, outcome)) => Some(outcome),
        Err(e) => {
            let index = *task_pages.get(&e.id())?;
            Some((index, Err(OcrError::WorkerPanicked(e.to_string()))))
        }
    }
}

/// Write one page's result into its slot. Returns true if the page failed.
async fn store(
    slots: &mut [Option<std::result::Result<String, OcrError>>],
    numbers: &[u32],
    (index, result): PageOutcome,
    event_tx: Option<&mpsc::Sender<TranscribeEvent>>,
) -> bool {
    let page_number = numbers[index];
    let failed = result.is_err();

    let event = match &result {
        Ok(text) => {
            tracing::debug!("Page {} recognized ({} chars)", page_number, text.len());
            TranscribeEvent::PageCompleted {
                index,
                page_number,
                chars: text.chars().count(),
            }
        }
        Err(e) => {
            tracing::error!("Error processing page {}: {}", page_number, e);
            TranscribeEvent::PageFailed {
                index,
                page_number,
                error: e.to_string(),
            }
        }
    };

    debug_assert!(slots[index].is_none(), "page slot written twice");
    slots[index] = Some(result);
    send_event(event_tx, event).await;
    failed
}

/// Build the transcript in ascending index order.
///
/// Also hands back the lowest-index failure for the abort policy.
fn assemble(
    slots: Vec<Option<std::result::Result<String, OcrError>>>,
    numbers: &[u32],
    page_markers: bool,
) -> (Transcript, Option<(u32, OcrError)>) {
    let total_pages = slots.len();
    let mut pages = Vec::new();
    let mut failures = Vec::new();
    let mut first_failure = None;

    for (index, slot) in slots.into_iter().enumerate() {
        let number = numbers[index];
        match slot {
            Some(Ok(text)) => pages.push(PageText {
                index,
                number,
                text,
            }),
            Some(Err(e)) => {
                failures.push(PageFailure {
                    index,
                    number,
                    error: e.to_string(),
                });
                if first_failure.is_none() {
                    first_failure = Some((number, e));
                }
            }
            None => {}
        }
    }

    let text = pages
        .iter()
        .map(|page| {
            if page_markers {
                format!("--- Page {} ---\n{}", page.number, page.text)
            } else {
                page.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR);

    (
        Transcript {
            text,
            pages,
            failures,
            total_pages,
        },
        first_failure,
    )
}

/// Waits for channel capacity; a closed receiver is ignored.
async fn send_event(event_tx: Option<&mpsc::Sender<TranscribeEvent>>, event: TranscribeEvent) {
    if let Some(tx) = event_tx {
        let _ = tx.send(event).await;
    }
}
