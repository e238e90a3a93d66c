//! Ordering, failure and concurrency behavior of the page transcriber,
//! driven through stub OCR engines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bangla_ocr::ocr::{OcrEngine, OcrError};
use bangla_ocr::services::{FailurePolicy, Page, TranscribeEvent, Transcriber};
use bangla_ocr::Error;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Returns the image file's contents as its text.
///
/// Optional per-image delays let tests force completion out of page order,
/// and every call is counted so the concurrency bound can be checked.
#[derive(Default)]
struct EchoEngine {
    delays: HashMap<PathBuf, Duration>,
    failing: Vec<PathBuf>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    cancel_on_first_call: Option<CancellationToken>,
}

impl OcrEngine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    fn recognize(&self, image_path: &Path, _language: &str) -> Result<String, OcrError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if call == 0 {
            if let Some(ref token) = self.cancel_on_first_call {
                token.cancel();
            }
        }

        if let Some(delay) = self.delays.get(image_path) {
            std::thread::sleep(*delay);
        }

        let result = if self.failing.iter().any(|p| p == image_path) {
            Err(OcrError::EngineFailed("unreadable scan".to_string()))
        } else {
            std::fs::read_to_string(image_path).map_err(OcrError::from)
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Write one fake page image per text and return the pages in order.
fn write_pages(dir: &Path, texts: &[&str]) -> Vec<Page> {
    let images: Vec<PathBuf> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let path = dir.join(format!("page-{}.png", i + 1));
            std::fs::write(&path, text).unwrap();
            path
        })
        .collect();
    Page::sequence(images)
}

/// Earlier pages take longer, so they finish last.
fn reverse_delays(pages: &[Page], step_ms: u64) -> HashMap<PathBuf, Duration> {
    let total = pages.len() as u64;
    pages
        .iter()
        .map(|p| {
            let delay = Duration::from_millis((total - p.index as u64) * step_ms);
            (p.image.clone(), delay)
        })
        .collect()
}

async fn collect_events(mut rx: mpsc::Receiver<TranscribeEvent>) -> Vec<TranscribeEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bengali_pages_keep_page_order() {
    let temp = TempDir::new().unwrap();
    let pages = write_pages(temp.path(), &["রহমান", "বাংলা", "পরীক্ষা"]);
    let engine = EchoEngine {
        delays: reverse_delays(&pages, 60),
        ..Default::default()
    };

    let transcriber = Transcriber::new(Arc::new(engine), "ben").with_workers(3);
    let transcript = transcriber
        .transcribe(pages, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(transcript.text, "রহমান\n\nবাংলা\n\nপরীক্ষা");
    assert!(transcript.is_complete());
    let numbers: Vec<u32> = transcript.pages.iter().map(|p| p.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_count_does_not_change_output() {
    let temp = TempDir::new().unwrap();
    let texts: Vec<String> = (1..=12).map(|n| format!("পৃষ্ঠা {}", n)).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let pages = write_pages(temp.path(), &refs);
    let expected = refs.join("\n\n");

    for workers in [1, 8] {
        let engine = EchoEngine {
            delays: reverse_delays(&pages, 5),
            ..Default::default()
        };
        let transcriber = Transcriber::new(Arc::new(engine), "ben").with_workers(workers);
        let transcript = transcriber
            .transcribe(pages.clone(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(transcript.text, expected, "workers = {}", workers);
    }
}

#[tokio::test]
async fn repeated_runs_are_identical() {
    let temp = TempDir::new().unwrap();
    let pages = write_pages(temp.path(), &["এক", "দুই", "তিন", "চার"]);
    let transcriber = Transcriber::new(Arc::new(EchoEngine::default()), "ben").with_workers(4);

    let first = transcriber
        .transcribe(pages.clone(), None, &CancellationToken::new())
        .await
        .unwrap();
    let second = transcriber
        .transcribe(pages, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn in_flight_calls_never_exceed_worker_limit() {
    let temp = TempDir::new().unwrap();
    let texts: Vec<String> = (1..=16).map(|n| n.to_string()).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let pages = write_pages(temp.path(), &refs);
    let delays = pages
        .iter()
        .map(|p| (p.image.clone(), Duration::from_millis(20)))
        .collect();

    let engine = Arc::new(EchoEngine {
        delays,
        ..Default::default()
    });
    let transcriber = Transcriber::new(engine.clone(), "ben").with_workers(3);
    transcriber
        .transcribe(pages, None, &CancellationToken::new())
        .await
        .unwrap();

    let max = engine.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "saw {} concurrent OCR calls", max);
    assert!(max >= 1);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 16);
}

#[tokio::test]
async fn failed_page_is_skipped_and_recorded() {
    let temp = TempDir::new().unwrap();
    let pages = write_pages(temp.path(), &["p1", "p2", "p3", "p4", "p5"]);
    let engine = EchoEngine {
        failing: vec![pages[2].image.clone()],
        ..Default::default()
    };

    let (tx, rx) = mpsc::channel(32);
    let transcriber = Transcriber::new(Arc::new(engine), "ben").with_workers(2);
    let transcript = transcriber
        .transcribe(pages, Some(&tx), &CancellationToken::new())
        .await
        .unwrap();
    drop(tx);

    assert_eq!(transcript.text, "p1\n\np2\n\np4\n\np5");
    assert_eq!(transcript.total_pages, 5);
    assert_eq!(transcript.failures.len(), 1);
    assert_eq!(transcript.failures[0].index, 2);
    assert_eq!(transcript.failures[0].number, 3);
    assert!(transcript.failures[0].error.contains("unreadable scan"));
    assert!(!transcript.is_complete());

    let events = collect_events(rx).await;
    assert_eq!(events.first(), Some(&TranscribeEvent::Started { total_pages: 5 }));
    assert_eq!(
        events.last(),
        Some(&TranscribeEvent::Finished {
            succeeded: 4,
            failed: 1
        })
    );
    let page_events = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                TranscribeEvent::PageCompleted { .. } | TranscribeEvent::PageFailed { .. }
            )
        })
        .count();
    assert_eq!(page_events, 5);
    assert!(events.iter().any(|e| matches!(
        e,
        TranscribeEvent::PageFailed { page_number: 3, .. }
    )));
}

#[tokio::test]
async fn abort_policy_reports_failed_page() {
    let temp = TempDir::new().unwrap();
    let pages = write_pages(temp.path(), &["p1", "p2", "p3", "p4", "p5"]);

    for workers in [1, 4] {
        let engine = EchoEngine {
            failing: vec![pages[2].image.clone()],
            ..Default::default()
        };
        let transcriber = Transcriber::new(Arc::new(engine), "ben")
            .with_workers(workers)
            .with_policy(FailurePolicy::Abort);

        match transcriber
            .transcribe(pages.clone(), None, &CancellationToken::new())
            .await
        {
            Err(Error::PageFailed { page, source }) => {
                assert_eq!(page, 3);
                assert!(matches!(source, OcrError::EngineFailed(_)));
            }
            other => panic!("expected PageFailed, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn cancelled_before_start_processes_nothing() {
    let temp = TempDir::new().unwrap();
    let pages = write_pages(temp.path(), &["এক", "দুই", "তিন"]);
    let engine = Arc::new(EchoEngine::default());
    let transcriber = Transcriber::new(engine.clone(), "ben").with_workers(2);

    let cancel = CancellationToken::new();
    cancel.cancel();

    match transcriber.transcribe(pages, None, &cancel).await {
        Err(Error::Cancelled {
            completed,
            total,
            partial,
        }) => {
            assert_eq!(completed, 0);
            assert_eq!(total, 3);
            assert_eq!(partial.text, "");
        }
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_mid_run_keeps_finished_pages() {
    let temp = TempDir::new().unwrap();
    let pages = write_pages(temp.path(), &["এক", "দুই", "তিন", "চার"]);
    let cancel = CancellationToken::new();
    let engine = Arc::new(EchoEngine {
        cancel_on_first_call: Some(cancel.clone()),
        ..Default::default()
    });
    let transcriber = Transcriber::new(engine.clone(), "ben").with_workers(1);

    match transcriber.transcribe(pages, None, &cancel).await {
        Err(Error::Cancelled {
            completed,
            total,
            partial,
        }) => {
            assert_eq!(total, 4);
            assert_eq!(completed, 1);
            assert_eq!(partial.text, "এক");
        }
        other => panic!("expected Cancelled, got {:?}", other),
    }
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn page_markers_use_document_page_numbers() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("a.png"), "সাত").unwrap();
    std::fs::write(temp.path().join("b.png"), "নয়").unwrap();
    let pages = vec![
        Page::new(0, 7, temp.path().join("a.png")),
        Page::new(1, 9, temp.path().join("b.png")),
    ];

    let transcriber = Transcriber::new(Arc::new(EchoEngine::default()), "ben")
        .with_workers(2)
        .with_page_markers(true);
    let transcript = transcriber
        .transcribe(pages, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        transcript.text,
        "--- Page 7 ---\nসাত\n\n--- Page 9 ---\nনয়"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abort_stops_dispatch_right_after_a_failure() {
    let temp = TempDir::new().unwrap();
    let pages = write_pages(temp.path(), &["p1", "p2", "p3", "p4", "p5"]);

    for (failing_index, expected_calls) in [(0, 1), (1, 2)] {
        for run in 0..200 {
            let engine = Arc::new(EchoEngine {
                failing: vec![pages[failing_index].image.clone()],
                ..Default::default()
            });
            let transcriber = Transcriber::new(engine.clone(), "ben")
                .with_workers(1)
                .with_policy(FailurePolicy::Abort);

            let result = transcriber
                .transcribe(pages.clone(), None, &CancellationToken::new())
                .await;

            assert!(
                matches!(result, Err(Error::PageFailed { page, .. }) if page as usize == failing_index + 1),
                "run {}: expected PageFailed",
                run
            );
            assert_eq!(
                engine.calls.load(Ordering::SeqCst),
                expected_calls,
                "run {}: pages were dispatched after page {} failed",
                run,
                failing_index + 1
            );
        }
    }
}

struct PanickingEngine;

impl OcrEngine for PanickingEngine {
    fn name(&self) -> &str {
        "panicking"
    }

    fn recognize(&self, image_path: &Path, _language: &str) -> Result<String, OcrError> {
        if image_path.ends_with("page-2.png") {
            panic!("engine crashed");
        }
        std::fs::read_to_string(image_path).map_err(OcrError::from)
    }
}

#[tokio::test]
async fn engine_panic_is_a_page_failure() {
    let temp = TempDir::new().unwrap();
    let pages = write_pages(temp.path(), &["এক", "দুই", "তিন"]);
    let transcriber = Transcriber::new(Arc::new(PanickingEngine), "ben").with_workers(1);

    let transcript = transcriber
        .transcribe(pages, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(transcript.text, "এক\n\nতিন");
    assert_eq!(transcript.failures.len(), 1);
    assert_eq!(transcript.failures[0].number, 2);
    assert!(transcript.failures[0].error.contains("panicked"));
}

#[tokio::test]
async fn closed_event_receiver_does_not_block() {
    let temp = TempDir::new().unwrap();
    let pages = write_pages(temp.path(), &["এক", "দুই", "তিন", "চার"]);
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let transcriber = Transcriber::new(Arc::new(EchoEngine::default()), "ben").with_workers(2);
    let transcript = transcriber
        .transcribe(pages, Some(&tx), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(transcript.text, "এক\n\nদুই\n\nতিন\n\nচার");
}

#[cfg(debug_assertions)]
#[tokio::test]
#[should_panic(expected = "page index must match its position")]
async fn mismatched_page_index_is_rejected() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("a.png"), "এক").unwrap();
    let pages = vec![Page::new(3, 1, temp.path().join("a.png"))];

    let transcriber = Transcriber::new(Arc::new(EchoEngine::default()), "ben");
    let _ = transcriber
        .transcribe(pages, None, &CancellationToken::new())
        .await;
}
