//! `transcribe` command.

use std::path::{Path, PathBuf};

use console::style;
use indicatif::ProgressBar;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::helpers::{default_output_path, locate_sample, progress_style};
use crate::config::Config;
use crate::error::Error;
use crate::ocr::PageSelection;
use crate::services::{write_output, Extractor, FailurePolicy, TranscribeEvent, Transcript};

#[derive(clap::Args)]
pub(super) struct TranscribeArgs {
    /// PDF to transcribe.
    ///
    /// Defaults to the sample PDF (`default_pdf` in the config file or
    /// OCR_DEFAULT_PDF, else "data/Freedom Fight.pdf"). A relative sample
    /// path is looked up in the working directory, then next to the
    /// executable.
    pub pdf: Option<PathBuf>,

    /// Output text file (default: input path with .txt extension)
    #[arg(short, long, conflicts_with = "stdout")]
    pub output: Option<PathBuf>,

    /// Tesseract language, e.g. "ben" or "ben+eng"
    #[arg(short, long)]
    pub language: Option<String>,

    /// Number of pages to OCR in parallel (default: CPU count)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Rasterization resolution
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Pages to transcribe, e.g. "1-5" or "1,3,7-"
    #[arg(short, long)]
    pub pages: Option<String>,

    /// Fail the whole run if any page fails
    #[arg(long)]
    pub strict: bool,

    /// Prefix each page with a "--- Page N ---" line
    #[arg(long)]
    pub page_markers: bool,

    /// Print the text instead of writing a file
    #[arg(long)]
    pub stdout: bool,

    /// Don't show progress
    #[arg(short, long)]
    pub quiet: bool,
}

impl TranscribeArgs {
    fn apply_to(&self, config: &mut Config) {
        if let Some(ref language) = self.language {
            config.language = language.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(dpi) = self.dpi {
            config.dpi = dpi;
        }
        if self.strict {
            config.failure_policy = FailurePolicy::Abort;
        }
        if self.page_markers {
            config.page_markers = true;
        }
    }
}

pub(super) async fn cmd_transcribe(mut config: Config, args: TranscribeArgs) -> anyhow::Result<()> {
    args.apply_to(&mut config);

    let pdf = match args.pdf {
        Some(ref pdf) => pdf.clone(),
        None => {
            let exe_dir = std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf));
            match locate_sample(&config.default_pdf, exe_dir.as_deref()) {
                Some(sample) => sample,
                None => anyhow::bail!(
                    "No PDF given and the default PDF {} was not found in the working directory or next to the executable (pass a path or set OCR_DEFAULT_PDF)",
                    config.default_pdf.display()
                ),
            }
        }
    };

    let pages = args
        .pages
        .as_deref()
        .map(PageSelection::parse)
        .transpose()?;

    let extractor = Extractor::new(&config)?.with_pages(pages);
    tracing::info!(
        "Using tesseract at {} and pdftoppm at {}",
        extractor.tools().tesseract.display(),
        extractor.tools().pdftoppm.display()
    );

    let output = if args.stdout {
        None
    } else {
        Some(args.output.clone().unwrap_or_else(|| default_output_path(&pdf)))
    };

    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt_handler(cancel.clone());

    let (event_tx, ui) = if args.quiet {
        (None, None)
    } else {
        let (tx, rx) = mpsc::channel::<TranscribeEvent>(100);
        (Some(tx), Some(spawn_progress(rx)))
    };

    let result = extractor.extract(&pdf, event_tx.as_ref(), &cancel).await;

    drop(event_tx);
    if let Some(ui) = ui {
        let _ = ui.await;
    }
    interrupt.abort();

    let transcript = match result {
        Ok(transcript) => transcript,
        Err(Error::Cancelled {
            completed, total, ..
        }) => {
            eprintln!(
                "{} Cancelled after {} of {} pages; nothing written",
                style("!").yellow(),
                completed,
                total
            );
            anyhow::bail!("Transcription cancelled");
        }
        Err(e) => return Err(e.into()),
    };

    report_failures(&transcript);

    match output {
        None => {
            println!("{}", transcript.text);
            Ok(())
        }
        Some(path) => save(&path, transcript).await,
    }
}

async fn save(path: &Path, transcript: Transcript) -> anyhow::Result<()> {
    let pages = transcript.pages.len();
    match write_output(path, transcript.text).await {
        Ok(_) => {
            eprintln!(
                "{} Text from {} pages saved to {}",
                style("✓").green(),
                pages,
                path.display()
            );
            Ok(())
        }
        Err(Error::OutputWrite { path, source, text }) => {
            // Don't lose the work: dump it where the user can still get it.
            println!("{}", text);
            anyhow::bail!("Failed to write {}: {}", path.display(), source)
        }
        Err(e) => Err(e.into()),
    }
}

fn report_failures(transcript: &Transcript) {
    if transcript.failures.is_empty() {
        return;
    }

    eprintln!(
        "{} {} of {} pages could not be read and were left out:",
        style("!").yellow(),
        transcript.failures.len(),
        transcript.total_pages
    );
    for failure in &transcript.failures {
        eprintln!("  page {}: {}", failure.number, style(&failure.error).dim());
    }
}

/// Cancel the run on Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{} Interrupted, waiting for running pages to finish...",
                style("!").yellow()
            );
            cancel.cancel();
        }
    })
}

/// Drive a progress bar from transcriber events.
fn spawn_progress(mut event_rx: mpsc::Receiver<TranscribeEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut progress: Option<ProgressBar> = None;

        while let Some(event) = event_rx.recv().await {
            match event {
                TranscribeEvent::Started { total_pages } => {
                    eprintln!(
                        "{} Running OCR on {} pages",
                        style("→").cyan(),
                        total_pages
                    );
                    let bar = ProgressBar::new(total_pages as u64);
                    bar.set_style(progress_style());
                    bar.set_message("Running OCR...");
                    progress = Some(bar);
                }
                TranscribeEvent::PageCompleted { page_number, .. } => {
                    if let Some(ref bar) = progress {
                        bar.set_message(format!("page {}", page_number));
                        bar.inc(1);
                    }
                }
                TranscribeEvent::PageFailed {
                    page_number, error, ..
                } => {
                    if let Some(ref bar) = progress {
                        bar.println(format!(
                            "{} Page {} failed: {}",
                            style("✗").red(),
                            page_number,
                            error
                        ));
                        bar.inc(1);
                    }
                }
                TranscribeEvent::Finished { succeeded, failed } => {
                    if let Some(bar) = progress.take() {
                        bar.finish_and_clear();
                    }
                    let mut msg = format!(
                        "{} OCR complete: {} pages recognized",
                        style("✓").green(),
                        succeeded
                    );
                    if failed > 0 {
                        msg.push_str(&format!(", {} failed", failed));
                    }
                    eprintln!("{}", msg);
                }
            }
        }
    })
}
