//! PDF text extraction pipeline.
//!
//! Locates the tools, renders the PDF into a scratch directory, transcribes
//! the pages and optionally writes the result to disk. Dependency and input
//! problems are reported before any page reaches the OCR engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ocr::{
    LocatorConfig, OcrEngine, PageSelection, PdfRasterizer, TesseractEngine, ToolLocator,
    ToolPaths,
};

use super::transcribe::{TranscribeEvent, Transcriber, Transcript};

/// Extracts text from PDFs with a fixed set of tools and settings.
#[derive(Clone)]
pub struct Extractor {
    tools: ToolPaths,
    rasterizer: PdfRasterizer,
    transcriber: Transcriber,
    pages: Option<PageSelection>,
}

impl Extractor {
    /// Locate tools from `config` and the process `PATH`.
    pub fn new(config: &Config) -> Result<Self> {
        let locator = ToolLocator::new(LocatorConfig::from_config(config));
        Self::with_locator(config, &locator)
    }

    /// Locate tools with a caller-supplied locator.
    pub fn with_locator(config: &Config, locator: &ToolLocator) -> Result<Self> {
        let tools = locator.locate()?;
        let engine: Arc<dyn OcrEngine> = Arc::new(TesseractEngine::new(&tools.tesseract));
        Ok(Self::from_parts(config, tools, engine))
    }

    /// Assemble from already-resolved tools and any OCR engine.
    pub fn from_parts(config: &Config, tools: ToolPaths, engine: Arc<dyn OcrEngine>) -> Self {
        let rasterizer = PdfRasterizer::new(&tools.pdftoppm)
            .with_pdfinfo(tools.pdfinfo.clone())
            .with_dpi(config.dpi);
        let transcriber = Transcriber::new(engine, config.language.clone())
            .with_workers(config.effective_workers())
            .with_policy(config.failure_policy)
            .with_page_markers(config.page_markers);

        Self {
            tools,
            rasterizer,
            transcriber,
            pages: None,
        }
    }

    /// Only transcribe the selected pages.
    pub fn with_pages(mut self, pages: Option<PageSelection>) -> Self {
        self.pages = pages;
        self
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    pub fn transcriber(&self) -> &Transcriber {
        &self.transcriber
    }

    /// Render and transcribe `pdf_path`.
    pub async fn extract(
        &self,
        pdf_path: &Path,
        event_tx: Option<&mpsc::Sender<TranscribeEvent>>,
        cancel: &CancellationToken,
    ) -> Result<Transcript> {
        tracing::info!("Extracting text from {}", pdf_path.display());

        let temp_dir = TempDir::new()?;
        let rasterizer = self.rasterizer.clone();
        let pdf: PathBuf = pdf_path.to_path_buf();
        let out_dir = temp_dir.path().to_path_buf();
        let selection = self.pages.clone();

        let pages = tokio::task::spawn_blocking(move || {
            rasterizer.rasterize(&pdf, &out_dir, selection.as_ref())
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        let transcript = self.transcriber.transcribe(pages, event_tx, cancel).await?;

        if let Err(e) = temp_dir.close() {
            tracing::debug!("Failed to remove page images: {}", e);
        }

        Ok(transcript)
    }
}

/// Write `text` to `path`, handing the text back either way.
pub async fn write_output(path: &Path, text: String) -> Result<String> {
    match tokio::fs::write(path, text.as_bytes()).await {
        Ok(()) => {
            tracing::info!("Text extracted and saved to {}", path.display());
            Ok(text)
        }
        Err(source) => Err(Error::OutputWrite {
            path: path.to_path_buf(),
            source,
            text,
        }),
    }
}

/// Extract text from a PDF using configuration from files and environment.
///
/// `language` overrides the configured OCR language. When `output` is given
/// the text is also written there.
pub async fn process_pdf(
    pdf_path: impl AsRef<Path>,
    output: Option<&Path>,
    language: Option<&str>,
) -> Result<String> {
    let config = Config::load(None).await?;
    process_pdf_with(config, pdf_path.as_ref(), output, language).await
}

/// [`process_pdf`] with an explicit configuration.
pub async fn process_pdf_with(
    mut config: Config,
    pdf_path: &Path,
    output: Option<&Path>,
    language: Option<&str>,
) -> Result<String> {
    if let Some(language) = language {
        config.language = language.to_string();
    }

    let extractor = Extractor::new(&config)?;
    let transcript = extractor
        .extract(pdf_path, None, &CancellationToken::new())
        .await?;

    match output {
        Some(path) => write_output(path, transcript.text).await,
        None => Ok(transcript.text),
    }
}
