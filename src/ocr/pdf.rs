//! PDF-to-image conversion with Poppler.
//!
//! `pdfinfo` (when available) validates the page count up front, then
//! `pdftoppm` renders the whole document (or the selected span) to PNG files
//! in a scratch directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::services::Page;

/// Resolution pdftoppm renders at when none is configured.
pub const DEFAULT_DPI: u32 = 150;

/// Prefix pdftoppm uses for its output files.
const IMAGE_PREFIX: &str = "page";

/// A set of 1-based page numbers to transcribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    ranges: Vec<(u32, Option<u32>)>,
}

impl PageSelection {
    /// Parse a selection like `"1"`, `"1-5"`, `"1,3,5-10"` or `"4-"`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut ranges = Vec::new();

        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let range = match part.split_once('-') {
                Some((start, end)) => {
                    let start = parse_page_number(start, input)?;
                    let end = if end.trim().is_empty() {
                        None
                    } else {
                        Some(parse_page_number(end, input)?)
                    };
                    if let Some(end) = end {
                        if end < start {
                            return Err(Error::Config(format!(
                                "Invalid page range '{}': end is before start",
                                part
                            )));
                        }
                    }
                    (start, end)
                }
                None => {
                    let page = parse_page_number(part, input)?;
                    (page, Some(page))
                }
            };
            ranges.push(range);
        }

        if ranges.is_empty() {
            return Err(Error::Config(format!("Empty page selection '{}'", input)));
        }

        Ok(Self { ranges })
    }

    /// Whether `page` (1-based) is selected.
    pub fn contains(&self, page: u32) -> bool {
        self.ranges
            .iter()
            .any(|&(start, end)| page >= start && end.map_or(true, |end| page <= end))
    }

    /// First selected page.
    pub fn first(&self) -> u32 {
        self.ranges.iter().map(|&(start, _)| start).min().unwrap_or(1)
    }

    /// Last selected page, or `None` when a range is open-ended.
    pub fn last(&self) -> Option<u32> {
        let mut last = 0;
        for &(_, end) in &self.ranges {
            last = last.max(end?);
        }
        Some(last)
    }

    /// Expand to a sorted, deduplicated list bounded by `max_pages`.
    pub fn pages(&self, max_pages: u32) -> Vec<u32> {
        (1..=max_pages).filter(|&p| self.contains(p)).collect()
    }
}

fn parse_page_number(raw: &str, input: &str) -> Result<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(Error::Config(format!(
            "Invalid page selection '{}': pages are numbered from 1",
            input
        ))),
        Ok(n) => Ok(n),
        Err(_) => Err(Error::Config(format!(
            "Invalid page selection '{}': '{}' is not a page number",
            input,
            raw.trim()
        ))),
    }
}

/// Renders PDF pages to images with pdftoppm.
#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    pdftoppm: PathBuf,
    pdfinfo: Option<PathBuf>,
    dpi: u32,
}

impl PdfRasterizer {
    pub fn new(pdftoppm: impl Into<PathBuf>) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
            pdfinfo: None,
            dpi: DEFAULT_DPI,
        }
    }

    /// Use `pdfinfo` to check the page count before rendering.
    pub fn with_pdfinfo(mut self, pdfinfo: Option<PathBuf>) -> Self {
        self.pdfinfo = pdfinfo;
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi.max(1);
        self
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }

    /// Render `pdf_path` into `output_dir` and return the pages in order.
    pub fn rasterize(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        selection: Option<&PageSelection>,
    ) -> Result<Vec<Page>> {
        validate_pdf(pdf_path)?;

        if let Some(count) = self.page_count(pdf_path)? {
            if count == 0 {
                return Err(Error::EmptyDocument(pdf_path.to_path_buf()));
            }
            if let Some(selection) = selection {
                if selection.pages(count).is_empty() {
                    return Err(Error::Config(format!(
                        "Page selection matches none of the {} pages in {}",
                        count,
                        pdf_path.display()
                    )));
                }
            }
        }

        let mut cmd = Command::new(&self.pdftoppm);
        cmd.args(["-png", "-r", &self.dpi.to_string()]);
        if let Some(selection) = selection {
            cmd.args(["-f", &selection.first().to_string()]);
            if let Some(last) = selection.last() {
                cmd.args(["-l", &last.to_string()]);
            }
        }
        cmd.arg(pdf_path).arg(output_dir.join(IMAGE_PREFIX));

        info!(
            "Converting {} to images at {} DPI using {}",
            pdf_path.display(),
            self.dpi,
            self.pdftoppm.display()
        );

        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DependencyMissing {
                    tool: crate::error::Tool::Pdftoppm,
                    hint: format!("{} could not be executed", self.pdftoppm.display()),
                })
            }
            Err(e) => return Err(Error::Io(e)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::InputInvalid {
                path: pdf_path.to_path_buf(),
                reason: format!("pdftoppm exited with {}: {}", output.status, stderr.trim()),
            });
        }

        let pages = collect_page_images(output_dir, selection)?;
        if pages.is_empty() {
            return Err(Error::EmptyDocument(pdf_path.to_path_buf()));
        }

        debug!("Rendered {} page images", pages.len());
        Ok(pages)
    }

    /// Ask pdfinfo for the page count; `None` if pdfinfo isn't available.
    pub fn page_count(&self, pdf_path: &Path) -> Result<Option<u32>> {
        let Some(ref pdfinfo) = self.pdfinfo else {
            return Ok(None);
        };

        let output = match Command::new(pdfinfo).arg(pdf_path).output() {
            Ok(output) => output,
            Err(e) => {
                debug!("pdfinfo could not run: {}", e);
                return Ok(None);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::InputInvalid {
                path: pdf_path.to_path_buf(),
                reason: format!("pdfinfo failed: {}", stderr.trim()),
            });
        }

        Ok(parse_page_count(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Check that the input exists and looks like a PDF.
pub fn validate_pdf(pdf_path: &Path) -> Result<()> {
    if !pdf_path.exists() {
        return Err(Error::InputMissing(pdf_path.to_path_buf()));
    }
    if !pdf_path.is_file() {
        return Err(Error::InputInvalid {
            path: pdf_path.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }

    match infer::get_from_path(pdf_path) {
        Ok(Some(kind)) if kind.mime_type() == "application/pdf" => Ok(()),
        Ok(Some(kind)) => Err(Error::InputInvalid {
            path: pdf_path.to_path_buf(),
            reason: format!("content is {}, not a PDF", kind.mime_type()),
        }),
        Ok(None) => Err(Error::InputInvalid {
            path: pdf_path.to_path_buf(),
            reason: "content is not a PDF".to_string(),
        }),
        Err(e) => Err(Error::InputInvalid {
            path: pdf_path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

/// Extract `Pages:` from pdfinfo output.
pub fn parse_page_count(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|count| count.trim().parse().ok())
}

/// Page number from a pdftoppm file name like `page-007.png`.
///
/// The zero padding depends on the document's page count, so the number is
/// parsed rather than relying on lexical order.
pub fn page_number_from_file_name(name: &str) -> Option<u32> {
    name.strip_prefix(IMAGE_PREFIX)?
        .strip_prefix('-')?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

/// Gather rendered images in page order and assign transcription indices.
fn collect_page_images(dir: &Path, selection: Option<&PageSelection>) -> Result<Vec<Page>> {
    let mut numbered: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let number = page_number_from_file_name(entry.file_name().to_str()?)?;
            Some((number, entry.path()))
        })
        .filter(|(number, _)| selection.map_or(true, |s| s.contains(*number)))
        .collect();

    numbered.sort_by_key(|(number, _)| *number);

    Ok(numbered
        .into_iter()
        .enumerate()
        .map(|(index, (number, image))| Page::new(index, number, image))
        .collect())
}
