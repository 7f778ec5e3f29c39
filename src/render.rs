//! Poppler-backed rasterizer.
//!
//! Pages are rendered by running `pdftoppm -r <dpi> -png <pdf> <dir>/page`
//! into a scratch directory. `pdftoppm` zero-pads the page suffix to the
//! width of the page count (`page-01.png` … `page-12.png`), so the output
//! files are ordered by their numeric suffix rather than by name.
//!
//! When `[rasterizer] extract_text = true`, `pdftotext -layout` is run as
//! well and its output is split on form feeds to attach one text layer per
//! page. Text extraction is best-effort; a failure only drops the text.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use pagelens_core::engine::Rasterizer;
use pagelens_core::models::PageImage;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::RasterizerConfig;

const OUTPUT_PREFIX: &str = "page";

pub struct PopplerRasterizer {
    pdftoppm: PathBuf,
    pdftotext: PathBuf,
    extract_text: bool,
    dpi: u32,
}

impl PopplerRasterizer {
    pub fn from_config(config: &RasterizerConfig) -> Self {
        Self {
            pdftoppm: config.pdftoppm.clone(),
            pdftotext: config.pdftotext.clone(),
            extract_text: config.extract_text,
            dpi: config.dpi,
        }
    }

    async fn render_images(&self, path: &Path, out_dir: &Path) -> Result<Vec<Vec<u8>>> {
        let output = Command::new(&self.pdftoppm)
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(path)
            .arg(out_dir.join(OUTPUT_PREFIX))
            .output()
            .await
            .with_context(|| {
                format!(
                    "Failed to execute '{}'. Is poppler-utils installed?",
                    self.pdftoppm.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("pdftoppm failed on {}: {}", path.display(), stderr.trim());
        }

        let mut numbered = Vec::new();
        let mut entries = tokio::fs::read_dir(out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(n) = name.to_str().and_then(page_number_from_file_name) {
                numbered.push((n, entry.path()));
            }
        }
        numbered.sort_by_key(|(n, _)| *n);

        let mut images = Vec::with_capacity(numbered.len());
        for (_, file) in numbered {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read rendered page {}", file.display()))?;
            images.push(bytes);
        }
        Ok(images)
    }

    async fn extract_page_text(&self, path: &Path) -> Result<Vec<String>> {
        let output = Command::new(&self.pdftotext)
            .arg("-layout")
            .arg(path)
            .arg("-")
            .output()
            .await
            .with_context(|| format!("Failed to execute '{}'", self.pdftotext.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("pdftotext failed: {}", stderr.trim());
        }
        Ok(split_pages(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl Rasterizer for PopplerRasterizer {
    async fn render(&self, path: &Path) -> Result<Vec<PageImage>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            bail!("document not found: {}", path.display());
        }

        let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
        let images = self.render_images(path, scratch.path()).await?;
        if images.is_empty() {
            bail!("pdftoppm produced no pages for {}", path.display());
        }

        let texts = if self.extract_text {
            match self.extract_page_text(path).await {
                Ok(texts) => texts,
                Err(e) => {
                    warn!(path = %path.display(), error = %format!("{:#}", e), "text extraction failed; pages carry no text");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        debug!(path = %path.display(), pages = images.len(), dpi = self.dpi, "rendered document");
        Ok(images
            .into_iter()
            .enumerate()
            .map(|(i, bytes)| {
                let page = PageImage::png(bytes);
                match texts.get(i) {
                    Some(text) if !text.trim().is_empty() => page.with_text(text.trim()),
                    _ => page,
                }
            })
            .collect())
    }
}

/// Page number encoded in a `pdftoppm` output name such as `page-007.png`.
fn page_number_from_file_name(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(".png")?;
    let (prefix, number) = stem.rsplit_once('-')?;
    if prefix != OUTPUT_PREFIX {
        return None;
    }
    number.parse().ok()
}

/// Split `pdftotext` output into per-page text. Pages are separated by a
/// form feed and the output ends with one.
fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split('\x0c').map(str::to_string).collect();
    if pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_page_numbers() {
        assert_eq!(page_number_from_file_name("page-1.png"), Some(1));
        assert_eq!(page_number_from_file_name("page-07.png"), Some(7));
        assert_eq!(page_number_from_file_name("page-120.png"), Some(120));
        assert_eq!(page_number_from_file_name("page-x.png"), None);
        assert_eq!(page_number_from_file_name("other-1.png"), None);
        assert_eq!(page_number_from_file_name("page-1.ppm"), None);
    }

    #[test]
    fn numeric_order_beats_name_order() {
        let mut names = vec!["page-10.png", "page-9.png", "page-1.png"];
        names.sort_by_key(|n| page_number_from_file_name(n));
        assert_eq!(names, vec!["page-1.png", "page-9.png", "page-10.png"]);
    }

    #[test]
    fn split_pages_on_form_feed() {
        let pages = split_pages("first page\n\x0csecond page\n\x0c");
        assert_eq!(pages, vec!["first page\n", "second page\n"]);
    }

    #[test]
    fn split_pages_keeps_blank_inner_pages() {
        let pages = split_pages("a\x0c\x0cc\x0c");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[1], "");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let rasterizer = PopplerRasterizer::from_config(&RasterizerConfig::default());
        let err = rasterizer
            .render(Path::new("/nonexistent/doc.pdf"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("document not found"));
    }

    /// A minimal PDF with one line of Helvetica text per page.
    fn text_pdf(pages: &[String]) -> Vec<u8> {
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            String::new(),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];
        let mut kids = Vec::new();
        for (i, text) in pages.iter().enumerate() {
            let page_id = 4 + 2 * i;
            kids.push(format!("{} 0 R", page_id));
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 300 200] \
                 /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
                page_id + 1
            ));
            let stream = format!("BT /F1 18 Tf 20 100 Td ({}) Tj ET", text);
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}\nendstream",
                stream.len(),
                stream
            ));
        }
        objects[1] = format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        );

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
        }
        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref
            )
            .as_bytes(),
        );
        out
    }

    fn poppler_available() -> bool {
        ["pdftoppm", "pdftotext"].iter().all(|tool| {
            std::process::Command::new(tool)
                .arg("-v")
                .output()
                .is_ok()
        })
    }

    #[tokio::test]
    async fn renders_pages_in_order_with_matching_text() {
        if !poppler_available() {
            eprintln!("skipping: poppler-utils not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twelve.pdf");
        let texts: Vec<String> = (1..=12).map(|n| format!("Page {} marker", n)).collect();
        std::fs::write(&path, text_pdf(&texts)).unwrap();

        let config = RasterizerConfig {
            dpi: 20,
            ..Default::default()
        };
        let pages = PopplerRasterizer::from_config(&config)
            .render(&path)
            .await
            .unwrap();

        assert_eq!(pages.len(), 12);
        for (i, page) in pages.iter().enumerate() {
            assert!(page.bytes.starts_with(b"\x89PNG"));
            let text = page.text.as_deref().unwrap_or_default();
            assert!(
                text.contains(&format!("Page {} marker", i + 1)),
                "page {} carried text {:?}",
                i + 1,
                text
            );
        }
    }
}
