// Extraction module
// Turns source files into plain-text documents


use std::path::{Path, PathBuf};

use async_trait::async_trait;
use itertools::Itertools;
use pulldown_cmark::{Event, Parser, TagEnd};
use scraper::Html;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::{Collaborator, RagError, Result};

/// Plain text of one source, before chunking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source_id: String,
    pub text: String,
}

/// Source formats understood by [`FileExtractor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Markdown,
    Html,
    Pdf,
}

impl DocumentFormat {
    /// Detect the format from the file extension, ignoring case
    #[inline]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "txt" | "text" => Some(Self::PlainText),
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// Produces document text from a source path
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Whether this extractor can read `path`
    fn supports(&self, path: &Path) -> bool;

    async fn extract(&self, path: &Path) -> Result<Document>;
}

/// Extractor for local text, Markdown, HTML and PDF files
#[derive(Debug, Clone, Copy, Default)]
pub struct FileExtractor;

impl FileExtractor {
    #[inline]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for FileExtractor {
    fn supports(&self, path: &Path) -> bool {
        DocumentFormat::from_path(path).is_some()
    }

    async fn extract(&self, path: &Path) -> Result<Document> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| {
            RagError::collaborator(
                Collaborator::Extraction,
                format!("unsupported file type: {}", path.display()),
            )
        })?;

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RagError::collaborator(
                Collaborator::Extraction,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        let text = match format {
            DocumentFormat::Pdf => tokio::task::spawn_blocking(move || pdf_to_text(&bytes))
                .await
                .map_err(|e| anyhow::anyhow!("PDF extraction task failed: {}", e))?
                .map_err(|e| {
                    RagError::collaborator(
                        Collaborator::Extraction,
                        format!("failed to parse {}: {}", path.display(), e),
                    )
                })?,
            DocumentFormat::PlainText => String::from_utf8_lossy(&bytes).into_owned(),
            DocumentFormat::Markdown => markdown_to_text(&String::from_utf8_lossy(&bytes)),
            DocumentFormat::Html => html_to_text(&String::from_utf8_lossy(&bytes)),
        };

        debug!(
            "Extracted {} characters from {} ({:?})",
            text.chars().count(),
            path.display(),
            format
        );

        Ok(Document {
            source_id: path.display().to_string(),
            text,
        })
    }
}

/// Expand sources into the files beneath them.
///
/// Directories are walked recursively with siblings sorted by name, so
/// repeated runs see files in the same order. Hidden entries are skipped and
/// symbolic links are not followed. Entries that cannot be read are logged
/// and skipped.
#[inline]
pub fn collect_files(sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for source in sources {
        if source.is_dir() {
            walk_directory(source, &mut files);
        } else if source.is_file() {
            files.push(source.clone());
        } else {
            return Err(RagError::InvalidArgument(format!(
                "source does not exist: {}",
                source.display()
            )));
        }
    }
    Ok(files)
}

fn walk_directory(dir: &Path, files: &mut Vec<PathBuf>) {
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(entry) => {
                if entry.path_is_symlink() {
                    debug!("Not following symbolic link {}", entry.path().display());
                }
            }
            Err(e) => warn!("Skipping unreadable entry under {}: {}", dir.display(), e),
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

/// Text of every page of a PDF, in page order.
///
/// A page whose text cannot be extracted contributes an empty string; only a
/// file that is not a readable PDF at all is an error.
#[inline]
pub fn pdf_to_text(bytes: &[u8]) -> std::result::Result<String, lopdf::Error> {
    let document = lopdf::Document::load_mem(bytes)?;
    let pages = document.get_pages();

    let text = pages
        .keys()
        .map(|&page| match document.extract_text(&[page]) {
            Ok(text) => {
                debug!("Extracted {} characters from page {}", text.chars().count(), page);
                text
            }
            Err(e) => {
                debug!("No text extracted from page {}: {}", page, e);
                String::new()
            }
        })
        .join("\n");

    Ok(text)
}

/// Flatten Markdown to its readable text, one block per paragraph
#[inline]
pub fn markdown_to_text(markdown: &str) -> String {
    let mut text = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(content) | Event::Code(content) => text.push_str(&content),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::Table,
            ) => text.push_str("\n\n"),
            Event::End(TagEnd::Item | TagEnd::TableRow | TagEnd::TableHead) => text.push('\n'),
            Event::End(TagEnd::TableCell) => text.push(' '),
            _ => {}
        }
    }

    text.trim_end().to_string()
}

const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "blockquote",
    "section", "article", "header", "footer", "title", "table", "ul", "ol", "dt", "dd",
];

/// Collect the visible text of an HTML document, one line per text block
#[inline]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();

    for node in document.root_element().descendants() {
        if let Some(element) = node.value().as_element() {
            if BLOCK_ELEMENTS.contains(&element.name()) {
                raw.push('\n');
            }
            continue;
        }
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| SKIPPED_ELEMENTS.contains(&element.name()))
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    raw.lines()
        .map(|line| line.split_whitespace().join(" "))
        .filter(|line| !line.is_empty())
        .join("\n")
}
