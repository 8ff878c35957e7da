use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Selector};

use crate::types::RawMessage;

/// Where raw messages come from.
pub trait MessageSource {
    /// Get the display name for this source
    fn display_name(&self) -> &'static str;

    /// Locate the documents this source will read, in reading order
    fn discover_documents(&self) -> Result<Vec<PathBuf>>;

    /// Read every message from the discovered documents, in document order
    fn read_messages(&self) -> Result<Vec<RawMessage>>;
}

/// A dated chat export folder such as `ChatExport_2025-03-05 (2)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDir {
    pub path: PathBuf,
    pub date: NaiveDate,
    pub variant: u32,
}

/// Reads the newest `ChatExport_*` folder under a base directory.
pub struct ChatExportSource {
    base_dir: PathBuf,
}

impl ChatExportSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn latest_export(&self) -> Result<ExportDir> {
        find_latest_export(&self.base_dir)
    }

    /// Read the pages of an already resolved export.
    pub fn read_export(&self, export: &ExportDir) -> Result<Vec<RawMessage>> {
        log::info!("using export {}", export.path.display());
        read_pages(&list_message_pages(&export.path)?)
    }
}

fn read_pages(pages: &[PathBuf]) -> Result<Vec<RawMessage>> {
    let mut messages = Vec::new();
    for page in pages {
        let html = std::fs::read_to_string(page)
            .with_context(|| format!("Failed to read {}", page.display()))?;
        let parsed = parse_messages_html(&html)?;
        log::debug!("{}: {} messages", page.display(), parsed.len());
        messages.extend(parsed);
    }
    Ok(messages)
}

impl MessageSource for ChatExportSource {
    fn display_name(&self) -> &'static str {
        "Chat export"
    }

    fn discover_documents(&self) -> Result<Vec<PathBuf>> {
        let export = self.latest_export()?;
        log::info!("using export {}", export.path.display());
        list_message_pages(&export.path)
    }

    fn read_messages(&self) -> Result<Vec<RawMessage>> {
        read_pages(&self.discover_documents()?)
    }
}

const EXPORT_NAME: &str = r"^ChatExport_(\d{4}-\d{2}-\d{2})(?: \((\d+)\))?$";

/// Parse an export folder name into its date and variant number.
pub fn parse_export_name(pattern: &Regex, name: &str) -> Option<(NaiveDate, u32)> {
    let caps = pattern.captures(name)?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
    let variant = match caps.get(2) {
        Some(n) => n.as_str().parse().ok()?,
        None => 0,
    };
    Some((date, variant))
}

/// Glob for `file_pattern` inside `dir`, with `dir` itself taken literally.
fn glob_in(dir: &Path, file_pattern: &str) -> Result<glob::Paths> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = Path::new(&escaped).join(file_pattern);
    glob::glob(&pattern.to_string_lossy())
        .with_context(|| format!("Failed to search {}", dir.display()))
}

/// Pick the newest export under `base`: latest date, then highest variant.
pub fn find_latest_export(base: &Path) -> Result<ExportDir> {
    let name_re = Regex::new(EXPORT_NAME)?;

    let mut best: Option<ExportDir> = None;
    for entry in glob_in(base, "ChatExport_*")? {
        let path = entry?;
        if !path.is_dir() {
            continue;
        }
        let Some((date, variant)) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| parse_export_name(&name_re, n))
        else {
            continue;
        };

        let newer = best
            .as_ref()
            .is_none_or(|b| (date, variant) > (b.date, b.variant));
        if newer {
            best = Some(ExportDir {
                path,
                date,
                variant,
            });
        }
    }

    best.with_context(|| format!("No ChatExport_* folders found in {}", base.display()))
}

/// `messages.html`, `messages2.html`, `messages3.html`, ... in page order.
pub fn list_message_pages(export: &Path) -> Result<Vec<PathBuf>> {
    let first = export.join("messages.html");
    if !first.is_file() {
        anyhow::bail!("{} not found", first.display());
    }

    let page_re = Regex::new(r"^messages(\d+)\.html$")?;
    let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
    for entry in glob_in(export, "messages*.html")? {
        let path = entry?;
        let page = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| page_re.captures(n))
            .and_then(|c| c[1].parse::<u32>().ok());
        if let Some(page) = page {
            numbered.push((page, path));
        }
    }
    numbered.sort_by_key(|(page, _)| *page);

    let mut pages = vec![first];
    pages.extend(numbered.into_iter().map(|(_, path)| path));
    Ok(pages)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Invalid selector {css:?}: {e}"))
}

/// Extract message bodies and timestamp titles from one export page.
pub fn parse_messages_html(html: &str) -> Result<Vec<RawMessage>> {
    let message_sel = selector("div.message")?;
    let text_sel = selector("div.text")?;
    let date_sel = selector("div.pull_right.date.details")?;

    let document = Html::parse_document(html);
    let mut messages = Vec::new();

    for message in document.select(&message_sel) {
        let mut bodies = message.select(&text_sel).peekable();
        if bodies.peek().is_none() {
            continue;
        }
        let text: String = bodies.flat_map(|el| el.text()).collect();

        let timestamp = message
            .select(&date_sel)
            .find_map(|el| el.value().attr("title"))
            .unwrap_or_default()
            .to_string();

        messages.push(RawMessage { text, timestamp });
    }

    Ok(messages)
}
