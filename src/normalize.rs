//! Field extraction over fetched wiki pages.
//!
//! Page text is loosely structured: labels appear in bold, as upper-case
//! lines or inline followed by a colon. Labels are turned into `label:`
//! markers first, then the text is cut at every known label and each
//! segment becomes that field's value.

use crate::{
    ingest::{self, RawPage},
    records::{Category, FieldKey, Fields, Record},
    storage::StorageManager,
};
use anyhow::Context;
use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

const UNKNOWN_CREATED: &str = "Unknown";

const SQL_KEYWORDS: [&str; 9] = [
    "select", "from", "where", "update", "insert", "exec", "begin", "commit", "rollback",
];

static BOLD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("Failed to compile bold regex"));

static UPPERCASE_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n([A-ZÁÉÍÓÚÜÑ\s]+)\n").expect("Failed to compile upper-case line regex")
});

static WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Failed to compile whitespace regex"));

/// Every extractable label, in priority order. Alternation is leftmost-first,
/// so an earlier label wins over a later one starting at the same position.
static LABEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    let alternation = FieldKey::EXTRACTABLE
        .iter()
        .map(|key| regex::escape(key.label()))
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&format!("(?i)({alternation}):?")).expect("Failed to compile label regex")
});

/// Tidy a prose value; anything that looks like SQL is left untouched.
pub fn clean_text(text: &str) -> String {
    let text = text.replace('•', "-");

    let lower = text.to_lowercase();
    if SQL_KEYWORDS.iter().any(|keyword| lower.contains(keyword)) {
        return text;
    }

    WHITESPACE_REGEX
        .replace_all(&text, " ")
        .trim()
        .replace(". ", ".\n- ")
}

/// Split page text into labelled fields.
///
/// Later occurrences of a label overwrite earlier ones. Code fields keep
/// their trimmed value verbatim, even when empty; other fields are cleaned
/// and kept only when non-empty.
pub fn extract_sections(content: &str) -> Fields {
    let content = BOLD_REGEX.replace_all(content, "\n${1}:\n");
    let content = UPPERCASE_LINE_REGEX.replace_all(&content, "\n${1}:\n");

    let mut fields = Fields::new();
    let labels: Vec<_> = LABEL_REGEX.captures_iter(&content).collect();

    for (i, caps) in labels.iter().enumerate() {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        let Some(key) = FieldKey::from_label(label.as_str().trim()) else {
            continue;
        };

        let value_end = labels
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|next| next.start())
            .unwrap_or(content.len());
        let value = content[whole.end()..value_end].trim();

        if key.is_code() {
            fields.insert(key, value);
        } else if !value.is_empty() {
            fields.insert(key, clean_text(value));
        }
    }

    fields
}

/// Root-cause pages carry their progress in the title.
fn root_cause_status(title: &str) -> Option<&'static str> {
    let title = title.to_lowercase();
    if !title.contains("causa raíz") {
        return None;
    }

    if title.contains("en curso") {
        Some("en curso")
    } else if title.contains("completado") {
        Some("completado")
    } else {
        None
    }
}

/// Turn one page into a record; pages without content yield `None`.
pub fn normalize_page(category: Category, page: RawPage) -> Option<Record> {
    let content = page.content.trim();
    if content.is_empty() {
        log::warn!("{category}: empty content for page {}, skipping", page.id);
        return None;
    }

    let mut fields = extract_sections(content);
    log::debug!("{category}: page {} -> {} fields", page.id, fields.len());

    if category == Category::Causaraiz {
        if let Some(status) = root_cause_status(&page.title) {
            fields.insert(FieldKey::Status, status);
        }
    }

    Some(Record {
        content: content.to_string(),
        id: page.id,
        title: page.title,
        created: Some(page.created.unwrap_or_else(|| UNKNOWN_CREATED.to_string())),
        fields,
    })
}

/// Normalize a category's pages, preserving their order.
pub fn normalize_pages(category: Category, pages: Vec<RawPage>) -> Vec<Record> {
    pages
        .into_par_iter()
        .filter_map(|page| normalize_page(category, page))
        .collect()
}

pub fn read_records(storage: &dyn StorageManager, category: Category) -> anyhow::Result<Vec<Record>> {
    let ident = category.normalized_file();
    let data = storage
        .read(&ident)
        .with_context(|| format!("failed to read {ident}"))?;
    serde_json::from_slice(&data).with_context(|| format!("{ident} is malformed"))
}

/// Normalize every category's raw dump into `<slug>_normalized.json`.
pub fn normalize_all(storage: &dyn StorageManager) -> anyhow::Result<Vec<(Category, usize)>> {
    let mut counts = vec![];

    for category in Category::ALL {
        let pages = ingest::read_pages(storage, category);
        let page_count = pages.len();
        let records = normalize_pages(category, pages);

        let ident = category.normalized_file();
        storage
            .write(&ident, &serde_json::to_vec_pretty(&records)?)
            .with_context(|| format!("failed to write {ident}"))?;

        log::info!("{category}: {} of {page_count} pages normalized", records.len());
        counts.push((category, records.len()));
    }

    Ok(counts)
}
