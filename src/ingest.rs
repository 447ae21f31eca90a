//! Wiki ingestion.
//!
//! Each category is a subtree of the wiki rooted at a parent page. The
//! crawl walks the tree depth-first, pulls every page body, reduces its
//! storage-format HTML to text and merges the result into
//! `<slug>_raw.json` under the data directory.

use crate::{
    config::ConfluenceConfig,
    records::Category,
    storage::StorageManager,
};
use anyhow::{bail, Context};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, thread::sleep, time::Duration};

const CHECKPOINT_FILE: &str = "last_fetch.json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MISSING_BODY: &str = "No content found";

/// A wiki page before field extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPage {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FetchCheckpoint {
    pub last_fetch_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChildListing {
    #[serde(default)]
    results: Vec<PageSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct PageSummary {
    id: String,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct History {
    #[serde(rename = "createdDate")]
    created_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Storage {
    value: String,
}

#[derive(Debug, Deserialize)]
struct Body {
    storage: Option<Storage>,
}

#[derive(Debug, Deserialize)]
struct PageContent {
    #[serde(default)]
    title: String,
    body: Option<Body>,
    history: Option<History>,
}

impl PageContent {
    fn into_raw_page(self, id: &str) -> RawPage {
        let content = match self.body.and_then(|body| body.storage) {
            Some(storage) => html_to_text(&storage.value),
            None => MISSING_BODY.to_string(),
        };

        RawPage {
            id: id.to_string(),
            title: self.title,
            created: self.history.and_then(|h| h.created_date),
            content,
        }
    }
}

/// Reduce storage-format HTML to its text nodes.
pub fn html_to_text(html: &str) -> String {
    scraper::Html::parse_fragment(html)
        .root_element()
        .text()
        .collect()
}

pub struct ConfluenceClient {
    http: reqwest::blocking::Client,
    base_url: String,
    email: String,
    api_token: Option<String>,
    page_limit: u32,
    delay: Duration,
}

impl ConfluenceClient {
    pub fn new(config: &ConfluenceConfig) -> anyhow::Result<Self> {
        if config.domain.trim().is_empty() {
            bail!("confluence domain is not configured (set ATLASSIAN_DOMAIN)");
        }

        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url(&config.domain),
            email: config.email.clone(),
            api_token: config.api_token.clone(),
            page_limit: config.page_limit,
            delay: Duration::from_millis(config.request_delay_ms),
        })
    }

    fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> anyhow::Result<T> {
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .basic_auth(&self.email, self.api_token.as_ref())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            bail!("{status}: {text}");
        }

        Ok(response.json()?)
    }

    /// Direct children of `parent_id`, following pagination.
    ///
    /// A failed request ends the listing with what was collected so far.
    fn child_pages(&self, parent_id: &str) -> Vec<PageSummary> {
        let mut pages = vec![];
        let mut start = 0;

        loop {
            let url = format!(
                "{}/wiki/rest/api/content/{parent_id}/child/page?start={start}&limit={}&expand=history",
                self.base_url, self.page_limit
            );

            let listing: ChildListing = match self.get(&url) {
                Ok(listing) => listing,
                Err(err) => {
                    log::error!("failed to list children of {parent_id}: {err:#}");
                    break;
                }
            };

            let received = listing.results.len();
            pages.extend(listing.results);

            if received < self.page_limit as usize {
                break;
            }

            start += self.page_limit;
            sleep(self.delay);
        }

        pages
    }

    fn page(&self, page_id: &str) -> Option<RawPage> {
        let url = format!(
            "{}/wiki/rest/api/content/{page_id}?expand=body.storage,history",
            self.base_url
        );

        match self.get::<PageContent>(&url) {
            Ok(content) => Some(content.into_raw_page(page_id)),
            Err(err) => {
                log::error!("failed to fetch page {page_id}: {err:#}");
                None
            }
        }
    }

    /// Every page below `parent_id`, depth-first.
    pub fn fetch_tree(&self, parent_id: &str) -> Vec<RawPage> {
        let mut pages = vec![];

        for child in self.child_pages(parent_id) {
            log::info!("fetching page: {} (id: {})", child.title, child.id);

            if let Some(page) = self.page(&child.id) {
                pages.push(page);
            }

            pages.extend(self.fetch_tree(&child.id));

            sleep(self.delay);
        }

        pages
    }
}

fn base_url(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    }
}

/// Merge freshly fetched pages into the existing dump.
///
/// Deduplicates by id keeping first-seen order. A later entry replaces an
/// earlier one only when it carries a `created` timestamp the earlier one
/// lacks. Pages without an id are dropped.
pub fn merge_pages(existing: Vec<RawPage>, fresh: Vec<RawPage>) -> Vec<RawPage> {
    let mut merged: Vec<RawPage> = vec![];
    let mut positions: HashMap<String, usize> = HashMap::new();

    for page in existing.into_iter().chain(fresh) {
        if page.id.is_empty() {
            continue;
        }

        match positions.get(&page.id) {
            Some(&pos) => {
                if page.created.is_some() && merged[pos].created.is_none() {
                    merged[pos] = page;
                }
            }
            None => {
                positions.insert(page.id.clone(), merged.len());
                merged.push(page);
            }
        }
    }

    merged
}

/// Newest parseable `created` timestamp, returned as written.
pub fn latest_created<'a>(pages: impl IntoIterator<Item = &'a RawPage>) -> Option<String> {
    pages
        .into_iter()
        .filter_map(|page| {
            let created = page.created.as_deref()?;
            let parsed = DateTime::parse_from_rfc3339(created).ok()?;
            Some((parsed, created))
        })
        .max_by_key(|(parsed, _)| *parsed)
        .map(|(_, created)| created.to_string())
}

fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok()
}

/// Read `<slug>_raw.json`; a missing or unreadable file counts as empty.
pub fn read_pages(storage: &dyn StorageManager, category: Category) -> Vec<RawPage> {
    let ident = category.raw_file();
    if !storage.exists(&ident) {
        return vec![];
    }

    match storage
        .read(&ident)
        .map_err(anyhow::Error::from)
        .and_then(|data| Ok(serde_json::from_slice(&data)?))
    {
        Ok(pages) => pages,
        Err(err) => {
            log::warn!("ignoring unreadable {ident}: {err:#}");
            vec![]
        }
    }
}

pub fn write_pages(
    storage: &dyn StorageManager,
    category: Category,
    pages: &[RawPage],
) -> anyhow::Result<()> {
    let ident = category.raw_file();
    storage
        .write(&ident, &serde_json::to_vec_pretty(pages)?)
        .with_context(|| format!("failed to write {ident}"))
}

pub fn read_checkpoint(storage: &dyn StorageManager) -> FetchCheckpoint {
    storage
        .read(CHECKPOINT_FILE)
        .ok()
        .and_then(|data| serde_json::from_slice(&data).ok())
        .unwrap_or_default()
}

/// Advance `last_fetch.json` to `candidate` if it is newer.
pub fn advance_checkpoint(storage: &dyn StorageManager, candidate: &str) -> anyhow::Result<()> {
    let current = read_checkpoint(storage);

    let newer = match current.last_fetch_time.as_deref().and_then(parse_timestamp) {
        Some(current) => parse_timestamp(candidate).is_some_and(|c| c > current),
        None => true,
    };

    if newer {
        let checkpoint = FetchCheckpoint {
            last_fetch_time: Some(candidate.to_string()),
        };
        storage.write(CHECKPOINT_FILE, &serde_json::to_vec(&checkpoint)?)?;
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct IngestReport {
    pub category: Category,
    pub fetched: usize,
    pub stored: usize,
}

/// Crawl every configured category into the data directory.
pub fn ingest(
    config: &ConfluenceConfig,
    storage: &dyn StorageManager,
) -> anyhow::Result<Vec<IngestReport>> {
    let client = ConfluenceClient::new(config)?;
    let mut reports = vec![];

    for category in Category::ALL {
        let Some(parent_id) = config.sources.get(&category) else {
            log::warn!("{category}: no parent page configured, skipping");
            continue;
        };

        log::info!("{category}: fetching tree under {parent_id}");
        let fetched = client.fetch_tree(parent_id);

        if let Some(latest) = latest_created(&fetched) {
            advance_checkpoint(storage, &latest)?;
        }

        let fetched_count = fetched.len();
        let merged = merge_pages(read_pages(storage, category), fetched);
        write_pages(storage, category, &merged)?;

        log::info!("{category}: {fetched_count} fetched, {} stored", merged.len());
        reports.push(IngestReport {
            category,
            fetched: fetched_count,
            stored: merged.len(),
        });
    }

    Ok(reports)
}
