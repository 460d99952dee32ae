// src/fetch/urls.rs

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};
use url::Url;

use super::Publisher;
use crate::convention::{extension_of, FILES_PATH};
use crate::error::Result;
use crate::types::{Category, Period, RemoteFile};

/// Page listing every monthly haircut publication, both categories.
pub const DEFAULT_LISTING_URL: &str =
    "https://www.banrep.gov.co/es/sistemas-pago/dcv/haircuts-repos-deuda-externa";

/// Detail pages look like `/es/sistemas-pago/dcv/haircuts-deuda-externa-enero-2026`,
/// sometimes with a `-0` style suffix when the site de-duplicates a path.
static DETAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"/sistemas-pago/dcv/(haircuts-repos|haircuts-deuda-externa)-([a-z]+)-(\d{4})(?:-\d+)?/?$",
    )
        .expect("detail path regex should compile")
});

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("CSS selector for links should be valid"));

/// One row of the listing page: a category/period and its detail page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingEntry {
    pub category: Category,
    pub period: Period,
    pub detail_url: Url,
}

/// Extract the entries for `category` from the listing HTML, newest first.
/// Duplicate links for one period keep the first occurrence.
pub fn parse_listing(html: &str, base: &Url, category: Category) -> Vec<ListingEntry> {
    let doc = Html::parse_document(html);
    let mut by_period: BTreeMap<Period, ListingEntry> = BTreeMap::new();

    for href in doc
        .select(&LINK_SELECTOR)
        .filter_map(|e| e.value().attr("href"))
    {
        let Ok(url) = base.join(href.trim()) else {
            continue;
        };
        let path = url.path().to_lowercase();
        let Some(caps) = DETAIL_RE.captures(&path) else {
            continue;
        };
        if Category::from_slug(&caps[1]) != Some(category) {
            continue;
        }
        let Some(period) = caps[3]
            .parse::<i32>()
            .ok()
            .and_then(|year| Period::from_spanish(&caps[2], year))
        else {
            trace!(%url, month = &caps[2], "unrecognised month in detail link");
            continue;
        };
        by_period.entry(period).or_insert_with(|| ListingEntry {
            category,
            period,
            detail_url: url.clone(),
        });
    }

    by_period.into_values().rev().collect()
}

/// Pick the attachment link on a detail page.
///
/// Preference: `.xlsx`, then `.xls`/`.csv`, then any other attachment (so that
/// a PDF-only publication surfaces as a format mismatch downstream).
pub fn parse_attachment(html: &str, base: &Url) -> Option<Url> {
    let doc = Html::parse_document(html);
    let attachments: Vec<Url> = doc
        .select(&LINK_SELECTOR)
        .filter_map(|e| e.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|u| u.path().contains(FILES_PATH))
        .collect();

    let with_ext = |wanted: &[&str]| {
        attachments
            .iter()
            .find(|u| extension_of(u.path()).is_some_and(|e| wanted.contains(&e.as_str())))
            .cloned()
    };

    with_ext(&["xlsx"])
        .or_else(|| with_ext(&["xls", "csv"]))
        .or_else(|| attachments.first().cloned())
}

/// Fetch the listing and return the entries for `category`.
/// An empty result triggers exactly one re-list.
pub async fn list_entries<P: Publisher + ?Sized>(
    publisher: &P,
    listing_url: &Url,
    category: Category,
) -> Result<Vec<ListingEntry>> {
    let html = publisher.get_text(listing_url).await?;
    let entries = parse_listing(&html, listing_url, category);
    if !entries.is_empty() {
        debug!(%category, count = entries.len(), "listing parsed");
        return Ok(entries);
    }

    warn!(%category, %listing_url, "listing returned no entries; re-listing once");
    let html = publisher.get_text(listing_url).await?;
    let entries = parse_listing(&html, listing_url, category);
    debug!(%category, count = entries.len(), "re-list parsed");
    Ok(entries)
}

/// Visit an entry's detail page and locate its attachment.
pub async fn resolve<P: Publisher + ?Sized>(publisher: &P, entry: ListingEntry) -> Result<RemoteFile> {
    let html = publisher.get_text(&entry.detail_url).await?;
    let file_url = parse_attachment(&html, &entry.detail_url);
    match &file_url {
        Some(u) => trace!(period = %entry.period, url = %u, "attachment found"),
        None => warn!(period = %entry.period, url = %entry.detail_url, "no attachment on detail page"),
    }
    Ok(RemoteFile {
        category: entry.category,
        period: entry.period,
        detail_url: entry.detail_url,
        file_url,
    })
}
