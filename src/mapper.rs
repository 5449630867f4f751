//! Catalog item → search document transform.
//!
//! [`DocumentMapper::map`] is pure: it does no I/O and either returns a
//! complete [`IndexedDocument`] or a [`TransformError`] naming the offending
//! field. Empty source values become absent fields, never `null`.
//!
//! Auction timestamps arrive as catalog strings. RFC 3339 values carry
//! their own offset; naive values (`2024-05-01 10:00:00`, `2024-05-01`) are
//! read in the store timezone before conversion to epoch seconds.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::collections::HashSet;

use crate::error::TransformError;
use crate::models::{CatalogItem, IndexedDocument};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

#[derive(Debug, Clone)]
pub struct DocumentMapper {
    timezone: Tz,
}

impl DocumentMapper {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn map(&self, item: &CatalogItem) -> Result<IndexedDocument, TransformError> {
        // The id is used verbatim: it must match the catalog's own key or the
        // indexed flag would never line up with the item.
        let id = item.id.as_str();
        if id.trim().is_empty() {
            return Err(TransformError::MissingId);
        }

        let price = finite(item.price, id, "price")?;

        let mut doc = IndexedDocument {
            id: id.to_string(),
            title: item.title.clone(),
            description: non_empty(&item.description),
            short_description: non_empty(&item.short_description),
            price,
            categories: dedup(&item.categories),
            attribute_terms: dedup(&item.attribute_terms),
            product_type: item.kind.as_str().to_string(),
            product_visibility: item.visibility.clone(),
            stock_status: item.stock_status.clone(),
            author: item.author.as_deref().and_then(non_empty),
            publish_date: item.created_at.timestamp(),
            auction_dates_from: None,
            auction_dates_to: None,
            auction_start_price: None,
            auction_has_started: None,
            product_image_url: item.image_url.as_deref().and_then(non_empty),
            product_image_html: item.image_html.as_deref().and_then(non_empty),
        };

        if item.kind.is_auction() {
            let auction = &item.auction;
            doc.auction_dates_from =
                self.timestamp(auction.dates_from.as_deref(), id, "auction_dates_from")?;
            doc.auction_dates_to =
                self.timestamp(auction.dates_to.as_deref(), id, "auction_dates_to")?;
            doc.auction_start_price = finite(auction.start_price, id, "auction_start_price")?;
            doc.auction_has_started = auction.has_started;
        }

        Ok(doc)
    }

    fn timestamp(
        &self,
        value: Option<&str>,
        item_id: &str,
        field: &'static str,
    ) -> Result<Option<i64>, TransformError> {
        let raw = match value.map(str::trim) {
            None | Some("") => return Ok(None),
            Some(raw) => raw,
        };

        parse_timestamp(raw, self.timezone)
            .map(Some)
            .ok_or_else(|| TransformError::InvalidTimestamp {
                item_id: item_id.to_string(),
                field,
                value: raw.to_string(),
            })
    }
}

/// Parse a catalog timestamp into epoch seconds.
pub fn parse_timestamp(raw: &str, timezone: Tz) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return Some(secs);
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.timestamp()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp()),
        // Wall-clock time skipped by a DST jump; use the instant the jump lands on.
        LocalResult::None => timezone
            .from_local_datetime(&(naive + chrono::Duration::hours(1)))
            .earliest()
            .map(|dt| dt.timestamp()),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn finite(
    value: Option<f64>,
    item_id: &str,
    field: &'static str,
) -> Result<Option<f64>, TransformError> {
    match value {
        Some(v) if !v.is_finite() => Err(TransformError::InvalidNumber {
            item_id: item_id.to_string(),
            field,
        }),
        other => Ok(other),
    }
}

/// Drop duplicates and blanks, keeping first-seen order.
fn dedup(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .iter()
        .filter(|v| !v.trim().is_empty())
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect()
}
