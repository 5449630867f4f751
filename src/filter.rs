//! Search filter compilation.
//!
//! Turns a user-facing [`FilterSelection`] into the engine's query
//! language: a free-text query, a `filter_by` boolean expression and a
//! `sort_by` clause.
//!
//! Clauses are appended in a fixed order and joined with ` && `:
//!
//! 1. visibility and stock exclusions (always present)
//! 2. seller scoping
//! 3. category membership
//! 4. one clause per attribute with a non-empty selection
//! 5. auctions only
//! 6. the temporal range implied by the sort key
//!
//! Day boundaries for the auction sorts are computed in the store timezone
//! and converted to UTC epoch seconds. The range is inclusive on both ends:
//! `field:[start..end]` with `end` one second before the next local midnight.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Category values that mean "no category selected".
const PLACEHOLDER_CATEGORIES: &[&str] = &["", "Category"];

const BASE_CLAUSES: &[&str] = &["product_visibility:!=hidden", "stock_status:!=outofstock"];

/// Selected term(s) for one attribute. Accepts a bare string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AttributeSelection {
    One(String),
    Many(Vec<String>),
}

impl AttributeSelection {
    fn values(&self) -> Vec<&str> {
        let raw: Vec<&str> = match self {
            AttributeSelection::One(v) => vec![v.as_str()],
            AttributeSelection::Many(vs) => vs.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum SortKey {
    Price,
    PriceDesc,
    AlphaA,
    AlphaZ,
    AuctionStarted,
    AuctionEnd,
    #[default]
    Default,
}

impl SortKey {
    /// Unknown and empty keys fall back to [`SortKey::Default`].
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "price" => SortKey::Price,
            "price-desc" => SortKey::PriceDesc,
            "alpha_a" => SortKey::AlphaA,
            "alpha_z" => SortKey::AlphaZ,
            "auction_started" => SortKey::AuctionStarted,
            "auction_end" => SortKey::AuctionEnd,
            _ => SortKey::Default,
        }
    }

    pub fn sort_clause(&self) -> &'static str {
        match self {
            SortKey::Price => "price:asc",
            SortKey::PriceDesc => "price:desc",
            SortKey::AlphaA | SortKey::Default => "title:asc",
            SortKey::AlphaZ => "title:desc",
            SortKey::AuctionStarted => "auction_dates_from:asc",
            SortKey::AuctionEnd => "auction_dates_to:asc",
        }
    }

    /// Field restricted to today's range, if any.
    fn temporal_field(&self) -> Option<&'static str> {
        match self {
            SortKey::AuctionStarted => Some("auction_dates_from"),
            SortKey::AuctionEnd => Some("auction_dates_to"),
            _ => None,
        }
    }
}

impl From<String> for SortKey {
    fn from(s: String) -> Self {
        SortKey::parse(&s)
    }
}

fn default_page() -> u32 {
    1
}

/// What the user picked in the search UI.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FilterSelection {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeSelection>,
    #[serde(default)]
    pub auctions_only: bool,
    #[serde(default)]
    pub sort: SortKey,
    /// 1-based.
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub seller_id: Option<String>,
}

impl FilterSelection {
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }
}

/// Ordered list of filter clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterExpr {
    clauses: Vec<String>,
}

impl FilterExpr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clause. Blank clauses are ignored.
    pub fn push(&mut self, clause: impl Into<String>) -> &mut Self {
        let clause = clause.into();
        if !clause.trim().is_empty() {
            self.clauses.push(clause);
        }
        self
    }

    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    pub fn build(&self) -> String {
        self.clauses.join(" && ")
    }
}

/// Output of [`FilterCompiler::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub query: String,
    pub filter_by: String,
    pub sort_by: String,
}

#[derive(Debug, Clone)]
pub struct FilterCompiler {
    timezone: Tz,
}

impl FilterCompiler {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn compile(&self, selection: &FilterSelection) -> CompiledQuery {
        self.compile_at(selection, Utc::now())
    }

    /// Compile against a fixed clock.
    pub fn compile_at(&self, selection: &FilterSelection, now: DateTime<Utc>) -> CompiledQuery {
        let mut expr = FilterExpr::new();

        for clause in BASE_CLAUSES {
            expr.push(*clause);
        }

        if let Some(seller) = non_blank(selection.seller_id.as_deref()) {
            expr.push(format!("author:={}", escape_value(seller)));
        }

        if let Some(category) = non_blank(selection.category.as_deref())
            .filter(|c| !PLACEHOLDER_CATEGORIES.contains(c))
        {
            expr.push(format!("categories:=[{}]", escape_value(category)));
        }

        for selected in selection.attributes.values() {
            match selected.values().as_slice() {
                [] => {}
                [one] if matches!(selected, AttributeSelection::One(_)) => {
                    expr.push(format!("attribute_terms:={}", escape_value(one)));
                }
                many => {
                    let joined: Vec<String> = many.iter().map(|v| escape_value(v)).collect();
                    expr.push(format!("attribute_terms:=[{}]", joined.join(",")));
                }
            }
        }

        if selection.auctions_only {
            expr.push("product_type:=auction");
        }

        if let Some(field) = selection.sort.temporal_field() {
            let (start, end) = today_range_utc(self.timezone, now);
            expr.push(format!("{}:[{}..{}]", field, start, end));
        }

        let query = selection.query.trim();
        CompiledQuery {
            query: if query.is_empty() { "*".to_string() } else { query.to_string() },
            filter_by: expr.build(),
            sort_by: selection.sort.sort_clause().to_string(),
        }
    }
}

/// Today's local day in `timezone`, as inclusive UTC epoch bounds:
/// local midnight and one second before the next local midnight.
pub fn today_range_utc(timezone: Tz, now: DateTime<Utc>) -> (i64, i64) {
    let today = now.with_timezone(&timezone).date_naive();
    let start = local_midnight(timezone, today);
    let end = today
        .succ_opt()
        .map(|tomorrow| local_midnight(timezone, tomorrow) - 1)
        .unwrap_or(start + 86_399);
    (start, end)
}

fn local_midnight(timezone: Tz, date: NaiveDate) -> i64 {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    timezone
        .from_local_datetime(&midnight)
        .earliest()
        // Midnight skipped by a DST jump: the day starts when the clock lands.
        .or_else(|| {
            timezone
                .from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Wrap values containing filter syntax in backticks.
fn escape_value(value: &str) -> String {
    const SPECIAL: &[char] = &[',', '(', ')', '[', ']', '&', '|', ':', '`', '!', '<', '>', '='];
    if value.contains(SPECIAL) {
        format!("`{}`", value.replace('`', ""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn full_selection() -> FilterSelection {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "grade".to_string(),
            AttributeSelection::Many(vec!["9.8".to_string()]),
        );
        FilterSelection {
            query: "spiderman".to_string(),
            category: Some("comics".to_string()),
            attributes,
            auctions_only: true,
            sort: SortKey::AuctionStarted,
            page: 1,
            seller_id: None,
        }
    }

    #[test]
    fn full_selection_compiles_every_clause_in_order() {
        let compiler = FilterCompiler::new(chrono_tz::UTC);
        let compiled = compiler.compile_at(&full_selection(), at(2024, 6, 15, 12));

        assert_eq!(compiled.query, "spiderman");
        assert_eq!(compiled.sort_by, "auction_dates_from:asc");
        assert_eq!(
            compiled.filter_by,
            "product_visibility:!=hidden && stock_status:!=outofstock \
             && categories:=[comics] && attribute_terms:=[9.8] \
             && product_type:=auction \
             && auction_dates_from:[1718409600..1718495999]"
        );
    }

    #[test]
    fn day_bounds_shift_by_the_store_offset() {
        // Etc/GMT+5 is UTC-5 with no DST.
        let tz = chrono_tz::Etc::GMTPlus5;
        let naive_utc_midnight = 1_718_409_600; // 2024-06-15T00:00:00Z

        let (start, end) = today_range_utc(tz, at(2024, 6, 15, 12));
        assert_eq!(start, naive_utc_midnight + 5 * 3600);
        assert_eq!(end, start + 86_399);

        // 02:00 UTC on the 16th is still the evening of the 15th locally.
        let (evening_start, _) = today_range_utc(tz, at(2024, 6, 16, 2));
        assert_eq!(evening_start, start);
    }

    #[test]
    fn auction_end_uses_end_field() {
        let compiler = FilterCompiler::new(chrono_tz::Etc::GMTPlus5);
        let selection = FilterSelection {
            sort: SortKey::AuctionEnd,
            ..Default::default()
        };
        let compiled = compiler.compile_at(&selection, at(2024, 6, 15, 12));
        assert_eq!(compiled.sort_by, "auction_dates_to:asc");
        assert!(compiled
            .filter_by
            .ends_with("auction_dates_to:[1718427600..1718513999]"));
    }

    #[test]
    fn dst_day_is_23_hours_long() {
        // US spring forward: 2024-03-10 has no 02:00-03:00.
        let (start, end) = today_range_utc(chrono_tz::America::New_York, at(2024, 3, 10, 17));
        assert_eq!(end - start + 1, 23 * 3600);
    }

    #[test]
    fn default_sort_has_no_temporal_clause() {
        let compiler = FilterCompiler::new(chrono_tz::UTC);
        let compiled = compiler.compile_at(&FilterSelection::default(), at(2024, 6, 15, 12));

        assert_eq!(compiled.sort_by, "title:asc");
        assert_eq!(compiled.query, "*");
        assert_eq!(
            compiled.filter_by,
            "product_visibility:!=hidden && stock_status:!=outofstock"
        );
    }

    #[test]
    fn sort_keys_map_to_clauses() {
        let cases = [
            ("price", "price:asc"),
            ("price-desc", "price:desc"),
            ("alpha_a", "title:asc"),
            ("alpha_z", "title:desc"),
            ("", "title:asc"),
            ("menu_order", "title:asc"),
        ];
        for (key, clause) in cases {
            assert_eq!(SortKey::parse(key).sort_clause(), clause, "key {:?}", key);
        }
    }

    #[test]
    fn placeholder_category_and_empty_attributes_are_skipped() {
        let mut attributes = BTreeMap::new();
        attributes.insert("grade".to_string(), AttributeSelection::Many(vec![]));
        attributes.insert("era".to_string(), AttributeSelection::One("  ".to_string()));
        let selection = FilterSelection {
            category: Some("Category".to_string()),
            attributes,
            ..Default::default()
        };

        let compiled = FilterCompiler::new(chrono_tz::UTC).compile_at(&selection, at(2024, 1, 1, 0));
        assert!(!compiled.filter_by.contains("categories"));
        assert!(!compiled.filter_by.contains("attribute_terms"));
    }

    #[test]
    fn seller_and_single_attribute_clauses() {
        let mut attributes = BTreeMap::new();
        attributes.insert("publisher".to_string(), AttributeSelection::One("Marvel".to_string()));
        attributes.insert(
            "grade".to_string(),
            AttributeSelection::Many(vec!["9.8".to_string(), "9.6".to_string()]),
        );
        let selection = FilterSelection {
            seller_id: Some("17".to_string()),
            category: Some("Comics, Vintage".to_string()),
            attributes,
            ..Default::default()
        };

        let compiled = FilterCompiler::new(chrono_tz::UTC).compile_at(&selection, at(2024, 1, 1, 0));
        assert_eq!(
            compiled.filter_by,
            "product_visibility:!=hidden && stock_status:!=outofstock && author:=17 \
             && categories:=[`Comics, Vintage`] && attribute_terms:=[9.8,9.6] \
             && attribute_terms:=Marvel"
        );
    }

    #[test]
    fn selection_deserializes_from_request_payload() {
        let selection: FilterSelection = serde_json::from_value(serde_json::json!({
            "query": "hulk",
            "attributes": {"grade": ["9.8"], "publisher": "Marvel"},
            "sort": "price-desc",
            "page": 0
        }))
        .unwrap();

        assert_eq!(selection.sort, SortKey::PriceDesc);
        assert_eq!(selection.page(), 1);
        assert_eq!(
            selection.attributes["publisher"],
            AttributeSelection::One("Marvel".to_string())
        );
        assert!(!selection.auctions_only);
    }

    #[test]
    fn expr_builder_joins_non_blank_clauses() {
        let mut expr = FilterExpr::new();
        expr.push("a:=1").push("  ").push("b:=2");
        assert_eq!(expr.clauses().len(), 2);
        assert_eq!(expr.build(), "a:=1 && b:=2");
        assert_eq!(FilterExpr::new().build(), "");
    }
}
