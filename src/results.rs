//! Engine hits → displayable result page.
//!
//! Hit order is authoritative. Hits whose id no longer resolves to a
//! catalog item are dropped, but `total` and `total_pages` keep the
//! engine's reported count so pagination stays stable.

use serde::Serialize;
use std::collections::HashSet;

use crate::engine::SearchResponse;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultPage {
    /// Catalog ids in engine order.
    pub items: Vec<String>,
    pub total: u64,
    pub total_pages: u64,
    pub current_page: u32,
}

impl ResultPage {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Ids of every hit, in order.
pub fn hit_ids(response: &SearchResponse) -> Vec<String> {
    response.hits.iter().map(|h| h.document.id.clone()).collect()
}

pub fn map_results(
    response: &SearchResponse,
    requested_page: u32,
    per_page: u32,
    known: &HashSet<String>,
) -> ResultPage {
    let items = response
        .hits
        .iter()
        .map(|h| &h.document.id)
        .filter(|id| known.contains(*id))
        .cloned()
        .collect();

    let total_pages = if per_page == 0 {
        0
    } else {
        response.found.div_ceil(u64::from(per_page))
    };

    ResultPage {
        items,
        total: response.found,
        total_pages,
        current_page: requested_page.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{HitDocument, SearchHit};

    fn response(found: u64, ids: &[&str]) -> SearchResponse {
        SearchResponse {
            found,
            hits: ids
                .iter()
                .map(|id| SearchHit {
                    document: HitDocument { id: id.to_string() },
                })
                .collect(),
        }
    }

    #[test]
    fn deleted_items_drop_without_changing_total() {
        let resp = response(3, &["30", "20", "10"]);
        let known: HashSet<String> = ["30", "10"].iter().map(|s| s.to_string()).collect();

        let page = map_results(&resp, 1, 48, &known);
        assert_eq!(page.items, vec!["30", "10"]);
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.current_page, 1);
    }

    #[test]
    fn total_pages_rounds_up() {
        let resp = response(97, &[]);
        let page = map_results(&resp, 3, 48, &HashSet::new());
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.current_page, 3);
        assert!(page.is_empty());

        assert_eq!(map_results(&response(96, &[]), 1, 48, &HashSet::new()).total_pages, 2);
        assert_eq!(map_results(&response(0, &[]), 0, 48, &HashSet::new()).total_pages, 0);
    }

    #[test]
    fn hit_ids_keep_engine_order() {
        assert_eq!(hit_ids(&response(2, &["b", "a"])), vec!["b", "a"]);
    }
}
