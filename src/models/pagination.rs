use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use utoipa::IntoParams;

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 100;

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// `?page=&limit=` query; pages start at 1.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct Pagination {
    /// Page number, starting at 1.
    pub page: Option<u32>,
    /// Items per page, at most 100.
    pub limit: Option<u32>,
}

impl Pagination {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> usize {
        (self.page() as usize - 1) * self.limit() as usize
    }

    /// Slice an already filtered list; returns the page and the total.
    pub fn apply<T>(&self, items: Vec<T>) -> (Vec<T>, usize) {
        let total = items.len();
        let page = items.into_iter().skip(self.offset()).take(self.limit() as usize).collect();
        (page, total)
    }
}

pub fn total_count_headers(total: usize) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static(TOTAL_COUNT_HEADER), HeaderValue::from(total as u64));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_bounds() {
        let pagination = Pagination::default();
        assert_eq!(pagination.page(), 1);
        assert_eq!(pagination.limit(), 20);

        let oversized = Pagination { page: Some(0), limit: Some(1_000) };
        assert_eq!(oversized.page(), 1);
        assert_eq!(oversized.limit(), 100);
    }

    #[test]
    fn apply_slices_and_reports_total() {
        let pagination = Pagination { page: Some(2), limit: Some(3) };
        let (items, total) = pagination.apply((1..=7).collect::<Vec<_>>());
        assert_eq!(items, vec![4, 5, 6]);
        assert_eq!(total, 7);
    }
}
