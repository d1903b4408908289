use std::{collections::HashMap, ops::Range};

use crate::models::Car;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageParams {
    pub page: u64,
    pub limit: u64,
}

impl PageParams {
    /// Bad input falls back to defaults instead of failing the request.
    pub fn parse(page: Option<&str>, limit: Option<&str>, default_limit: u64, max_limit: u64) -> Self {
        let page = positive(page).unwrap_or(1);
        let limit = positive(limit).unwrap_or(default_limit).min(max_limit);

        Self { page, limit }
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

fn positive(value: Option<&str>) -> Option<u64> {
    value?.trim().parse::<u64>().ok().filter(|&n| n >= 1)
}

/// Index range of `page` within `len` items, empty past the end.
pub fn page_window(len: usize, params: PageParams) -> Range<usize> {
    let start = usize::try_from(params.skip()).unwrap_or(usize::MAX).min(len);
    let limit = usize::try_from(params.limit).unwrap_or(usize::MAX);

    start..start.saturating_add(limit).min(len)
}

/// Reorders a batched fetch to follow `ids`.
///
/// Ids without a record are skipped, the second value counts them.
pub fn order_by_ids(ids: &[String], records: Vec<Car>) -> (Vec<Car>, usize) {
    let mut by_id: HashMap<String, Car> = records
        .into_iter()
        .map(|car| (car.id.clone(), car))
        .collect();

    let ordered: Vec<Car> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
    let dropped = ids.len() - ordered.len();

    (ordered, dropped)
}
