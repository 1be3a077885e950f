//! Slicing ranked lists into pages.

use serde::Serialize;

/// One page of a longer list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Page<T> {
    /// The number of items in the whole list.
    pub total: usize,
    /// The page size.
    pub limit: usize,
    /// The page number that was requested, starting at 1.
    pub page: usize,
    /// The items on this page.
    pub items: Vec<T>,
}

/// Resolve the `page` query parameter into a page number.
///
/// Leading digits are read and anything after them is ignored, so `"2abc"` is
/// page 2. A missing, unreadable, zero, or negative value is page 1.
pub fn resolve_page(raw: Option<&str>) -> usize {
    let Some(raw) = raw else { return 1 };
    let trimmed = raw.trim_start();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: String = unsigned.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<usize>().ok().filter(|page| *page > 0).unwrap_or(1)
}

/// Take page `page` of `items`, `limit` items per page.
///
/// A page that starts past the end of the list is answered with the first
/// page's items, while still reporting the requested page number. A page that
/// starts exactly at the end is empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, limit: usize) -> Page<T> {
    let page = page.max(1);
    let total = items.len();

    let mut start = (page - 1).saturating_mul(limit);
    let mut end = page.saturating_mul(limit);
    if start > total {
        start = 0;
        end = limit;
    }
    let end = end.min(total);

    Page {
        total,
        limit,
        page,
        items: items[start..end].to_vec(),
    }
}
