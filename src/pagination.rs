//! Page arithmetic for the topic listing.

/// Number of pages needed for `total_rows` at `per_page` rows each.
/// Zero rows yield zero pages.
pub fn total_pages(total_rows: i64, per_page: i64) -> i64 {
    if total_rows <= 0 || per_page <= 0 {
        return 0;
    }
    if total_rows % per_page == 0 {
        total_rows / per_page
    } else {
        total_rows / per_page + 1
    }
}

/// Clamps a requested page into `1..=last_page` (or 1 when there are no pages).
pub fn clamp_page(requested: i64, last_page: i64) -> i64 {
    requested.clamp(1, last_page.max(1))
}

pub fn offset(page: i64, per_page: i64) -> i64 {
    (page.max(1) - 1).saturating_mul(per_page)
}

/// One entry of the pager shown under the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub number: i64,
    pub current: bool,
}

pub fn page_links(current: i64, last_page: i64) -> Vec<PageLink> {
    (1..=last_page).map(|number| PageLink { number, current: number == current }).collect()
}
