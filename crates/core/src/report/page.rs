use crate::model::PageSize;

/// One page of report rows plus the total before paging.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPage<T> {
    pub rows: Vec<T>,
    pub total: usize,
    /// Zero-based page index actually returned.
    pub page: usize,
    pub page_size: PageSize,
}

impl<T> ReportPage<T> {
    /// Slices `rows` to page `page`; out-of-range pages clamp to the last one.
    #[must_use]
    pub fn slice(rows: Vec<T>, page: usize, page_size: PageSize) -> Self {
        let total = rows.len();
        let size = usize::from(page_size.value());
        let last_page = total.saturating_sub(1) / size;
        let page = page.min(last_page);
        let rows = rows.into_iter().skip(page * size).take(size).collect();
        Self {
            rows,
            total,
            page,
            page_size,
        }
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.total.div_ceil(usize::from(self.page_size.value()))
    }
}
