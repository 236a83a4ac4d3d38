use serde::Serialize;

/// One page of a longer sequence. `page` is 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    start: usize,
}

impl<T> Page<T> {
    /// 1-indexed position of the first and last item shown, `None` when empty.
    pub fn showing(&self) -> Option<(usize, usize)> {
        if self.items.is_empty() {
            None
        } else {
            Some((self.start + 1, self.start + self.items.len()))
        }
    }

    pub fn describe(&self) -> String {
        match self.showing() {
            Some((first, last)) => {
                format!("Showing plays {} to {} of {}", first, last, self.total_items)
            }
            None => "No plays to display".to_string(),
        }
    }
}

/// Number of pages needed for `len` items, never less than one.
pub fn total_pages(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size.max(1)).max(1)
}

/// Slices `items` into the requested 1-indexed page. Page 0 reads as page 1
/// and pages past the end clamp to the last page. A zero page size is treated
/// as one.
pub fn paginate<T: Clone>(items: &[T], page_size: usize, page: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_pages = total_pages(items.len(), page_size);
    let page = page.clamp(1, total_pages);

    let start = (page - 1) * page_size;
    let end = (start + page_size).min(items.len());
    Page {
        items: items[start.min(end)..end].to_vec(),
        page,
        total_pages,
        total_items: items.len(),
        start,
    }
}
