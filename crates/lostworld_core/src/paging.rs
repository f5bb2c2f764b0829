use std::future::Future;

use tracing::{debug, warn};

use crate::errors::TrackerError;

pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProgress {
    /// Offset of the next page that would be requested.
    pub next_offset: usize,
    pub collected: usize,
    pub upper_bound: Option<usize>,
}

/// Drives offset-based pagination until a short page comes back, the offset
/// reaches `upper_bound`, or a page starts with the same item as the page
/// before it. A page that does not advance is discarded. Pages are appended
/// in request order.
pub async fn collect_all<T, F, Fut, P>(
    page_size: usize,
    upper_bound: Option<usize>,
    mut fetch_page: F,
    mut on_page: P,
) -> Result<Vec<T>, TrackerError>
where
    T: PartialEq,
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<T>, TrackerError>>,
    P: FnMut(PageProgress),
{
    if page_size == 0 {
        return Err(TrackerError::InvalidConfig(
            "page size must be greater than 0".into(),
        ));
    }

    let mut items: Vec<T> = Vec::new();
    let mut offset = 0usize;
    let mut previous_start: Option<usize> = None;
    loop {
        if upper_bound.is_some_and(|bound| offset >= bound) {
            break;
        }
        let page = fetch_page(offset, page_size).await?;
        let received = page.len();
        debug!(offset, received, "fetched page");
        let repeated = previous_start
            .and_then(|start| items.get(start))
            .is_some_and(|first| page.first() == Some(first));
        if repeated {
            warn!(offset, "page did not advance, stopping pagination");
            break;
        }
        if received > 0 {
            previous_start = Some(items.len());
        }
        items.extend(page);
        offset += page_size;
        on_page(PageProgress {
            next_offset: offset,
            collected: items.len(),
            upper_bound,
        });
        if received < page_size {
            break;
        }
    }
    Ok(items)
}
