//! Flattens a cursor-linked listing into a single vector of items.
use crate::error::{Error, Result};
use serde::Deserialize;
use tracing::debug;

/// Links reported by one page of a listing.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct PageCursor {
    #[serde(rename = "@id")]
    pub this: String,
    pub first: String,
    pub last: String,
    pub next: String,
}

#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: PageCursor,
}

pub trait PageFetcher {
    type Item;

    async fn fetch_page(&self, url: &str) -> Result<Page<Self::Item>>;
}

/// Walks every page starting at `initial_url`.
///
/// Stops on an empty page, or when the page reports itself as `last` or
/// `next`. A page with items but no `next` link is an error rather than a
/// silent truncation.
pub async fn fetch_all<F: PageFetcher>(initial_url: &str, fetcher: &F) -> Result<Vec<F::Item>> {
    let mut items = Vec::new();
    let mut url = initial_url.to_string();

    loop {
        let page = fetcher.fetch_page(&url).await?;
        debug!(%url, count = page.items.len(), "fetched page");

        if page.items.is_empty() {
            break;
        }
        items.extend(page.items);

        if page.cursor.last == url || page.cursor.next == url {
            break;
        }
        url = page.cursor.next;
        if url.is_empty() {
            return Err(Error::Protocol("no next URL".to_string()));
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct FakePages {
        pages: HashMap<String, (Vec<u32>, PageCursor)>,
        requested: RefCell<Vec<String>>,
    }

    impl FakePages {
        fn new(pages: Vec<(&str, Vec<u32>, &str, &str)>) -> Self {
            let pages = pages
                .into_iter()
                .map(|(url, items, next, last)| {
                    let cursor = PageCursor {
                        this: url.to_string(),
                        first: "p0".to_string(),
                        last: last.to_string(),
                        next: next.to_string(),
                    };
                    (url.to_string(), (items, cursor))
                })
                .collect();
            Self {
                pages,
                requested: RefCell::new(Vec::new()),
            }
        }

        fn fetches(&self) -> usize {
            self.requested.borrow().len()
        }
    }

    impl PageFetcher for FakePages {
        type Item = u32;

        async fn fetch_page(&self, url: &str) -> Result<Page<u32>> {
            self.requested.borrow_mut().push(url.to_string());
            let (items, cursor) = self
                .pages
                .get(url)
                .cloned()
                .ok_or_else(|| Error::Protocol(format!("no such page {url}")))?;
            Ok(Page { items, cursor })
        }
    }

    #[tokio::test]
    async fn test_stops_at_last_page() {
        let fetcher = FakePages::new(vec![
            ("p0", vec![1, 2], "p1", "p2"),
            ("p1", vec![3, 4], "p2", "p2"),
            ("p2", vec![5], "", "p2"),
        ]);
        let items = fetch_all("p0", &fetcher).await.unwrap();
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        assert_eq!(fetcher.fetches(), 3);
    }

    #[tokio::test]
    async fn test_self_referencing_next_terminates() {
        // The final page never reports itself as last, only echoes its own URL.
        let fetcher = FakePages::new(vec![
            ("p0", vec![1], "p1", "elsewhere"),
            ("p1", vec![2], "p1", "elsewhere"),
        ]);
        let items = fetch_all("p0", &fetcher).await.unwrap();
        assert_eq!(items, vec![1, 2]);
        assert!(fetcher.fetches() <= 3);
        assert_eq!(fetcher.requested.borrow().as_slice(), ["p0", "p1"]);
    }

    #[tokio::test]
    async fn test_empty_page_terminates() {
        let fetcher = FakePages::new(vec![
            ("p0", vec![1], "p1", "p9"),
            ("p1", vec![], "p2", "p9"),
        ]);
        let items = fetch_all("p0", &fetcher).await.unwrap();
        assert_eq!(items, vec![1]);
        assert_eq!(fetcher.fetches(), 2);
    }

    #[tokio::test]
    async fn test_missing_next_is_protocol_error() {
        let fetcher = FakePages::new(vec![
            ("p0", vec![1], "p1", "p2"),
            ("p1", vec![2], "", "p2"),
        ]);
        let err = fetch_all("p0", &fetcher).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ref msg) if msg == "no next URL"));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        let fetcher = FakePages::new(vec![("p0", vec![1], "missing", "p9")]);
        let err = fetch_all("p0", &fetcher).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
