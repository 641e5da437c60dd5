//! Link Header Pagination
//!
//! List endpoints return one page per request and point at the next page
//! with a `Link: <url>; rel="next"` header.

use std::marker::PhantomData;

use reqwest::Method;
use reqwest::header::LINK;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::RestError;
use super::gateway::{RestGateway, decode};

/// Page cursor over a list endpoint.
#[derive(Debug)]
pub struct Paginator<T> {
    gateway: RestGateway,
    next: Option<String>,
    query: Option<Value>,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Paginator<T> {
    /// Paginator starting at `path` with optional query parameters.
    #[must_use]
    pub fn new(gateway: RestGateway, path: &str, query: Option<Value>) -> Self {
        let next = Some(gateway.url(path));
        Self {
            gateway,
            next,
            query,
            _item: PhantomData,
        }
    }

    /// Fetch the next page, `None` once the last page was returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the page does not match `T`.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>, RestError> {
        let Some(url) = self.next.take() else {
            return Ok(None);
        };

        // Only the first request carries the caller's query; next links
        // embed their own.
        let query = self.query.take();
        let response = self
            .gateway
            .send(Method::GET, &url, query.as_ref(), None::<&()>)
            .await?;

        self.next = response
            .headers()
            .get_all(LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(next_link);

        let page: Vec<T> = decode(response).await?;
        tracing::debug!(url = %url, items = page.len(), has_next = self.next.is_some(), "Fetched page");

        if page.is_empty() {
            self.next = None;
            return Ok(None);
        }

        Ok(Some(page))
    }

    /// Check if another page may be available.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// Fetch every remaining page into one list.
    ///
    /// # Errors
    ///
    /// Returns the first request error.
    pub async fn collect_all(mut self) -> Result<Vec<T>, RestError> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}

/// URL of the `rel="next"` entry of a `Link` header value.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });

        if !is_next {
            return None;
        }

        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_next_among_prev_and_next() {
        let header = r#"<https://example.social/api/v1/timelines/public?max_id=10>; rel="next", <https://example.social/api/v1/timelines/public?min_id=20>; rel="prev""#;
        assert_eq!(
            next_link(header).as_deref(),
            Some("https://example.social/api/v1/timelines/public?max_id=10")
        );
    }

    #[test]
    fn no_next_entry() {
        let header = r#"<https://example.social/api/v1/timelines/public?min_id=20>; rel="prev""#;
        assert!(next_link(header).is_none());
    }

    #[test]
    fn unquoted_rel() {
        assert_eq!(
            next_link("<https://a/b?page=2>; rel=next").as_deref(),
            Some("https://a/b?page=2")
        );
    }
}
