//! Following `Link: rel="next"` across list endpoints.

use std::sync::atomic::{AtomicBool, Ordering};

use super::client::GitHubClient;
use super::error::GitHubApiError;
use super::request::{ApiRequest, ApiResponse};

/// Passed to the page callback; calling [`PageControl::stop`] ends
/// pagination after the current page.
#[derive(Debug, Default)]
pub struct PageControl {
    stopped: AtomicBool,
}

impl PageControl {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }
}

impl GitHubClient {
    /// Fetches `request` and every following page, mapping each page with
    /// `on_page` and concatenating the results in page order.
    ///
    /// Every page goes through [`GitHubClient::request`], so pages are
    /// limited and intercepted like any other call. If any page fails the
    /// error is returned and results collected so far are dropped.
    pub async fn paginate<T, F>(
        &self,
        request: ApiRequest,
        mut on_page: F,
    ) -> Result<Vec<T>, GitHubApiError>
    where
        F: FnMut(&ApiResponse, &PageControl) -> Vec<T>,
    {
        let control = PageControl::default();
        let mut results = Vec::new();
        let mut response = self.request(request).await?;

        loop {
            results.extend(on_page(&response, &control));
            if control.is_stopped() {
                break;
            }
            match self.get_next_page(&response).await? {
                Some(next) => response = next,
                None => break,
            }
        }

        Ok(results)
    }

    /// Collects the items of every page; see [`ApiResponse::items`].
    pub async fn paginate_items(
        &self,
        request: ApiRequest,
    ) -> Result<Vec<serde_json::Value>, GitHubApiError> {
        self.paginate(request, |response, _| response.items()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::ClientConfig;
    use crate::test_utils::{MockTransport, token_client};
    use http::header::LINK;
    use serde_json::json;
    use std::sync::Arc;

    /// Serves `pages` pages of `[page*10, page*10+1]`, linking each to the
    /// next via `?page=N`.
    fn paged_transport(pages: u32, fail_on: Option<u32>) -> Arc<MockTransport> {
        Arc::new(MockTransport::new(move |request| {
            let url = request.url()?;
            let page: u32 = url
                .split("page=")
                .nth(1)
                .and_then(|p| p.parse().ok())
                .unwrap_or(1);
            if fail_on == Some(page) {
                return Ok(ApiResponse::new(502, json!({ "message": "Bad Gateway" })));
            }
            let mut response = ApiResponse::new(200, json!([page * 10, page * 10 + 1]));
            if page < pages {
                response = response.with_header(
                    LINK,
                    &format!(
                        "<https://api.github.com/items?page={}>; rel=\"next\", \
                         <https://api.github.com/items?page={}>; rel=\"last\"",
                        page + 1,
                        pages
                    ),
                );
            }
            Ok(response)
        }))
    }

    #[tokio::test]
    async fn concatenates_all_pages_in_order() {
        let transport = paged_transport(3, None);
        let client = token_client(transport.clone(), ClientConfig::unthrottled());

        let items = client.paginate_items(ApiRequest::get("/items")).await.unwrap();

        assert_eq!(
            items,
            vec![json!(10), json!(11), json!(20), json!(21), json!(30), json!(31)]
        );
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn single_page_without_link() {
        let transport = paged_transport(1, None);
        let client = token_client(transport.clone(), ClientConfig::unthrottled());

        let items = client.paginate_items(ApiRequest::get("/items")).await.unwrap();

        assert_eq!(items, vec![json!(10), json!(11)]);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn stop_prevents_fetching_next_page() {
        let transport = paged_transport(5, None);
        let client = token_client(transport.clone(), ClientConfig::unthrottled());

        let mut seen = 0;
        let pages = client
            .paginate(ApiRequest::get("/items"), |response, control| {
                seen += 1;
                if seen == 2 {
                    control.stop();
                }
                vec![response.data.clone()]
            })
            .await
            .unwrap();

        assert_eq!(pages, vec![json!([10, 11]), json!([20, 21])]);
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn failure_discards_partial_results() {
        let transport = paged_transport(4, Some(3));
        let client = token_client(transport.clone(), ClientConfig::unthrottled());

        let err = client.paginate_items(ApiRequest::get("/items")).await.unwrap_err();

        assert_eq!(err.status_code, Some(502));
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn follows_absolute_next_links() {
        let transport = paged_transport(2, None);
        let client = token_client(transport.clone(), ClientConfig::unthrottled());

        client.paginate_items(ApiRequest::get("/items")).await.unwrap();

        let urls: Vec<String> = transport
            .requests()
            .iter()
            .map(|r| r.url().unwrap())
            .collect();
        assert_eq!(urls, vec!["/items", "https://api.github.com/items?page=2"]);
    }

    #[tokio::test]
    async fn has_next_page_reads_link_header() {
        let client = token_client(paged_transport(2, None), ClientConfig::unthrottled());
        let first = client.request(ApiRequest::get("/items")).await.unwrap();
        assert!(client.has_next_page(&first));

        let second = client.get_next_page(&first).await.unwrap().unwrap();
        assert!(!client.has_next_page(&second));
        assert!(client.get_next_page(&second).await.unwrap().is_none());
    }
}
