//! Request and response values passed through the client pipeline.
//!
//! Requests use route templates in the style of GitHub's REST documentation,
//! e.g. `/repos/{owner}/{repo}/issues/{issue_number}/comments`. Placeholders
//! are filled from the request's params; whatever params remain become the
//! query string (GET and HEAD) or the JSON body (every other method).
//!
//! This lets the parameter maps built by [`crate::context::Context`] flow
//! straight into a request.

use http::header::{HeaderMap, HeaderName, HeaderValue, LINK};
use http::Method;
use serde_json::{Map, Value};

use super::error::GitHubApiError;

/// Request parameters keyed by name.
pub type Params = Map<String, Value>;

/// An outgoing REST request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Route template or absolute URL.
    pub route: String,
    pub params: Params,
    /// Explicit JSON body. When set, leftover params are not sent as a body.
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl ApiRequest {
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            method,
            route: route.into(),
            params: Params::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(route: impl Into<String>) -> Self {
        Self::new(Method::GET, route)
    }

    pub fn post(route: impl Into<String>) -> Self {
        Self::new(Method::POST, route)
    }

    pub fn patch(route: impl Into<String>) -> Self {
        Self::new(Method::PATCH, route)
    }

    pub fn put(route: impl Into<String>) -> Self {
        Self::new(Method::PUT, route)
    }

    pub fn delete(route: impl Into<String>) -> Self {
        Self::new(Method::DELETE, route)
    }

    /// Sets a single param.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Merges `params` into the request; incoming values win.
    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Returns true if leftover params belong in the query string.
    fn params_in_query(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }

    /// Expands the route template and appends the query string.
    ///
    /// The result is relative (`/repos/o/r`) for route templates and absolute
    /// for absolute routes such as pagination links.
    pub fn url(&self) -> Result<String, GitHubApiError> {
        let (path, leftover) = expand_route(&self.route, &self.params)?;

        if !self.params_in_query() || leftover.is_empty() {
            return Ok(path);
        }

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in &leftover {
            if let Some(rendered) = query_value(value) {
                query.append_pair(name, &rendered);
            }
        }
        let query = query.finish();
        if query.is_empty() {
            return Ok(path);
        }

        let separator = if path.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}", path, separator, query))
    }

    /// Returns the JSON body to send, if any.
    pub fn json_body(&self) -> Result<Option<Value>, GitHubApiError> {
        if let Some(body) = &self.body {
            return Ok(Some(body.clone()));
        }
        if self.params_in_query() {
            return Ok(None);
        }

        let (_, leftover) = expand_route(&self.route, &self.params)?;
        if leftover.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Value::Object(leftover)))
        }
    }

    /// Returns the URL for log lines, falling back to the raw route.
    pub fn display_url(&self) -> String {
        self.url().unwrap_or_else(|_| self.route.clone())
    }
}

/// Fills `{name}` placeholders from `params`, returning the path and the
/// params that were not consumed.
fn expand_route(route: &str, params: &Params) -> Result<(String, Params), GitHubApiError> {
    let mut leftover = params.clone();
    let mut path = String::with_capacity(route.len());
    let mut rest = route;

    while let Some(open) = rest.find('{') {
        path.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            GitHubApiError::invalid_request(format!("unterminated placeholder in route {}", route))
        })?;
        let name = &after[..close];

        let value = leftover.remove(name).ok_or_else(|| {
            GitHubApiError::invalid_request(format!("missing param '{}' for route {}", name, route))
        })?;
        let rendered = path_value(&value).ok_or_else(|| {
            GitHubApiError::invalid_request(format!(
                "param '{}' must be a string or number, got {}",
                name, value
            ))
        })?;
        path.push_str(&encode_path(&rendered));

        rest = &after[close + 1..];
    }
    path.push_str(rest);

    Ok((path, leftover))
}

fn path_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Renders a query value. Arrays are comma-joined; nulls are skipped.
fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(query_value)
                .collect::<Vec<_>>()
                .join(","),
        ),
        other => Some(other.to_string()),
    }
}

/// Percent-encodes a path value, keeping `/` so file paths stay readable.
fn encode_path(value: &str) -> String {
    value
        .split('/')
        .map(urlencoding::encode)
        .collect::<Vec<_>>()
        .join("/")
}

/// A REST response. Any HTTP status may appear here; the client turns
/// error statuses into [`GitHubApiError`] before callers see them.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub data: Value,
}

impl ApiResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            data,
        }
    }

    /// Adds a header. Invalid values are ignored.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Returns true for 2xx and 3xx statuses.
    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Returns the URL of the `Link` header entry with the given `rel`.
    pub fn link(&self, rel: &str) -> Option<String> {
        let header = self.headers.get(LINK)?.to_str().ok()?;
        parse_link_header(header, rel)
    }

    /// Returns the URL of the next page, if there is one.
    pub fn next_page_url(&self) -> Option<String> {
        self.link("next")
    }

    /// The items on this page.
    ///
    /// List endpoints return a bare array. Search and installation listings
    /// wrap the array in an object (`{"total_count": 2, "items": [...]}`), in
    /// which case the first array-valued field is used. Anything else is a
    /// single item.
    pub fn items(&self) -> Vec<Value> {
        match &self.data {
            Value::Array(items) => items.clone(),
            Value::Object(fields) => fields
                .values()
                .find_map(|v| v.as_array().cloned())
                .unwrap_or_else(|| vec![self.data.clone()]),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }
}

/// Finds the URL for `rel` in a `Link` header such as
/// `<https://api.github.com/x?page=2>; rel="next", <...?page=5>; rel="last"`.
fn parse_link_header(header: &str, rel: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let url = target.strip_prefix('<')?.strip_suffix('>')?;

        let matches = parts.any(|param| {
            let param = param.trim();
            param
                .strip_prefix("rel=")
                .map(|value| value.trim_matches('"').split_whitespace().any(|r| r == rel))
                .unwrap_or(false)
        });

        matches.then(|| url.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn expands_placeholders() {
        let request = ApiRequest::get("/repos/{owner}/{repo}/issues/{issue_number}")
            .params(params(json!({ "owner": "octocat", "repo": "hello", "issue_number": 5 })));
        assert_eq!(request.url().unwrap(), "/repos/octocat/hello/issues/5");
    }

    #[test]
    fn leftover_params_go_to_query_for_get() {
        let request = ApiRequest::get("/repos/{owner}/{repo}/issues")
            .params(params(json!({
                "owner": "o",
                "repo": "r",
                "labels": ["bug", "help wanted"],
                "per_page": 100,
                "since": null
            })));
        let url = request.url().unwrap();
        assert!(url.starts_with("/repos/o/r/issues?"));
        assert!(url.contains("labels=bug%2Chelp+wanted"));
        assert!(url.contains("per_page=100"));
        assert!(!url.contains("since"));
        assert_eq!(request.json_body().unwrap(), None);
    }

    #[test]
    fn leftover_params_go_to_body_for_post() {
        let request = ApiRequest::post("/repos/{owner}/{repo}/issues/{issue_number}/comments")
            .params(params(json!({ "owner": "o", "repo": "r", "issue_number": 3, "body": "hi" })));
        assert_eq!(request.url().unwrap(), "/repos/o/r/issues/3/comments");
        assert_eq!(request.json_body().unwrap(), Some(json!({ "body": "hi" })));
    }

    #[test]
    fn explicit_body_wins() {
        let request = ApiRequest::patch("/repos/{owner}/{repo}")
            .params(params(json!({ "owner": "o", "repo": "r", "ignored": 1 })))
            .body(json!({ "private": true }));
        assert_eq!(request.json_body().unwrap(), Some(json!({ "private": true })));
    }

    #[test]
    fn path_values_keep_slashes() {
        let request = ApiRequest::get("/repos/{owner}/{repo}/contents/{path}")
            .params(params(json!({ "owner": "o", "repo": "r", "path": ".github/my app.yml" })));
        assert_eq!(
            request.url().unwrap(),
            "/repos/o/r/contents/.github/my%20app.yml"
        );
    }

    #[test]
    fn missing_param_is_invalid_request() {
        let err = ApiRequest::get("/repos/{owner}/{repo}").url().unwrap_err();
        assert_eq!(err.kind, crate::github::GitHubErrorKind::InvalidRequest);
        assert!(err.message.contains("owner"));
    }

    #[test]
    fn absolute_urls_pass_through() {
        let request = ApiRequest::get("https://api.github.com/repositories/1/issues?page=2");
        assert_eq!(
            request.url().unwrap(),
            "https://api.github.com/repositories/1/issues?page=2"
        );
    }

    #[test]
    fn query_appends_to_existing_query() {
        let request = ApiRequest::get("https://api.github.com/x?page=2").param("per_page", 10);
        assert_eq!(request.url().unwrap(), "https://api.github.com/x?page=2&per_page=10");
    }

    #[test]
    fn parses_next_link() {
        let header = "<https://api.github.com/repositories/1/issues?page=2>; rel=\"next\", \
                      <https://api.github.com/repositories/1/issues?page=5>; rel=\"last\"";
        assert_eq!(
            parse_link_header(header, "next").as_deref(),
            Some("https://api.github.com/repositories/1/issues?page=2")
        );
        assert_eq!(
            parse_link_header(header, "last").as_deref(),
            Some("https://api.github.com/repositories/1/issues?page=5")
        );
        assert_eq!(parse_link_header(header, "prev"), None);
    }

    #[test]
    fn next_page_url_from_response() {
        let response = ApiResponse::new(200, json!([]))
            .with_header(LINK, "<https://api.github.com/x?page=3>; rel=\"next\"");
        assert_eq!(
            response.next_page_url().as_deref(),
            Some("https://api.github.com/x?page=3")
        );
        assert_eq!(ApiResponse::new(200, json!([])).next_page_url(), None);
    }

    #[test]
    fn items_of_wrapped_listing() {
        let response = ApiResponse::new(
            200,
            json!({ "total_count": 2, "items": [{ "id": 1 }, { "id": 2 }] }),
        );
        assert_eq!(response.items(), vec![json!({ "id": 1 }), json!({ "id": 2 })]);
    }

    #[test]
    fn items_of_single_object() {
        let response = ApiResponse::new(200, json!({ "id": 1 }));
        assert_eq!(response.items(), vec![json!({ "id": 1 })]);
        assert!(ApiResponse::new(204, Value::Null).items().is_empty());
    }

    proptest! {
        #[test]
        fn path_encoding_is_reversible_for_ascii(s in "[ -~]{0,40}") {
            let encoded = encode_path(&s);
            let expected = s
                .split('/')
                .map(|segment| urlencoding::encode(segment).into_owned())
                .collect::<Vec<_>>()
                .join("/");
            prop_assert_eq!(&encoded, &expected);
            prop_assert!(!encoded.contains(' '));
            prop_assert!(!encoded.contains('?'));
            prop_assert!(!encoded.contains('#'));
            let decoded = url::form_urlencoded::parse(format!("k={}", encoded).as_bytes())
                .next()
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default();
            prop_assert_eq!(decoded, s);
        }
    }
}
