//! The per-event handle given to plugin handlers.
//!
//! A [`Context`] bundles the webhook event, a GitHub client authenticated for
//! the event's installation, and a tracing span tagged with the delivery. A
//! fresh context is built for every (event, handler) pair, so nothing a
//! handler does to its context is visible to another handler.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{Span, debug};

use crate::github::{ApiRequest, GitHubApiError, GitHubClient, Params};
use crate::types::{DeliveryId, RepoId};
use crate::webhooks::WebhookEvent;

/// Directory repository config files are read from.
pub const CONFIG_DIR: &str = ".github";

/// Errors produced by context helpers.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The payload lacks a field the helper needs.
    #[error("payload has no {0}")]
    MissingField(&'static str),

    /// A GitHub request failed.
    #[error(transparent)]
    Api(#[from] GitHubApiError),

    /// File content was not valid base64 or UTF-8.
    #[error("config file {path} is not valid text: {reason}")]
    InvalidEncoding { path: String, reason: String },

    /// File content was not valid YAML.
    #[error("config file {path} is not valid YAML: {source}")]
    InvalidYaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The merged config does not have the requested shape.
    #[error("config file {path} does not match the expected shape: {source}")]
    InvalidConfig {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a handler needs to react to one event.
#[derive(Debug, Clone)]
pub struct Context {
    event: WebhookEvent,
    github: GitHubClient,
    log: Span,
}

impl Context {
    pub fn new(event: WebhookEvent, github: GitHubClient, log: Span) -> Self {
        Self { event, github, log }
    }

    /// The client for the event's installation.
    pub fn github(&self) -> &GitHubClient {
        &self.github
    }

    /// The span handler logs should be recorded in.
    pub fn log(&self) -> &Span {
        &self.log
    }

    pub fn event(&self) -> &WebhookEvent {
        &self.event
    }

    pub fn payload(&self) -> &Value {
        self.event.payload()
    }

    pub fn id(&self) -> &DeliveryId {
        self.event.id()
    }

    pub fn name(&self) -> &str {
        self.event.name()
    }

    pub fn action(&self) -> Option<&str> {
        self.event.action()
    }

    /// The repository the event happened in.
    ///
    /// The owner is `repository.owner.login`, falling back to
    /// `repository.owner.name` for payloads that only carry the name.
    pub fn repo(&self) -> Result<RepoId, ContextError> {
        let repository = self
            .payload()
            .get("repository")
            .ok_or(ContextError::MissingField("repository"))?;
        let owner = repository
            .get("owner")
            .ok_or(ContextError::MissingField("repository.owner"))?;
        let login = non_empty_str(owner.get("login"))
            .or_else(|| non_empty_str(owner.get("name")))
            .ok_or(ContextError::MissingField("repository.owner.login"))?;
        let name = non_empty_str(repository.get("name"))
            .ok_or(ContextError::MissingField("repository.name"))?;

        Ok(RepoId::new(login, name))
    }

    /// `{owner, repo}` for the event's repository.
    pub fn repo_params(&self) -> Result<Params, ContextError> {
        self.repo_params_with(Params::new())
    }

    /// `{owner, repo}` merged with `extra`; `extra` wins on collisions.
    ///
    /// ```ignore
    /// let params = context.repo_params_with(params!({ "path": ".github/stale.yml" }))?;
    /// // {"owner": "octocat", "repo": "hello-world", "path": ".github/stale.yml"}
    /// ```
    pub fn repo_params_with(&self, extra: Params) -> Result<Params, ContextError> {
        let repo = self.repo()?;
        let mut params = Params::new();
        params.insert("owner".to_string(), Value::String(repo.owner));
        params.insert("repo".to_string(), Value::String(repo.repo));
        params.extend(extra);
        Ok(params)
    }

    /// `{owner, repo, number}` for the event's issue or pull request.
    pub fn issue_params(&self) -> Result<Params, ContextError> {
        self.issue_params_with(Params::new())
    }

    /// `{owner, repo, number}` merged with `extra`; `extra` wins.
    ///
    /// `number` comes from the first of `issue`, `pull_request` and the
    /// payload itself that has one.
    pub fn issue_params_with(&self, extra: Params) -> Result<Params, ContextError> {
        let payload = self.payload();
        let number = [payload.get("issue"), payload.get("pull_request"), Some(payload)]
            .into_iter()
            .flatten()
            .find_map(|v| v.get("number").filter(|n| !n.is_null()))
            .cloned()
            .ok_or(ContextError::MissingField("number"))?;

        let mut params = Params::new();
        params.insert("number".to_string(), number);
        params.extend(self.repo_params()?);
        params.extend(extra);
        Ok(params)
    }

    /// True if the event was triggered by a bot account.
    pub fn is_bot(&self) -> bool {
        self.payload()
            .get("sender")
            .and_then(|s| s.get("type"))
            .and_then(Value::as_str)
            == Some("Bot")
    }

    /// Reads `.github/<file_name>` from the event's repository.
    ///
    /// The file's top-level keys are merged over `default` (file values win)
    /// and the result deserialized as `T`. If the file does not exist,
    /// `default` is returned as given. Any other failure is returned.
    pub async fn config<T>(&self, file_name: &str, default: Option<T>) -> Result<Option<T>, ContextError>
    where
        T: Serialize + DeserializeOwned,
    {
        let path = format!("{}/{}", CONFIG_DIR, file_name.trim_start_matches('/'));
        let params = self.repo_params()?;
        let request = ApiRequest::get("/repos/{owner}/{repo}/contents/{path}")
            .params(params)
            .param("path", path.clone());

        let response = match self.github.request(request).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!(parent: &self.log, path = %path, "No config file, using defaults");
                return Ok(default);
            }
            Err(e) => return Err(e.into()),
        };

        let content = response
            .data
            .get("content")
            .and_then(Value::as_str)
            .ok_or(ContextError::MissingField("content"))?;
        let file = parse_config_file(&path, content)?;

        let mut merged = match default {
            Some(default) => match serde_json::to_value(default) {
                Ok(Value::Object(fields)) => fields,
                Ok(_) => serde_json::Map::new(),
                Err(source) => return Err(ContextError::InvalidConfig { path, source }),
            },
            None => serde_json::Map::new(),
        };
        merged.extend(file);

        serde_json::from_value(Value::Object(merged))
            .map(Some)
            .map_err(|source| ContextError::InvalidConfig { path, source })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Decodes a contents-API `content` field and parses it as a YAML mapping.
/// An empty document is an empty mapping.
fn parse_config_file(path: &str, content: &str) -> Result<serde_json::Map<String, Value>, ContextError> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| ContextError::InvalidEncoding {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    let text = String::from_utf8(bytes).map_err(|e| ContextError::InvalidEncoding {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    if text.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }

    let value: Value = serde_yaml::from_str(&text).map_err(|source| ContextError::InvalidYaml {
        path: path.to_string(),
        source,
    })?;
    match value {
        Value::Object(fields) => Ok(fields),
        Value::Null => Ok(serde_json::Map::new()),
        other => Err(ContextError::InvalidConfig {
            path: path.to_string(),
            source: serde::de::Error::custom(format!("expected a mapping, got {}", other)),
        }),
    }
}
