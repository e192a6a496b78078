//! Orchestrator API client.
//!
//! A thin `reqwest` wrapper around the workflow orchestrator's REST API. It
//! focuses on:
//!
//! - Constructing an HTTP client with basic auth and the requested TLS policy
//! - Validating the API base URL for safety
//! - Looking up workflows by id or by name
//! - Starting executions and reading back their state and output parameters
//!
//! The primary entry point is [`OrchestratorClient`]. Wire formats live in
//! [`wire`].
//!
//! # Example
//!
//! ```ignore
//! use corral_api::OrchestratorClient;
//! use corral_types::Credentials;
//!
//! async fn demo() -> Result<(), corral_api::ApiError> {
//!     let credentials = Credentials::new(Some("admin".into()), Some("secret".into()));
//!     let client = OrchestratorClient::new("https://vco.example.com:8281/vco/api/", &credentials, true)?;
//!     let workflow = client.workflow_by_id("1b2c3d").await?;
//!     println!("{} => {}", workflow.name, workflow.id);
//!     Ok(())
//! }
//! ```

use std::{env, time::Duration};

use corral_types::{Credentials, ParameterSet};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url, header};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

pub mod wire;

pub use wire::{ExecutionDocument, WorkflowSummary};

/// Hostnames allowed to use plain HTTP.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Characters escaped inside a single path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Errors returned by [`OrchestratorClient`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid orchestrator base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("HTTP {status} from {path}: {body}")]
    Status { status: u16, path: String, body: String },

    #[error("transport error calling {path}: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("could not decode response from {path}: {reason}")]
    Decode { path: String, reason: String },
}

impl ApiError {
    pub fn decode(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// True when the remote side reported that the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Configured client for one orchestrator endpoint.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    base_url: Url,
    http: Client,
    username: Option<String>,
    password: Option<String>,
    user_agent: String,
}

impl OrchestratorClient {
    /// Build a client for `base_url`.
    ///
    /// Non-localhost hosts must use HTTPS. When `verify_ssl` is false the
    /// server certificate is not validated.
    pub fn new(base_url: &str, credentials: &Credentials, verify_ssl: bool) -> Result<Self, ApiError> {
        let base_url = validate_base_url(base_url)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|error| ApiError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("could not build HTTP client: {error}"),
            })?;

        if !verify_ssl {
            warn!(base_url = %base_url, "TLS certificate verification disabled");
        }

        Ok(Self {
            base_url,
            http,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            user_agent: format!("corral/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch a workflow by its identifier.
    pub async fn workflow_by_id(&self, workflow_id: &str) -> Result<WorkflowSummary, ApiError> {
        let path = format!("workflows/{}", encode_segment(workflow_id));
        let response = self.send(self.request(Method::GET, &path), &path).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::not_found(format!("workflow id '{workflow_id}'")));
        }
        read_json(response, &path).await
    }

    /// List workflows whose name matches `name` exactly.
    pub async fn workflows_by_name(&self, name: &str) -> Result<Vec<WorkflowSummary>, ApiError> {
        let path = "workflows";
        let builder = self
            .request(Method::GET, path)
            .query(&[("conditions", format!("name={name}"))]);
        let response = self.send(builder, path).await?;
        let listing: wire::InventoryListing = read_json(response, path).await?;
        Ok(listing
            .workflows()
            .into_iter()
            .filter(|workflow| workflow.name == name)
            .collect())
    }

    /// Start an execution of `workflow_id` with `parameters`, returning the execution id.
    pub async fn start_execution(&self, workflow_id: &str, parameters: &ParameterSet) -> Result<String, ApiError> {
        let path = format!("workflows/{}/executions", encode_segment(workflow_id));
        let body = wire::encode_parameters(parameters);
        debug!(workflow_id, parameter_count = body.parameters.len(), "starting execution");
        let builder = self.request(Method::POST, &path).json(&body);
        let response = self.send(builder, &path).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::not_found(format!("workflow id '{workflow_id}'")));
        }
        let response = ensure_success(response, &path).await?;
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::decode(&path, "response is missing a Location header"))?;
        wire::execution_id_from_location(location)
            .ok_or_else(|| ApiError::decode(&path, format!("cannot find an execution id in '{location}'")))
    }

    /// Fetch the execution document (state, timestamps, output parameters).
    pub async fn execution(&self, workflow_id: &str, execution_id: &str) -> Result<ExecutionDocument, ApiError> {
        let path = format!(
            "workflows/{}/executions/{}",
            encode_segment(workflow_id),
            encode_segment(execution_id)
        );
        let response = self.send(self.request(Method::GET, &path), &path).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ApiError::not_found(format!("execution '{execution_id}' of workflow '{workflow_id}'")));
        }
        read_json(response, &path).await
    }

    /// Build a request for an API-relative path with auth and User-Agent applied.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = self.url_for(path);
        debug!(%method, %url, "building request");
        let builder = self
            .http
            .request(method, url)
            .header(header::USER_AGENT, &self.user_agent);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_deref()),
            None => builder,
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, builder: RequestBuilder, path: &str) -> Result<reqwest::Response, ApiError> {
        builder.send().await.map_err(|source| {
            warn!(path, error = %source, "orchestrator request failed");
            ApiError::Transport {
                path: path.to_string(),
                source,
            }
        })
    }
}

/// Validate and normalize the API base URL.
///
/// Rules:
/// - `localhost` / loopback: any scheme is allowed
/// - otherwise: scheme must be HTTPS
///
/// The returned URL always ends with `/` so relative paths append cleanly.
pub fn validate_base_url(base: &str) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::InvalidBaseUrl {
        url: base.to_string(),
        reason,
    };
    let mut parsed = Url::parse(base.trim()).map_err(|error| invalid(error.to_string()))?;
    let host_name = parsed
        .host_str()
        .ok_or_else(|| invalid("URL must include a host".into()))?
        .to_string();

    let is_local = LOCALHOST_DOMAINS
        .iter()
        .any(|allowed| host_name.eq_ignore_ascii_case(allowed));
    if !is_local && parsed.scheme() != "https" {
        return Err(invalid(format!(
            "must use https for non-localhost hosts; got '{}://'",
            parsed.scheme()
        )));
    }

    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }
    Ok(parsed)
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

async fn ensure_success(response: reqwest::Response, path: &str) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(path, status = %status, "orchestrator returned an error status");
    Err(ApiError::Status {
        status: status.as_u16(),
        path: path.to_string(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T, ApiError> {
    let response = ensure_success(response, path).await?;
    let text = response.text().await.map_err(|source| ApiError::Transport {
        path: path.to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|error| ApiError::decode(path, error.to_string()))
}
