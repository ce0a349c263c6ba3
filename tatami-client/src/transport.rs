//! HTTP transport with bearer auth and coordinated token refresh.
//!
//! Every call funnels through [`Transport`]: relative paths resolve against
//! the configured base URL, a bearer header is attached when a token is
//! available, non-string bodies serialize as JSON (binary form-data passes
//! through as multipart, untouched), and a 401 triggers exactly one
//! coordinated refresh before the original call is retried once. Concurrent 401s wait on the same refresh instead of each starting
//! their own, and a refresh gate keeps refresh-dependent calls from racing
//! ahead of the refresh itself.

use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cancel::AbortHandle;
use crate::config::ClientConfig;
use crate::error::{RequestError, Result};
use crate::routes;
use tatami_model::{AuthToken, RefreshRequest};

/// Options for one transport call.
#[derive(Debug, Default)]
pub struct FetchOptions {
    pub method: Option<Method>,
    pub body: Option<serde_json::Value>,
    /// Binary form-data upload; sent as multipart instead of JSON.
    pub multipart: Option<MultipartFile>,
    pub headers: Vec<(String, String)>,
    pub abort: Option<AbortHandle>,
    /// Skip the bearer header even when a token is stored.
    pub public: bool,
}

/// One file of a multipart upload (backup import, cover replacement).
/// Owned bytes so the request can be rebuilt for the 401 retry.
#[derive(Debug, Clone)]
pub struct MultipartFile {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Shared HTTP fetcher.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    config: Arc<ClientConfig>,
    token_store: Arc<RwLock<Option<AuthToken>>>,
    /// Serializes token refreshes; requests queue behind the in-flight one.
    refresh_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.config.base_url)
            .field(
                "has_token",
                &self
                    .token_store
                    .try_read()
                    .map(|t| t.is_some())
                    .unwrap_or(false),
            )
            .finish()
    }
}

impl Transport {
    pub fn new(config: Arc<ClientConfig>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            config,
            token_store: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The bare client, for callers that must not attach auth headers.
    pub fn bare_client(&self) -> &Client {
        &self.client
    }

    /// Build a full URL from a path. Absolute URLs pass through; paths that
    /// already carry the API prefix resolve against the bare base URL.
    pub fn build_url(&self, path: impl AsRef<str>) -> String {
        let p = path.as_ref();
        if p.starts_with("http://") || p.starts_with("https://") {
            return p.to_string();
        }
        let trimmed = p.trim_start_matches('/');
        if trimmed.starts_with("api/v1/") {
            format!("{}/{}", self.config.base_url, trimmed)
        } else {
            format!(
                "{}{}/{}",
                self.config.base_url,
                routes::API_BASE,
                trimmed
            )
        }
    }

    /// The ws(s) URL for a WebSocket upgrade path.
    pub fn ws_url(&self, path: &str) -> String {
        let http = self.build_url(path);
        if let Some(rest) = http.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = http.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            http
        }
    }

    pub async fn set_token(&self, token: Option<AuthToken>) {
        *self.token_store.write().await = token;
    }

    pub async fn token(&self) -> Option<AuthToken> {
        self.token_store.read().await.clone()
    }

    async fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        if let Some(token) = self.token_store.read().await.as_ref() {
            builder.header(
                "Authorization",
                format!("Bearer {}", token.access_token),
            )
        } else {
            builder
        }
    }

    fn apply_options(
        &self,
        mut builder: RequestBuilder,
        options: &FetchOptions,
    ) -> Result<RequestBuilder> {
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }
        if let Some(upload) = &options.multipart {
            let part =
                reqwest::multipart::Part::bytes(upload.bytes.clone())
                    .file_name(upload.file_name.clone())
                    .mime_str(&upload.mime)?;
            builder = builder.multipart(
                reqwest::multipart::Form::new()
                    .part(upload.field.clone(), part),
            );
        }
        for (name, value) in &options.headers {
            builder = builder.header(name, value);
        }
        Ok(builder)
    }

    /// Perform one call with the full 401-refresh-and-retry protocol.
    pub async fn fetch(
        &self,
        path: &str,
        options: FetchOptions,
    ) -> Result<reqwest::Response> {
        let url = self.build_url(path);
        let method = options.method.clone().unwrap_or(Method::GET);
        debug!(%method, %url, "transport fetch");

        let abort = options.abort.clone().unwrap_or_default();

        let build = |transport: &Transport| {
            let builder = transport.client.request(method.clone(), &url);
            transport.apply_options(builder, &options)
        };

        // Queue behind an in-flight refresh so this call cannot race ahead
        // of the token it depends on.
        drop(self.refresh_lock.lock().await);

        let builder = if options.public {
            build(self)?
        } else {
            self.authorize(build(self)?).await
        };

        let response = tokio::select! {
            _ = abort.aborted() => {
                return Err(RequestError::cancelled(
                    abort.reason().unwrap_or_else(|| "aborted".into()),
                ));
            }
            result = builder.send() => result?,
        };

        if response.status() != StatusCode::UNAUTHORIZED || options.public {
            return Self::check_status(response).await;
        }

        // 401: run (or wait for) the single coordinated refresh, then retry
        // the original call exactly once.
        info!(%url, "received 401, refreshing token");
        self.refresh_token().await?;

        let retry = self.authorize(build(self)?).await;
        let response = tokio::select! {
            _ = abort.aborted() => {
                return Err(RequestError::cancelled(
                    abort.reason().unwrap_or_else(|| "aborted".into()),
                ));
            }
            result = retry.send() => result?,
        };
        if response.status() == StatusCode::UNAUTHORIZED {
            // Refresh succeeded but the server still rejects us; clear the
            // token and let the caller run its re-auth flow.
            warn!(%url, "still unauthorized after refresh, clearing token");
            self.set_token(None).await;
            return Err(RequestError::Unauthorized);
        }
        Self::check_status(response).await
    }

    /// Exactly-one-refresh coordination: the first 401 performs the refresh
    /// while holding the lock; concurrent 401s block on the same lock, then
    /// observe the already-rotated token and skip their own refresh.
    async fn refresh_token(&self) -> Result<()> {
        let stale = self.token().await;
        let _guard = self.refresh_lock.lock().await;
        if self.token().await != stale {
            debug!("token already refreshed by a concurrent caller");
            return Ok(());
        }

        let Some(current) = stale else {
            return Err(RequestError::Unauthorized);
        };

        let url = self.build_url(routes::auth::REFRESH);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest {
                refresh_token: current.refresh_token.clone(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "token refresh rejected");
            self.set_token(None).await;
            return Err(RequestError::Unauthorized);
        }

        let token: AuthToken = response.json().await?;
        self.set_token(Some(token)).await;
        info!("token refreshed");
        Ok(())
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(RequestError::Http {
            status: status.as_u16(),
            message,
        })
    }

    // === JSON convenience wrappers the thin endpoint calls build on ===

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T> {
        let response = self.fetch(path, FetchOptions::default()).await?;
        Ok(response.json().await?)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let options = FetchOptions {
            method: Some(Method::POST),
            body: Some(serde_json::to_value(body)?),
            ..FetchOptions::default()
        };
        let response = self.fetch(path, options).await?;
        Ok(response.json().await?)
    }

    /// POST a binary file as multipart form-data (e.g. backup import).
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        file: MultipartFile,
    ) -> Result<T> {
        let options = FetchOptions {
            method: Some(Method::POST),
            multipart: Some(file),
            ..FetchOptions::default()
        };
        let response = self.fetch(path, options).await?;
        Ok(response.json().await?)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        let options = FetchOptions {
            method: Some(Method::DELETE),
            ..FetchOptions::default()
        };
        self.fetch(path, options).await?;
        Ok(())
    }

    /// GET returning raw bytes (images, backups). Fails on a truncated body
    /// rather than handing back partial content.
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.fetch(path, FetchOptions::default()).await?;
        let expected = response.content_length();
        let bytes = response.bytes().await?;
        if let Some(expected) = expected
            && expected as usize != bytes.len()
        {
            return Err(RequestError::other(format!(
                "content-length mismatch: header={} actual={}",
                expected,
                bytes.len()
            )));
        }
        Ok(bytes.to_vec())
    }
}
