//! HTTP client for the experiment server.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::types::*;
use super::ExperimentApi;
use crate::error::ChainError;
use crate::store::SessionIds;

/// Connection settings for [`ExperimentClient`].
#[derive(Debug, Clone)]
pub struct ExperimentClientConfig {
    /// Base URL of the experiment server (e.g. `http://localhost:5000`).
    pub base_url: String,
    /// TCP connection timeout.
    pub connect_timeout: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl ExperimentClientConfig {
    /// Create a config with defaults.
    ///
    /// - connect_timeout: 3 s
    /// - request_timeout: 10 s
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// The experiment server, reached over HTTP.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ExperimentClient {
    config: ExperimentClientConfig,
    client: reqwest::Client,
}

impl ExperimentClient {
    /// Start building a client aimed at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> ExperimentClientBuilder {
        ExperimentClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// The base URL followed by `segments`, each percent-encoded as a single
    /// path segment.
    fn segment_url(&self, segments: &[&str]) -> Result<String, ChainError> {
        let base = &self.config.base_url;
        let mut url = Url::parse(base)
            .map_err(|e| ChainError::Config(format!("invalid server URL '{base}': {e}")))?;
        url.path_segments_mut()
            .map_err(|()| ChainError::Config(format!("server URL '{base}' cannot take a path")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.to_string())
    }

    /// Send `request` and decode the JSON body as `T`.
    ///
    /// # Returns
    /// - `Err(ChainError::Connect)` when the request never got a response.
    /// - `Err(ChainError::Http)` on a non-2xx status; `page` is filled from an
    ///   `html` field in the error body when present.
    /// - `Err(ChainError::Json)` when the body is not the expected shape.
    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: String,
        field: &str,
    ) -> Result<T, ChainError> {
        let resp = request.send().await.map_err(|e| ChainError::Connect {
            url: url.clone(),
            detail: e.to_string(),
        })?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| ChainError::Connect {
            url: url.clone(),
            detail: e.to_string(),
        })?;

        if !status.is_success() {
            let page = serde_json::from_slice::<ErrorBody>(&bytes)
                .unwrap_or_default()
                .html;
            return Err(ChainError::Http {
                status: status.as_u16(),
                url,
                page,
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| ChainError::json(field, e))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, field: &str) -> Result<T, ChainError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let request = self.client.request(Method::GET, &url);
        self.send(request, url, field).await
    }

    async fn post_form<T, F>(&self, path: &str, form: Option<&F>, field: &str) -> Result<T, ChainError>
    where
        T: DeserializeOwned,
        F: Serialize + ?Sized,
    {
        self.post_form_to(self.url(path), form, field).await
    }

    async fn post_form_to<T, F>(
        &self,
        url: String,
        form: Option<&F>,
        field: &str,
    ) -> Result<T, ChainError>
    where
        T: DeserializeOwned,
        F: Serialize + ?Sized,
    {
        debug!(%url, "POST");
        let mut request = self.client.request(Method::POST, &url);
        if let Some(form) = form {
            request = request.form(form);
        }
        self.send(request, url, field).await
    }
}

impl ExperimentApi for ExperimentClient {
    async fn create_participant(&self, ids: &SessionIds) -> Result<Participant, ChainError> {
        let url = self.segment_url(&[
            "participant",
            &ids.worker_id,
            &ids.hit_id,
            &ids.assignment_id,
            &ids.mode,
        ])?;
        let env: ParticipantEnvelope = self
            .post_form_to::<_, ()>(url, None, "participant")
            .await?;
        Ok(env.participant)
    }

    async fn create_node(&self, participant_id: u64) -> Result<Node, ChainError> {
        let path = format!("/node/{participant_id}");
        let env: NodeEnvelope = self.post_form::<_, ()>(&path, None, "node").await?;
        Ok(env.node)
    }

    async fn received_infos(&self, node_id: u64) -> Result<Vec<Info>, ChainError> {
        let env: InfosEnvelope = self
            .get(&format!("/node/{node_id}/received_infos"), "infos")
            .await?;
        Ok(env.infos)
    }

    async fn pending_transmissions(&self, node_id: u64) -> Result<Vec<Transmission>, ChainError> {
        let env: TransmissionsEnvelope = self
            .get(
                &format!("/node/{node_id}/transmissions?status=pending"),
                "transmissions",
            )
            .await?;
        Ok(env.transmissions)
    }

    async fn info(&self, node_id: u64, info_id: u64) -> Result<Info, ChainError> {
        let env: InfoEnvelope = self.get(&format!("/info/{node_id}/{info_id}"), "info").await?;
        Ok(env.info)
    }

    async fn create_info(&self, node_id: u64, contents: &str) -> Result<(), ChainError> {
        let body = NewInfo {
            contents,
            info_type: INFO_TYPE,
        };
        let _: serde_json::Value = self
            .post_form(&format!("/info/{node_id}"), Some(&body), "info")
            .await?;
        Ok(())
    }

    async fn info_count(&self) -> Result<u64, ChainError> {
        let env: InfoCountEnvelope = self.get("/info", "info").await?;
        Ok(env.info.count)
    }

    async fn summary(&self) -> Result<Summary, ChainError> {
        let env: SummaryEnvelope = self.get("/summary", "summary").await?;
        Ok(env.summary)
    }

    async fn quorum(&self) -> Result<u32, ChainError> {
        let env: QuorumEnvelope = self.get("/experiment/quorum", "quorum").await?;
        Ok(env.quorum)
    }

    async fn submit_question(
        &self,
        participant_id: u64,
        response: &QuestionResponse,
    ) -> Result<(), ChainError> {
        let _: serde_json::Value = self
            .post_form(&format!("/question/{participant_id}"), Some(response), "question")
            .await?;
        Ok(())
    }

    async fn worker_complete(&self, ids: &SessionIds) -> Result<(), ChainError> {
        let url = self.url("/worker_complete");
        debug!(%url, "GET");
        let request = self
            .client
            .request(Method::GET, &url)
            .query(&[("uniqueId", ids.unique_id())]);
        let _: serde_json::Value = self.send(request, url, "worker_complete").await?;
        Ok(())
    }
}

/// Builder for [`ExperimentClient`].
///
/// # Example
/// ```rust,ignore
/// let client = ExperimentClient::builder("http://localhost:5000")
///     .connect_timeout(Duration::from_secs(1))
///     .build();
/// ```
pub struct ExperimentClientBuilder {
    config: ExperimentClientConfig,
}

impl ExperimentClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            config: ExperimentClientConfig::new(base_url),
        }
    }

    /// Override the TCP connect timeout (default 3 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Override the per-request timeout (default 10 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Consume the builder and construct an [`ExperimentClient`].
    pub fn build(self) -> ExperimentClient {
        // reqwest::Client::builder() can fail in extreme environments, but
        // unwrap_or_default() falls back to a default client instead of panicking.
        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .build()
            .unwrap_or_default();

        ExperimentClient {
            config: self.config,
            client,
        }
    }
}
