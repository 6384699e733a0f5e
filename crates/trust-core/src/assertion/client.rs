//! Partner API HTTP client.
//!
//! Every request carries a partner assertion from the [`AssertionSigner`].
//!
//! # Security
//!
//! - Assertions are short-lived and signed with the partner key
//! - A 401 invalidates the cached assertion and retries exactly once
//! - Timeouts prevent hanging connections
//! - Errors are logged with the status only, never the assertion

use crate::assertion::signer::AssertionSigner;
use crate::config::PartnerConfig;
use crate::errors::TrustError;
use crate::observability::metrics;
use common::secret::ExposeSecret;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// Connection establishment timeout for partner requests.
const PARTNER_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the partner API.
#[derive(Clone)]
pub struct PartnerClient {
    client: Client,
    base_url: String,
    signer: Arc<AssertionSigner>,
}

impl PartnerClient {
    /// Create a partner client that authenticates with `signer`.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::ConfigurationInvalid` if the HTTP client cannot be built.
    pub fn new(config: &PartnerConfig, signer: Arc<AssertionSigner>) -> Result<Self, TrustError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(PARTNER_CONNECT_TIMEOUT.min(config.http_timeout))
            .build()
            .map_err(|e| {
                TrustError::ConfigurationInvalid(format!("failed to build partner HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            signer,
        })
    }

    pub fn signer(&self) -> &Arc<AssertionSigner> {
        &self.signer
    }

    /// GET `path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// - `TrustError::SigningFailed` if no assertion can be produced
    /// - `TrustError::PartnerRequestFailed` on transport failure, non-2xx
    ///   status, or an undecodable body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, TrustError> {
        self.send_json::<(), T>(Method::GET, path, None).await
    }

    /// POST `body` as JSON to `path` and decode the JSON response.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TrustError> {
        self.send_json(Method::POST, path, Some(body)).await
    }

    #[instrument(skip_all, name = "trust.partner.request", fields(method = %method, path = %path))]
    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, TrustError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));

        let response = self.send_once(method.clone(), &url, body).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return handle_response(response).await;
        }

        // Partner rejected the assertion; sign a new one and retry once
        warn!(target: "trust.partner", "Partner rejected assertion, retrying with a fresh one");
        metrics::record_partner_request("retried");
        self.signer.invalidate();
        let response = self.send_once(method, &url, body).await?;
        handle_response(response).await
    }

    async fn send_once<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Response, TrustError> {
        let assertion = self.signer.get_assertion()?;

        let mut request = self
            .client
            .request(method, url)
            .header(
                AUTHORIZATION,
                format!("Bearer {}", assertion.token().expose_secret()),
            )
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|e| {
            warn!(target: "trust.partner", error = %e, "Partner request failed");
            metrics::record_partner_request("error");
            TrustError::PartnerRequestFailed(if e.is_timeout() {
                "partner API timed out".to_string()
            } else {
                "partner API is unreachable".to_string()
            })
        })
    }
}

async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, TrustError> {
    let status = response.status();
    if !status.is_success() {
        warn!(target: "trust.partner", status = %status, "Partner API returned error status");
        metrics::record_partner_request("error");
        return Err(TrustError::PartnerRequestFailed(format!(
            "partner API returned {}",
            status.as_u16()
        )));
    }

    let body = response.json::<T>().await.map_err(|e| {
        warn!(target: "trust.partner", error = %e, "Partner response could not be decoded");
        metrics::record_partner_request("error");
        TrustError::PartnerRequestFailed("partner API returned an invalid body".to_string())
    })?;

    metrics::record_partner_request("success");
    Ok(body)
}
