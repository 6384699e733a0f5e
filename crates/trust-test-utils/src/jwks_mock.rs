//! Wiremock-backed identity provider key endpoint.

use crate::crypto_fixtures::IdpSigningKey;
use crate::test_ids::TEST_JWKS_PATH;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Build a JWKS document publishing `keys`.
pub fn jwks_document(keys: &[&IdpSigningKey]) -> serde_json::Value {
    let keys: Vec<serde_json::Value> = keys.iter().map(|k| k.jwk_json()).collect();
    serde_json::json!({ "keys": keys })
}

/// A mock identity provider serving its key document over HTTP.
pub struct MockJwksProvider {
    server: MockServer,
}

impl MockJwksProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URL of the key document endpoint.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), TEST_JWKS_PATH)
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Serve `keys` on every request.
    pub async fn serve_keys(&self, keys: &[&IdpSigningKey]) {
        Mock::given(method("GET"))
            .and(path(TEST_JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` and verify on drop that exactly `times` fetches happened.
    pub async fn serve_keys_expecting(&self, keys: &[&IdpSigningKey], times: u64) {
        Mock::given(method("GET"))
            .and(path(TEST_JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` for the first `times` requests only; later mounts take over.
    pub async fn serve_keys_up_to(&self, keys: &[&IdpSigningKey], times: u64) {
        Mock::given(method("GET"))
            .and(path(TEST_JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .up_to_n_times(times)
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Serve an arbitrary JSON body.
    pub async fn serve_body(&self, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(TEST_JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Respond with `status` and no body.
    pub async fn serve_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(TEST_JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` after `delay` (for timeout and cancellation tests).
    pub async fn serve_keys_delayed(&self, keys: &[&IdpSigningKey], delay: std::time::Duration) {
        Mock::given(method("GET"))
            .and(path(TEST_JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks_document(keys))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Drop every mounted response.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of key document requests received so far.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}
