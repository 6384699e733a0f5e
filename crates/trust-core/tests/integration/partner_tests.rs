//! Outbound partner calls through the composed trust core.

use crate::support;
use common::secret::ExposeSecret;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;
use std::sync::Arc;
use trust_test_utils::{TEST_PARTNER_AUDIENCE, TEST_PARTNER_ISSUER_ID, TEST_PARTNER_KEY_ID};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct AssertionClaims {
    iss: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct SalesReport {
    units: u64,
}

async fn core_with_partner(server: &MockServer) -> Result<support::TestCore, anyhow::Error> {
    let uri = server.uri();
    support::start_with(move |vars| {
        vars.insert("PARTNER_API_URL".to_string(), uri);
    })
    .await
}

#[tokio::test]
async fn test_assertion_verifies_with_partner_public_key() -> Result<(), anyhow::Error> {
    let test = support::start().await?;
    let assertion = test.core.assertions.get_assertion()?;

    let header = jsonwebtoken::decode_header(assertion.token().expose_secret())?;
    assert_eq!(header.alg, Algorithm::ES256);
    assert_eq!(header.kid.as_deref(), Some(TEST_PARTNER_KEY_ID));

    let mut validation = Validation::new(Algorithm::ES256);
    validation.set_audience(&[TEST_PARTNER_AUDIENCE]);
    let claims = decode::<AssertionClaims>(
        assertion.token().expose_secret(),
        &test.partner_key.decoding_key(),
        &validation,
    )?
    .claims;

    assert_eq!(claims.iss, TEST_PARTNER_ISSUER_ID);
    assert_eq!(claims.aud, TEST_PARTNER_AUDIENCE);
    assert_eq!(claims.exp - claims.iat, 1200);
    Ok(())
}

#[tokio::test]
async fn test_cached_assertion_is_byte_identical_until_invalidated() -> Result<(), anyhow::Error> {
    let test = support::start().await?;
    let signer = &test.core.assertions;

    let first = signer.get_assertion()?;
    let second = signer.get_assertion()?;
    assert_eq!(first.token().expose_secret(), second.token().expose_secret());
    assert_eq!(signer.signatures_issued(), 1);

    signer.invalidate();
    let third = signer.get_assertion()?;
    assert_ne!(first.token().expose_secret(), third.token().expose_secret());
    assert_eq!(signer.signatures_issued(), 2);

    // Both remain independently valid signatures
    let mut validation = Validation::new(Algorithm::ES256);
    validation.set_audience(&[TEST_PARTNER_AUDIENCE]);
    for assertion in [&first, &third] {
        decode::<AssertionClaims>(
            assertion.token().expose_secret(),
            &test.partner_key.decoding_key(),
            &validation,
        )?;
    }
    Ok(())
}

#[tokio::test]
async fn test_concurrent_partner_calls_sign_once() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/salesReports"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"units": 42})))
        .expect(12)
        .mount(&server)
        .await;

    let test = core_with_partner(&server).await?;
    let partner = Arc::new(test.core.partner.clone());

    let handles: Vec<_> = (0..12)
        .map(|_| {
            let partner = Arc::clone(&partner);
            tokio::spawn(async move { partner.get_json::<SalesReport>("/v1/salesReports").await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await??.units, 42);
    }

    assert_eq!(test.core.assertions.signatures_issued(), 1);
    Ok(())
}

#[tokio::test]
async fn test_partner_rejection_refreshes_assertion_once() -> Result<(), anyhow::Error> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"units": 7})))
        .expect(1)
        .mount(&server)
        .await;

    let test = core_with_partner(&server).await?;
    let stale = test.core.assertions.get_assertion()?;

    let report: SalesReport = test
        .core
        .partner
        .post_json("/v1/salesReports", &serde_json::json!({"frequency": "DAILY"}))
        .await?;
    assert_eq!(report.units, 7);

    let current = test.core.assertions.get_assertion()?;
    assert_ne!(stale.token().expose_secret(), current.token().expose_secret());
    assert_eq!(test.core.assertions.signatures_issued(), 2);
    Ok(())
}
