//! Identity token to session token exchange, end to end.

use crate::support;
use common::secret::ExposeSecret;
use trust_core::errors::TrustError;
use trust_test_utils::{TestIdentityTokenBuilder, TEST_ADMIN_SUBJECT, TEST_USER_SUBJECT};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;

/// Admin subject signs in; the session lasts exactly 24 hours.
#[tokio::test]
async fn test_admin_sign_in_and_session_lifetime() -> Result<(), anyhow::Error> {
    let test = support::start().await?;

    let identity_token = TestIdentityTokenBuilder::new()
        .for_subject(TEST_ADMIN_SUBJECT)
        .with_email("admin@example.com")
        .sign_with(&test.idp_key);

    let principal = test.core.identity.verify(&identity_token).await?;
    assert_eq!(principal.subject(), TEST_ADMIN_SUBJECT);
    assert!(test.core.identity.derive_authorization(&principal).is_admin());

    let session = test.core.sign_in(&identity_token).await?;
    let claims = session.claims();
    assert!(claims.is_admin());
    assert_eq!(claims.subject(), TEST_ADMIN_SUBJECT);
    assert_eq!(claims.email(), Some("admin@example.com"));
    assert_eq!(claims.expires_at() - claims.issued_at(), 24 * HOUR);

    let token = session.token().expose_secret();
    let minted_at = claims.issued_at();
    let sessions = &test.core.sessions;

    let later = sessions.validate_token_at(token, minted_at + 23 * HOUR + 59 * MINUTE)?;
    assert_eq!(&later, claims);

    assert_eq!(
        sessions.validate_token_at(token, minted_at + 24 * HOUR + 1),
        Err(TrustError::Expired)
    );
    Ok(())
}

#[tokio::test]
async fn test_non_admin_signs_in_without_elevation() -> Result<(), anyhow::Error> {
    let test = support::start().await?;

    let identity_token = TestIdentityTokenBuilder::new()
        .for_subject(TEST_USER_SUBJECT)
        .sign_with(&test.idp_key);

    let session = test.core.sign_in(&identity_token).await?;
    assert!(!session.claims().is_admin());
    assert!(session.claims().email().is_none());
    Ok(())
}

#[tokio::test]
async fn test_sign_in_rejects_expired_identity_token() -> Result<(), anyhow::Error> {
    let test = support::start().await?;

    let identity_token = TestIdentityTokenBuilder::new()
        .for_subject(TEST_ADMIN_SUBJECT)
        .expired_by(1)
        .sign_with(&test.idp_key);

    assert_eq!(
        test.core.sign_in(&identity_token).await.unwrap_err(),
        TrustError::Expired
    );
    Ok(())
}

#[tokio::test]
async fn test_sign_in_rejects_wrong_audience_and_issuer() -> Result<(), anyhow::Error> {
    let test = support::start().await?;

    let wrong_audience = TestIdentityTokenBuilder::new()
        .with_audience("com.example.other")
        .sign_with(&test.idp_key);
    assert_eq!(
        test.core.sign_in(&wrong_audience).await.unwrap_err(),
        TrustError::AudienceMismatch
    );

    let wrong_issuer = TestIdentityTokenBuilder::new()
        .with_issuer("https://accounts.example.com")
        .sign_with(&test.idp_key);
    assert_eq!(
        test.core.sign_in(&wrong_issuer).await.unwrap_err(),
        TrustError::IssuerMismatch
    );
    Ok(())
}

/// An HS256 token keyed with the published modulus must never verify.
#[tokio::test]
async fn test_symmetric_identity_token_rejected_without_fetch() -> Result<(), anyhow::Error> {
    let test = support::start().await?;
    let fetches_after_prime = test.provider.fetch_count().await;

    let forged = TestIdentityTokenBuilder::new()
        .for_subject(TEST_ADMIN_SUBJECT)
        .sign_hs256(&test.idp_key.kid, test.idp_key.jwk_json().to_string().as_bytes());

    assert_eq!(
        test.core.sign_in(&forged).await.unwrap_err(),
        TrustError::UnsupportedAlgorithm("HS256".to_string())
    );
    assert_eq!(test.provider.fetch_count().await, fetches_after_prime);
    Ok(())
}

#[tokio::test]
async fn test_session_refresh_slides_window() -> Result<(), anyhow::Error> {
    let test = support::start().await?;
    let identity_token = TestIdentityTokenBuilder::new()
        .for_subject(TEST_ADMIN_SUBJECT)
        .sign_with(&test.idp_key);
    let session = test.core.sign_in(&identity_token).await?;
    let minted_at = session.claims().issued_at();
    let sessions = &test.core.sessions;

    let validated =
        sessions.validate_token_at(session.token().expose_secret(), minted_at + 2 * HOUR)?;
    let refreshed = sessions.refresh_token_at(&validated, minted_at + 2 * HOUR)?;

    assert_eq!(refreshed.claims().subject(), TEST_ADMIN_SUBJECT);
    assert!(refreshed.claims().is_admin());
    assert_eq!(refreshed.claims().issued_at(), minted_at + 2 * HOUR);

    // Old token still expires on its own schedule; the new one outlives it
    let after_original = minted_at + 24 * HOUR + 1;
    assert_eq!(
        sessions.validate_token_at(session.token().expose_secret(), after_original),
        Err(TrustError::Expired)
    );
    assert!(sessions
        .validate_token_at(refreshed.token().expose_secret(), after_original)
        .is_ok());
    Ok(())
}
