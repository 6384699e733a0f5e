//! Provider key rotation against a live (mock) key endpoint.
//!
//! The verifier refreshes at most once per verification when it meets an
//! unknown key identifier, and concurrent misses share one refresh.

use crate::support;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trust_core::config::Config;
use trust_core::errors::TrustError;
use trust_core::TrustCore;
use trust_test_utils::{
    IdpSigningKey, MockJwksProvider, PartnerKeyPair, TestIdentityTokenBuilder, TEST_ADMIN_SUBJECT,
};

/// Provider publishes only `old` for the startup fetch, then `old` and `new`.
async fn rotating_core(
    old: &IdpSigningKey,
    new: &IdpSigningKey,
) -> Result<(TrustCore, MockJwksProvider), anyhow::Error> {
    let provider = MockJwksProvider::start().await;
    provider.serve_keys_up_to(&[old], 1).await;
    provider.serve_keys(&[old, new]).await;

    let partner_key = PartnerKeyPair::generate()?;
    let config = Config::from_vars(&support::config_vars(&provider, &partner_key))?;
    let core = TrustCore::initialize(&config, CancellationToken::new()).await?;

    assert_eq!(provider.fetch_count().await, 1, "startup primes the key set");
    Ok((core, provider))
}

#[tokio::test]
async fn test_rotated_key_verifies_after_single_refresh() -> Result<(), anyhow::Error> {
    let old = IdpSigningKey::fixture(1, "idp-key-1")?;
    let new = IdpSigningKey::fixture(2, "idp-key-2")?;
    let (core, provider) = rotating_core(&old, &new).await?;

    let token = TestIdentityTokenBuilder::new()
        .for_subject(TEST_ADMIN_SUBJECT)
        .sign_with(&new);

    let principal = core.identity.verify(&token).await?;
    assert_eq!(principal.subject(), TEST_ADMIN_SUBJECT);
    assert_eq!(provider.fetch_count().await, 2);

    // New key is now cached; no further fetches
    core.identity.verify(&token).await?;
    assert_eq!(provider.fetch_count().await, 2);
    assert!(core.identity.key_set().contains("idp-key-2"));
    Ok(())
}

#[tokio::test]
async fn test_old_key_keeps_verifying_during_rotation() -> Result<(), anyhow::Error> {
    let old = IdpSigningKey::fixture(1, "idp-key-1")?;
    let new = IdpSigningKey::fixture(2, "idp-key-2")?;
    let (core, provider) = rotating_core(&old, &new).await?;

    let old_token = TestIdentityTokenBuilder::new().sign_with(&old);
    let new_token = TestIdentityTokenBuilder::new().sign_with(&new);

    core.identity.verify(&old_token).await?;
    core.identity.verify(&new_token).await?;
    core.identity.verify(&old_token).await?;

    assert_eq!(provider.fetch_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_unknown_key_fails_after_exactly_one_refresh() -> Result<(), anyhow::Error> {
    let old = IdpSigningKey::fixture(1, "idp-key-1")?;
    let new = IdpSigningKey::fixture(2, "idp-key-2")?;
    let (core, provider) = rotating_core(&old, &new).await?;

    // Same key material as `new`, but a kid the provider never publishes
    let unpublished = IdpSigningKey::fixture(2, "idp-key-unpublished")?;
    let token = TestIdentityTokenBuilder::new().sign_with(&unpublished);

    assert_eq!(
        core.identity.verify(&token).await.unwrap_err(),
        TrustError::UnknownSigningKey
    );
    assert_eq!(provider.fetch_count().await, 2);

    // Each verification gets its own single refresh, never more
    assert_eq!(
        core.identity.verify(&token).await.unwrap_err(),
        TrustError::UnknownSigningKey
    );
    assert_eq!(provider.fetch_count().await, 3);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_misses_share_one_refresh() -> Result<(), anyhow::Error> {
    let old = IdpSigningKey::fixture(1, "idp-key-1")?;
    let new = IdpSigningKey::fixture(2, "idp-key-2")?;
    let (core, provider) = rotating_core(&old, &new).await?;

    let token = Arc::new(TestIdentityTokenBuilder::new().sign_with(&new));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let identity = Arc::clone(&core.identity);
            let token = Arc::clone(&token);
            tokio::spawn(async move { identity.verify(&token).await })
        })
        .collect();

    for handle in handles {
        handle.await??;
    }

    assert_eq!(provider.fetch_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn test_provider_outage_during_rotation_is_key_fetch_failure() -> Result<(), anyhow::Error> {
    let old = IdpSigningKey::fixture(1, "idp-key-1")?;
    let new = IdpSigningKey::fixture(2, "idp-key-2")?;
    let (core, provider) = rotating_core(&old, &new).await?;

    provider.reset().await;
    provider.serve_status(503).await;

    let token = TestIdentityTokenBuilder::new().sign_with(&new);
    assert!(matches!(
        core.identity.verify(&token).await,
        Err(TrustError::KeyFetchFailed(_))
    ));

    // Keys already held keep working
    let old_token = TestIdentityTokenBuilder::new().sign_with(&old);
    core.identity.verify(&old_token).await?;
    Ok(())
}
