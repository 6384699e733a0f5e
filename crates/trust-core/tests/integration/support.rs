//! Shared setup for integration tests.

use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use trust_core::config::Config;
use trust_core::TrustCore;
use trust_test_utils::{test_config_vars, IdpSigningKey, MockJwksProvider, PartnerKeyPair};

/// A running trust core wired to a mock identity provider.
pub struct TestCore {
    pub core: TrustCore,
    pub provider: MockJwksProvider,
    pub idp_key: IdpSigningKey,
    pub partner_key: PartnerKeyPair,
}

/// Base configuration pointing at `provider`.
pub fn config_vars(provider: &MockJwksProvider, partner_key: &PartnerKeyPair) -> HashMap<String, String> {
    test_config_vars(&provider.jwks_url(), &partner_key.private_key_pem())
}

/// Start a mock provider publishing fixture key 1 and initialize a core.
pub async fn start() -> Result<TestCore, anyhow::Error> {
    start_with(|_| {}).await
}

/// Like [`start`], letting the caller adjust configuration first.
pub async fn start_with(
    adjust: impl FnOnce(&mut HashMap<String, String>),
) -> Result<TestCore, anyhow::Error> {
    let provider = MockJwksProvider::start().await;
    let idp_key = IdpSigningKey::fixture(1, "idp-key-1")?;
    provider.serve_keys(&[&idp_key]).await;

    let partner_key = PartnerKeyPair::generate()?;
    let mut vars = config_vars(&provider, &partner_key);
    adjust(&mut vars);

    let config = Config::from_vars(&vars)?;
    let core = TrustCore::initialize(&config, CancellationToken::new()).await?;

    Ok(TestCore {
        core,
        provider,
        idp_key,
        partner_key,
    })
}
