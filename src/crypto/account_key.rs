use std::sync::Arc;

use zeroize::Zeroizing;

use crate::error::AcmeResult;

use super::jwk::Jwk;
use super::jws::JwsSigner;
use super::provider::CryptoProvider;

pub static JWS_ALG_RS256: &str = "RS256";

/// An account private key bound to its crypto provider. The public JWK is
/// derived once at construction.
#[derive(Clone)]
pub struct AccountKey {
    provider: Arc<dyn CryptoProvider>,
    pem: Zeroizing<String>,
    jwk: Jwk,
}

impl AccountKey {
    pub fn from_pem(
        provider: Arc<dyn CryptoProvider>,
        pem: impl Into<String>,
    ) -> AcmeResult<Self> {
        let pem = Zeroizing::new(pem.into());
        let modulus = provider.public_modulus(&pem)?;
        let exponent = provider.public_exponent(&pem)?;
        let jwk = Jwk::from_rsa_components(&modulus, &exponent);
        Ok(Self { provider, pem, jwk })
    }

    pub fn generate(provider: Arc<dyn CryptoProvider>, bits: u32) -> AcmeResult<Self> {
        let pem = provider.generate_private_key(bits)?;
        Self::from_pem(provider, pem.to_string())
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    pub fn thumbprint(&self) -> String {
        self.jwk.thumbprint_b64()
    }

    pub fn key_authorization(&self, token: &str) -> String {
        self.jwk.key_authorization(token)
    }
}

impl JwsSigner for AccountKey {
    fn jws_alg(&self) -> &str {
        JWS_ALG_RS256
    }

    fn jws_sign(&self, input: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.provider
            .sign_rs256(&self.pem, input)
            .map_err(|err| anyhow::anyhow!(err))
    }
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKey")
            .field("alg", &JWS_ALG_RS256)
            .field("thumbprint", &self.thumbprint())
            .finish()
    }
}
