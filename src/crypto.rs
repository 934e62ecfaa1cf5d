pub mod account_key;
pub mod jwk;
pub mod jws;
pub mod provider;
pub mod rustcrypto;
pub mod x509;

#[cfg(feature = "openssl-backend")]
pub mod openssl_backend;

use std::sync::Arc;

use anyhow::anyhow;
use zeroize::Zeroizing;

use crate::error::{AcmeError, AcmeResult};
use provider::{Csr, CsrParams, CryptoProvider};

pub static DEFAULT_KEY_BITS: u32 = 2048;

/// Unpadded URL-safe base64, the only encoding ACME puts on the wire.
pub(crate) fn base64url(input: impl AsRef<[u8]>) -> String {
    base64::encode_config(input, base64::URL_SAFE_NO_PAD)
}

/// Decodes a base64url wire field, naming the field in the error so a bad
/// server response points at what was being read.
pub(crate) fn base64url_decode(field: &'static str, input: &str) -> AcmeResult<Vec<u8>> {
    base64::decode_config(input, base64::URL_SAFE_NO_PAD)
        .map_err(|err| AcmeError::Crypto(anyhow!("invalid base64url in {field}: {err}")))
}

pub fn default_provider() -> Arc<dyn CryptoProvider> {
    Arc::new(rustcrypto::RustCryptoProvider)
}

#[cfg(feature = "openssl-backend")]
pub fn openssl_provider() -> Arc<dyn CryptoProvider> {
    Arc::new(openssl_backend::OpensslProvider)
}

/// Builds a CSR, generating a fresh RSA key when none is supplied. Returns
/// the key PEM alongside the request.
pub fn create_csr(
    provider: &Arc<dyn CryptoProvider>,
    params: &CsrParams,
    key_pem: Option<&str>,
) -> AcmeResult<(Zeroizing<String>, Csr)> {
    let key_pem = match key_pem {
        Some(pem) => Zeroizing::new(pem.to_string()),
        None => provider.generate_private_key(DEFAULT_KEY_BITS)?,
    };
    let csr = provider.build_csr(params, &key_pem)?;
    Ok((key_pem, csr))
}
