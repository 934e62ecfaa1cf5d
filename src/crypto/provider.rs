use zeroize::Zeroizing;

use crate::error::AcmeResult;

/// Capability interface over an RSA crypto backend.
///
/// Two interchangeable implementations exist: the default pure-Rust provider
/// and an OpenSSL-backed one behind the `openssl-backend` feature. Both must
/// behave identically for all inputs; the backend is picked at client
/// construction time.
pub trait CryptoProvider: Send + Sync + std::fmt::Debug {
    /// Generates an RSA private key, returned as PKCS#8 PEM.
    fn generate_private_key(&self, bits: u32) -> AcmeResult<Zeroizing<String>>;

    /// RSASSA-PKCS1-v1_5 signature over SHA-256 of `data`.
    fn sign_rs256(&self, key_pem: &str, data: &[u8]) -> AcmeResult<Vec<u8>>;

    /// Public modulus as raw big-endian bytes, no leading zero octets.
    fn public_modulus(&self, key_pem: &str) -> AcmeResult<Vec<u8>>;

    /// Public exponent as raw big-endian bytes, no leading zero octets.
    fn public_exponent(&self, key_pem: &str) -> AcmeResult<Vec<u8>>;

    /// Builds a PKCS#10 CSR signed with SHA-256. Subject alternative names
    /// carry RFC 5280 type 2 (DNS) or type 7 (IP) entries.
    fn build_csr(&self, params: &CsrParams, key_pem: &str) -> AcmeResult<Csr>;
}

/// Subject contents for CSR construction.
#[derive(Clone, Debug, Default)]
pub struct CsrParams {
    pub common_name: Option<String>,
    pub alt_names: Vec<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
}

impl CsrParams {
    pub fn new(common_name: impl Into<String>, alt_names: impl IntoIterator<Item = String>) -> Self {
        Self {
            common_name: Some(common_name.into()),
            alt_names: alt_names.into_iter().collect(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct Csr {
    pub pem: String,
    pub der: Vec<u8>,
}
