use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::base64url;

/// RSA public key as a JSON Web Key.
///
/// Field declaration order is `e`, `kty`, `n`: serialization therefore matches
/// the lexicographic member ordering RFC 7638 requires for thumbprints.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Jwk {
    pub e: String,
    pub kty: String,
    pub n: String,
}

impl Jwk {
    /// Builds the JWK from raw big-endian modulus and exponent bytes.
    pub fn from_rsa_components(modulus: &[u8], exponent: &[u8]) -> Self {
        Self {
            e: base64url(strip_leading_zeros(exponent)),
            kty: "RSA".to_string(),
            n: base64url(strip_leading_zeros(modulus)),
        }
    }

    /// RFC 7638 thumbprint: SHA-256 over the canonical JSON rendering.
    pub fn thumbprint(&self) -> [u8; 32] {
        let canonical = serde_json::to_vec(self).expect("jwk serialization is infallible");
        Sha256::digest(canonical).into()
    }

    pub fn thumbprint_b64(&self) -> String {
        base64url(self.thumbprint())
    }

    /// `token || "." || base64url(SHA-256(canonical JWK))`
    pub fn key_authorization(&self, token: &str) -> String {
        format!("{}.{}", token, self.thumbprint_b64())
    }
}

/// dns-01 publishes the hashed key authorization as the TXT record value.
pub fn dns_record_value(key_authorization: &str) -> String {
    base64url(Sha256::digest(key_authorization.as_bytes()))
}

/// tls-alpn-01 embeds the raw 32-byte digest in the acmeIdentifier extension.
pub fn tls_alpn_digest(key_authorization: &str) -> [u8; 32] {
    Sha256::digest(key_authorization.as_bytes()).into()
}

/// DER integers are sign-padded; JWK components are not.
fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
