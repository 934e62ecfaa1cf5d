use serde::Serialize;

use super::base64url;

pub static CONTENT_TYPE: &str = "application/jose+json";

pub trait JwsSigner {
    fn jws_alg(&self) -> &str;
    fn jws_sign(&self, input: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// RFC 7515 flattened JSON serialization. The signing input is
/// `base64url(protected) || "." || base64url(payload)`.
pub fn jws_flattened(
    signer: &impl JwsSigner,
    header: &JwsHeader<impl Serialize>,
    payload: &[u8],
) -> anyhow::Result<Jws> {
    let header_json = serde_json::to_vec(header)?;
    let header_b64 = base64url(header_json);
    let payload_b64 = base64url(payload);
    let input = format!("{}.{}", header_b64, payload_b64);
    let signature = signer.jws_sign(input.as_bytes())?;
    let signature_b64 = base64url(signature);
    Ok(Jws {
        protected: header_b64,
        payload: payload_b64,
        signature: signature_b64,
    })
}

#[derive(Serialize, Debug)]
pub struct Jws {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

/// ACME protected header: `url` must equal the request target, and exactly
/// one of `jwk` / `kid` is set. The nonce is absent only in the key-rollover
/// inner JWS.
#[derive(Serialize)]
pub struct JwsHeader<'a, JwkT: Serialize> {
    pub alg: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<&'a str>,

    pub url: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<JwkT>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<&'a str>,
}
