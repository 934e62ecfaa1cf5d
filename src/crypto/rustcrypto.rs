use rand::rngs::OsRng;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{AcmeError, AcmeResult};

use super::provider::{Csr, CsrParams, CryptoProvider};

/// Default backend: `rsa` for key handling and RS256, `rcgen` for CSRs.
#[derive(Debug, Default)]
pub struct RustCryptoProvider;

impl CryptoProvider for RustCryptoProvider {
    fn generate_private_key(&self, bits: u32) -> AcmeResult<Zeroizing<String>> {
        let key = RsaPrivateKey::new(&mut OsRng, bits as usize)
            .map_err(|err| AcmeError::Crypto(err.into()))?;
        key.to_pkcs8_pem(LineEnding::LF)
            .map_err(|err| AcmeError::Crypto(err.into()))
    }

    fn sign_rs256(&self, key_pem: &str, data: &[u8]) -> AcmeResult<Vec<u8>> {
        let key = parse_private_key(key_pem)?;
        let signing_key = SigningKey::<Sha256>::new(key);
        Ok(signing_key.sign(data).to_vec())
    }

    fn public_modulus(&self, key_pem: &str) -> AcmeResult<Vec<u8>> {
        Ok(parse_private_key(key_pem)?.n().to_bytes_be())
    }

    fn public_exponent(&self, key_pem: &str) -> AcmeResult<Vec<u8>> {
        Ok(parse_private_key(key_pem)?.e().to_bytes_be())
    }

    fn build_csr(&self, params: &CsrParams, key_pem: &str) -> AcmeResult<Csr> {
        let key_pair = KeyPair::from_pem_and_sign_algo(key_pem, &rcgen::PKCS_RSA_SHA256)
            .map_err(|err| AcmeError::Crypto(err.into()))?;

        let mut request_params = CertificateParams::new(params.alt_names.clone())
            .map_err(|err| AcmeError::Crypto(err.into()))?;
        request_params.distinguished_name = distinguished_name(params);

        let request = request_params
            .serialize_request(&key_pair)
            .map_err(|err| AcmeError::Crypto(err.into()))?;
        let pem = request
            .pem()
            .map_err(|err| AcmeError::Crypto(err.into()))?;
        let der = request.der().to_vec();
        Ok(Csr { pem, der })
    }
}

fn distinguished_name(params: &CsrParams) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    if let Some(ref country) = params.country {
        dn.push(DnType::CountryName, country.as_str());
    }
    if let Some(ref state) = params.state {
        dn.push(DnType::StateOrProvinceName, state.as_str());
    }
    if let Some(ref locality) = params.locality {
        dn.push(DnType::LocalityName, locality.as_str());
    }
    if let Some(ref organization) = params.organization {
        dn.push(DnType::OrganizationName, organization.as_str());
    }
    if let Some(ref unit) = params.organization_unit {
        dn.push(DnType::OrganizationalUnitName, unit.as_str());
    }
    if let Some(ref common_name) = params.common_name {
        dn.push(DnType::CommonName, common_name.as_str());
    }
    dn
}

fn parse_private_key(key_pem: &str) -> AcmeResult<RsaPrivateKey> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(key_pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(key_pem)
        .map_err(|err| AcmeError::Crypto(anyhow::anyhow!("unreadable RSA private key: {err}")))
}
