use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Signer;
use openssl::stack::Stack;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509NameBuilder, X509ReqBuilder};
use zeroize::Zeroizing;

use crate::error::{AcmeError, AcmeResult};

use super::provider::{Csr, CsrParams, CryptoProvider};

/// OpenSSL-backed provider, selected with the `openssl-backend` feature.
/// Behaves identically to [`super::rustcrypto::RustCryptoProvider`].
#[derive(Debug, Default)]
pub struct OpensslProvider;

impl CryptoProvider for OpensslProvider {
    fn generate_private_key(&self, bits: u32) -> AcmeResult<Zeroizing<String>> {
        let key = PKey::from_rsa(Rsa::generate(bits)?)?;
        let pem = String::from_utf8(key.private_key_to_pem_pkcs8()?)
            .map_err(|err| AcmeError::Crypto(err.into()))?;
        Ok(Zeroizing::new(pem))
    }

    fn sign_rs256(&self, key_pem: &str, data: &[u8]) -> AcmeResult<Vec<u8>> {
        let key = private_key(key_pem)?;
        let mut signer = Signer::new(MessageDigest::sha256(), &key)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }

    fn public_modulus(&self, key_pem: &str) -> AcmeResult<Vec<u8>> {
        Ok(private_key(key_pem)?.rsa()?.n().to_vec())
    }

    fn public_exponent(&self, key_pem: &str) -> AcmeResult<Vec<u8>> {
        Ok(private_key(key_pem)?.rsa()?.e().to_vec())
    }

    fn build_csr(&self, params: &CsrParams, key_pem: &str) -> AcmeResult<Csr> {
        let key = private_key(key_pem)?;

        let mut builder = X509ReqBuilder::new()?;
        builder.set_pubkey(key.as_ref())?;
        builder.set_subject_name(subject_name(params)?.as_ref())?;

        if !params.alt_names.is_empty() {
            let mut san = SubjectAlternativeName::new();
            for name in &params.alt_names {
                if name.parse::<std::net::IpAddr>().is_ok() {
                    san.ip(name);
                } else {
                    san.dns(name);
                }
            }
            let mut extensions = Stack::new()?;
            extensions.push(san.build(&builder.x509v3_context(None))?)?;
            builder.add_extensions(extensions.as_ref())?;
        }

        builder.sign(key.as_ref(), MessageDigest::sha256())?;
        let request = builder.build();
        let pem = String::from_utf8(request.to_pem()?)
            .map_err(|err| AcmeError::Crypto(err.into()))?;
        let der = request.to_der()?;
        Ok(Csr { pem, der })
    }
}

fn private_key(key_pem: &str) -> AcmeResult<PKey<Private>> {
    Ok(PKey::private_key_from_pem(key_pem.as_bytes())?)
}

fn subject_name(params: &CsrParams) -> AcmeResult<openssl::x509::X509Name> {
    let mut name = X509NameBuilder::new()?;
    let fields = [
        (Nid::COUNTRYNAME, &params.country),
        (Nid::STATEORPROVINCENAME, &params.state),
        (Nid::LOCALITYNAME, &params.locality),
        (Nid::ORGANIZATIONNAME, &params.organization),
        (Nid::ORGANIZATIONALUNITNAME, &params.organization_unit),
        (Nid::COMMONNAME, &params.common_name),
    ];
    for (nid, value) in fields {
        if let Some(value) = value {
            name.append_entry_by_nid(nid, value)?;
        }
    }
    Ok(name.build())
}

impl From<ErrorStack> for AcmeError {
    fn from(err: ErrorStack) -> Self {
        AcmeError::Crypto(err.into())
    }
}
