use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::FromDer;
use x509_parser::public_key::PublicKey;

use crate::error::{AcmeError, AcmeResult};

/// Domains and validity window of a parsed certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateInfo {
    pub common_name: Option<String>,
    pub alt_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Subject contents of a parsed PKCS#10 request, SAN order preserved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrDomains {
    pub common_name: Option<String>,
    pub alt_names: Vec<String>,
}

/// Parses the first certificate of a PEM chain.
pub fn certificate_info(pem_chain: &str) -> AcmeResult<CertificateInfo> {
    let (_, pem) = parse_x509_pem(pem_chain.as_bytes())
        .map_err(|err| AcmeError::Crypto(anyhow!("invalid certificate PEM: {err}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|err| AcmeError::Crypto(anyhow!("invalid certificate DER: {err}")))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string);

    let alt_names = match cert.subject_alternative_name() {
        Ok(Some(ext)) => general_names(&ext.value.general_names),
        _ => Vec::new(),
    };

    Ok(CertificateInfo {
        common_name,
        alt_names,
        not_before: timestamp(cert.validity().not_before.timestamp())?,
        not_after: timestamp(cert.validity().not_after.timestamp())?,
    })
}

/// RSA modulus and exponent of the first certificate in a PEM chain, raw
/// big-endian with sign padding stripped.
pub fn certificate_rsa_public_key(pem_chain: &str) -> AcmeResult<(Vec<u8>, Vec<u8>)> {
    let (_, pem) = parse_x509_pem(pem_chain.as_bytes())
        .map_err(|err| AcmeError::Crypto(anyhow!("invalid certificate PEM: {err}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|err| AcmeError::Crypto(anyhow!("invalid certificate DER: {err}")))?;

    match cert.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => Ok((rsa.modulus.to_vec(), rsa.exponent.to_vec())),
        Ok(_) => Err(AcmeError::Crypto(anyhow!("certificate key is not RSA"))),
        Err(err) => Err(AcmeError::Crypto(anyhow!("unreadable public key: {err}"))),
    }
}

/// DER body of the first certificate in a PEM chain, as revocation requests
/// submit it.
pub fn certificate_der(pem_chain: &str) -> AcmeResult<Vec<u8>> {
    let (_, pem) = parse_x509_pem(pem_chain.as_bytes())
        .map_err(|err| AcmeError::Crypto(anyhow!("invalid certificate PEM: {err}")))?;
    Ok(pem.contents)
}

/// DER body of a CSR supplied as either PEM or DER; finalize requests
/// submit base64url(DER).
pub fn csr_der(csr: &[u8]) -> AcmeResult<Vec<u8>> {
    if csr.starts_with(b"-----BEGIN") {
        let (_, pem) = parse_x509_pem(csr)
            .map_err(|err| AcmeError::Crypto(anyhow!("invalid CSR PEM: {err}")))?;
        Ok(pem.contents)
    } else {
        Ok(csr.to_vec())
    }
}

/// Extracts the subject common name and alternative names from a CSR, PEM or
/// DER.
pub fn csr_domains(csr: &[u8]) -> AcmeResult<CsrDomains> {
    let der;
    let der_slice = if csr.starts_with(b"-----BEGIN") {
        let (_, pem) = parse_x509_pem(csr)
            .map_err(|err| AcmeError::Crypto(anyhow!("invalid CSR PEM: {err}")))?;
        der = pem.contents;
        der.as_slice()
    } else {
        csr
    };

    let (_, request) = X509CertificationRequest::from_der(der_slice)
        .map_err(|err| AcmeError::Crypto(anyhow!("invalid CSR DER: {err}")))?;

    let common_name = request
        .certification_request_info
        .subject
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_string);

    let alt_names = request
        .requested_extensions()
        .into_iter()
        .flatten()
        .find_map(|ext| match ext {
            ParsedExtension::SubjectAlternativeName(san) => {
                Some(general_names(&san.general_names))
            }
            _ => None,
        })
        .unwrap_or_default();

    Ok(CsrDomains {
        common_name,
        alt_names,
    })
}

fn general_names(names: &[GeneralName]) -> Vec<String> {
    names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some((*dns).to_string()),
            GeneralName::IPAddress(bytes) => ip_to_string(bytes),
            _ => None,
        })
        .collect()
}

fn ip_to_string(bytes: &[u8]) -> Option<String> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(std::net::Ipv4Addr::from(octets).to_string())
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(std::net::Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}

fn timestamp(secs: i64) -> AcmeResult<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| AcmeError::Crypto(anyhow!("certificate validity out of range")))
}
