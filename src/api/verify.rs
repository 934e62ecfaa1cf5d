use std::sync::Arc;

use anyhow::anyhow;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use http_client::{HttpClient, Request};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::crypto::base64url_decode;
use crate::error::{AcmeError, AcmeResult};
use crate::wire::authorization::AuthorizationResource;
use crate::wire::challenge::{
    ChallengeResource, CHALLENGE_TYPE_DNS_01, CHALLENGE_TYPE_HTTP_01, CHALLENGE_TYPE_TLS_ALPN_01,
    DNS_01_RECORD_PREFIX, HTTP_01_PATH_PREFIX,
};

static ACME_TLS_ALPN_PROTOCOL: &[u8] = b"acme-tls/1";

/// OID of the id-pe-acmeIdentifier certificate extension (RFC 8737).
static ACME_IDENTIFIER_OID: &str = "1.3.6.1.5.5.7.1.31";

/// Checks that a challenge response is actually visible before asking the
/// server to validate it. Every failure here is transient: callers run this
/// under the polling backoff.
pub(crate) async fn verify_challenge(
    http: &Arc<dyn HttpClient>,
    authz: &AuthorizationResource,
    challenge: &ChallengeResource,
    publish_value: &str,
) -> AcmeResult<()> {
    if challenge.type_ == CHALLENGE_TYPE_HTTP_01 {
        verify_http_01(http, authz, challenge, publish_value).await
    } else if challenge.type_ == CHALLENGE_TYPE_DNS_01 {
        verify_dns_01(authz, publish_value).await
    } else if challenge.type_ == CHALLENGE_TYPE_TLS_ALPN_01 {
        verify_tls_alpn_01(authz, publish_value).await
    } else {
        Err(AcmeError::Config(format!(
            "unsupported challenge type {}",
            challenge.type_
        )))
    }
}

/// Every supported challenge proves control of a DNS name; a non-dns
/// identifier cannot be probed.
fn dns_identifier<'a>(
    authz: &'a AuthorizationResource,
    challenge_type: &str,
) -> AcmeResult<&'a str> {
    authz.identifier.dns_name().ok_or_else(|| {
        AcmeError::Config(format!(
            "{challenge_type} cannot validate a {} identifier",
            authz.identifier.type_
        ))
    })
}

async fn verify_http_01(
    http: &Arc<dyn HttpClient>,
    authz: &AuthorizationResource,
    challenge: &ChallengeResource,
    key_authorization: &str,
) -> AcmeResult<()> {
    let host = dns_identifier(authz, CHALLENGE_TYPE_HTTP_01)?;
    let token = challenge
        .token
        .as_deref()
        .ok_or(AcmeError::MissingExpectedField("token"))?;
    let url = format!("http://{}{}{}", host, HTTP_01_PATH_PREFIX, token);
    debug!(%url, "verifying http-01 provisioning");

    let mut resp = http.send(Request::get(url.as_str())).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AcmeError::State {
            entity: "challenge",
            reason: format!("key authorization not served yet ({})", status),
        });
    }
    let body = resp.body_string().await?;
    if body.trim() != key_authorization {
        return Err(AcmeError::State {
            entity: "challenge",
            reason: "served key authorization does not match".to_string(),
        });
    }
    Ok(())
}

async fn verify_dns_01(authz: &AuthorizationResource, record_value: &str) -> AcmeResult<()> {
    let name = format!("{}{}", DNS_01_RECORD_PREFIX, authz.identifier.base_name());
    debug!(%name, "verifying dns-01 provisioning");

    let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
    let lookup = resolver
        .txt_lookup(name.clone())
        .await
        .map_err(|err| AcmeError::Transport(anyhow!("TXT lookup for {name} failed: {err}")))?;

    // SAN orders on overlapping zones legitimately stack several records.
    let found = lookup.iter().any(|txt| {
        let joined: String = txt
            .txt_data()
            .iter()
            .map(|part| String::from_utf8_lossy(part))
            .collect();
        joined == record_value
    });
    if !found {
        return Err(AcmeError::State {
            entity: "challenge",
            reason: format!("TXT record for {name} not visible yet"),
        });
    }
    Ok(())
}

/// Best-effort: connect with the `acme-tls/1` ALPN protocol and check the
/// offered certificate's SAN and acmeIdentifier extension.
async fn verify_tls_alpn_01(
    authz: &AuthorizationResource,
    publish_value: &str,
) -> AcmeResult<()> {
    let host = dns_identifier(authz, CHALLENGE_TYPE_TLS_ALPN_01)?.to_string();
    debug!(%host, "verifying tls-alpn-01 provisioning");
    let expected_digest = base64url_decode("key authorization digest", publish_value)?;

    let mut config = rustls::ClientConfig::builder()
        .dangerous()
        // The responder presents a self-signed challenge certificate.
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    config.alpn_protocols = vec![ACME_TLS_ALPN_PROTOCOL.to_vec()];

    let server_name = ServerName::try_from(host.clone())
        .map_err(|err| AcmeError::Transport(anyhow!("invalid server name {host}: {err}")))?;
    let tcp = TcpStream::connect((host.as_str(), 443))
        .await
        .map_err(|err| AcmeError::Transport(anyhow!("connect to {host}:443 failed: {err}")))?;
    let connector = TlsConnector::from(Arc::new(config));
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|err| AcmeError::Transport(anyhow!("TLS handshake with {host} failed: {err}")))?;

    let (_, session) = tls.get_ref();
    if session.alpn_protocol() != Some(ACME_TLS_ALPN_PROTOCOL) {
        return Err(AcmeError::State {
            entity: "challenge",
            reason: "responder did not negotiate acme-tls/1".to_string(),
        });
    }
    let leaf = session
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or(AcmeError::State {
            entity: "challenge",
            reason: "responder offered no certificate".to_string(),
        })?;

    check_alpn_certificate(leaf, &host, &expected_digest)
}

fn check_alpn_certificate(
    leaf: &CertificateDer<'_>,
    host: &str,
    expected_digest: &[u8],
) -> AcmeResult<()> {
    let (_, cert) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|err| AcmeError::Crypto(anyhow!("unreadable challenge certificate: {err}")))?;

    let san_matches = matches!(
        cert.subject_alternative_name(),
        Ok(Some(ext)) if ext.value.general_names.iter().any(|name| {
            matches!(name, x509_parser::extensions::GeneralName::DNSName(dns) if *dns == host)
        })
    );
    if !san_matches {
        return Err(AcmeError::State {
            entity: "challenge",
            reason: "challenge certificate SAN does not cover the identifier".to_string(),
        });
    }

    // Extension value is an OCTET STRING wrapping the 32-byte digest.
    let digest_matches = cert.extensions().iter().any(|ext| {
        ext.oid.to_id_string() == ACME_IDENTIFIER_OID
            && ext.value.len() == 34
            && ext.value[0] == 0x04
            && ext.value[1] == 0x20
            && &ext.value[2..] == expected_digest
    });
    if !digest_matches {
        return Err(AcmeError::State {
            entity: "challenge",
            reason: "acmeIdentifier extension missing or stale".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
