use std::sync::{Arc, Mutex};

use futures_util::future::try_join_all;
use http_client::HttpClient;
use serde_json::Value;
use tracing::{debug, info};

use crate::crypto::account_key::AccountKey;
use crate::crypto::jwk::dns_record_value;
use crate::crypto::jws::{jws_flattened, JwsHeader, JwsSigner};
use crate::crypto::provider::CryptoProvider;
use crate::crypto::{self, base64url, DEFAULT_KEY_BITS};
use crate::error::{AcmeError, AcmeResult};
use crate::retry::{retry, Abort, RetryOptions};
use crate::wire::account::{
    AccountResource, AccountStatus, KeyChangeRequest, NewAccountResource, UpdateAccountRequest,
};
use crate::wire::authorization::{AuthorizationResource, AuthorizationStatus};
use crate::wire::challenge::{
    ChallengeResource, ChallengeResponse, CHALLENGE_TYPE_DNS_01, CHALLENGE_TYPE_HTTP_01,
    CHALLENGE_TYPE_TLS_ALPN_01,
};
use crate::wire::client::AcmeClient;
use crate::wire::common::LocationResource;
use crate::wire::directory::DirectoryEndpoint;
use crate::wire::order::{FinalizeOrder, NewOrderResource, OrderResource, OrderStatus};
use crate::wire::revocation::{RevocationReason, RevokeCertRequest};

/// Client construction options. Everything flows through here; the crate
/// reads no ambient configuration.
pub struct ClientConfig {
    /// ACME directory endpoint.
    pub directory_url: String,

    /// PEM-encoded RSA account private key.
    pub account_key: String,

    /// Pre-known account URL; skips discovery when set.
    pub account_url: Option<String>,

    /// Polling parameters shared by every wait loop.
    pub backoff: RetryOptions,

    /// User-Agent header value; defaults to `acme-client/<version> (<os>)`.
    pub user_agent: Option<String>,
}

impl ClientConfig {
    pub fn new(directory_url: impl Into<String>, account_key_pem: impl Into<String>) -> Self {
        Self {
            directory_url: directory_url.into(),
            account_key: account_key_pem.into(),
            account_url: None,
            backoff: RetryOptions::default(),
            user_agent: None,
        }
    }
}

pub fn default_user_agent() -> String {
    format!(
        "acme-client/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

#[derive(Default)]
pub struct AccountOptions {
    pub contact: Vec<Contact>,
    pub terms_of_service_agreed: bool,
    pub only_return_existing: bool,
    pub external_account_binding: Option<Value>,
}

pub enum Contact {
    Email(String),
    Uri(String),
}

impl Contact {
    pub(crate) fn uri(self) -> String {
        match self {
            Self::Email(email) if !email.starts_with("mailto:") => format!("mailto:{}", email),
            Self::Email(email) => email,
            Self::Uri(uri) => uri,
        }
    }
}

/// ACME protocol client bound to one directory and one account key.
///
/// Operations that sign requests take `&self`; key rollover takes `&mut self`
/// so the key swap cannot race an in-flight signed request.
pub struct Client {
    http: Arc<dyn HttpClient>,
    provider: Arc<dyn CryptoProvider>,
    directory_url: String,
    backoff: RetryOptions,
    user_agent: String,
    account_key: AccountKey,
    account_url: Option<String>,
    transport: Mutex<Option<Arc<AcmeClient>>>,
}

impl Client {
    pub fn new(http: impl Into<Arc<dyn HttpClient>>, config: ClientConfig) -> AcmeResult<Self> {
        Self::with_provider(http, crypto::default_provider(), config)
    }

    pub fn with_provider(
        http: impl Into<Arc<dyn HttpClient>>,
        provider: Arc<dyn CryptoProvider>,
        config: ClientConfig,
    ) -> AcmeResult<Self> {
        if config.directory_url.is_empty() {
            return Err(AcmeError::Config("directory URL is required".to_string()));
        }
        if config.account_key.is_empty() {
            return Err(AcmeError::Config("account key is required".to_string()));
        }
        let account_key = AccountKey::from_pem(provider.clone(), config.account_key)
            .map_err(|err| AcmeError::Config(format!("invalid account key: {err}")))?;
        Ok(Self {
            http: http.into(),
            provider,
            directory_url: config.directory_url,
            backoff: config.backoff,
            user_agent: config.user_agent.unwrap_or_else(default_user_agent),
            account_key,
            account_url: config.account_url,
            transport: Mutex::new(None),
        })
    }

    pub fn account_key(&self) -> &AccountKey {
        &self.account_key
    }

    pub fn account_url(&self) -> Option<&str> {
        self.account_url.as_deref()
    }

    pub fn backoff(&self) -> &RetryOptions {
        &self.backoff
    }

    pub(crate) fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    pub async fn terms_of_service_url(&self) -> AcmeResult<Option<String>> {
        let transport = self.transport().await?;
        Ok(transport.directory().meta.terms_of_service.clone())
    }

    /// The directory is fetched on first use and cached for the lifetime of
    /// the client.
    async fn transport(&self) -> AcmeResult<Arc<AcmeClient>> {
        if let Some(transport) = self.transport.lock().unwrap().clone() {
            return Ok(transport);
        }
        let directory =
            AcmeClient::get_directory(self.http.as_ref(), &self.directory_url, &self.user_agent)
                .await?;
        let transport = Arc::new(AcmeClient::new(
            self.http.clone(),
            directory,
            self.user_agent.clone(),
        ));
        let mut slot = self.transport.lock().unwrap();
        Ok(slot.get_or_insert(transport).clone())
    }

    fn require_account_url(&self) -> AcmeResult<String> {
        self.account_url
            .clone()
            .ok_or_else(|| AcmeError::Config("no account URL; create or find an account first".to_string()))
    }

    /// Validates a pre-configured account URL, or registers/discovers an
    /// account via newAccount. HTTP 201 means the account was created, 200
    /// that the server matched the key to an existing one; the Location
    /// header is persisted either way.
    pub async fn create_or_find_account(
        &mut self,
        options: AccountOptions,
    ) -> AcmeResult<AccountResource> {
        if let Some(account_url) = self.account_url.clone() {
            let transport = self.transport().await?;
            let account = transport
                .update_account(&self.account_key, &account_url, &UpdateAccountRequest::default())
                .await?;
            debug!(url = %account_url, "pre-configured account URL validated");
            return Ok(account);
        }

        let transport = self.transport().await?;
        let new_account = NewAccountResource {
            contact: options.contact.into_iter().map(Contact::uri).collect(),
            terms_of_service_agreed: options.terms_of_service_agreed,
            only_return_existing: options.only_return_existing,
            external_account_binding: options.external_account_binding,
        };
        let (status, mut account) = transport
            .new_account(&self.account_key, self.account_key.jwk(), &new_account)
            .await?;
        let account_url = account.take_location()?;
        if status == http_types::StatusCode::Created {
            info!(url = %account_url, "account created");
        } else {
            info!(url = %account_url, "existing account found");
        }
        self.account_url = Some(account_url);
        Ok(account)
    }

    /// Looks up the account for the configured key without ever creating
    /// one (RFC 8555 section 7.3.1, `onlyReturnExisting`).
    pub async fn find_account(&mut self) -> AcmeResult<AccountResource> {
        self.create_or_find_account(AccountOptions {
            only_return_existing: true,
            ..Default::default()
        })
        .await
    }

    pub async fn update_account(
        &self,
        update: &UpdateAccountRequest,
    ) -> AcmeResult<AccountResource> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        transport
            .update_account(&self.account_key, &account_url, update)
            .await
    }

    pub async fn deactivate_account(&self) -> AcmeResult<AccountResource> {
        self.update_account(&UpdateAccountRequest {
            status: Some(AccountStatus::Deactivated),
            ..Default::default()
        })
        .await
    }

    /// Account key rollover: an inner JWS signed by the replacement key
    /// (jwk header, no nonce) is wrapped in an outer JWS signed by the
    /// current key. On success the client key is swapped and the nonce pool
    /// drained.
    pub async fn update_account_key(&mut self, new_key_pem: Option<String>) -> AcmeResult<()> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;

        let new_key = match new_key_pem {
            Some(pem) => AccountKey::from_pem(self.provider.clone(), pem)
                .map_err(|err| AcmeError::Config(format!("invalid replacement key: {err}")))?,
            None => AccountKey::generate(self.provider.clone(), DEFAULT_KEY_BITS)?,
        };

        let key_change_url = transport
            .directory()
            .endpoint(DirectoryEndpoint::KeyChange)
            .to_string();
        let payload = KeyChangeRequest {
            account: account_url.clone(),
            old_key: self.account_key.jwk().clone(),
        };
        let inner_header = JwsHeader {
            alg: new_key.jws_alg(),
            nonce: None,
            url: &key_change_url,
            jwk: Some(new_key.jwk()),
            kid: None,
        };
        let inner = jws_flattened(&new_key, &inner_header, &serde_json::to_vec(&payload)?)
            .map_err(AcmeError::Crypto)?;

        transport
            .key_change(&self.account_key, &account_url, &inner)
            .await?;

        info!(thumbprint = %new_key.thumbprint(), "account key rolled over");
        self.account_key = new_key;
        transport.clear_nonces();
        Ok(())
    }

    pub async fn create_order(&self, new_order: &NewOrderResource) -> AcmeResult<OrderResource> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        let order = transport
            .new_order(&self.account_key, &account_url, new_order)
            .await?;
        debug!(url = ?order.location, identifiers = order.identifiers.len(), "order created");
        Ok(order)
    }

    pub async fn get_order(&self, order_url: &str) -> AcmeResult<OrderResource> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        let mut order = transport
            .get_order(&self.account_key, &account_url, order_url)
            .await?;
        order.location.get_or_insert_with(|| order_url.to_string());
        Ok(order)
    }

    /// Fetches every authorization of an order in parallel.
    pub async fn get_authorizations(
        &self,
        order: &OrderResource,
    ) -> AcmeResult<Vec<AuthorizationResource>> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        try_join_all(order.authorizations.iter().map(|authorization_url| {
            let transport = transport.clone();
            let account_url = account_url.clone();
            async move {
                let mut authz = transport
                    .get_authorization(&self.account_key, &account_url, authorization_url)
                    .await?;
                authz.location.get_or_insert_with(|| authorization_url.clone());
                Ok::<_, AcmeError>(authz)
            }
        }))
        .await
    }

    pub async fn get_authorization(
        &self,
        authorization_url: &str,
    ) -> AcmeResult<AuthorizationResource> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        let mut authz = transport
            .get_authorization(&self.account_key, &account_url, authorization_url)
            .await?;
        authz
            .location
            .get_or_insert_with(|| authorization_url.to_string());
        Ok(authz)
    }

    pub async fn deactivate_authorization(
        &self,
        authorization_url: &str,
    ) -> AcmeResult<AuthorizationResource> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        transport
            .deactivate_authorization(&self.account_key, &account_url, authorization_url)
            .await
    }

    /// The value the challenge response publishes: the raw key authorization
    /// for http-01, its base64url-encoded SHA-256 for dns-01 and
    /// tls-alpn-01.
    pub fn challenge_key_authorization(&self, challenge: &ChallengeResource) -> AcmeResult<String> {
        let token = challenge
            .token
            .as_deref()
            .ok_or(AcmeError::MissingExpectedField("token"))?;
        let key_authorization = self.account_key.key_authorization(token);
        if challenge.type_ == CHALLENGE_TYPE_HTTP_01 {
            Ok(key_authorization)
        } else if challenge.type_ == CHALLENGE_TYPE_DNS_01
            || challenge.type_ == CHALLENGE_TYPE_TLS_ALPN_01
        {
            Ok(dns_record_value(&key_authorization))
        } else {
            Err(AcmeError::Config(format!(
                "unsupported challenge type {}",
                challenge.type_
            )))
        }
    }

    /// Tells the server the challenge is ready for validation.
    pub async fn complete_challenge(
        &self,
        challenge: &ChallengeResource,
    ) -> AcmeResult<ChallengeResource> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        let token = challenge
            .token
            .as_deref()
            .ok_or(AcmeError::MissingExpectedField("token"))?;
        let response = ChallengeResponse {
            key_authorization: self.account_key.key_authorization(token),
        };
        transport
            .complete_challenge(&self.account_key, &account_url, &challenge.url, &response)
            .await
    }

    pub async fn finalize_order(
        &self,
        order: &OrderResource,
        csr_der: &[u8],
    ) -> AcmeResult<OrderResource> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        let finalize_url = order
            .finalize
            .as_deref()
            .ok_or(AcmeError::MissingExpectedField("finalize"))?;
        let finalize = FinalizeOrder {
            csr: base64url(csr_der),
        };
        let mut finalized = transport
            .finalize_order(&self.account_key, &account_url, finalize_url, &finalize)
            .await?;
        if finalized.location.is_none() {
            finalized.location = order.location.clone();
        }
        Ok(finalized)
    }

    pub async fn download_certificate(&self, order: &OrderResource) -> AcmeResult<String> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        let certificate_url = order
            .certificate
            .as_deref()
            .ok_or(AcmeError::MissingExpectedField("certificate"))?;
        transport
            .download_certificate(&self.account_key, &account_url, certificate_url)
            .await
    }

    /// https://www.rfc-editor.org/rfc/rfc8555.html#section-7.6
    pub async fn revoke_certificate(
        &self,
        certificate_pem: &str,
        reason: Option<RevocationReason>,
    ) -> AcmeResult<()> {
        let account_url = self.require_account_url()?;
        let transport = self.transport().await?;
        let der = crypto::x509::certificate_der(certificate_pem)?;
        let revocation = RevokeCertRequest {
            certificate: base64url(der),
            reason,
        };
        transport
            .revoke_cert(&self.account_key, &account_url, &revocation)
            .await
    }

    /// Polls an authorization until it leaves the pending state; terminal
    /// failure states abort the retry loop immediately.
    pub async fn wait_for_valid_authorization(
        &self,
        authorization_url: &str,
    ) -> AcmeResult<AuthorizationResource> {
        self.wait_for_valid_authorization_with(authorization_url, None)
            .await
    }

    pub(crate) async fn wait_for_valid_authorization_with(
        &self,
        authorization_url: &str,
        cancel: Option<&Abort>,
    ) -> AcmeResult<AuthorizationResource> {
        retry(&self.backoff, |abort| async move {
            if cancel.map(Abort::is_aborted).unwrap_or(false) {
                return Err(AcmeError::Cancelled);
            }
            let authz = self.get_authorization(authorization_url).await?;
            match authz.status {
                AuthorizationStatus::Valid => Ok(authz),
                AuthorizationStatus::Pending => Err(AcmeError::State {
                    entity: "authorization",
                    reason: "still pending".to_string(),
                }),
                other => {
                    abort.abort();
                    match authz.status_result() {
                        Err(err) => Err(err),
                        Ok(_) => Err(AcmeError::State {
                            entity: "authorization",
                            reason: format!("{:?}", other).to_ascii_lowercase(),
                        }),
                    }
                }
            }
        })
        .await
    }

    /// Polls an order until it reaches `target` (or the always-acceptable
    /// `valid`); `invalid` aborts immediately with the server-reported
    /// reason.
    pub async fn wait_for_order_status(
        &self,
        order_url: &str,
        target: OrderStatus,
    ) -> AcmeResult<OrderResource> {
        self.wait_for_order_status_with(order_url, target, None)
            .await
    }

    pub(crate) async fn wait_for_order_status_with(
        &self,
        order_url: &str,
        target: OrderStatus,
        cancel: Option<&Abort>,
    ) -> AcmeResult<OrderResource> {
        retry(&self.backoff, |abort| async move {
            if cancel.map(Abort::is_aborted).unwrap_or(false) {
                return Err(AcmeError::Cancelled);
            }
            let order = self.get_order(order_url).await?;
            match order.status {
                status if status == target || status == OrderStatus::Valid => Ok(order),
                OrderStatus::Invalid => {
                    abort.abort();
                    match order.status_result() {
                        Err(err) => Err(err),
                        Ok(_) => Err(AcmeError::State {
                            entity: "order",
                            reason: "invalid".to_string(),
                        }),
                    }
                }
                status => Err(AcmeError::State {
                    entity: "order",
                    reason: format!("still {:?}", status).to_ascii_lowercase(),
                }),
            }
        })
        .await
    }
}
