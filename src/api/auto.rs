use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::crypto::x509::{self, CsrDomains};
use crate::error::{AcmeError, AcmeResult};
use crate::retry::{retry, Abort};
use crate::wire::authorization::{AuthorizationResource, AuthorizationStatus};
use crate::wire::challenge::{
    ChallengeResource, CHALLENGE_TYPE_DNS_01, CHALLENGE_TYPE_HTTP_01,
};
use crate::wire::common::LocationResource;
use crate::wire::identifier::AcmeIdentifier;
use crate::wire::order::{NewOrderResource, OrderStatus};

use super::client::{AccountOptions, Client, Contact};
use super::verify;

/// The user-supplied side of challenge fulfilment: publish a response where
/// the CA will look for it, and take it down again afterwards.
///
/// `deploy` failures abort the order. `cleanup` always runs for every
/// deployed challenge, even on failure or cancellation; its errors are
/// logged and swallowed.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    async fn deploy(
        &self,
        authz: &AuthorizationResource,
        challenge: &ChallengeResource,
        key_authorization: &str,
    ) -> anyhow::Result<()>;

    async fn cleanup(
        &self,
        authz: &AuthorizationResource,
        challenge: &ChallengeResource,
        key_authorization: &str,
    ) -> anyhow::Result<()>;
}

pub fn default_challenge_priority() -> Vec<String> {
    vec![
        CHALLENGE_TYPE_HTTP_01.to_string(),
        CHALLENGE_TYPE_DNS_01.to_string(),
    ]
}

pub struct AutoOptions {
    /// The CSR to finalize the order with, PEM or DER.
    pub csr: Vec<u8>,

    pub solver: Arc<dyn ChallengeSolver>,

    /// Registered as a mailto: contact when the account is created here.
    pub email: Option<String>,

    pub terms_of_service_agreed: bool,

    /// Challenge types in preference order. Wildcard identifiers ignore
    /// this and always use dns-01.
    pub challenge_priority: Vec<String>,

    /// Skips the pre-validation probe and posts the challenge response
    /// immediately.
    pub skip_challenge_verification: bool,

    /// Caller-side cancellation; checked between polling attempts. Cleanup
    /// still runs before the cancellation surfaces.
    pub cancel: Option<Abort>,
}

impl AutoOptions {
    pub fn new(csr: impl Into<Vec<u8>>, solver: Arc<dyn ChallengeSolver>) -> Self {
        Self {
            csr: csr.into(),
            solver,
            email: None,
            terms_of_service_agreed: false,
            challenge_priority: default_challenge_priority(),
            skip_challenge_verification: false,
            cancel: None,
        }
    }

    fn check_cancelled(&self) -> AcmeResult<()> {
        match &self.cancel {
            Some(cancel) if cancel.is_aborted() => Err(AcmeError::Cancelled),
            _ => Ok(()),
        }
    }
}

impl Client {
    /// Runs an order from CSR to issued certificate chain: account setup,
    /// newOrder, one challenge per pending authorization, finalize, and
    /// download.
    pub async fn auto(&mut self, options: AutoOptions) -> AcmeResult<String> {
        if self.account_url().is_none() {
            let contact = match options.email.clone() {
                Some(email) => vec![Contact::Email(email)],
                None => Vec::new(),
            };
            self.create_or_find_account(AccountOptions {
                contact,
                terms_of_service_agreed: options.terms_of_service_agreed,
                ..Default::default()
            })
            .await?;
        }

        let domains = x509::csr_domains(&options.csr)?;
        let identifiers = order_identifiers(&domains)?;
        info!(count = identifiers.len(), "placing order");

        let mut order = self
            .create_order(&NewOrderResource {
                identifiers,
                ..Default::default()
            })
            .await?;
        let order_url = order.take_location()?;

        let authorizations = self.get_authorizations(&order).await?;

        for authz in &authorizations {
            options.check_cancelled()?;
            match authz.status {
                AuthorizationStatus::Valid => {
                    debug!(identifier = %authz.identifier.value, "authorization already valid");
                }
                AuthorizationStatus::Pending => {
                    self.solve_authorization(&options, authz).await?;
                }
                other => {
                    authz.status_result()?;
                    return Err(AcmeError::State {
                        entity: "authorization",
                        reason: format!("{other:?}").to_ascii_lowercase(),
                    });
                }
            }
        }

        options.check_cancelled()?;
        let order = self
            .wait_for_order_status_with(&order_url, OrderStatus::Ready, options.cancel.as_ref())
            .await?;

        let order = if order.status == OrderStatus::Valid {
            order
        } else {
            let csr_der = x509::csr_der(&options.csr)?;
            self.finalize_order(&order, &csr_der).await?
        };

        let order = if order.status == OrderStatus::Valid {
            order
        } else {
            self.wait_for_order_status_with(&order_url, OrderStatus::Valid, options.cancel.as_ref())
                .await?
        };

        let chain = self.download_certificate(&order).await?;
        info!("certificate issued");
        Ok(chain)
    }

    async fn solve_authorization(
        &self,
        options: &AutoOptions,
        authz: &AuthorizationResource,
    ) -> AcmeResult<()> {
        let challenge = select_challenge(authz, &options.challenge_priority)?;
        let publish_value = self.challenge_key_authorization(challenge)?;
        info!(
            identifier = %authz.identifier.value,
            challenge = %challenge.type_,
            "deploying challenge response"
        );
        options
            .solver
            .deploy(authz, challenge, &publish_value)
            .await
            .map_err(|err| AcmeError::State {
                entity: "challenge",
                reason: format!("challenge deployment failed: {err}"),
            })?;

        let outcome = self
            .validate_challenge(options, authz, challenge, &publish_value)
            .await;

        // Cleanup is unconditional and best-effort.
        if let Err(err) = options.solver.cleanup(authz, challenge, &publish_value).await {
            warn!(
                identifier = %authz.identifier.value,
                error = %err,
                "challenge cleanup failed"
            );
        }
        outcome
    }

    async fn validate_challenge(
        &self,
        options: &AutoOptions,
        authz: &AuthorizationResource,
        challenge: &ChallengeResource,
        publish_value: &str,
    ) -> AcmeResult<()> {
        if !options.skip_challenge_verification {
            retry(self.backoff(), |_abort| async move {
                options.check_cancelled()?;
                verify::verify_challenge(self.http(), authz, challenge, publish_value).await
            })
            .await?;
        }

        options.check_cancelled()?;
        self.complete_challenge(challenge).await?;

        let authorization_url = authz
            .location
            .as_deref()
            .ok_or(AcmeError::MissingExpectedField("location"))?;
        self.wait_for_valid_authorization_with(authorization_url, options.cancel.as_ref())
            .await?;
        info!(identifier = %authz.identifier.value, "authorization valid");
        Ok(())
    }
}

/// Wildcard identifiers are pinned to dns-01 regardless of the configured
/// priority; everything else takes the first priority entry the server
/// offers.
fn select_challenge<'a>(
    authz: &'a AuthorizationResource,
    priority: &[String],
) -> AcmeResult<&'a ChallengeResource> {
    if authz.wildcard || authz.identifier.is_wildcard() {
        return authz
            .find_challenge(CHALLENGE_TYPE_DNS_01)
            .ok_or_else(|| AcmeError::State {
                entity: "authorization",
                reason: format!(
                    "wildcard identifier {} offers no dns-01 challenge",
                    authz.identifier.value
                ),
            });
    }
    for wanted in priority {
        if let Some(challenge) = authz.find_challenge(wanted) {
            return Ok(challenge);
        }
    }
    Err(AcmeError::State {
        entity: "authorization",
        reason: format!(
            "no offered challenge matches priority [{}]",
            priority.join(", ")
        ),
    })
}

/// Order identifiers come from the CSR: common name first, then subject
/// alternative names, deduplicated.
fn order_identifiers(domains: &CsrDomains) -> AcmeResult<Vec<AcmeIdentifier>> {
    let mut names: Vec<String> = Vec::new();
    if let Some(ref common_name) = domains.common_name {
        names.push(common_name.clone());
    }
    for alt_name in &domains.alt_names {
        if !names.contains(alt_name) {
            names.push(alt_name.clone());
        }
    }
    if names.is_empty() {
        return Err(AcmeError::Config(
            "CSR names no identifiers".to_string(),
        ));
    }
    Ok(names.into_iter().map(AcmeIdentifier::dns).collect())
}
