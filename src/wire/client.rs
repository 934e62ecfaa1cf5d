use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use http_client::{Body, HttpClient, Request, Response};
use http_types::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    account::{AccountResource, NewAccountResource, UpdateAccountRequest},
    authorization::{AuthorizationResource, DeactivateAuthorization},
    challenge::{ChallengeResource, ChallengeResponse},
    common::LocationResource,
    directory::{DirectoryEndpoint, DirectoryResource},
    order::{FinalizeOrder, NewOrderResource, OrderResource},
    problem::AcmeProblem,
    revocation::RevokeCertRequest,
};
use crate::{
    crypto::jws::{self, jws_flattened, Jws, JwsHeader, JwsSigner},
    error::{AcmeError, AcmeResult},
};

/// Signed-request transport: owns the cached directory and the nonce pool,
/// builds and dispatches one JWS-enveloped POST per API operation.
pub struct AcmeClient {
    http: Arc<dyn HttpClient>,
    directory: DirectoryResource,
    nonces: Mutex<VecDeque<String>>,
    user_agent: String,
}

pub static NO_PAYLOAD: Option<()> = None;

static STATUS_OK: &[StatusCode] = &[StatusCode::Ok];

impl AcmeClient {
    pub fn new(
        http: impl Into<Arc<dyn HttpClient>>,
        directory: DirectoryResource,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            http: http.into(),
            directory,
            nonces: Default::default(),
            user_agent: user_agent.into(),
        }
    }

    pub async fn for_directory_url(
        http: impl Into<Arc<dyn HttpClient>>,
        directory_url: &str,
        user_agent: impl Into<String>,
    ) -> AcmeResult<AcmeClient> {
        let http_arc = http.into();
        let user_agent = user_agent.into();
        let directory = Self::get_directory(http_arc.as_ref(), directory_url, &user_agent).await?;
        Ok(Self::new(http_arc, directory, user_agent))
    }

    pub async fn get_directory(
        http: &(impl HttpClient + ?Sized),
        directory_url: impl AsRef<str>,
        user_agent: &str,
    ) -> AcmeResult<DirectoryResource> {
        debug!(url = directory_url.as_ref(), "fetching ACME directory");
        let mut req = Request::get(directory_url.as_ref());
        req.insert_header("User-Agent", user_agent);
        let mut resp = http.send(req).await?;
        let status = resp.status();
        if !STATUS_OK.contains(&status) {
            return Err(response_error(&mut resp, status).await);
        }
        Ok(resp.body_json().await?)
    }

    pub fn directory(&self) -> &DirectoryResource {
        &self.directory
    }

    /// Drops every pooled nonce. Used after key rollover, when nonces tied
    /// to the old signing context are no longer wanted.
    pub fn clear_nonces(&self) {
        self.nonces.lock().unwrap().clear();
    }

    /// https://www.rfc-editor.org/rfc/rfc8555.html#section-7.3
    pub async fn new_account(
        &self,
        signer: &impl JwsSigner,
        public_jwk: &impl Serialize,
        new_account: &NewAccountResource,
    ) -> AcmeResult<(StatusCode, AccountResource)> {
        let url = self.directory.endpoint(DirectoryEndpoint::NewAccount);
        let resp = self
            .request(
                signer,
                url,
                Auth::Jwk(public_jwk),
                Some(new_account),
                &[StatusCode::Ok, StatusCode::Created],
            )
            .await?;
        let status = resp.status();
        let resource = AccountResource::from_response(resp).await?;
        Ok((status, resource))
    }

    /// https://www.rfc-editor.org/rfc/rfc8555.html#section-7.3.2
    pub async fn update_account(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        update: &UpdateAccountRequest,
    ) -> AcmeResult<AccountResource> {
        self.request_resource(
            signer,
            account_url,
            Auth::kid(account_url),
            Some(update),
            &[StatusCode::Ok, StatusCode::Accepted],
        )
        .await
    }

    /// Outer envelope of account key rollover: the inner JWS (signed by the
    /// replacement key) is the payload, the current key signs the outer.
    /// https://www.rfc-editor.org/rfc/rfc8555.html#section-7.3.5
    pub async fn key_change(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        inner: &Jws,
    ) -> AcmeResult<()> {
        let url = self.directory.endpoint(DirectoryEndpoint::KeyChange);
        self.request(signer, url, Auth::kid(account_url), Some(inner), STATUS_OK)
            .await?;
        Ok(())
    }

    /// https://www.rfc-editor.org/rfc/rfc8555.html#section-7.4
    pub async fn new_order(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        new_order: &NewOrderResource,
    ) -> AcmeResult<OrderResource> {
        let url = self.directory.endpoint(DirectoryEndpoint::NewOrder);
        self.request_resource(
            signer,
            url,
            Auth::kid(account_url),
            Some(new_order),
            &[StatusCode::Created],
        )
        .await
    }

    pub async fn get_order(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        order_url: &str,
    ) -> AcmeResult<OrderResource> {
        self.request_resource(signer, order_url, Auth::kid(account_url), NO_PAYLOAD, STATUS_OK)
            .await
    }

    pub async fn finalize_order(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        finalize_url: &str,
        finalize_order: &FinalizeOrder,
    ) -> AcmeResult<OrderResource> {
        self.request_resource(
            signer,
            finalize_url,
            Auth::kid(account_url),
            Some(finalize_order),
            STATUS_OK,
        )
        .await
    }

    pub async fn download_certificate(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        certificate_url: &str,
    ) -> AcmeResult<String> {
        let mut resp = self
            .request(
                signer,
                certificate_url,
                Auth::kid(account_url),
                NO_PAYLOAD,
                STATUS_OK,
            )
            .await?;
        Ok(resp.body_string().await?)
    }

    pub async fn get_authorization(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        authorization_url: &str,
    ) -> AcmeResult<AuthorizationResource> {
        self.request_resource(
            signer,
            authorization_url,
            Auth::kid(account_url),
            NO_PAYLOAD,
            STATUS_OK,
        )
        .await
    }

    /// https://www.rfc-editor.org/rfc/rfc8555.html#section-7.5.2
    pub async fn deactivate_authorization(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        authorization_url: &str,
    ) -> AcmeResult<AuthorizationResource> {
        self.request_resource(
            signer,
            authorization_url,
            Auth::kid(account_url),
            Some(DeactivateAuthorization::new()),
            STATUS_OK,
        )
        .await
    }

    /// https://www.rfc-editor.org/rfc/rfc8555.html#section-7.5.1
    pub async fn complete_challenge(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        challenge_url: &str,
        response: &ChallengeResponse,
    ) -> AcmeResult<ChallengeResource> {
        let mut resp = self
            .request(
                signer,
                challenge_url,
                Auth::kid(account_url),
                Some(response),
                STATUS_OK,
            )
            .await?;
        Ok(resp.body_json().await?)
    }

    /// https://www.rfc-editor.org/rfc/rfc8555.html#section-7.6
    pub async fn revoke_cert(
        &self,
        signer: &impl JwsSigner,
        account_url: &str,
        revocation: &RevokeCertRequest,
    ) -> AcmeResult<()> {
        let url = self.directory.endpoint(DirectoryEndpoint::RevokeCert);
        self.request(signer, url, Auth::kid(account_url), Some(revocation), STATUS_OK)
            .await?;
        Ok(())
    }

    async fn request_resource<R: LocationResource>(
        &self,
        signer: &impl JwsSigner,
        url: &str,
        auth: Auth<'_, impl Serialize>,
        payload: Option<impl Serialize>,
        expected: &[StatusCode],
    ) -> AcmeResult<R> {
        R::from_response(self.request(signer, url, auth, payload, expected).await?).await
    }

    async fn request(
        &self,
        signer: &impl JwsSigner,
        url: &str,
        auth: Auth<'_, impl Serialize>,
        payload: Option<impl Serialize>,
        expected: &[StatusCode],
    ) -> AcmeResult<Response> {
        let mut resp = self.request_once(signer, url, &auth, &payload).await?;
        let status = resp.status();
        if expected.contains(&status) {
            return Ok(resp);
        }

        let err = response_error(&mut resp, status).await;
        if let AcmeError::Protocol(ref problem) = err {
            // Like certbot, recover exactly once from a stale nonce; the
            // rejection response itself supplies the replacement.
            if problem.is_bad_nonce() {
                warn!(url, "nonce rejected; retrying with the server-supplied nonce");
                self.retain_latest_nonce();
                let mut resp = self.request_once(signer, url, &auth, &payload).await?;
                let status = resp.status();
                if expected.contains(&status) {
                    return Ok(resp);
                }
                return Err(response_error(&mut resp, status).await);
            }
        }
        Err(err)
    }

    async fn request_once(
        &self,
        signer: &impl JwsSigner,
        url: &str,
        auth: &Auth<'_, impl Serialize>,
        payload: &Option<impl Serialize>,
    ) -> AcmeResult<Response> {
        let jws = self.build_request_body(signer, url, auth, payload).await?;

        let mut req = Request::post(url);
        req.insert_header("User-Agent", self.user_agent.as_str());
        req.set_body(&jws);

        let resp = self.http.send(req).await?;
        self.harvest_nonce(&resp);
        Ok(resp)
    }

    pub async fn build_request_body(
        &self,
        signer: &impl JwsSigner,
        url: &str,
        auth: &Auth<'_, impl Serialize>,
        payload: &Option<impl Serialize>,
    ) -> AcmeResult<Jws> {
        let (kid, jwk) = match auth {
            &Auth::Kid(url) => (Some(url), None),
            Auth::Jwk(jwk) => (None, Some(jwk)),
        };
        let jws_header = JwsHeader {
            alg: signer.jws_alg(),
            url,
            nonce: Some(&self.get_nonce().await?),
            kid,
            jwk,
        };

        let payload_bytes = if let Some(p) = payload {
            serde_json::to_vec(&p)?
        } else {
            // POST-as-GET requests carry a zero-length payload.
            Vec::new()
        };

        jws_flattened(signer, &jws_header, &payload_bytes).map_err(AcmeError::Crypto)
    }

    async fn get_nonce(&self) -> AcmeResult<String> {
        {
            let mut nonces = self.nonces.lock().unwrap();
            if let Some(nonce) = nonces.pop_front() {
                return Ok(nonce);
            }
        }
        debug!("nonce pool empty; requesting a fresh nonce");
        let url = self.directory.endpoint(DirectoryEndpoint::NewNonce);
        let mut req = Request::head(url);
        req.insert_header("User-Agent", self.user_agent.as_str());
        let mut resp = self.http.send(req).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(response_error(&mut resp, status).await);
        }
        get_replay_nonce(&resp).ok_or(AcmeError::MissingExpectedHeader("Replay-Nonce"))
    }

    fn harvest_nonce(&self, resp: &Response) {
        if let Some(nonce) = get_replay_nonce(resp) {
            let mut nonces = self.nonces.lock().unwrap();
            nonces.push_back(nonce);
        }
    }

    /// Keeps only the most recently harvested nonce; anything older is
    /// presumed stale once the server has rejected one.
    fn retain_latest_nonce(&self) {
        let mut nonces = self.nonces.lock().unwrap();
        if let Some(latest) = nonces.pop_back() {
            nonces.clear();
            nonces.push_back(latest);
        }
    }
}

pub enum Auth<'a, Jwk: Serialize> {
    Jwk(Jwk),
    Kid(&'a str),
}

impl<'a> Auth<'a, ()> {
    pub fn kid(account_url: &'a str) -> Self {
        Auth::Kid(account_url)
    }
}

fn get_replay_nonce(resp: &Response) -> Option<String> {
    Some(resp.header("Replay-Nonce")?.last().as_str().to_owned())
}

async fn response_error(resp: &mut Response, status: StatusCode) -> AcmeError {
    if resp
        .content_type()
        .map(|ct| ct.essence() == AcmeProblem::CONTENT_TYPE)
        .unwrap_or(false)
    {
        if let Ok(problem) = resp.body_json().await {
            return AcmeError::Protocol(problem);
        }
    }

    let body = resp.body_string().await.unwrap_or_default();
    let detail = if body.is_empty() {
        format!("unexpected status {}", status)
    } else {
        body
    };
    AcmeError::Protocol(AcmeProblem {
        type_: None,
        detail: Some(detail),
        status: Some(u16::from(status)),
        subproblems: Vec::new(),
    })
}

impl From<&Jws> for Body {
    fn from(jws: &Jws) -> Self {
        let mut body = Body::from_json(jws).unwrap();
        body.set_mime(jws::CONTENT_TYPE);
        body
    }
}
