#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use http_client::{Body, HttpClient, Request, Response};
use http_types::StatusCode;
use once_cell::sync::Lazy;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::{BigUint, RsaPublicKey};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use acme_client::crypto::default_provider;
use acme_client::{Client, ClientConfig, RetryOptions};

pub static BASE: &str = "https://mock.example";

pub static ACCOUNT_KEY_PEM: Lazy<String> = Lazy::new(|| {
    default_provider()
        .generate_private_key(2048)
        .expect("key generation")
        .to_string()
});

pub static SECOND_KEY_PEM: Lazy<String> = Lazy::new(|| {
    default_provider()
        .generate_private_key(2048)
        .expect("key generation")
        .to_string()
});

pub static CERT_CHAIN_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBmockleafcert\n-----END CERTIFICATE-----\n-----BEGIN CERTIFICATE-----\nMIIBmockissuercert\n-----END CERTIFICATE-----\n";

pub fn fast_backoff() -> RetryOptions {
    RetryOptions {
        attempts: 5,
        min: std::time::Duration::from_millis(1),
        max: std::time::Duration::from_millis(5),
    }
}

pub fn test_client(mock: &MockAcmeServer) -> Client {
    test_client_with_key(mock, ACCOUNT_KEY_PEM.as_str())
}

pub fn test_client_with_key(mock: &MockAcmeServer, key_pem: &str) -> Client {
    let mut config = ClientConfig::new(format!("{BASE}/directory"), key_pem);
    config.backoff = fast_backoff();
    let http: Arc<dyn HttpClient> = Arc::new(mock.clone());
    Client::new(http, config).expect("client construction")
}

pub fn b64(data: impl AsRef<[u8]>) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

pub fn b64_decode(data: &str) -> Vec<u8> {
    base64::decode_config(data, base64::URL_SAFE_NO_PAD).expect("base64url")
}

pub fn jwk_thumbprint(jwk: &Value) -> String {
    let canonical = format!(
        "{{\"e\":{},\"kty\":{},\"n\":{}}}",
        jwk["e"], jwk["kty"], jwk["n"]
    );
    b64(Sha256::digest(canonical.as_bytes()))
}

#[derive(Debug, Default)]
struct MockAuthz {
    identifier: String,
    wildcard: bool,
    token: String,
    challenge_types: Vec<String>,
    completed_type: Option<String>,
    polls_remaining: u32,
    final_status: String,
    error_detail: Option<String>,
}

#[derive(Debug, Default)]
struct MockOrder {
    identifiers: Vec<String>,
    authz_ids: Vec<usize>,
    finalized: bool,
    finalize_polls_remaining: u32,
}

#[derive(Debug, Default)]
struct ServerState {
    nonce_counter: u64,
    live_nonces: HashSet<String>,
    bad_nonce_injections: u32,

    account_counter: u64,
    // canonical jwk -> account URL
    accounts_by_jwk: HashMap<String, String>,
    // account URL -> current jwk
    account_keys: HashMap<String, Value>,

    order_counter: usize,
    orders: HashMap<usize, MockOrder>,
    authz_counter: usize,
    authzs: HashMap<usize, MockAuthz>,

    // Script for the next created authorizations.
    authz_polls_until_final: u32,
    authz_final_status: String,
    authz_error_detail: Option<String>,
    offered_challenge_types: Vec<String>,

    // token -> body, for http-01 self-verification requests
    well_known: HashMap<String, String>,

    key_change_count: u64,
}

/// Scripted RFC 8555 server speaking through the `HttpClient` trait, so the
/// client under test runs its real transport against it.
#[derive(Clone)]
pub struct MockAcmeServer {
    state: Arc<Mutex<ServerState>>,
}

impl std::fmt::Debug for MockAcmeServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MockAcmeServer")
    }
}

impl Default for MockAcmeServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAcmeServer {
    pub fn new() -> Self {
        let state = ServerState {
            // One pending poll, then the final status: pending -> valid in
            // two authorization fetches.
            authz_polls_until_final: 1,
            authz_final_status: "valid".to_string(),
            offered_challenge_types: vec!["http-01".to_string(), "dns-01".to_string()],
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Rejects the next `count` signed requests with badNonce.
    pub fn inject_bad_nonce(&self, count: u32) {
        self.state.lock().unwrap().bad_nonce_injections = count;
    }

    /// Registers an account for `jwk` as if created in an earlier session.
    pub fn preregister_account(&self, jwk: &Value) -> String {
        let mut state = self.state.lock().unwrap();
        state.register_account(jwk)
    }

    /// Scripts how authorizations created from now on resolve.
    pub fn script_authorizations(
        &self,
        polls_until_final: u32,
        final_status: &str,
        error_detail: Option<&str>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.authz_polls_until_final = polls_until_final;
        state.authz_final_status = final_status.to_string();
        state.authz_error_detail = error_detail.map(str::to_string);
    }

    pub fn offer_challenges(&self, types: &[&str]) {
        self.state.lock().unwrap().offered_challenge_types =
            types.iter().map(|t| t.to_string()).collect();
    }

    /// Publishes an http-01 body, as a solver provisioning a web server
    /// would.
    pub fn publish_http01(&self, token: &str, body: &str) {
        self.state
            .lock()
            .unwrap()
            .well_known
            .insert(token.to_string(), body.to_string());
    }

    pub fn remove_http01(&self, token: &str) {
        self.state.lock().unwrap().well_known.remove(token);
    }

    pub fn key_change_count(&self) -> u64 {
        self.state.lock().unwrap().key_change_count
    }

    pub fn account_url_for(&self, jwk: &Value) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .accounts_by_jwk
            .get(&canonical_jwk(jwk))
            .cloned()
    }

    /// Tokens of the challenges offered for the most recent order, in
    /// authorization order.
    pub fn issued_tokens(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<&usize> = state.authzs.keys().collect();
        ids.sort();
        ids.iter().map(|id| state.authzs[id].token.clone()).collect()
    }
}

#[async_trait::async_trait]
impl HttpClient for MockAcmeServer {
    async fn send(&self, mut req: Request) -> Result<Response, http_client::Error> {
        let state = self.state.clone();
        let method = req.method().to_string();
        let url = req.url().to_string();
        let body = req.body_bytes().await?;
        let mut state = state.lock().unwrap();
        Ok(state.handle(&method, &url, &body))
    }
}

fn canonical_jwk(jwk: &Value) -> String {
    format!("{}|{}|{}", jwk["e"], jwk["kty"], jwk["n"])
}

fn verify_rs256(jwk: &Value, signing_input: &[u8], signature: &[u8]) -> bool {
    let (Some(n), Some(e)) = (jwk["n"].as_str(), jwk["e"].as_str()) else {
        return false;
    };
    let key = match RsaPublicKey::new(
        BigUint::from_bytes_be(&b64_decode(n)),
        BigUint::from_bytes_be(&b64_decode(e)),
    ) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let Ok(signature) = Signature::try_from(signature) else {
        return false;
    };
    VerifyingKey::<Sha256>::new(key)
        .verify(signing_input, &signature)
        .is_ok()
}

impl ServerState {
    fn fresh_nonce(&mut self) -> String {
        self.nonce_counter += 1;
        let nonce = format!("nonce-{}", self.nonce_counter);
        self.live_nonces.insert(nonce.clone());
        nonce
    }

    fn register_account(&mut self, jwk: &Value) -> String {
        self.account_counter += 1;
        let url = format!("{BASE}/acme/acct/{}", self.account_counter);
        self.accounts_by_jwk.insert(canonical_jwk(jwk), url.clone());
        self.account_keys.insert(url.clone(), jwk.clone());
        url
    }

    fn respond(
        &mut self,
        status: StatusCode,
        body: Option<Value>,
        location: Option<String>,
    ) -> Response {
        let mut resp = Response::new(status);
        resp.insert_header("Replay-Nonce", self.fresh_nonce());
        if let Some(location) = location {
            resp.insert_header("Location", location);
        }
        if let Some(body) = body {
            resp.set_body(Body::from_json(&body).unwrap());
        }
        resp
    }

    fn problem(&mut self, status: StatusCode, type_: &str, detail: &str) -> Response {
        let mut resp = Response::new(status);
        resp.insert_header("Replay-Nonce", self.fresh_nonce());
        let mut body = Body::from_json(&json!({
            "type": format!("urn:ietf:params:acme:error:{type_}"),
            "detail": detail,
            "status": u16::from(status),
        }))
        .unwrap();
        body.set_mime("application/problem+json");
        resp.set_body(body);
        resp
    }

    fn handle(&mut self, method: &str, url: &str, body: &[u8]) -> Response {
        // Plain http-01 verification traffic.
        if let Some(token) = url.strip_prefix("http://") {
            if let Some((_, token)) = token.split_once("/.well-known/acme-challenge/") {
                return match self.well_known.get(token) {
                    Some(body) => {
                        let mut resp = Response::new(StatusCode::Ok);
                        resp.set_body(body.as_str());
                        resp
                    }
                    None => Response::new(StatusCode::NotFound),
                };
            }
        }

        if url == format!("{BASE}/directory") && method == "GET" {
            let mut resp = Response::new(StatusCode::Ok);
            resp.set_body(
                Body::from_json(&json!({
                    "newNonce": format!("{BASE}/acme/new-nonce"),
                    "newAccount": format!("{BASE}/acme/new-account"),
                    "newOrder": format!("{BASE}/acme/new-order"),
                    "revokeCert": format!("{BASE}/acme/revoke-cert"),
                    "keyChange": format!("{BASE}/acme/key-change"),
                    "meta": {
                        "termsOfService": format!("{BASE}/terms")
                    }
                }))
                .unwrap(),
            );
            return resp;
        }

        if url == format!("{BASE}/acme/new-nonce") {
            return self.respond(StatusCode::Ok, None, None);
        }

        self.handle_signed(url, body)
    }

    fn handle_signed(&mut self, url: &str, body: &[u8]) -> Response {
        if self.bad_nonce_injections > 0 {
            self.bad_nonce_injections -= 1;
            return self.problem(
                StatusCode::BadRequest,
                "badNonce",
                "JWS has an invalid anti-replay nonce",
            );
        }

        let Ok(envelope) = serde_json::from_slice::<Value>(body) else {
            return self.problem(StatusCode::BadRequest, "malformed", "request body is not JSON");
        };
        let (Some(protected_b64), Some(payload_b64), Some(signature_b64)) = (
            envelope["protected"].as_str(),
            envelope["payload"].as_str(),
            envelope["signature"].as_str(),
        ) else {
            return self.problem(StatusCode::BadRequest, "malformed", "not a flattened JWS");
        };

        let Ok(protected) =
            serde_json::from_slice::<Value>(&b64_decode(protected_b64)) else {
            return self.problem(StatusCode::BadRequest, "malformed", "bad protected header");
        };

        if protected["alg"].as_str() != Some("RS256") {
            return self.problem(StatusCode::BadRequest, "badSignatureAlgorithm", "expected RS256");
        }
        if protected["url"].as_str() != Some(url) {
            return self.problem(StatusCode::BadRequest, "malformed", "url header mismatch");
        }

        let has_jwk = protected.get("jwk").is_some();
        let has_kid = protected.get("kid").is_some();
        if has_jwk == has_kid {
            return self.problem(
                StatusCode::BadRequest,
                "malformed",
                "exactly one of jwk and kid is required",
            );
        }

        // Nonces are strictly single-use.
        let Some(nonce) = protected["nonce"].as_str() else {
            return self.problem(StatusCode::BadRequest, "badNonce", "missing nonce");
        };
        if !self.live_nonces.remove(nonce) {
            return self.problem(
                StatusCode::BadRequest,
                "badNonce",
                "JWS has an invalid anti-replay nonce",
            );
        }

        let signer_jwk = if has_jwk {
            if !url.ends_with("/new-account") && !url.ends_with("/key-change") {
                return self.problem(StatusCode::BadRequest, "malformed", "jwk not allowed here");
            }
            protected["jwk"].clone()
        } else {
            let kid = protected["kid"].as_str().unwrap_or_default();
            match self.account_keys.get(kid) {
                Some(jwk) => jwk.clone(),
                None => {
                    return self.problem(
                        StatusCode::Unauthorized,
                        "unauthorized",
                        "unknown account",
                    )
                }
            }
        };

        let signing_input = format!("{protected_b64}.{payload_b64}");
        if !verify_rs256(&signer_jwk, signing_input.as_bytes(), &b64_decode(signature_b64)) {
            return self.problem(StatusCode::Unauthorized, "unauthorized", "signature check failed");
        }

        let payload: Value = if payload_b64.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(&b64_decode(payload_b64)) {
                Ok(value) => value,
                Err(_) => {
                    return self.problem(StatusCode::BadRequest, "malformed", "bad payload")
                }
            }
        };

        self.dispatch(url, &protected, &signer_jwk, &payload)
    }

    fn dispatch(
        &mut self,
        url: &str,
        protected: &Value,
        signer_jwk: &Value,
        payload: &Value,
    ) -> Response {
        if url == format!("{BASE}/acme/new-account") {
            return self.new_account(signer_jwk, payload);
        }
        if url == format!("{BASE}/acme/key-change") {
            let kid = protected["kid"].as_str().unwrap_or_default().to_string();
            return self.key_change(&kid, signer_jwk, payload);
        }
        if url == format!("{BASE}/acme/new-order") {
            return self.new_order(payload);
        }
        if url == format!("{BASE}/acme/revoke-cert") {
            if payload["certificate"].as_str().unwrap_or_default().is_empty() {
                return self.problem(StatusCode::BadRequest, "malformed", "missing certificate");
            }
            return self.respond(StatusCode::Ok, None, None);
        }
        if let Some(rest) = url.strip_prefix(&format!("{BASE}/acme/acct/")) {
            let account_url = format!("{BASE}/acme/acct/{rest}");
            return self.account_update(&account_url, payload);
        }
        if let Some(id) = strip_id(url, &format!("{BASE}/acme/order/")) {
            if url.ends_with("/finalize") {
                return self.finalize(id, payload);
            }
            return self.order_status(id);
        }
        if let Some(id) = strip_id(url, &format!("{BASE}/acme/authz/")) {
            return self.authz_status(id, payload);
        }
        if let Some(id) = strip_id(url, &format!("{BASE}/acme/chall/")) {
            return self.complete_challenge(id, url, signer_jwk, payload);
        }
        if let Some(id) = strip_id(url, &format!("{BASE}/acme/cert/")) {
            let _ = id;
            let mut resp = Response::new(StatusCode::Ok);
            resp.insert_header("Replay-Nonce", self.fresh_nonce());
            let mut body = Body::from_string(CERT_CHAIN_PEM.to_string());
            body.set_mime("application/pem-certificate-chain");
            resp.set_body(body);
            return resp;
        }
        self.problem(StatusCode::NotFound, "malformed", "unknown resource")
    }

    fn new_account(&mut self, signer_jwk: &Value, payload: &Value) -> Response {
        let key = canonical_jwk(signer_jwk);
        if let Some(existing) = self.accounts_by_jwk.get(&key).cloned() {
            let body = json!({ "status": "valid", "orders": format!("{existing}/orders") });
            return self.respond(StatusCode::Ok, Some(body), Some(existing));
        }
        if payload["onlyReturnExisting"].as_bool().unwrap_or(false) {
            return self.problem(
                StatusCode::BadRequest,
                "accountDoesNotExist",
                "no account registered for this key",
            );
        }
        let url = self.register_account(signer_jwk);
        let mut body = json!({
            "status": "valid",
            "orders": format!("{url}/orders"),
        });
        if !payload["contact"].is_null() {
            body["contact"] = payload["contact"].clone();
        }
        self.respond(StatusCode::Created, Some(body), Some(url))
    }

    fn account_update(&mut self, account_url: &str, payload: &Value) -> Response {
        if !self.account_keys.contains_key(account_url) {
            return self.problem(StatusCode::Unauthorized, "unauthorized", "unknown account");
        }
        let status = payload["status"].as_str().unwrap_or("valid");
        let mut body = json!({ "status": status });
        if !payload["contact"].is_null() {
            body["contact"] = payload["contact"].clone();
        }
        self.respond(StatusCode::Ok, Some(body), None)
    }

    fn key_change(&mut self, outer_kid: &str, outer_jwk: &Value, payload: &Value) -> Response {
        let (Some(inner_protected_b64), Some(inner_payload_b64), Some(inner_signature_b64)) = (
            payload["protected"].as_str(),
            payload["payload"].as_str(),
            payload["signature"].as_str(),
        ) else {
            return self.problem(StatusCode::BadRequest, "malformed", "payload is not a JWS");
        };
        let Ok(inner_protected) =
            serde_json::from_slice::<Value>(&b64_decode(inner_protected_b64)) else {
            return self.problem(StatusCode::BadRequest, "malformed", "bad inner header");
        };
        let Ok(inner_payload) =
            serde_json::from_slice::<Value>(&b64_decode(inner_payload_b64)) else {
            return self.problem(StatusCode::BadRequest, "malformed", "bad inner payload");
        };

        if inner_protected["alg"].as_str() != Some("RS256")
            || inner_protected["url"].as_str() != Some(&format!("{BASE}/acme/key-change")[..])
            || inner_protected.get("nonce").is_some()
            || inner_protected.get("kid").is_some()
        {
            return self.problem(StatusCode::BadRequest, "malformed", "bad inner header");
        }
        let new_jwk = inner_protected["jwk"].clone();
        if new_jwk.is_null() {
            return self.problem(StatusCode::BadRequest, "malformed", "inner jwk required");
        }

        let inner_input = format!("{inner_protected_b64}.{inner_payload_b64}");
        if !verify_rs256(&new_jwk, inner_input.as_bytes(), &b64_decode(inner_signature_b64)) {
            return self.problem(
                StatusCode::Unauthorized,
                "unauthorized",
                "inner signature check failed",
            );
        }

        if inner_payload["account"].as_str() != Some(outer_kid) {
            return self.problem(StatusCode::BadRequest, "malformed", "account mismatch");
        }
        if canonical_jwk(&inner_payload["oldKey"]) != canonical_jwk(outer_jwk) {
            return self.problem(StatusCode::BadRequest, "malformed", "oldKey mismatch");
        }

        // Swap the account to the new key.
        self.accounts_by_jwk.remove(&canonical_jwk(outer_jwk));
        self.accounts_by_jwk
            .insert(canonical_jwk(&new_jwk), outer_kid.to_string());
        self.account_keys
            .insert(outer_kid.to_string(), new_jwk);
        self.key_change_count += 1;
        self.respond(StatusCode::Ok, Some(json!({ "status": "valid" })), None)
    }

    fn new_order(&mut self, payload: &Value) -> Response {
        let identifiers: Vec<String> = payload["identifiers"]
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id["value"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        if identifiers.is_empty() {
            return self.problem(StatusCode::BadRequest, "malformed", "no identifiers");
        }

        let mut authz_ids = Vec::new();
        for identifier in &identifiers {
            self.authz_counter += 1;
            let id = self.authz_counter;
            let wildcard = identifier.starts_with("*.");
            self.authzs.insert(
                id,
                MockAuthz {
                    identifier: identifier.clone(),
                    wildcard,
                    token: format!("token-{id}"),
                    challenge_types: if wildcard {
                        vec!["dns-01".to_string()]
                    } else {
                        self.offered_challenge_types.clone()
                    },
                    completed_type: None,
                    polls_remaining: self.authz_polls_until_final,
                    final_status: self.authz_final_status.clone(),
                    error_detail: self.authz_error_detail.clone(),
                },
            );
            authz_ids.push(id);
        }

        self.order_counter += 1;
        let order_id = self.order_counter;
        self.orders.insert(
            order_id,
            MockOrder {
                identifiers,
                authz_ids,
                finalized: false,
                finalize_polls_remaining: 0,
            },
        );

        let body = self.order_json(order_id, "pending");
        self.respond(
            StatusCode::Created,
            Some(body),
            Some(format!("{BASE}/acme/order/{order_id}")),
        )
    }

    fn order_json(&self, id: usize, status: &str) -> Value {
        let order = &self.orders[&id];
        let mut body = json!({
            "status": status,
            "expires": "2030-01-01T00:00:00Z",
            "identifiers": order
                .identifiers
                .iter()
                .map(|value| json!({ "type": "dns", "value": value }))
                .collect::<Vec<_>>(),
            "authorizations": order
                .authz_ids
                .iter()
                .map(|authz_id| format!("{BASE}/acme/authz/{authz_id}"))
                .collect::<Vec<_>>(),
            "finalize": format!("{BASE}/acme/order/{id}/finalize"),
        });
        if status == "valid" {
            body["certificate"] = Value::String(format!("{BASE}/acme/cert/{id}"));
        }
        body
    }

    fn computed_order_status(&mut self, id: usize) -> String {
        let order = &self.orders[&id];
        if order.finalized {
            let order = self.orders.get_mut(&id).unwrap();
            if order.finalize_polls_remaining > 0 {
                order.finalize_polls_remaining -= 1;
                return "processing".to_string();
            }
            return "valid".to_string();
        }
        let all_valid = order
            .authz_ids
            .iter()
            .all(|authz_id| self.authz_resolved_status(*authz_id) == "valid");
        if all_valid {
            "ready".to_string()
        } else {
            "pending".to_string()
        }
    }

    /// The status an authorization has settled into, without consuming a
    /// poll.
    fn authz_resolved_status(&self, id: usize) -> String {
        let authz = &self.authzs[&id];
        if authz.completed_type.is_some() && authz.polls_remaining == 0 {
            authz.final_status.clone()
        } else {
            "pending".to_string()
        }
    }

    fn order_status(&mut self, id: usize) -> Response {
        if !self.orders.contains_key(&id) {
            return self.problem(StatusCode::NotFound, "malformed", "unknown order");
        }
        let status = self.computed_order_status(id);
        let body = self.order_json(id, &status);
        self.respond(StatusCode::Ok, Some(body), None)
    }

    fn authz_json(&self, id: usize, status: &str) -> Value {
        let authz = &self.authzs[&id];
        let challenges: Vec<Value> = authz
            .challenge_types
            .iter()
            .enumerate()
            .map(|(index, type_)| {
                let mut challenge = json!({
                    "type": type_,
                    "url": format!("{BASE}/acme/chall/{id}-{index}"),
                    "status": if Some(type_) == authz.completed_type.as_ref() {
                        if status == "pending" { "processing" } else { status }
                    } else {
                        "pending"
                    },
                    "token": authz.token,
                });
                if status == "invalid" && Some(type_) == authz.completed_type.as_ref() {
                    challenge["error"] = json!({
                        "type": "urn:ietf:params:acme:error:incorrectResponse",
                        "detail": authz.error_detail.clone().unwrap_or_else(|| "validation failed".to_string()),
                    });
                }
                challenge
            })
            .collect();

        json!({
            "status": status,
            "expires": "2030-01-01T00:00:00Z",
            "identifier": {
                "type": "dns",
                "value": authz.identifier.trim_start_matches("*.")
            },
            "wildcard": authz.wildcard,
            "challenges": challenges,
        })
    }

    fn authz_status(&mut self, id: usize, payload: &Value) -> Response {
        if !self.authzs.contains_key(&id) {
            return self.problem(StatusCode::NotFound, "malformed", "unknown authorization");
        }
        if payload["status"].as_str() == Some("deactivated") {
            let body = self.authz_json(id, "deactivated");
            return self.respond(StatusCode::Ok, Some(body), None);
        }
        let status = {
            let authz = self.authzs.get_mut(&id).unwrap();
            if authz.completed_type.is_some() {
                if authz.polls_remaining > 0 {
                    authz.polls_remaining -= 1;
                    "pending".to_string()
                } else {
                    authz.final_status.clone()
                }
            } else {
                "pending".to_string()
            }
        };
        let body = self.authz_json(id, &status);
        self.respond(StatusCode::Ok, Some(body), None)
    }

    fn complete_challenge(
        &mut self,
        _id: usize,
        url: &str,
        signer_jwk: &Value,
        payload: &Value,
    ) -> Response {
        // URL shape: .../chall/{authz_id}-{challenge_index}
        let suffix = url.rsplit('/').next().unwrap_or_default();
        let (Some(authz_id), Some(challenge_index)) = suffix
            .split_once('-')
            .map(|(a, c)| (a.parse::<usize>().ok(), c.parse::<usize>().ok()))
            .unwrap_or((None, None))
        else {
            return self.problem(StatusCode::NotFound, "malformed", "unknown challenge");
        };

        let expected_key_authorization = {
            let Some(authz) = self.authzs.get(&authz_id) else {
                return self.problem(StatusCode::NotFound, "malformed", "unknown challenge");
            };
            format!("{}.{}", authz.token, jwk_thumbprint(signer_jwk))
        };
        if payload["keyAuthorization"].as_str() != Some(&expected_key_authorization[..]) {
            return self.problem(
                StatusCode::Forbidden,
                "unauthorized",
                "key authorization mismatch",
            );
        }

        let authz = self.authzs.get_mut(&authz_id).unwrap();
        let Some(type_) = authz.challenge_types.get(challenge_index).cloned() else {
            return self.problem(StatusCode::NotFound, "malformed", "unknown challenge");
        };
        authz.completed_type = Some(type_.clone());
        let token = authz.token.clone();

        let body = json!({
            "type": type_,
            "url": url,
            "status": "processing",
            "token": token,
        });
        self.respond(StatusCode::Ok, Some(body), None)
    }

    fn finalize(&mut self, id: usize, payload: &Value) -> Response {
        if !self.orders.contains_key(&id) {
            return self.problem(StatusCode::NotFound, "malformed", "unknown order");
        }
        if self.computed_order_status(id) != "ready" {
            return self.problem(
                StatusCode::Forbidden,
                "orderNotReady",
                "order is not ready for finalization",
            );
        }
        if payload["csr"].as_str().unwrap_or_default().is_empty() {
            return self.problem(StatusCode::BadRequest, "badCSR", "missing csr");
        }
        {
            let order = self.orders.get_mut(&id).unwrap();
            order.finalized = true;
            order.finalize_polls_remaining = 1;
        }
        let body = self.order_json(id, "processing");
        self.respond(StatusCode::Ok, Some(body), None)
    }
}

fn strip_id(url: &str, prefix: &str) -> Option<usize> {
    let rest = url.strip_prefix(prefix)?;
    let id = rest.split(['/', '-']).next()?;
    id.parse().ok()
}
