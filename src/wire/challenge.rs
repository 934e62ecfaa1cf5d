use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{common::ResourceStatus, problem::AcmeProblem};

pub static CHALLENGE_TYPE_HTTP_01: &str = "http-01";
pub static CHALLENGE_TYPE_DNS_01: &str = "dns-01";
pub static CHALLENGE_TYPE_TLS_ALPN_01: &str = "tls-alpn-01";

/// Well-known path prefix where http-01 key authorizations are served.
pub static HTTP_01_PATH_PREFIX: &str = "/.well-known/acme-challenge/";

/// DNS label under which dns-01 TXT records are published.
pub static DNS_01_RECORD_PREFIX: &str = "_acme-challenge.";

/// ACME Challenge resource
/// https://datatracker.ietf.org/doc/html/rfc8555#section-8
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResource {
    /// The type of challenge encoded in the object.
    #[serde(rename = "type")]
    pub type_: String,

    /// The URL to which a response can be posted.
    pub url: String,

    /// The status of this challenge.
    pub status: ChallengeStatus,

    /// The time at which the server validated this challenge. REQUIRED if
    /// the status is "valid".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<DateTime<FixedOffset>>,

    /// Error that occurred while the server was validating the challenge,
    /// if any. A challenge object with an error MUST have status "invalid".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AcmeProblem>,

    /// A random value that uniquely identifies the challenge.
    ///
    /// NOTE: Not a generic challenge resource field, but used by all three
    /// challenge types this client implements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// All additional fields are specified by the challenge type.
    #[serde(flatten)]
    pub additional_fields: Map<String, Value>,
}

impl ChallengeResource {
    pub fn status_result(&self) -> crate::error::AcmeResult<ChallengeStatus> {
        self.status.as_result(self.error.as_ref())
    }
}

/// Challenge response payload: the computed key authorization.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub key_authorization: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    /// Challenge objects are created in the "pending" state.
    Pending,

    /// They transition to "processing" when the client responds to the
    /// challenge and the server begins attempting to validate it.
    Processing,

    /// If validation is successful, the challenge moves to the "valid" state
    Valid,

    /// If there is an error, the challenge moves to the "invalid" state.
    Invalid,
}

impl ResourceStatus for ChallengeStatus {
    const ENTITY: &'static str = "challenge";

    fn is_failure(&self) -> bool {
        matches!(self, Self::Invalid)
    }
}
