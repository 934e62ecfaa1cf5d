use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::{
    challenge::ChallengeResource,
    common::{is_false, LocationResource, ResourceStatus},
    identifier::AcmeIdentifier,
};

/// ACME Authorization resource
/// https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.4
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResource {
    /// The identifier that the account is authorized to represent.
    pub identifier: AcmeIdentifier,

    /// The status of this authorization.
    pub status: AuthorizationStatus,

    /// The timestamp after which the server will consider this authorization
    /// invalid. REQUIRED for "valid" authorizations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<FixedOffset>>,

    /// For pending authorizations, the challenges that the client can
    /// fulfill. Any one of them is sufficient to make the authorization
    /// valid.
    pub challenges: Vec<ChallengeResource>,

    /// MUST be present and true for authorizations created from a newOrder
    /// request containing a wildcard DNS identifier.
    #[serde(default, skip_serializing_if = "is_false")]
    pub wildcard: bool,

    /// The URL of this resource, as returned in the Location header.
    #[serde(skip)]
    pub location: Option<String>,
}

impl AuthorizationResource {
    pub fn status_result(&self) -> crate::error::AcmeResult<AuthorizationStatus> {
        // The reason for a failed authorization lives on the challenge the
        // server attempted.
        let challenge_error = self
            .challenges
            .iter()
            .find_map(|challenge| challenge.error.as_ref());
        self.status.as_result(challenge_error)
    }

    pub fn find_challenge(&self, challenge_type: &str) -> Option<&ChallengeResource> {
        self.challenges
            .iter()
            .find(|challenge| challenge.type_ == challenge_type)
    }
}

impl LocationResource for AuthorizationResource {
    fn location_mut(&mut self) -> &mut Option<String> {
        &mut self.location
    }
}

/// Client-initiated deactivation request.
/// https://datatracker.ietf.org/doc/html/rfc8555#section-7.5.2
#[derive(Serialize, Deserialize, Debug)]
pub struct DeactivateAuthorization {
    pub status: AuthorizationStatus,
}

impl DeactivateAuthorization {
    pub fn new() -> Self {
        Self {
            status: AuthorizationStatus::Deactivated,
        }
    }
}

impl Default for DeactivateAuthorization {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    /// Authorization objects are created in the "pending" state.
    Pending,

    /// If one of the challenges listed in the authorization transitions to
    /// the "valid" state, the authorization also changes to "valid".
    Valid,

    /// If the client attempts to fulfill a challenge and fails, or if there
    /// is an error while the authorization is still pending, the
    /// authorization transitions to the "invalid" state.
    Invalid,

    /// Once valid, an authorization can be deactivated by the client.
    Deactivated,

    /// Once valid, an authorization can expire.
    Expired,

    /// Once valid, an authorization can be revoked by the server.
    Revoked,
}

impl ResourceStatus for AuthorizationStatus {
    const ENTITY: &'static str = "authorization";

    fn is_failure(&self) -> bool {
        !matches!(self, Self::Pending | Self::Valid)
    }
}
