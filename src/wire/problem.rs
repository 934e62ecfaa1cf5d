use serde::{Deserialize, Serialize};

/// ACME problem document (RFC 7807 with the ACME urn namespace)
/// https://datatracker.ietf.org/doc/html/rfc8555#section-6.7
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AcmeProblem {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// A human-readable explanation specific to this occurrence of the problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// The HTTP status code for this occurrence of the problem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// When a problem relates to specific identifiers in a newOrder request,
    /// the server breaks it down per identifier here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subproblems: Vec<AcmeProblem>,
}

impl AcmeProblem {
    pub const CONTENT_TYPE: &'static str = "application/problem+json";

    pub fn has_type(&self, problem_type: AcmeProblemType) -> bool {
        self.type_.as_deref() == Some(problem_type.urn())
    }

    pub fn is_bad_nonce(&self) -> bool {
        self.has_type(AcmeProblemType::BadNonce)
    }

    pub fn is_user_action_required(&self) -> bool {
        self.has_type(AcmeProblemType::UserActionRequired)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.has_type(AcmeProblemType::RateLimited)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.has_type(AcmeProblemType::Unauthorized)
    }

    /// Best human-readable rendering: the detail when present, otherwise the
    /// serialized document.
    pub fn description(&self) -> String {
        match self.detail {
            Some(ref detail) => detail.clone(),
            None => serde_json::to_string(self).unwrap_or_else(|_| "unknown problem".to_string()),
        }
    }
}

impl std::fmt::Display for AcmeProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.type_ {
            Some(ref type_) => write!(f, "{}: {}", type_, self.description()),
            None => write!(f, "{}", self.description()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcmeProblemType {
    AccountDoesNotExist,
    BadCsr,
    BadNonce,
    BadSignatureAlgorithm,
    Malformed,
    OrderNotReady,
    RateLimited,
    RejectedIdentifier,
    ServerInternal,
    Unauthorized,
    UserActionRequired,
}

impl AcmeProblemType {
    pub fn urn(self) -> &'static str {
        use AcmeProblemType::*;
        match self {
            AccountDoesNotExist => "urn:ietf:params:acme:error:accountDoesNotExist",
            BadCsr => "urn:ietf:params:acme:error:badCSR",
            BadNonce => "urn:ietf:params:acme:error:badNonce",
            BadSignatureAlgorithm => "urn:ietf:params:acme:error:badSignatureAlgorithm",
            Malformed => "urn:ietf:params:acme:error:malformed",
            OrderNotReady => "urn:ietf:params:acme:error:orderNotReady",
            RateLimited => "urn:ietf:params:acme:error:rateLimited",
            RejectedIdentifier => "urn:ietf:params:acme:error:rejectedIdentifier",
            ServerInternal => "urn:ietf:params:acme:error:serverInternal",
            Unauthorized => "urn:ietf:params:acme:error:unauthorized",
            UserActionRequired => "urn:ietf:params:acme:error:userActionRequired",
        }
    }
}
