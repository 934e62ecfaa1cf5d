use serde::{Deserialize, Serialize};

/// ACME Directory resource
/// https://datatracker.ietf.org/doc/html/rfc8555#section-7.1.1
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryResource {
    /// New nonce URL
    pub new_nonce: String,

    /// New account URL
    pub new_account: String,

    /// New order URL
    pub new_order: String,

    /// New authorization URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_authz: Option<String>,

    /// Revoke certificate URL
    pub revoke_cert: String,

    /// Key change URL
    pub key_change: String,

    #[serde(default)]
    pub meta: DirectoryMetadata,
}

/// Closed enumeration of the directory resources this client posts to.
/// Unknown resource names are unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectoryEndpoint {
    NewNonce,
    NewAccount,
    NewOrder,
    RevokeCert,
    KeyChange,
}

impl DirectoryResource {
    pub fn endpoint(&self, endpoint: DirectoryEndpoint) -> &str {
        match endpoint {
            DirectoryEndpoint::NewNonce => &self.new_nonce,
            DirectoryEndpoint::NewAccount => &self.new_account,
            DirectoryEndpoint::NewOrder => &self.new_order,
            DirectoryEndpoint::RevokeCert => &self.revoke_cert,
            DirectoryEndpoint::KeyChange => &self.key_change,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryMetadata {
    /// A URL identifying the current terms of service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,

    /// An HTTP or HTTPS URL locating a website providing more information
    /// about the ACME server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// The hostnames that the ACME server recognizes as referring to itself
    /// for the purposes of CAA record validation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub caa_identities: Vec<String>,

    /// If present and true, all newAccount requests must carry an
    /// externalAccountBinding field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_account_required: Option<bool>,
}
