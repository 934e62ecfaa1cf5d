use serde::{Deserialize, Serialize};

pub static IDENTIFIER_TYPE_DNS: &str = "dns";

pub static WILDCARD_PREFIX: &str = "*.";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct AcmeIdentifier {
    /// The type of identifier.
    #[serde(rename = "type")]
    pub type_: String,

    /// The identifier itself.
    pub value: String,
}

impl AcmeIdentifier {
    pub fn dns(name: impl Into<String>) -> Self {
        Self {
            type_: IDENTIFIER_TYPE_DNS.to_string(),
            value: name.into(),
        }
    }

    pub fn is_dns(&self) -> bool {
        self.type_ == IDENTIFIER_TYPE_DNS
    }

    pub fn dns_name(&self) -> Option<&str> {
        if self.is_dns() {
            Some(&self.value)
        } else {
            None
        }
    }

    /// Wildcard identifiers are required to validate through dns-01.
    pub fn is_wildcard(&self) -> bool {
        self.value.starts_with(WILDCARD_PREFIX)
    }

    /// The identifier without a leading `*.`; authorizations and DNS records
    /// are always rooted at the base name.
    pub fn base_name(&self) -> &str {
        self.value
            .strip_prefix(WILDCARD_PREFIX)
            .unwrap_or(&self.value)
    }
}
