use serde::{Deserialize, Serialize};

/// Certificate revocation request.
/// https://datatracker.ietf.org/doc/html/rfc8555#section-7.6
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RevokeCertRequest {
    /// The certificate to be revoked, base64url-encoded DER.
    pub certificate: String,

    /// RFC 5280 CRLReason code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RevocationReason>,
}

/// Wire form is the bare CRLReason integer.
/// https://datatracker.ietf.org/doc/html/rfc5280#section-5.3.1
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(into = "u8", try_from = "u8")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    RemoveFromCrl,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl From<RevocationReason> for u8 {
    fn from(reason: RevocationReason) -> u8 {
        use RevocationReason::*;
        match reason {
            Unspecified => 0,
            KeyCompromise => 1,
            CaCompromise => 2,
            AffiliationChanged => 3,
            Superseded => 4,
            CessationOfOperation => 5,
            CertificateHold => 6,
            RemoveFromCrl => 8,
            PrivilegeWithdrawn => 9,
            AaCompromise => 10,
        }
    }
}

impl TryFrom<u8> for RevocationReason {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        use RevocationReason::*;
        Ok(match code {
            0 => Unspecified,
            1 => KeyCompromise,
            2 => CaCompromise,
            3 => AffiliationChanged,
            4 => Superseded,
            5 => CessationOfOperation,
            6 => CertificateHold,
            8 => RemoveFromCrl,
            9 => PrivilegeWithdrawn,
            10 => AaCompromise,
            other => return Err(format!("unknown CRLReason code {other}")),
        })
    }
}
