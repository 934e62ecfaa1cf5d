pub mod api;
pub mod crypto;
pub mod error;
pub mod retry;
pub mod wire;

use std::sync::Arc;

pub use api::auto::{default_challenge_priority, AutoOptions, ChallengeSolver};
pub use api::client::{AccountOptions, Client, ClientConfig, Contact};
pub use error::{AcmeError, AcmeResult};
pub use retry::{Abort, RetryOptions};

pub static LETS_ENCRYPT_DIRECTORY_URL: &str = "https://acme-v02.api.letsencrypt.org/directory";
pub fn lets_encrypt_client(
    http: impl Into<Arc<dyn http_client::HttpClient>>,
    account_key_pem: impl Into<String>,
) -> AcmeResult<Client> {
    Client::new(
        http,
        ClientConfig::new(LETS_ENCRYPT_DIRECTORY_URL, account_key_pem),
    )
}

pub static LETS_ENCRYPT_STAGING_DIRECTORY_URL: &str =
    "https://acme-staging-v02.api.letsencrypt.org/directory";
pub fn lets_encrypt_staging_client(
    http: impl Into<Arc<dyn http_client::HttpClient>>,
    account_key_pem: impl Into<String>,
) -> AcmeResult<Client> {
    Client::new(
        http,
        ClientConfig::new(LETS_ENCRYPT_STAGING_DIRECTORY_URL, account_key_pem),
    )
}
