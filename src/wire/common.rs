use async_trait::async_trait;
use http_client::Response;
use serde::de::DeserializeOwned;

use crate::error::{AcmeError, AcmeResult};

use super::problem::AcmeProblem;

// Serde skip_serialization_if helper
pub(crate) fn is_false(value: &bool) -> bool {
    !value
}

/// Status enums of URL-addressed resources. Terminal failure states map to
/// [`AcmeError::State`] carrying the entity kind and the server-reported
/// reason when one exists.
pub trait ResourceStatus: std::fmt::Debug + Copy + Sized {
    const ENTITY: &'static str;

    fn is_failure(&self) -> bool;

    fn failure(&self, problem: Option<&AcmeProblem>) -> Option<AcmeError> {
        if !self.is_failure() {
            return None;
        }
        let reason = match problem {
            Some(problem) => problem.description(),
            None => format!("{:?}", self).to_ascii_lowercase(),
        };
        Some(AcmeError::State {
            entity: Self::ENTITY,
            reason,
        })
    }

    fn as_result(&self, problem: Option<&AcmeProblem>) -> AcmeResult<Self> {
        match self.failure(problem) {
            Some(err) => Err(err),
            None => Ok(*self),
        }
    }
}

/// Resources whose canonical URL arrives in the `Location` response header.
#[async_trait]
pub(crate) trait LocationResource: DeserializeOwned + Send {
    fn location_mut(&mut self) -> &mut Option<String>;

    fn take_location(&mut self) -> AcmeResult<String> {
        self.location_mut()
            .take()
            .ok_or(AcmeError::MissingExpectedHeader("Location"))
    }

    async fn from_response(mut resp: Response) -> AcmeResult<Self> {
        let mut resource: Self = resp.body_json().await?;
        if let Some(values) = resp.header("Location") {
            *resource.location_mut() = Some(values.last().as_str().to_owned());
        }
        Ok(resource)
    }
}
