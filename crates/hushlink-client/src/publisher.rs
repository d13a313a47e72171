//! HTTP client for the external identity registry.

use hushlink_proto::IdentityPublication;

use crate::transport::TransportError;

/// Path of the registry endpoint, relative to the registry base URL.
pub const STORE_IDENTITY_PATH: &str = "/store_identity_key/";

/// Publishes identity public keys so other participants can discover them.
#[derive(Debug, Clone)]
pub struct IdentityPublisher {
    http: reqwest::Client,
    endpoint: String,
}

impl IdentityPublisher {
    /// Publisher for the registry at `registry_url`.
    pub fn new(registry_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}{STORE_IDENTITY_PATH}", registry_url.trim_end_matches('/')),
        }
    }

    /// Full URL the publication is posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post one identity publication.
    ///
    /// # Errors
    ///
    /// - `TransportError::Publish` if the request fails or the registry
    ///   answers with a non-success status
    pub async fn publish(&self, publication: &IdentityPublication) -> Result<(), TransportError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(publication)
            .send()
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Publish(format!("registry answered {status}")));
        }

        tracing::debug!(
            session = %publication.session_id,
            participant = %publication.participant_id,
            "identity published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            IdentityPublisher::new("https://registry.example/").endpoint(),
            "https://registry.example/store_identity_key/"
        );
        assert_eq!(
            IdentityPublisher::new("http://localhost:8000").endpoint(),
            "http://localhost:8000/store_identity_key/"
        );
    }
}
