//! Liveness checks over HTTP.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use super::{InvalidReason, LinkValidator, LinkVerdict, precheck};
use crate::config::ValidatorConfig;
use crate::error::error_chain;

/// Validates links by fetching them with a bounded timeout.
///
/// Redirects are followed; only the final status and URL count.
#[derive(Debug, Clone)]
pub struct HttpLinkValidator {
    client: Client,
    redirector_marker: String,
}

impl HttpLinkValidator {
    pub fn new(config: &ValidatorConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            redirector_marker: config.redirector_marker.clone(),
        })
    }

    /// A redirect that lands on a search redirector page is rejected like
    /// the redirector URL itself.
    fn lands_on_redirector(&self, landed: &url::Url) -> bool {
        !self.redirector_marker.is_empty()
            && landed
                .as_str()
                .to_ascii_lowercase()
                .contains(&self.redirector_marker.to_ascii_lowercase())
    }

    async fn fetch(&self, url: url::Url) -> LinkVerdict {
        match self.client.get(url).send().await {
            Ok(response) if self.lands_on_redirector(response.url()) => {
                LinkVerdict::Invalid(InvalidReason::Redirector)
            }
            Ok(response) if response.status() == StatusCode::OK => LinkVerdict::Valid,
            Ok(response) => LinkVerdict::Invalid(InvalidReason::Status(response.status().as_u16())),
            Err(e) if e.is_timeout() => LinkVerdict::Invalid(InvalidReason::Timeout),
            Err(e) => LinkVerdict::Invalid(InvalidReason::Network(error_chain(&e))),
        }
    }
}

#[async_trait]
impl LinkValidator for HttpLinkValidator {
    #[instrument(skip(self), level = "debug")]
    async fn validate(&self, url: &str) -> LinkVerdict {
        let parsed = match precheck(url, &self.redirector_marker) {
            Ok(parsed) => parsed,
            Err(reason) => {
                debug!(%reason, "link rejected before fetch");
                return LinkVerdict::Invalid(reason);
            }
        };
        let verdict = self.fetch(parsed).await;
        debug!(?verdict, "link checked");
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn malformed_url_is_invalid_without_fetch() {
        let validator = HttpLinkValidator::new(&ValidatorConfig::default()).unwrap();
        assert_eq!(
            validator.validate("recipes/pancakes").await,
            LinkVerdict::Invalid(InvalidReason::Malformed)
        );
    }

    #[tokio::test]
    async fn redirector_is_invalid_without_fetch() {
        let validator = HttpLinkValidator::new(&ValidatorConfig::default()).unwrap();
        // Port 9 (discard) would never answer 200; the marker check fires first.
        let url = "http://127.0.0.1:9/vertexaisearch/redirect";
        assert_eq!(
            validator.validate(url).await,
            LinkVerdict::Invalid(InvalidReason::Redirector)
        );
    }
}
