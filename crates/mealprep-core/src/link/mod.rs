//! Recipe link validation.
//!
//! A link is acceptable when it is a well-formed `http(s)` URL with a host,
//! is not an opaque search-redirector stub, and answers a live fetch with
//! exactly HTTP 200. The [`LinkValidator`] trait is the seam the repair loop
//! validates through; [`HttpLinkValidator`] is the production implementation.

pub mod http;

use std::fmt;

use async_trait::async_trait;
use url::Url;

use crate::model::{CandidateLink, LinkStatus};

pub use http::HttpLinkValidator;

/// Why a link was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    /// Not an absolute `http(s)` URL with a host.
    Malformed,
    /// Contains the search-redirector marker.
    Redirector,
    /// The fetch completed with a status other than 200.
    Status(u16),
    /// The fetch did not complete within the timeout.
    Timeout,
    /// DNS, TLS, connection, or other transport failure.
    Network(String),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => f.write_str("malformed URL"),
            Self::Redirector => f.write_str("search redirector link"),
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Timeout => f.write_str("timed out"),
            Self::Network(msg) => write!(f, "network error: {msg}"),
        }
    }
}

/// Outcome of validating one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkVerdict {
    Valid,
    Invalid(InvalidReason),
}

impl LinkVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn status(&self) -> LinkStatus {
        match self {
            Self::Valid => LinkStatus::Valid,
            Self::Invalid(_) => LinkStatus::Invalid,
        }
    }
}

/// Decides whether a URL may appear in a meal plan.
///
/// Implementations must not fail: every error collapses into
/// [`LinkVerdict::Invalid`]. They must not retry; retrying is the repair
/// loop's job.
#[async_trait]
pub trait LinkValidator: Send + Sync {
    async fn validate(&self, url: &str) -> LinkVerdict;
}

const _: () = {
    fn _assert_object_safe(_: &dyn LinkValidator) {}
};

/// Record a verdict on a candidate link. The only place a link's status
/// changes.
pub fn apply_verdict(link: &mut CandidateLink, verdict: &LinkVerdict) {
    link.status = verdict.status();
}

/// The offline checks: well-formedness and the redirector marker.
///
/// Returns the parsed URL when the link may proceed to the liveness fetch.
pub fn precheck(raw: &str, redirector_marker: &str) -> Result<Url, InvalidReason> {
    let url = Url::parse(raw.trim()).map_err(|_| InvalidReason::Malformed)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(InvalidReason::Malformed);
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(InvalidReason::Malformed);
    }
    let marker = redirector_marker.to_ascii_lowercase();
    if !marker.is_empty() && raw.to_ascii_lowercase().contains(&marker) {
        return Err(InvalidReason::Redirector);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REDIRECTOR_MARKER;
    use crate::model::RecipeIdea;

    fn check(raw: &str) -> Result<Url, InvalidReason> {
        precheck(raw, DEFAULT_REDIRECTOR_MARKER)
    }

    #[test]
    fn accepts_plain_https_url() {
        let url = check("https://www.allrecipes.com/recipe/123/shakshuka/").unwrap();
        assert_eq!(url.host_str(), Some("www.allrecipes.com"));
    }

    #[test]
    fn rejects_missing_scheme() {
        assert_eq!(check("www.allrecipes.com/recipe/1"), Err(InvalidReason::Malformed));
    }

    #[test]
    fn rejects_missing_host() {
        assert_eq!(check("https://"), Err(InvalidReason::Malformed));
        assert_eq!(check("mailto:chef@example.com"), Err(InvalidReason::Malformed));
        assert_eq!(check("file:///etc/passwd"), Err(InvalidReason::Malformed));
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert_eq!(check(""), Err(InvalidReason::Malformed));
        assert_eq!(check("not a url"), Err(InvalidReason::Malformed));
    }

    #[test]
    fn rejects_redirector_host() {
        let raw = "https://vertexaisearch.cloud.google.com/grounding-api-redirect/AbC";
        assert_eq!(check(raw), Err(InvalidReason::Redirector));
    }

    #[test]
    fn rejects_redirector_marker_in_path_any_case() {
        let raw = "https://example.com/go/VertexAISearch/xyz";
        assert_eq!(check(raw), Err(InvalidReason::Redirector));
    }

    #[test]
    fn malformed_wins_over_redirector() {
        assert_eq!(check("vertexaisearch"), Err(InvalidReason::Malformed));
    }

    #[test]
    fn apply_verdict_sets_status() {
        let mut link = CandidateLink::new(RecipeIdea::new("Chili"), "https://x.example");
        apply_verdict(&mut link, &LinkVerdict::Valid);
        assert_eq!(link.status, LinkStatus::Valid);
        apply_verdict(&mut link, &LinkVerdict::Invalid(InvalidReason::Status(404)));
        assert_eq!(link.status, LinkStatus::Invalid);
    }

    #[test]
    fn reason_display() {
        assert_eq!(InvalidReason::Status(404).to_string(), "HTTP 404");
        assert_eq!(InvalidReason::Redirector.to_string(), "search redirector link");
    }
}
