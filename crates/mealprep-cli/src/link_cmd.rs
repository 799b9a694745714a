//! `mealprep check-link`: run recipe URLs through the link validator.

use anyhow::{Result, bail};
use futures::StreamExt;

use mealprep_core::config::ValidatorConfig;
use mealprep_core::link::{HttpLinkValidator, LinkValidator, LinkVerdict};

/// Validate every URL, at most `concurrency` at a time, preserving input order.
pub async fn check_links(
    validator: &dyn LinkValidator,
    urls: &[String],
    concurrency: usize,
) -> Vec<(String, LinkVerdict)> {
    futures::stream::iter(urls)
        .map(|url| async move { (url.clone(), validator.validate(url).await) })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

fn format_line(url: &str, verdict: &LinkVerdict) -> String {
    match verdict {
        LinkVerdict::Valid => format!("  valid    {url}"),
        LinkVerdict::Invalid(reason) => format!("  invalid  {url}  ({reason})"),
    }
}

pub async fn run_check_links(config: &ValidatorConfig, urls: &[String], concurrency: usize) -> Result<()> {
    let validator = HttpLinkValidator::new(config)?;
    let results = check_links(&validator, urls, concurrency).await;

    for (url, verdict) in &results {
        println!("{}", format_line(url, verdict));
    }

    let invalid = results.iter().filter(|(_, v)| !v.is_valid()).count();
    if invalid > 0 {
        bail!("{invalid} of {} link(s) failed validation", results.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mealprep_core::link::InvalidReason;
    use mealprep_test_utils::TestServer;

    use super::*;

    fn fast_validator() -> HttpLinkValidator {
        HttpLinkValidator::new(&ValidatorConfig {
            timeout: Duration::from_millis(500),
            ..ValidatorConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let server = TestServer::recipe_sites().await;
        let urls = vec![
            server.url("/missing"),
            server.url("/ok"),
            "not a url".to_string(),
            format!("{}?via=vertexaisearch", server.url("/ok")),
        ];

        let results = check_links(&fast_validator(), &urls, 2).await;
        let urls_back: Vec<_> = results.iter().map(|(u, _)| u.clone()).collect();
        assert_eq!(urls_back, urls);
        assert_eq!(results[0].1, LinkVerdict::Invalid(InvalidReason::Status(404)));
        assert_eq!(results[1].1, LinkVerdict::Valid);
        assert_eq!(results[2].1, LinkVerdict::Invalid(InvalidReason::Malformed));
        assert_eq!(results[3].1, LinkVerdict::Invalid(InvalidReason::Redirector));
    }

    #[tokio::test]
    async fn any_invalid_link_fails_the_command() {
        let server = TestServer::recipe_sites().await;
        let config = ValidatorConfig {
            timeout: Duration::from_millis(500),
            ..ValidatorConfig::default()
        };

        run_check_links(&config, &[server.url("/ok")], 4).await.unwrap();

        let err = run_check_links(&config, &[server.url("/ok"), server.url("/error")], 4)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "1 of 2 link(s) failed validation");
    }

    #[test]
    fn lines_show_reason() {
        let line = format_line("https://x.example", &LinkVerdict::Invalid(InvalidReason::Timeout));
        assert_eq!(line, "  invalid  https://x.example  (timed out)");
    }
}
