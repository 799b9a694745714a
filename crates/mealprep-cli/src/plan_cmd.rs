//! `mealprep plan`: a one-shot conversation through an in-memory session.
//!
//! Each message is one turn. Agent replies are printed as they arrive, so a
//! first message without dietary restrictions prints the agent's question.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use futures::StreamExt;
use uuid::Uuid;

use mealprep_core::agent::{Agents, GeminiClient};
use mealprep_core::link::HttpLinkValidator;
use mealprep_core::runner::{ROOT_AGENT, RunRequest, Runner};
use mealprep_core::session::{Event, MemoryService, SessionService, SessionState};
use mealprep_core::MealPlanner;

use crate::config::MealprepConfig;

pub const APP_NAME: &str = "mealprep";
const USER_ID: &str = "cli";

/// Wire the production runner: Gemini agents plus the HTTP link validator.
pub fn build_runner(config: &MealprepConfig) -> Result<Arc<Runner>> {
    let gemini = config.require_gemini()?;
    let client = GeminiClient::new(gemini).context("failed to build Gemini client")?;
    let validator = HttpLinkValidator::new(&config.planner.validator)
        .context("failed to build link validator HTTP client")?;
    let planner = MealPlanner::new(
        Agents::gemini(client),
        Arc::new(validator),
        config.planner.clone(),
    );
    Ok(Arc::new(Runner::new(
        planner,
        Arc::new(SessionService::new()),
        Arc::new(MemoryService::new()),
    )))
}

/// Text printed for one event, or `None` for the echoed user message.
fn render_event(event: &Event) -> Option<String> {
    if event.author != ROOT_AGENT {
        return None;
    }
    match &event.error_message {
        Some(message) => Some(format!("error: {message}")),
        None => Some(event.content.text()),
    }
}

/// Run each message as a turn, writing agent output to `out`.
///
/// Returns `true` when every turn finished without an error event.
pub async fn converse(
    runner: Arc<Runner>,
    messages: &[String],
    out: &mut (dyn Write + Send),
) -> Result<bool> {
    let session_id = Uuid::new_v4().to_string();
    runner
        .sessions()
        .create(APP_NAME, USER_ID, Some(session_id.as_str()), SessionState::default())
        .await?;

    let mut clean = true;
    for message in messages {
        let request = RunRequest::new(APP_NAME, USER_ID, &session_id, message.as_str());
        let mut stream = Arc::clone(&runner).run_stream(request);
        while let Some(item) = stream.next().await {
            let event = item?;
            clean &= event.error_message.is_none();
            if let Some(text) = render_event(&event) {
                writeln!(out, "{text}\n")?;
            }
        }
    }
    Ok(clean)
}

pub async fn run_plan(config: &MealprepConfig, messages: &[String]) -> Result<()> {
    if messages.is_empty() {
        bail!("at least one message is required");
    }
    let runner = build_runner(config)?;
    let mut stdout = std::io::stdout();

    // Dropping the conversation future drops the event stream, which cancels
    // the running turn.
    let clean = tokio::select! {
        result = converse(runner, messages, &mut stdout) => result?,
        _ = tokio::signal::ctrl_c() => bail!("interrupted"),
    };
    if !clean {
        bail!("meal planning did not complete");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::canned_runner;

    #[tokio::test]
    async fn first_turn_without_restrictions_prints_the_question() {
        let mut out = Vec::new();
        let clean = converse(canned_runner(), &["Plan my dinners".to_string()], &mut out)
            .await
            .unwrap();
        assert!(clean);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("dietary restrictions"));
        assert!(!text.contains("Plan my dinners"), "user text is not echoed");
    }

    #[tokio::test]
    async fn follow_up_turn_prints_progress_and_plan() {
        let mut out = Vec::new();
        let messages = vec!["Plan my dinners".to_string(), "I'm vegetarian".to_string()];
        converse(canned_runner(), &messages, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("The current day of the week is"));
        assert!(text.contains("## Your meal plan"));
        assert!(text.contains("Dietary restrictions: vegetarian"));
        assert!(text.contains("**Dinner**"));
        assert!(!text.contains("**Lunch**"));
    }

    #[test]
    fn error_events_are_marked() {
        let event = Event::error("inv", ROOT_AGENT, "schedule builder failed");
        assert_eq!(render_event(&event).unwrap(), "error: schedule builder failed");
        let user = Event::new("inv", "user", mealprep_core::session::Content::user("hi"));
        assert!(render_event(&user).is_none());
    }
}
