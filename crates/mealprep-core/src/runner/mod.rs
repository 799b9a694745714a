//! Turn handling: reads a user message, asks for dietary restrictions when
//! they are not known yet, otherwise runs the planner and replies with the
//! plan. Every turn is committed to the session and archived to memory.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PlanError, error_chain};
use crate::model::DietaryRestrictions;
use crate::pipeline::MealPlanner;
use crate::request::{PlanRequest, RestrictionAnswer};
use crate::schedule::render_markdown;
use crate::session::{Content, Event, MemoryService, SessionError, SessionService, SessionState};

/// Author name on every reply event.
pub const ROOT_AGENT: &str = "meal_prep_agent";

const ASK_RESTRICTIONS: &str = "Happy to plan your meals for the week! Before I start: do you \
have any dietary restrictions, for example vegetarian, vegan, gluten-free, dairy-free or \
nut-free? If not, just say \"no restrictions\".";

/// Body of a run request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub new_message: Content,
}

impl RunRequest {
    pub fn new(app: &str, user: &str, session: &str, text: impl Into<String>) -> Self {
        Self {
            app_name: app.to_string(),
            user_id: user.to_string(),
            session_id: session.to_string(),
            new_message: Content::user(text),
        }
    }
}

/// Stream of events for one turn.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event, SessionError>> + Send>>;

pub struct Runner {
    planner: MealPlanner,
    sessions: Arc<SessionService>,
    memory: Arc<MemoryService>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("planner", &self.planner)
            .finish_non_exhaustive()
    }
}

impl Runner {
    pub fn new(
        planner: MealPlanner,
        sessions: Arc<SessionService>,
        memory: Arc<MemoryService>,
    ) -> Self {
        Self {
            planner,
            sessions,
            memory,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionService> {
        &self.sessions
    }

    pub fn memory(&self) -> &Arc<MemoryService> {
        &self.memory
    }

    /// Run one turn and return all of its events, the user's message first.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Event>, SessionError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.run_turn(request, cancel, tx).await?;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        Ok(events)
    }

    /// Run one turn on a background task, yielding events as they happen.
    ///
    /// Dropping the stream cancels the turn.
    pub fn run_stream(self: Arc<Self>, request: RunRequest) -> EventStream {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(self.run_owned(request, task_cancel, tx));

        let stream = async_stream::stream! {
            let _guard = cancel.drop_guard();
            while let Some(event) = rx.recv().await {
                yield Ok(event);
            }
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => yield Err(e),
                Err(e) => warn!(error = %e, "turn task failed"),
            }
        };
        Box::pin(stream)
    }

    /// [`Runner::run_turn`] over owned inputs, for spawning.
    async fn run_owned(
        self: Arc<Self>,
        request: RunRequest,
        cancel: CancellationToken,
        sink: mpsc::UnboundedSender<Event>,
    ) -> Result<(), SessionError> {
        self.run_turn(&request, &cancel, sink).await
    }

    async fn run_turn(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
        sink: mpsc::UnboundedSender<Event>,
    ) -> Result<(), SessionError> {
        let session_id = request.session_id.as_str();
        let session = self
            .sessions
            .get(&request.app_name, &request.user_id, session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let invocation_id = format!("e-{}", Uuid::new_v4());
        let mut log = TurnLog::new(sink);
        log.push(Event::new(&invocation_id, "user", request.new_message.clone()));

        let parsed = PlanRequest::from_message(&request.new_message.text());
        let mut state = session.state.clone();
        match &parsed.restrictions {
            RestrictionAnswer::Tags(tags) => state.dietary_restrictions = Some(tags.clone()),
            RestrictionAnswer::NoRestrictions => {
                state.dietary_restrictions = Some(DietaryRestrictions::none());
            }
            RestrictionAnswer::Unstated => {}
        }

        let Some(restrictions) = state.dietary_restrictions.clone() else {
            info!(session_id, "asking for dietary restrictions");
            if !parsed.meals.is_empty() {
                state.pending_meals = parsed.meals;
            }
            log.push(Event::new(&invocation_id, ROOT_AGENT, Content::model(ASK_RESTRICTIONS)));
            return self.finish(request, &log.events, state).await;
        };

        let meals = if !parsed.meals.is_empty() {
            parsed.meals.clone()
        } else if !state.pending_meals.is_empty() {
            state.pending_meals.clone()
        } else {
            parsed.meals_or_all()
        };
        state.pending_meals.clear();

        info!(session_id, %restrictions, meals = meals.len(), "planning turn");
        let (ptx, mut prx) = mpsc::unbounded_channel();
        let planning = async {
            let ptx = ptx;
            self.planner
                .plan(&restrictions, &meals, cancel, Some(&ptx))
                .await
        };
        let forward = async {
            while let Some(progress) = prx.recv().await {
                log.push(Event::new(
                    &invocation_id,
                    ROOT_AGENT,
                    Content::model(progress.to_string()),
                ));
            }
        };
        let (result, ()) = tokio::join!(planning, forward);

        match result {
            Ok(plan) => {
                log.push(Event::new(
                    &invocation_id,
                    ROOT_AGENT,
                    Content::model(render_markdown(&plan)),
                ));
            }
            Err(PlanError::Cancelled) => {
                info!(session_id, "turn cancelled");
            }
            Err(e) => {
                let chain = error_chain(&e);
                warn!(session_id, error = %chain, "planning failed");
                log.push(Event::error(
                    &invocation_id,
                    ROOT_AGENT,
                    format!("Sorry, I could not finish your meal plan: {chain}"),
                ));
            }
        }
        self.finish(request, &log.events, state).await
    }

    /// Commit the turn and archive the session into memory.
    async fn finish(
        &self,
        request: &RunRequest,
        turn: &[Event],
        state: SessionState,
    ) -> Result<(), SessionError> {
        let session = self
            .sessions
            .commit(
                &request.app_name,
                &request.user_id,
                &request.session_id,
                turn,
                state,
            )
            .await?;
        self.memory.archive(&session).await;
        Ok(())
    }
}

/// Events of the turn in progress, forwarded to the caller as they are added.
struct TurnLog {
    sink: mpsc::UnboundedSender<Event>,
    events: Vec<Event>,
}

impl TurnLog {
    fn new(sink: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            sink,
            events: Vec::new(),
        }
    }

    fn push(&mut self, event: Event) {
        // A closed sink means the caller stopped listening; the turn is
        // still committed.
        let _ = self.sink.send(event.clone());
        self.events.push(event);
    }
}
