//! Weekly meal planning with validated recipe links.
//!
//! Recipe ideas and links come from LLM collaborators ([`agent`]). Links are
//! checked for liveness ([`link`]) and repaired in bounded rounds
//! ([`repair`]) before a schedule is built and checked ([`schedule`]).
//! [`pipeline`] ties one planning run together; [`runner`] wraps it in a
//! conversational turn over in-memory [`session`]s.

pub mod agent;
pub mod config;
pub mod error;
pub mod link;
pub mod model;
pub mod pipeline;
pub mod repair;
pub mod request;
pub mod runner;
pub mod schedule;
pub mod session;
pub mod weekday;

pub use config::{ConfigError, PlannerConfig};
pub use error::PlanError;
pub use pipeline::{MealPlanner, PlanEvent};
pub use runner::{RunRequest, Runner};
