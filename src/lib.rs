#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_wraps,
    dead_code
)]

//! Routes free-text customer requests to specialized conversational agents.
//!
//! An [`routing::Orchestrator`] classifies each request, dispatches it to one
//! agent (model-backed, tool-using, chained or human escalation) and records
//! the turn in a per-session [`sessions::ConversationStore`].

pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod gateway;
pub mod observability;
pub mod providers;
pub mod retrieval;
pub mod routing;
pub mod sessions;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use routing::{InboundRequest, Orchestrator, RouteResponse, Router};
