// milkflow/src/lib.rs

//! Milkflow: a small asynchronous step-pipeline engine.
//!
//! A pipeline is an ordered list of named steps. Each step can carry `before`,
//! `on` and `after` handlers that receive a shared, lockable [`ContextData`].
//! Steps may be optional (missing handlers are fine and handler failures are
//! logged and swallowed) or skipped at runtime by a predicate over the context.
//!
//! Pipelines are registered in a [`Registry`] keyed by their context type, so a
//! caller only needs to build the context value and call [`Registry::run`].
//!
//! Lock guards taken from a `ContextData` are blocking and must be dropped
//! before any `.await` inside a handler.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::handler::Handler;
pub use crate::core::step::{SkipCondition, StepDef};
pub use crate::error::{FlowError, FlowResult};
pub use crate::pipeline::Pipeline;
pub use crate::registry::Registry;
