//! Shared types for the AutoCode work session backend.

mod activity;
mod agent;
mod context;
mod transcript;

pub use activity::*;
pub use agent::*;
pub use context::*;
pub use transcript::*;
