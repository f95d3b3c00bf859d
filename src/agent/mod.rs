//! Agent Runtime and main-session event sink collaborator interfaces
//! (§6) — deliberately out of scope as feature surfaces, but the engine
//! needs a concrete, if minimal, stand-in for each so it compiles and its
//! integration tests can exercise the full tick → dispatch → execute →
//! deliver path end to end.

pub mod fake;
mod traits;

pub use traits::{AgentError, AgentErrorKind, AgentOutput, AgentRuntime, EventSink, RunOptions};
