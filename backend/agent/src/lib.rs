//! Conductor agent invocation.
//!
//! The invoker state machine plus the query runners it drives: the external
//! agent CLI and a scripted stand-in.

pub mod cli_runner;
pub mod invoker;
pub mod scripted;

pub use cli_runner::{CliQueryRunner, parse_stream_line};
pub use invoker::{AgentInvoker, Invocation, InvocationOutcome, InvocationState, InvokeOptions};
pub use scripted::ScriptedRunner;
