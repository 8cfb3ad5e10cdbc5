pub mod error;
pub mod message;
pub mod tools;
pub mod traits;

pub use error::ConductorError;
pub use message::AgentMessage;
pub use tools::{ToolDefinition, ToolOutput};
pub use traits::{MessageStream, QueryRequest, QueryRunner, ToolHandler};
