//! On-disk session bookkeeping.
//!
//! Per session `S` and agent `A`:
//!
//! ```text
//! output_streams/S/session.log            human log (StreamWriter)
//! output_streams/S/conversation.jsonl     transcript (TranscriptWriter)
//! output_streams/S/session-metadata.json  metadata (SessionStore)
//! reports/S/A-summary.json                summary (SummaryWriter)
//! ```
//!
//! Each file has exactly one writer.

pub mod fsio;
pub mod layout;
pub mod store;
pub mod stream;
pub mod summary;
pub mod time;
pub mod transcript;

pub use layout::{validate_agent_name, validate_session_id, SessionLayout};
pub use store::{Session, SessionLease, SessionMetadata, SessionStore};
pub use stream::{StreamLevel, StreamWriter};
pub use summary::{Summary, SummaryStatus, SummaryWriter};
pub use transcript::{ConversationRecord, Role, TranscriptWriter};
