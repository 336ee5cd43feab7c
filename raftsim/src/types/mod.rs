pub mod ids;
pub mod log_entry;
pub mod message;

pub use ids::NodeId;
pub use log_entry::LogEntry;
pub use message::{Message, MessageBody, MessageType};
