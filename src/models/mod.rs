pub mod block;
pub mod entry;
pub mod hook;

pub use block::ActivityBlock;
pub use entry::{Message, TokenUsage, TranscriptRecord};
pub use hook::HookJson;
