mod history;
mod session_state;

pub use history::{HistoryStore, JsonlHistoryStore, MemoryHistoryStore, SessionRecord};
pub use session_state::{SessionChange, SessionState, SessionStateMachine};
