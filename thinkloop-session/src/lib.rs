//! # thinkloop-session
//!
//! Chat history keyed by session identifier. Each session keeps only its
//! most recent messages so that a long-lived process does not grow without
//! bound; ending a session removes its entry outright.
//!
//! ```
//! use thinkloop_session::{SessionStore, new_session_id};
//!
//! let store = SessionStore::new(20);
//! let id = new_session_id();
//! store.record_exchange(&id, "Which cases are urgent?", "Three cases need attention.");
//! assert_eq!(store.history(&id).len(), 2);
//! store.clear(&id);
//! assert!(store.history(&id).is_empty());
//! ```

mod error;
mod store;
mod types;

pub use error::SessionError;
pub use store::{DEFAULT_MAX_MESSAGES, SessionStore};
pub use types::{ChatMessage, ChatRole};

/// Generate a fresh random session identifier.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
