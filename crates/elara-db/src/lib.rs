pub mod session_store;

pub use session_store::{SessionGuard, SessionStore};
