//! Repositories over the session store

pub mod session;

pub use session::{SessionRepository, SessionTtl};
