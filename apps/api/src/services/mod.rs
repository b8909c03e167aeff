//! Business logic services

pub mod id_issuer;
pub mod session;

pub use id_issuer::{IdIssuer, IssueError, TOKEN_LEN};
pub use session::{SessionCredentials, SessionService};
