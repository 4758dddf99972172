pub mod config;
pub mod ledger;
pub mod local;
pub mod reveal;
pub mod session;
pub mod signing;
pub mod tokio_tools;

#[cfg(test)]
pub mod test_utils;

pub use config::SessionConfig;
pub use local::LocalStack;
pub use session::{GameSession, Outcome, SessionError};
