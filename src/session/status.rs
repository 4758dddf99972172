use serde::Serialize;

use super::error::SessionError;

pub const MSG_CREATING_GAME: &str = "Creating a new hand...";
pub const MSG_GAME_READY: &str = "New game is ready. Good luck!";
pub const MSG_SCORES_PENDING: &str = "Game over. Final scores are still decrypting.";

pub fn round_resolved_message(round: u8) -> String {
    format!("Round {round} resolved.")
}

/// Progress of the reveal pipeline, shown next to the status line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum DecryptionStatus {
    #[default]
    Idle,
    Decrypting,
    Failed(String),
}

/// One blocking error or one informational message, plus the decryption
/// indicator which is tracked independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub error: Option<String>,
    pub message: Option<String>,
    pub decryption: DecryptionStatus,
}

impl SessionStatus {
    /// The line to display. An error hides the informational message.
    pub fn headline(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }

    pub(crate) fn set_error(&mut self, err: &SessionError) {
        self.error = Some(err.status_message());
    }

    pub(crate) fn set_message(&mut self, message: impl Into<String>) {
        self.error = None;
        self.message = Some(message.into());
    }
}
