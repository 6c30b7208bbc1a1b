use strum::{AsRefStr, Display};

/// Remote-sync activity shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Syncing,
    Saving,
    Saved,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    phase: SyncPhase,
    message: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::idle()
    }
}

impl SyncStatus {
    pub fn idle() -> Self {
        Self {
            phase: SyncPhase::Idle,
            message: None,
        }
    }

    pub fn syncing() -> Self {
        Self {
            phase: SyncPhase::Syncing,
            message: Some("Syncing notes".to_string()),
        }
    }

    pub fn saving() -> Self {
        Self {
            phase: SyncPhase::Saving,
            message: Some("Saving".to_string()),
        }
    }

    pub fn saved() -> Self {
        Self {
            phase: SyncPhase::Saved,
            message: Some("Saved".to_string()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            phase: SyncPhase::Error,
            message: Some(message.into()),
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.phase == SyncPhase::Error
    }
}
