use thiserror::Error;

use crate::warden::model::AssociationKey;

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("registry rejected {key}: {reason}")]
    RegistryRejection { key: AssociationKey, reason: String },
    #[error("handler {handler} is no longer available")]
    HandlerUnavailable { handler: String },
    #[error("{key} changed externally since entry {entry_id} was recorded")]
    StateDrift { key: AssociationKey, entry_id: String },
    #[error("activity entry not found: {0}")]
    UnknownEntry(String),
    #[error("activity entry cannot be undone: {0}")]
    NotUndoable(String),
    #[error("another warden session holds {0}")]
    Locked(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
}

impl WardenError {
    pub fn code(&self) -> WardenErrorCode {
        match self {
            Self::RegistryRejection { .. } => WardenErrorCode::E002RegistryRejection,
            Self::HandlerUnavailable { .. } => WardenErrorCode::E004HandlerUnavailable,
            Self::StateDrift { .. } => WardenErrorCode::E003StateDrift,
            Self::UnknownEntry(_) | Self::NotUndoable(_) => WardenErrorCode::E005NotUndoable,
            Self::Locked(_) => WardenErrorCode::E001Locked,
            Self::InvalidConfig(_) => WardenErrorCode::E006ConfigInvalid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WardenErrorCode {
    E001Locked,
    E002RegistryRejection,
    E003StateDrift,
    E004HandlerUnavailable,
    E005NotUndoable,
    E006ConfigInvalid,
    E007StateCorrupt,
}

impl WardenErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002RegistryRejection => "E002_REGISTRY_REJECTION",
            Self::E003StateDrift => "E003_STATE_DRIFT",
            Self::E004HandlerUnavailable => "E004_HANDLER_UNAVAILABLE",
            Self::E005NotUndoable => "E005_NOT_UNDOABLE",
            Self::E006ConfigInvalid => "E006_CONFIG_INVALID",
            Self::E007StateCorrupt => "E007_STATE_CORRUPT",
        }
    }
}

/// Error code for an arbitrary failure, if it carries a domain error.
pub fn code_of(err: &anyhow::Error) -> Option<WardenErrorCode> {
    err.downcast_ref::<WardenError>().map(WardenError::code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warden::model::AssociationKind;

    #[test]
    fn domain_errors_survive_anyhow_wrapping() {
        let err: anyhow::Error = WardenError::StateDrift {
            key: AssociationKey::new(AssociationKind::FileType, ".json"),
            entry_id: "abc".into(),
        }
        .into();
        let err = err.context("undo failed");
        assert_eq!(code_of(&err), Some(WardenErrorCode::E003StateDrift));
        assert_eq!(code_of(&err).map(WardenErrorCode::as_str), Some("E003_STATE_DRIFT"));
    }
}
