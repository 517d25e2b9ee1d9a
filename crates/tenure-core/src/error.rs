use thiserror::Error;

use tenure_types::{InviteToken, UserId};

/// A call to the messaging platform did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("platform rejected the request: {0}")]
    Rejected(String),

    #[error("platform unreachable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invite link not tracked: {0}")]
    NotFound(InviteToken),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// Failures surfaced to whoever issued a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("user {0} is not an admin")]
    Forbidden(UserId),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}
