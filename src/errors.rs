use thiserror::Error;

/// Coarse classification of a [`DatastoreError`].
///
/// Callers that only care about the category of a failure (for example a
/// command layer mapping errors to status codes) match on this instead of the
/// message-carrying variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgs,
    NotFound,
    AlreadyExists,
    TooLong,
    TooShort,
    NotOperational,
    NoMemory,
    NotStarted,
    InvalidObject,
    InvalidNamespace,
    InvalidStateTransition,
    Collaborator,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatastoreError {
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Too long: {0}")]
    TooLong(String),

    #[error("Too short: {0}")]
    TooShort(String),

    #[error("Not operational: {0}")]
    NotOperational(String),

    #[error("Out of memory")]
    NoMemory,

    #[error("Entity store is not started")]
    NotStarted,

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// An external collaborator (create/destroy/start/stop) failed for `name`.
    #[error("Collaborator failure (name = {name}): {message}")]
    Collaborator { name: String, message: String },
}

impl DatastoreError {
    /// Builds a collaborator failure for the entity `name`.
    pub fn collaborator(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collaborator {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgs(_) => ErrorKind::InvalidArgs,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::TooLong(_) => ErrorKind::TooLong,
            Self::TooShort(_) => ErrorKind::TooShort,
            Self::NotOperational(_) => ErrorKind::NotOperational,
            Self::NoMemory => ErrorKind::NoMemory,
            Self::NotStarted => ErrorKind::NotStarted,
            Self::InvalidObject(_) => ErrorKind::InvalidObject,
            Self::InvalidNamespace(_) => ErrorKind::InvalidNamespace,
            Self::InvalidStateTransition { .. } => ErrorKind::InvalidStateTransition,
            Self::Collaborator { .. } => ErrorKind::Collaborator,
        }
    }

    /// Adds the identifying entity name to a collaborator failure that does
    /// not carry one yet. Other variants are returned unchanged.
    pub fn with_name(self, name: &str) -> Self {
        match self {
            Self::Collaborator { name: n, message } if n.is_empty() => Self::Collaborator {
                name: name.to_string(),
                message,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DatastoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_message_names_entity() {
        let err = DatastoreError::collaborator("", "socket refused").with_name(":c1");
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        assert_eq!(
            err.to_string(),
            "Collaborator failure (name = :c1): socket refused"
        );
    }

    #[test]
    fn test_with_name_keeps_existing_name() {
        let err = DatastoreError::collaborator(":ch1", "boom").with_name(":c1");
        assert!(matches!(err, DatastoreError::Collaborator { ref name, .. } if name == ":ch1"));
        let err = DatastoreError::NotFound("x".into()).with_name(":c1");
        assert_eq!(err, DatastoreError::NotFound("x".into()));
    }
}
