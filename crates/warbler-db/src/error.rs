use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// A UNIQUE, NOT NULL, CHECK or FOREIGN KEY constraint rejected the write.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("database error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,
}

impl DbError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, DbError::Integrity(_))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                DbError::Integrity(msg.clone().unwrap_or_else(|| code.to_string()))
            }
            _ => DbError::Sqlite(err),
        }
    }
}
