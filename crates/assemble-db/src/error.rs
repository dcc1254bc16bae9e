use rusqlite::ffi;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid parent: {0}")]
    InvalidParent(&'static str),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("corrupt {table} row {id}: {reason}")]
    Corrupt {
        table: &'static str,
        id: String,
        reason: String,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Maps a UNIQUE / PRIMARY KEY violation to `Conflict`, leaving other
    /// errors untouched.
    pub(crate) fn conflict_on_unique(err: rusqlite::Error, what: &str) -> Self {
        let unique = matches!(
            &err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        );
        if unique {
            Self::Conflict(format!("{what} already exists"))
        } else {
            Self::Sqlite(err)
        }
    }
}
