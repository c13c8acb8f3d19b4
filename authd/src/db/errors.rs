use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        table: Option<String>,
        /// Column(s) named by the violated constraint, e.g. `email` or `nickname, nickname_number`
        columns: Option<String>,
        message: String,
    },

    /// Foreign key constraint violation
    #[error("Foreign key constraint violation")]
    ForeignKeyViolation { message: String },

    /// Check constraint violation
    #[error("Check constraint violation")]
    CheckViolation { message: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DbError {
    /// True if this is a unique violation on `table` touching `column`.
    pub fn is_unique_violation_on(&self, table: &str, column: &str) -> bool {
        match self {
            DbError::UniqueViolation {
                table: Some(t),
                columns: Some(c),
                ..
            } => t == table && c.split(',').any(|part| part.trim() == column),
            _ => false,
        }
    }
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    let (table, columns) = parse_unique_violation(db_err.message());
                    DbError::UniqueViolation {
                        table,
                        columns,
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_foreign_key_violation() {
                    DbError::ForeignKeyViolation {
                        message: db_err.message().to_string(),
                    }
                } else if db_err.is_check_violation() {
                    DbError::CheckViolation {
                        message: db_err.message().to_string(),
                    }
                } else {
                    // All other database errors are non-recoverable - convert to anyhow
                    DbError::Other(anyhow::Error::from(err))
                }
            }
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

/// Extract the table and column names from a SQLite unique violation message.
///
/// SQLite does not report constraint names, the message looks like
/// `UNIQUE constraint failed: users.nickname, users.nickname_number`.
fn parse_unique_violation(message: &str) -> (Option<String>, Option<String>) {
    let Some((_, targets)) = message.split_once("constraint failed:") else {
        return (None, None);
    };

    let mut table = None;
    let mut columns = Vec::new();
    for target in targets.split(',') {
        if let Some((t, c)) = target.trim().split_once('.') {
            table.get_or_insert_with(|| t.to_string());
            columns.push(c.to_string());
        }
    }

    let columns = if columns.is_empty() { None } else { Some(columns.join(", ")) };
    (table, columns)
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_column_violation() {
        let (table, columns) = parse_unique_violation("UNIQUE constraint failed: users.email");
        assert_eq!(table.as_deref(), Some("users"));
        assert_eq!(columns.as_deref(), Some("email"));
    }

    #[test]
    fn test_parse_composite_violation() {
        let (table, columns) = parse_unique_violation("UNIQUE constraint failed: users.nickname, users.nickname_number");
        assert_eq!(table.as_deref(), Some("users"));
        assert_eq!(columns.as_deref(), Some("nickname, nickname_number"));

        let err = DbError::UniqueViolation {
            table,
            columns,
            message: String::new(),
        };
        assert!(err.is_unique_violation_on("users", "nickname_number"));
        assert!(!err.is_unique_violation_on("users", "email"));
        assert!(!err.is_unique_violation_on("video_tags", "nickname"));
    }

    #[test]
    fn test_parse_unrecognised_message() {
        assert_eq!(parse_unique_violation("something else"), (None, None));
    }
}
