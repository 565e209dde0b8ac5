// ABOUTME: Error taxonomy for the loader core (introspection, policy, records, statements)
// ABOUTME: Every failing call rolls back its transaction before one of these is returned

use thiserror::Error;

/// Errors produced by the loader core.
///
/// Introspection, constraint and argument errors are raised before any
/// statement writes data. Record and transaction errors are raised inside the
/// call's transaction, which is rolled back before the error is returned.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Table or column introspection failed, or the table/column does not exist.
    #[error("schema error on {table}: {message}")]
    Schema { table: String, message: String },

    /// The conflict policy needs constraint columns and none could be resolved.
    #[error(
        "conflict policy '{policy}' requires a unique constraint or primary key on {table}, none found"
    )]
    ConstraintRequired { policy: String, table: String },

    /// A record does not satisfy the shape the operation requires.
    #[error("invalid record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// The database rejected a statement (type mismatch, unique violation, deadlock, ...).
    #[error("{context}")]
    Transaction {
        context: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// The query template could not be rendered.
    #[error("template error: {0}")]
    Template(String),

    /// The policy has no meaning for the requested operation.
    #[error("conflict policy '{policy}' is not supported by {operation}")]
    UnsupportedPolicy { policy: String, operation: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type LoaderResult<T> = std::result::Result<T, LoaderError>;

impl LoaderError {
    pub(crate) fn schema(table: impl ToString, message: impl Into<String>) -> Self {
        Self::Schema {
            table: table.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_record(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            index,
            reason: reason.into(),
        }
    }
}

/// Attach a description to a `tokio_postgres` failure, mirroring `anyhow::Context`.
pub(crate) trait StatementContext<T> {
    fn statement_context<F>(self, context: F) -> LoaderResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> StatementContext<T> for std::result::Result<T, tokio_postgres::Error> {
    fn statement_context<F>(self, context: F) -> LoaderResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| LoaderError::Transaction {
            context: context(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_required_message() {
        let err = LoaderError::ConstraintRequired {
            policy: "update".to_string(),
            table: "public.daily_report".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "conflict policy 'update' requires a unique constraint or primary key on public.daily_report, none found"
        );
    }

    #[test]
    fn test_invalid_record_message() {
        let err = LoaderError::invalid_record(3, "missing business_key");
        assert_eq!(
            err.to_string(),
            "invalid record at index 3: missing business_key"
        );
    }

    #[test]
    fn test_schema_message() {
        let err = LoaderError::schema("public.missing", "table does not exist");
        assert!(err.to_string().contains("public.missing"));
        assert!(err.to_string().contains("table does not exist"));
    }
}
