//! Conversions from external infrastructure errors into domain errors.

use fieldsync_domain::FieldSyncError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub FieldSyncError);

impl From<InfraError> for FieldSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<FieldSyncError> for InfraError {
    fn from(value: FieldSyncError) -> Self {
        InfraError(value)
    }
}

trait IntoFieldSyncError {
    fn into_fieldsync(self) -> FieldSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → FieldSyncError */
/* -------------------------------------------------------------------------- */

impl IntoFieldSyncError for SqlError {
    fn into_fieldsync(self) -> FieldSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        FieldSyncError::Storage("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        FieldSyncError::Storage("database is locked".into())
                    }
                    (ErrorCode::DiskFull, _) => {
                        FieldSyncError::Storage("device storage is full".into())
                    }
                    (ErrorCode::ReadOnly, _) => {
                        FieldSyncError::Storage("database is read-only".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        FieldSyncError::Storage("unique constraint violation".into())
                    }
                    _ => FieldSyncError::Storage(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => FieldSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                FieldSyncError::Storage(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                FieldSyncError::Storage(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                FieldSyncError::Storage("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidPath(path) => FieldSyncError::Storage(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => FieldSyncError::Storage(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_fieldsync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → FieldSyncError */
/* -------------------------------------------------------------------------- */

impl IntoFieldSyncError for r2d2::Error {
    fn into_fieldsync(self) -> FieldSyncError {
        FieldSyncError::Storage(format!("connection pool error: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(value.into_fieldsync())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → FieldSyncError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(FieldSyncError::Storage(format!("invalid stored payload: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → FieldSyncError */
/* -------------------------------------------------------------------------- */

impl IntoFieldSyncError for HttpError {
    fn into_fieldsync(self) -> FieldSyncError {
        if self.is_timeout() {
            return FieldSyncError::Timeout("HTTP request timed out".into());
        }

        if self.is_connect() {
            return FieldSyncError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                404 => FieldSyncError::NotFound(message),
                408 | 429 => FieldSyncError::Network(message),
                400..=499 => FieldSyncError::Validation(message),
                _ => FieldSyncError::Server(message),
            };
        }

        if self.is_builder() {
            return FieldSyncError::Config(format!("invalid HTTP request: {self}"));
        }

        FieldSyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_fieldsync())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
