use axum::http::StatusCode;

use parley_store::StoreError;

/// Map a store outcome to the status the client sees.
///
/// `DanglingSender` has already been logged where it was detected.
pub fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::InvalidInput(_) | StoreError::NotFound => StatusCode::BAD_REQUEST,
        StoreError::UsernameTaken => StatusCode::CONFLICT,
        StoreError::UnknownSender(_) | StoreError::DanglingSender { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
