use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body returned by every endpoint that rejects a request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorResponse { error: error.into() }
    }
}
