//! Error types and error codes for the command line and query service.

use behavior_drift::DriftError;

/// Machine-readable error codes.
pub mod error_codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const MALFORMED_INPUT: &str = "malformed_input";
    pub const INVALID_CONFIG: &str = "invalid_config";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// All errors that can occur in the CLI and query service.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Drift(DriftError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        use error_codes::*;
        match self {
            ServiceError::NotFound(_) => NOT_FOUND,
            ServiceError::InvalidParams(_) => INVALID_PARAMS,
            ServiceError::Drift(DriftError::MalformedInput(_)) => MALFORMED_INPUT,
            ServiceError::Drift(DriftError::InvalidConfig(_)) => INVALID_CONFIG,
            _ => INTERNAL_ERROR,
        }
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::InvalidParams(_) => 400,
            ServiceError::Drift(DriftError::MalformedInput(_))
            | ServiceError::Drift(DriftError::InvalidConfig(_)) => 422,
            _ => 500,
        }
    }

    /// JSON error body: `{"error": {"code", "message"}}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

impl From<DriftError> for ServiceError {
    fn from(e: DriftError) -> Self {
        match e {
            DriftError::UnknownEntity(id) => ServiceError::NotFound(id),
            other => ServiceError::Drift(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_entity_maps_to_not_found() {
        let err: ServiceError = DriftError::UnknownEntity("user_9".to_string()).into();
        assert!(matches!(err, ServiceError::NotFound(ref id) if id == "user_9"));
        assert_eq!(err.status(), 404);
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_malformed_input_code() {
        let err: ServiceError = DriftError::MalformedInput("line 3: bad day".to_string()).into();
        assert_eq!(err.code(), "malformed_input");
        assert_eq!(err.status(), 422);
    }

    #[test]
    fn test_error_json_shape() {
        let err = ServiceError::InvalidParams("threshold must be finite".to_string());
        let body = err.to_json();
        assert_eq!(body["error"]["code"], "invalid_params");
        assert_eq!(err.status(), 400);
    }
}
