use serde::Serialize;

/// Errors surfaced by resource operations. Each maps to one HTTP status and a JSON body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidBody(String),
    #[error("{}", not_found_message(.resource, .id))]
    NotFound { resource: String, id: Option<String> },
    #[error("Simulated failure from chaos mode")]
    ChaosInjected { status: u16 },
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Status codes a chaos fault may answer with.
pub const CHAOS_STATUSES: [u16; 4] = [500, 502, 503, 504];

fn not_found_message(resource: &str, id: &Option<String>) -> String {
    match id {
        Some(id) => format!("{} with id '{}' not found", resource, id),
        None => format!("resource '{}' not found", resource),
    }
}

impl ApiError {
    pub fn not_found(resource: &str, id: &str) -> Self {
        Self::NotFound { resource: resource.to_string(), id: Some(id.to_string()) }
    }

    pub fn unknown_resource(resource: &str) -> Self {
        Self::NotFound { resource: resource.to_string(), id: None }
    }

    /// Machine-readable kind carried in the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidBody(_) => "invalid_body",
            Self::NotFound { .. } => "not_found",
            Self::ChaosInjected { .. } => "chaos_error",
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidBody(_) => 400,
            Self::NotFound { .. } => 404,
            Self::ChaosInjected { status } => *status,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            status: match self {
                Self::ChaosInjected { status } => Some(*status),
                _ => None,
            },
        }
    }
}

/// JSON error payload: `{"error": kind, "message": text}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}
