//! Shared constants for structured API errors.

pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_TIMEOUT: &str = "timeout_error";
pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_CONFIGURATION: &str = "configuration_error";

pub const OUTCOME_COMPLETED: &str = "completed";
pub const OUTCOME_ERROR_CHUNK: &str = "error_chunk";
pub const OUTCOME_FALLBACK: &str = "fallback";
pub const OUTCOME_CANCELLED: &str = "cancelled";
