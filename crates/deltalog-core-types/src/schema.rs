//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names consistent between the logging macros,
//! the error facility and the test capture layer.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_SCOPE_ID: &str = "scope_id";

// Record identifiers
pub const FIELD_ENTITY_ID: &str = "entity_id";
pub const FIELD_TRANSACTION_ID: &str = "transaction_id";
pub const FIELD_VERSION: &str = "version";

// Collection sizes
pub const FIELD_STEP_COUNT: &str = "step_count";
pub const FIELD_RESULT_COUNT: &str = "result_count";

// Error fields
pub const FIELD_ERR_KIND: &str = "err.kind";
pub const FIELD_ERR_CODE: &str = "err.code";
pub const FIELD_ERR_MESSAGE: &str = "err.message";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";
