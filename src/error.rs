/// Typed failure of one tool invocation.
///
/// The runner never panics or raises across its boundary: every failure ends
/// up as one of these variants inside [`crate::subprocess::RunOutcome`].
/// `Display` is the user-facing message; [`ToolError::hint`] carries the
/// optional remediation text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// Pre-flight failed: installation root or executable missing.
    #[error("{error}")]
    NotAvailable {
        tool: String,
        error: String,
        hint: String,
    },

    /// Adapter-level input check failed before anything was spawned.
    #[error("{error}")]
    Precondition { error: String, hint: Option<String> },

    #[error("{tool} command timed out")]
    TimedOut {
        tool: String,
        timeout_ms: u64,
        hint: Option<String>,
    },

    #[error("{message}")]
    NonZeroExit {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("{message}")]
    SpawnError { message: String, hint: Option<String> },

    #[error("{tool} request was superseded by a newer one")]
    Cancelled { tool: String },

    #[error("Too many tool invocations in flight (limit {limit})")]
    Busy { limit: usize },

    #[error("{0}")]
    InvalidRequest(String),
}

impl ToolError {
    pub fn hint(&self) -> Option<&str> {
        match self {
            ToolError::NotAvailable { hint, .. } => Some(hint),
            ToolError::Precondition { hint, .. }
            | ToolError::TimedOut { hint, .. }
            | ToolError::SpawnError { hint, .. } => hint.as_deref(),
            ToolError::Busy { .. } => Some("Retry once running tool invocations finish"),
            ToolError::NonZeroExit { .. }
            | ToolError::Cancelled { .. }
            | ToolError::InvalidRequest(_) => None,
        }
    }

    /// Short stable name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::NotAvailable { .. } => "not_available",
            ToolError::Precondition { .. } => "precondition",
            ToolError::TimedOut { .. } => "timed_out",
            ToolError::NonZeroExit { .. } => "non_zero_exit",
            ToolError::SpawnError { .. } => "spawn_error",
            ToolError::Cancelled { .. } => "cancelled",
            ToolError::Busy { .. } => "busy",
            ToolError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub(crate) fn precondition(error: impl Into<String>, hint: Option<&str>) -> Self {
        ToolError::Precondition {
            error: error.into(),
            hint: hint.map(str::to_owned),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse environment variable '{var}': {detail}")]
    EnvParse { var: String, detail: String },

    #[error("Invalid bind address '{value}': {detail}")]
    InvalidBind { value: String, detail: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}
