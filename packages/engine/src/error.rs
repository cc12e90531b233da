#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    MalformedStatement,
    UnresolvableRoute,
    RewriteInvariantViolation,
    Merge,
    Unsupported,
    Parse,
    Configuration,
    KeyGeneration,
    Backend,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MalformedStatement => "SHARDLINE_ERROR_MALFORMED_STATEMENT",
            Self::UnresolvableRoute => "SHARDLINE_ERROR_UNRESOLVABLE_ROUTE",
            Self::RewriteInvariantViolation => "SHARDLINE_ERROR_REWRITE_INVARIANT_VIOLATION",
            Self::Merge => "SHARDLINE_ERROR_MERGE",
            Self::Unsupported => "SHARDLINE_ERROR_UNSUPPORTED",
            Self::Parse => "SHARDLINE_ERROR_PARSE",
            Self::Configuration => "SHARDLINE_ERROR_CONFIGURATION",
            Self::KeyGeneration => "SHARDLINE_ERROR_KEY_GENERATION",
            Self::Backend => "SHARDLINE_ERROR_BACKEND",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::MalformedStatement,
            Self::UnresolvableRoute,
            Self::RewriteInvariantViolation,
            Self::Merge,
            Self::Unsupported,
            Self::Parse,
            Self::Configuration,
            Self::KeyGeneration,
            Self::Backend,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShardlineError {
    /// A parameter marker has no bound value, or a condition compares values
    /// that have no ordering between them.
    #[error("malformed statement: {0}")]
    MalformedStatement(String),

    /// A sharding value maps to no configured data node.
    #[error("unresolvable route: {0}")]
    UnresolvableRoute(String),

    /// Generated tokens overlap. Always a generator bug, never user input.
    #[error("rewrite invariant violated: {0}")]
    RewriteInvariantViolation(String),

    #[error("merge failed: {0}")]
    Merge(String),

    #[error("unsupported statement: {0}")]
    Unsupported(String),

    #[error("failed to parse SQL: {0}")]
    Parse(String),

    #[error("invalid sharding configuration: {0}")]
    Configuration(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("backend error on data source '{data_source}': {message}")]
    Backend { data_source: String, message: String },
}

impl ShardlineError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedStatement(message.into())
    }

    pub fn unresolvable(message: impl Into<String>) -> Self {
        Self::UnresolvableRoute(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn merge(message: impl Into<String>) -> Self {
        Self::Merge(message.into())
    }

    pub fn backend(data_source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            data_source: data_source.into(),
            message: message.into(),
        }
    }

    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedStatement(_) => ErrorCode::MalformedStatement,
            Self::UnresolvableRoute(_) => ErrorCode::UnresolvableRoute,
            Self::RewriteInvariantViolation(_) => ErrorCode::RewriteInvariantViolation,
            Self::Merge(_) => ErrorCode::Merge,
            Self::Unsupported(_) => ErrorCode::Unsupported,
            Self::Parse(_) => ErrorCode::Parse,
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::KeyGeneration(_) => ErrorCode::KeyGeneration,
            Self::Backend { .. } => ErrorCode::Backend,
        }
    }
}
