/// Internal failure taxonomy for the dormant tier (spec.md §7).
///
/// `DormantStore` implementors return this type, but it never crosses the
/// `CacheController` surface: every caller-facing method absorbs it into a
/// `bool`/`Option` outcome and logs the failure via `tracing` instead
/// (spec.md §7: "no error objects cross the API surface in the core").
#[derive(Debug, thiserror::Error)]
pub enum DormantError {
    #[error("dormant store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("dormant store payload could not be deserialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("dormant store unavailable: {0}")]
    Unavailable(String),
}

/// Notification raised when both tiers become empty (spec.md §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    EmptyCache,
}
