//! Helpers for displaying errors.

/// Format an error and every source in its chain: `"outer -> inner -> root"`.
///
/// Error boundaries log through this so that the root cause is never
/// swallowed by an outer context message.
pub fn format_ref(error: &dyn std::error::Error) -> String {
    let mut parts = vec![error.to_string()];
    let mut current = error.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(" -> ")
}

/// As [`format_ref`], for owning error types like `anyhow::Error`.
pub fn format(error: impl AsRef<dyn std::error::Error>) -> String {
    format_ref(error.as_ref())
}

// ----------------------------------------------------------------------------
