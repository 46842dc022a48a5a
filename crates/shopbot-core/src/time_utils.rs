/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Milliseconds since `started_ms`; zero if the clock stepped backwards.
pub fn elapsed_ms_since(started_ms: u64) -> u64 {
    current_unix_timestamp_ms().saturating_sub(started_ms)
}
