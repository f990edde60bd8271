//! Timestamp utilities

/// Convert a std duration into a chrono duration, saturating on overflow
pub fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
