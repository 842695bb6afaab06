//! Time utilities for remotty

use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is set before the Unix epoch.
///
/// # Examples
/// ```
/// use rt_core::time::current_time_millis;
///
/// let now = current_time_millis();
/// assert!(now > 0);
/// ```
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_is_positive() {
        assert!(current_time_millis() > 0);
    }

    #[test]
    fn test_current_time_is_monotonic_enough() {
        let first = current_time_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(current_time_millis() >= first + 5);
    }
}
