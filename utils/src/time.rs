//! Time formatting helpers.

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_across_unit_boundaries() {
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(180), "3m 0s");
        assert_eq!(format_duration(3661), "1h 1m");
    }
}
