//! Second-precision timestamp formatting shared across the pipeline.
//!
//! Reports render each `time_ranges` endpoint as both a raw `f64` number of
//! seconds (one decimal, per the report's numeric-precision contract) and a
//! human `mm:ss` label.

/// Format a duration in seconds as `mm:ss`, rounding down to the nearest
/// second. Negative input is clamped to zero.
///
/// # Examples
/// ```
/// use entityscan_models::timestamp::format_mm_ss;
/// assert_eq!(format_mm_ss(0.0), "00:00");
/// assert_eq!(format_mm_ss(65.4), "01:05");
/// assert_eq!(format_mm_ss(3661.0), "61:01");
/// ```
pub fn format_mm_ss(total_secs: f64) -> String {
    let secs = total_secs.max(0.0).floor() as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Round a seconds value to one decimal place, the report's contracted
/// numeric precision for `duration_sec` and `time_ranges` endpoints.
pub fn round_seconds(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Round a fraction (presence, confidence) to four decimal places, the
/// report's contracted precision for those fields.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_whole_minutes() {
        assert_eq!(format_mm_ss(120.0), "02:00");
    }

    #[test]
    fn clamps_negative() {
        assert_eq!(format_mm_ss(-5.0), "00:00");
    }

    #[test]
    fn rounds_seconds_to_one_decimal() {
        assert_eq!(round_seconds(5.449), 5.4);
        assert_eq!(round_seconds(5.451), 5.5);
    }

    #[test]
    fn rounds_presence_to_four_decimals() {
        assert_eq!(round4(0.83333333), 0.8333);
    }
}
