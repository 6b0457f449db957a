//! Common validation utilities.

use validator::ValidationError;

/// Maximum map zoom level accepted from clients.
pub const MAX_ZOOM_LEVEL: i32 = 22;

/// UTC offsets in the wild range from -12:00 to +14:00.
const MIN_UTC_OFFSET_MINUTES: i32 = -12 * 60;
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// One week; longer liveness thresholds are a configuration mistake.
const MAX_THRESHOLD_MINUTES: i32 = 7 * 24 * 60;

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Validates that a latitude value is within valid range (-90 to 90).
pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
    if (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        Err(error("latitude_range", "Latitude must be between -90 and 90"))
    }
}

/// Validates that a longitude value is within valid range (-180 to 180).
pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
    if (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        Err(error(
            "longitude_range",
            "Longitude must be between -180 and 180",
        ))
    }
}

/// Validates that accuracy is non-negative.
pub fn validate_accuracy(accuracy: f64) -> Result<(), ValidationError> {
    if accuracy >= 0.0 {
        Ok(())
    } else {
        Err(error("accuracy_range", "Accuracy must be non-negative"))
    }
}

/// Validates that speed is non-negative.
pub fn validate_speed(speed: f64) -> Result<(), ValidationError> {
    if speed >= 0.0 {
        Ok(())
    } else {
        Err(error("speed_range", "Speed must be non-negative"))
    }
}

/// Validates a slippy-map zoom level (0 to 22).
pub fn validate_zoom_level(zoom: i32) -> Result<(), ValidationError> {
    if (0..=MAX_ZOOM_LEVEL).contains(&zoom) {
        Ok(())
    } else {
        Err(error("zoom_range", "Zoom level must be between 0 and 22"))
    }
}

/// Validates a UTC offset expressed in minutes.
pub fn validate_utc_offset_minutes(offset: i32) -> Result<(), ValidationError> {
    if (MIN_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&offset) {
        Ok(())
    } else {
        Err(error(
            "utc_offset_range",
            "UTC offset must be between -720 and 840 minutes",
        ))
    }
}

/// Validates a liveness threshold in minutes (1 minute to 1 week).
pub fn validate_threshold_minutes(minutes: i32) -> Result<(), ValidationError> {
    if (1..=MAX_THRESHOLD_MINUTES).contains(&minutes) {
        Ok(())
    } else {
        Err(error(
            "threshold_range",
            "Threshold must be between 1 and 10080 minutes",
        ))
    }
}

/// Validates a username used in realtime topic names.
///
/// Usernames become part of topic keys, so only ASCII letters, digits,
/// `.`, `_` and `-` are accepted.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

    if !username.is_empty() && username.len() <= 64 && valid_chars {
        Ok(())
    } else {
        Err(error(
            "username_format",
            "Username must be 1-64 characters of letters, digits, '.', '_' or '-'",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_latitude() {
        assert!(validate_latitude(0.0).is_ok());
        assert!(validate_latitude(90.0).is_ok());
        assert!(validate_latitude(-90.0).is_ok());
        assert!(validate_latitude(90.1).is_err());
        assert!(validate_latitude(-90.1).is_err());
    }

    #[test]
    fn test_validate_longitude_error_message() {
        assert!(validate_longitude(-180.0).is_ok());
        let err = validate_longitude(200.0).unwrap_err();
        assert_eq!(
            err.message.unwrap().to_string(),
            "Longitude must be between -180 and 180"
        );
    }

    #[test]
    fn test_validate_accuracy_and_speed() {
        assert!(validate_accuracy(0.0).is_ok());
        assert!(validate_accuracy(-1.0).is_err());
        assert!(validate_speed(27.8).is_ok());
        assert!(validate_speed(-0.5).is_err());
    }

    #[test]
    fn test_validate_zoom_level() {
        assert!(validate_zoom_level(0).is_ok());
        assert!(validate_zoom_level(22).is_ok());
        assert!(validate_zoom_level(23).is_err());
        assert!(validate_zoom_level(-1).is_err());
    }

    #[test]
    fn test_validate_utc_offset() {
        assert!(validate_utc_offset_minutes(0).is_ok());
        assert!(validate_utc_offset_minutes(-720).is_ok());
        assert!(validate_utc_offset_minutes(840).is_ok());
        assert!(validate_utc_offset_minutes(841).is_err());
    }

    #[test]
    fn test_validate_threshold_minutes() {
        assert!(validate_threshold_minutes(10).is_ok());
        assert!(validate_threshold_minutes(0).is_err());
        assert!(validate_threshold_minutes(10_081).is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.b_c-9").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("slash/name").is_err());
    }
}
