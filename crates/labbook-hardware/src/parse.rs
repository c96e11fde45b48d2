//! Coercion of raw instrument replies.
//!
//! Devices answer in text and sometimes not at all. Drivers call these at
//! the point where a reply becomes a value, falling back to a default on
//! silence or garbage.

use tracing::debug;

pub fn parse_int_or(raw: Option<&str>, default: i64) -> i64 {
    match raw.map(|r| r.trim().parse::<i64>()) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            debug!(error = %e, "reply is not an integer");
            default
        }
        None => default,
    }
}

pub fn parse_float_or(raw: Option<&str>, default: f64) -> f64 {
    match raw.map(|r| r.trim().parse::<f64>()) {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            debug!(error = %e, "reply is not a number");
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ints() {
        assert_eq!(parse_int_or(Some(" 42\r"), -1), 42);
        assert_eq!(parse_int_or(Some("4.2"), -1), -1);
        assert_eq!(parse_int_or(None, -1), -1);
    }

    #[test]
    fn floats() {
        assert_eq!(parse_float_or(Some("1.5E-09"), 0.0), 1.5e-9);
        assert_eq!(parse_float_or(Some("OFF"), 0.0), 0.0);
        assert_eq!(parse_float_or(None, -1.0), -1.0);
    }
}
