//! Sequential lab-identifier allocation.
//!
//! Identifiers (and irradiation names) come in three shapes:
//!
//! - `NM-001`: prefix, separator, zero-padded counter
//! - `NM-ABC-001`: only the segment after the last separator counts
//! - `NM001`: non-numeric head followed by a numeric run
//!
//! [`allocate_next`] bumps the counter and keeps everything else. Input it
//! cannot make sense of comes back unchanged.

/// Separator between an identifier's prefix and its counter.
pub const SEPARATOR: char = '-';

/// Returns the identifier following `name`.
///
/// The counter is formatted with at least three digits. If no counter can be
/// isolated (no digits, trailing separator, overflow) `name` is returned as-is.
pub fn allocate_next(name: &str) -> String {
    let (head, separator, tail) = match name.rfind(SEPARATOR) {
        Some(idx) => (&name[..idx], "-", &name[idx + SEPARATOR.len_utf8()..]),
        None => {
            let start = numeric_tail_start(name);
            (&name[..start], "", &name[start..])
        }
    };

    match tail.parse::<i64>().ok().and_then(|n| n.checked_add(1)) {
        Some(next) => format!("{head}{separator}{next:03}"),
        None => name.to_string(),
    }
}

/// Byte offset where the numeric tail begins: characters are peeled off the
/// front until the remainder parses as an integer. Returns `name.len()` when
/// nothing numeric remains.
fn numeric_tail_start(name: &str) -> usize {
    name.char_indices()
        .map(|(idx, _)| idx)
        .find(|&idx| name[idx..].parse::<i64>().is_ok())
        .unwrap_or(name.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn increments_after_separator() {
        assert_eq!(allocate_next("NM-001"), "NM-002");
        assert_eq!(allocate_next("NM-009"), "NM-010");
    }

    #[test]
    fn only_last_separator_splits() {
        assert_eq!(allocate_next("NM-ABC-099"), "NM-ABC-100");
        assert_eq!(allocate_next("A-B-C-7"), "A-B-C-008");
    }

    #[test]
    fn increments_numeric_run_without_separator() {
        assert_eq!(allocate_next("NM001"), "NM002");
        assert_eq!(allocate_next("NM272"), "NM273");
        assert_eq!(allocate_next("41"), "042");
    }

    #[test]
    fn counter_grows_past_three_digits() {
        assert_eq!(allocate_next("NM-999"), "NM-1000");
    }

    #[test]
    fn malformed_input_is_returned_unchanged() {
        assert_eq!(allocate_next("ABC"), "ABC");
        assert_eq!(allocate_next(""), "");
        assert_eq!(allocate_next("NM-"), "NM-");
        assert_eq!(allocate_next("NM-ABC"), "NM-ABC");
        assert_eq!(allocate_next("NM-9223372036854775807"), "NM-9223372036854775807");
    }

    #[test]
    fn digits_inside_head_are_not_the_counter() {
        // peeling stops at the first suffix that parses as a whole
        assert_eq!(allocate_next("N2M5"), "N2M006");
    }

    proptest! {
        #[test]
        fn separator_form_bumps_suffix(prefix in "[A-Z]{1,4}(-[A-Z]{1,3})?", n in 0i64..998) {
            let id = format!("{prefix}-{n:03}");
            prop_assert_eq!(allocate_next(&id), format!("{prefix}-{:03}", n + 1));
        }

        #[test]
        fn bare_form_keeps_head(prefix in "[A-Z]{1,4}", n in 0i64..998) {
            let id = format!("{prefix}{n:03}");
            prop_assert_eq!(allocate_next(&id), format!("{prefix}{:03}", n + 1));
        }

        #[test]
        fn alphabetic_input_is_untouched(name in "[A-Za-z]{0,12}") {
            prop_assert_eq!(allocate_next(&name), name);
        }
    }
}
