//! Human-readable request numbers: `LR-<year>-<6-digit sequence>`,
//! sequence scoped per calendar year.
//!
//! The store reports the highest sequence already allocated for a year;
//! the service formats the next one. A unique constraint on
//! `request_number` plus a bounded retry in `create` covers two creates
//! racing for the same sequence.

const PREFIX: &str = "LR";

pub fn format_request_number(year: i32, sequence: u32) -> String {
    format!("{}{sequence:06}", year_prefix(year))
}

/// Prefix shared by every number allocated in `year`. Zero padding keeps
/// numbers fixed-width, so the lexicographic maximum under this prefix is
/// also the numeric maximum.
pub fn year_prefix(year: i32) -> String {
    format!("{PREFIX}-{year}-")
}

/// Sequence component of a number allocated for `year`, if it matches the
/// year's prefix. Storage backends use this to find the current maximum.
pub fn sequence_of(number: &str, year: i32) -> Option<u32> {
    number
        .strip_prefix(&year_prefix(year))
        .and_then(|seq| seq.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_zero_padding() {
        assert_eq!(format_request_number(2024, 1), "LR-2024-000001");
        assert_eq!(format_request_number(2024, 123456), "LR-2024-123456");
    }

    #[test]
    fn parses_back_the_sequence() {
        assert_eq!(sequence_of("LR-2024-000042", 2024), Some(42));
        assert_eq!(sequence_of("LR-2024-000042", 2023), None);
        assert_eq!(sequence_of("PO-2024-000042", 2024), None);
        assert_eq!(sequence_of("LR-2024-abc", 2024), None);
    }
}
