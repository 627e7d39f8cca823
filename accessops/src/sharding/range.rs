//! Hash range math. Ranges are identified by their inclusive start; a range
//! runs to the next range's start (exclusive), the last one to `i32::MAX`.

use super::{DataElement, Error};

/// Validate that a list of hash range starts partitions the full `i32`
/// space: non-empty, no duplicates, and anchored at `i32::MIN`. Sorted
/// unique starts cover the space by construction.
pub fn validate_range_starts(element: DataElement, starts: &[i32]) -> Result<(), Error> {
    if starts.is_empty() {
        return Err(Error::NoRanges(element));
    }

    let mut sorted = starts.to_vec();
    sorted.sort_unstable();
    for window in sorted.windows(2) {
        if window[0] == window[1] {
            return Err(Error::DuplicateRangeStart {
                element,
                start: window[0],
            });
        }
    }

    if sorted[0] != i32::MIN {
        return Err(Error::MissingMinimumRangeStart(element));
    }

    Ok(())
}

/// Inclusive end of the range starting at `starts[index]`, given the
/// sorted list of starts for the element.
pub fn range_end(starts: &[i32], index: usize) -> i32 {
    match starts.get(index + 1) {
        Some(next) => next - 1,
        None => i32::MAX,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_single_range_covers_everything() {
        validate_range_starts(DataElement::User, &[i32::MIN]).unwrap();
        assert_eq!(range_end(&[i32::MIN], 0), i32::MAX);
    }

    #[test]
    fn test_three_ranges() {
        let starts = [i32::MIN, -715_827_882, 715_827_884];
        validate_range_starts(DataElement::Group, &starts).unwrap();
        assert_eq!(range_end(&starts, 0), -715_827_883);
        assert_eq!(range_end(&starts, 1), 715_827_883);
        assert_eq!(range_end(&starts, 2), i32::MAX);
    }

    #[test]
    fn test_duplicate_start_rejected() {
        let err = validate_range_starts(DataElement::User, &[i32::MIN, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            Error::DuplicateRangeStart {
                element: DataElement::User,
                start: 0
            }
        );
        assert!(err.to_string().contains("duplicate hash range start value 0."));
    }

    #[test]
    fn test_missing_minimum_rejected() {
        let err = validate_range_starts(DataElement::Group, &[0, 100]).unwrap_err();
        assert_eq!(err, Error::MissingMinimumRangeStart(DataElement::Group));
    }

    #[test]
    fn test_empty_rejected() {
        let err = validate_range_starts(DataElement::User, &[]).unwrap_err();
        assert_eq!(err, Error::NoRanges(DataElement::User));
    }
}
