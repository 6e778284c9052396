use thiserror::Error;

/// Zero-indexed, half-open page range `[start, end)` within a document.
///
/// Always satisfies `start < end`. Intervals are kept in the exact order the
/// user wrote them; overlapping or repeated ranges are emitted as-is so the
/// extractor can print a page more than once when asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInterval {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Error)]
pub enum PageSpecError {
    #[error("invalid page range spec '{spec}': {reason}")]
    InvalidRangeSpec { spec: String, reason: String },
}

/// Parses a user-facing page spec such as `"1-3,5,7-9"` into page intervals.
///
/// Pages are 1-indexed and range bounds are inclusive, so `"1-3"` becomes
/// `[0, 3)` and `"5"` becomes `[4, 5)`. An empty or whitespace-only spec
/// yields an empty list, which callers treat as "print all pages". Empty
/// segments between commas are skipped.
pub fn parse_page_spec(spec: &str) -> Result<Vec<PageInterval>, PageSpecError> {
    let mut intervals = Vec::new();

    for segment in spec.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let interval = if let Some((lo, hi)) = segment.split_once('-') {
            let start = parse_bound(spec, segment, lo)?;
            let end = parse_bound(spec, segment, hi)?;
            if end < start {
                return Err(invalid(
                    spec,
                    format!("range '{segment}' ends before it starts"),
                ));
            }
            PageInterval {
                start: start - 1,
                end,
            }
        } else {
            let page = parse_bound(spec, segment, segment)?;
            PageInterval {
                start: page - 1,
                end: page,
            }
        };

        intervals.push(interval);
    }

    Ok(intervals)
}

fn parse_bound(spec: &str, segment: &str, bound: &str) -> Result<usize, PageSpecError> {
    let bound = bound.trim();
    if bound.is_empty() {
        return Err(invalid(spec, format!("missing bound in '{segment}'")));
    }
    match bound.parse::<usize>() {
        Ok(page) if page >= 1 => Ok(page),
        Ok(_) => Err(invalid(spec, format!("page numbers start at 1, got '{bound}'"))),
        Err(_) => Err(invalid(spec, format!("'{bound}' is not a page number"))),
    }
}

fn invalid(spec: &str, reason: String) -> PageSpecError {
    PageSpecError::InvalidRangeSpec {
        spec: spec.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(start: usize, end: usize) -> PageInterval {
        PageInterval { start, end }
    }

    #[test]
    fn single_page_becomes_unit_interval() {
        assert_eq!(parse_page_spec("3").unwrap(), vec![iv(2, 3)]);
        assert_eq!(parse_page_spec("1").unwrap(), vec![iv(0, 1)]);
    }

    #[test]
    fn inclusive_range_becomes_half_open() {
        assert_eq!(parse_page_spec("1-5").unwrap(), vec![iv(0, 5)]);
    }

    #[test]
    fn mixed_spec_preserves_order() {
        assert_eq!(
            parse_page_spec("1-3,5,7-9").unwrap(),
            vec![iv(0, 3), iv(4, 5), iv(6, 9)]
        );
    }

    #[test]
    fn overlapping_ranges_are_not_merged() {
        assert_eq!(
            parse_page_spec("1-4,2-3,2-3").unwrap(),
            vec![iv(0, 4), iv(1, 3), iv(1, 3)]
        );
    }

    #[test]
    fn empty_spec_means_all_pages() {
        assert_eq!(parse_page_spec("").unwrap(), Vec::new());
        assert_eq!(parse_page_spec("   ").unwrap(), Vec::new());
    }

    #[test]
    fn empty_segments_are_skipped() {
        assert_eq!(parse_page_spec("1,,3").unwrap(), vec![iv(0, 1), iv(2, 3)]);
        assert_eq!(parse_page_spec(" 2 , 4 ").unwrap(), vec![iv(1, 2), iv(3, 4)]);
    }

    #[test]
    fn non_integer_content_is_rejected() {
        assert!(matches!(
            parse_page_spec("abc"),
            Err(PageSpecError::InvalidRangeSpec { .. })
        ));
        assert!(parse_page_spec("1-2,x").is_err());
    }

    #[test]
    fn missing_bound_is_rejected() {
        assert!(parse_page_spec("1-").is_err());
        assert!(parse_page_spec("-3").is_err());
    }

    #[test]
    fn zero_and_inverted_ranges_are_rejected() {
        assert!(parse_page_spec("0").is_err());
        assert!(parse_page_spec("0-2").is_err());
        assert!(parse_page_spec("5-3").is_err());
    }

    #[test]
    fn parsed_intervals_are_well_formed() {
        for interval in parse_page_spec("1,2-2,3-9,40-41").unwrap() {
            assert!(interval.start < interval.end);
        }
    }
}
