//! HTTP byte-range parsing.
//!
//! Only a single inclusive interval is recognised: `bytes=start-end` or the
//! open-ended `bytes=start-`. The `bytes=` unit prefix is optional. Suffix
//! ranges (`bytes=-500`) are not supported and are rejected as unsatisfiable.
//!
//! A header that does not have the byte-range shape at all (wrong unit, no
//! separator, several ranges, non-digit bounds) is treated as if no range was
//! requested, so clients always get the full resource rather than an error.

/// An inclusive span of byte offsets within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset (inclusive).
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by the span.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` header value for a 206 response.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// `Content-Range` header value for a 416 response.
pub fn unsatisfied_content_range(total: u64) -> String {
    format!("bytes */{total}")
}

/// Outcome of validating a `Range` header against a resource length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDecision {
    /// Serve the whole resource (no range, or a malformed one).
    FullContent,
    /// Serve the given span. Invariant: `start <= end < total`.
    PartialContent(ByteRange),
    /// The requested span cannot be served for this resource.
    Unsatisfiable,
}

/// Parse a `Range` header value against a resource of `total` bytes.
pub fn parse_range(header: Option<&str>, total: u64) -> RangeDecision {
    let Some(header) = header else {
        return RangeDecision::FullContent;
    };

    let header = header.trim();
    let set = header.strip_prefix("bytes=").unwrap_or(header);
    let Some((start, end)) = set.split_once('-') else {
        return RangeDecision::FullContent;
    };
    let (start, end) = (start.trim(), end.trim());

    if !is_digits(start) || !is_digits(end) {
        return RangeDecision::FullContent;
    }

    // Empty start (suffix form) or a bound that overflows u64.
    let Ok(start) = start.parse::<u64>() else {
        return RangeDecision::Unsatisfiable;
    };

    let end = if end.is_empty() {
        match total.checked_sub(1) {
            Some(last) => last,
            None => return RangeDecision::Unsatisfiable,
        }
    } else {
        match end.parse::<u64>() {
            Ok(end) => end,
            Err(_) => return RangeDecision::Unsatisfiable,
        }
    };

    if start > end || end >= total {
        return RangeDecision::Unsatisfiable;
    }

    RangeDecision::PartialContent(ByteRange { start, end })
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn partial(start: u64, end: u64) -> RangeDecision {
        RangeDecision::PartialContent(ByteRange { start, end })
    }

    #[test]
    fn absent_header_is_full_content() {
        assert_eq!(parse_range(None, 100), RangeDecision::FullContent);
    }

    #[test]
    fn closed_range() {
        assert_eq!(parse_range(Some("bytes=0-9"), 100), partial(0, 9));
        assert_eq!(parse_range(Some("bytes=10-10"), 100), partial(10, 10));
        assert_eq!(parse_range(Some("bytes=0-99"), 100), partial(0, 99));
    }

    #[test]
    fn open_ended_range_runs_to_last_byte() {
        assert_eq!(parse_range(Some("bytes=40-"), 100), partial(40, 99));
        assert_eq!(parse_range(Some("bytes=99-"), 100), partial(99, 99));
    }

    #[test]
    fn unit_prefix_is_optional() {
        assert_eq!(parse_range(Some("5-7"), 100), partial(5, 7));
        assert_eq!(parse_range(Some("  bytes= 5 - 7 "), 100), partial(5, 7));
    }

    #[test]
    fn inverted_range_is_unsatisfiable() {
        assert_eq!(
            parse_range(Some("bytes=10-5"), 100),
            RangeDecision::Unsatisfiable
        );
    }

    #[test]
    fn range_past_end_is_unsatisfiable() {
        assert_eq!(
            parse_range(Some("bytes=0-100"), 100),
            RangeDecision::Unsatisfiable
        );
        assert_eq!(
            parse_range(Some("bytes=100-"), 100),
            RangeDecision::Unsatisfiable
        );
    }

    #[test]
    fn empty_resource_cannot_satisfy_any_range() {
        assert_eq!(parse_range(Some("bytes=0-"), 0), RangeDecision::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=0-0"), 0), RangeDecision::Unsatisfiable);
    }

    #[test]
    fn suffix_range_is_unsupported() {
        assert_eq!(
            parse_range(Some("bytes=-500"), 1000),
            RangeDecision::Unsatisfiable
        );
    }

    #[test]
    fn overflowing_bound_is_unsatisfiable() {
        assert_eq!(
            parse_range(Some("bytes=0-99999999999999999999999"), 100),
            RangeDecision::Unsatisfiable
        );
    }

    #[test]
    fn malformed_headers_fall_back_to_full_content() {
        for header in [
            "bytes=abc-def",
            "bytes=1x-5",
            "bytes=0-10,20-30",
            "bytes=5",
            "items=0-5",
            "",
            "garbage",
        ] {
            assert_eq!(
                parse_range(Some(header), 100),
                RangeDecision::FullContent,
                "header {header:?}"
            );
        }
    }

    #[test]
    fn content_range_formatting() {
        let range = ByteRange { start: 2, end: 5 };
        assert_eq!(range.len(), 4);
        assert_eq!(range.content_range(10), "bytes 2-5/10");
        assert_eq!(unsatisfied_content_range(10), "bytes */10");
    }

    proptest! {
        #[test]
        fn valid_intervals_are_accepted(total in 1u64..1_000_000, a in any::<u64>(), b in any::<u64>()) {
            let (s, e) = {
                let x = a % total;
                let y = b % total;
                (x.min(y), x.max(y))
            };
            let header = format!("bytes={s}-{e}");
            let decision = parse_range(Some(&header), total);
            prop_assert_eq!(decision, partial(s, e));
            if let RangeDecision::PartialContent(range) = decision {
                prop_assert_eq!(range.len(), e - s + 1);
            }
        }

        #[test]
        fn out_of_bounds_intervals_are_rejected(total in 1u64..1_000_000, s in 0u64..2_000_000, e in 0u64..2_000_000) {
            prop_assume!(s > e || e >= total);
            let header = format!("bytes={s}-{e}");
            prop_assert_eq!(parse_range(Some(&header), total), RangeDecision::Unsatisfiable);
        }

        #[test]
        fn non_numeric_bounds_match_no_header(total in 0u64..10_000, junk in "[a-zA-Z]{1,8}") {
            let header = format!("bytes={junk}-{junk}");
            prop_assert_eq!(parse_range(Some(&header), total), parse_range(None, total));
        }
    }
}
