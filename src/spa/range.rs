//! `Range` header parsing (RFC 9110 §14), single `bytes` ranges only.

/// A satisfiable byte range, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub fn len(self) -> usize {
        self.end - self.start + 1
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RangeParse {
    Satisfiable(ByteRange),
    /// Well-formed but outside the entity: answer 416.
    Unsatisfiable,
    /// Absent, malformed, multipart or another unit: serve the whole entity.
    Ignore,
}

/// Parses `header` against an entity of `size` bytes.
///
/// Accepted forms: `bytes=start-end`, `bytes=start-`, `bytes=-suffix`.
pub(crate) fn parse_range(header: Option<&str>, size: usize) -> RangeParse {
    let Some(spec) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeParse::Ignore;
    };
    if spec.contains(',') {
        return RangeParse::Ignore;
    }
    let Some((start, end)) = spec.split_once('-') else {
        return RangeParse::Ignore;
    };
    let (start, end) = (start.trim(), end.trim());

    if start.is_empty() {
        // Suffix: the last `end` bytes.
        return match end.parse::<usize>() {
            Ok(0) => RangeParse::Unsatisfiable,
            Ok(_) if size == 0 => RangeParse::Unsatisfiable,
            Ok(suffix) => RangeParse::Satisfiable(ByteRange {
                start: size.saturating_sub(suffix),
                end: size - 1,
            }),
            Err(_) => RangeParse::Ignore,
        };
    }

    let Ok(start) = start.parse::<usize>() else {
        return RangeParse::Ignore;
    };
    let end = if end.is_empty() {
        None
    } else {
        match end.parse::<usize>() {
            Ok(e) => Some(e),
            Err(_) => return RangeParse::Ignore,
        }
    };
    if start >= size || end.is_some_and(|e| e < start) {
        return RangeParse::Unsatisfiable;
    }
    let end = end.map_or(size - 1, |e| e.min(size - 1));
    RangeParse::Satisfiable(ByteRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: usize, end: usize) -> RangeParse {
        RangeParse::Satisfiable(ByteRange { start, end })
    }

    #[test]
    fn explicit_open_and_suffix_ranges() {
        assert_eq!(parse_range(Some("bytes=0-9"), 100), range(0, 9));
        assert_eq!(parse_range(Some("bytes=50-"), 100), range(50, 99));
        assert_eq!(parse_range(Some("bytes=-20"), 100), range(80, 99));
        assert_eq!(parse_range(Some("bytes=90-500"), 100), range(90, 99));
        assert_eq!(parse_range(Some("bytes=-500"), 100), range(0, 99));
    }

    #[test]
    fn out_of_bounds_is_unsatisfiable() {
        assert_eq!(parse_range(Some("bytes=200-"), 100), RangeParse::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=9-3"), 100), RangeParse::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=-0"), 100), RangeParse::Unsatisfiable);
        assert_eq!(parse_range(Some("bytes=0-"), 0), RangeParse::Unsatisfiable);
    }

    #[test]
    fn malformed_or_multipart_is_ignored() {
        assert_eq!(parse_range(None, 100), RangeParse::Ignore);
        assert_eq!(parse_range(Some("bytes=a-b"), 100), RangeParse::Ignore);
        assert_eq!(parse_range(Some("bytes=0-9,20-29"), 100), RangeParse::Ignore);
        assert_eq!(parse_range(Some("items=0-9"), 100), RangeParse::Ignore);
    }
}
