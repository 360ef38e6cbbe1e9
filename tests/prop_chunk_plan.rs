//! Property tests for chunk planning and range header handling

use proptest::prelude::*;
use ranged::{chunks, parse_content_range, parse_range, Chunk};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// The plan covers exactly `[offset, end)`: starts are contiguous,
    /// lengths sum to the interval, and every boundary except the first and
    /// last lands on a multiple of the chunk size.
    #[test]
    fn prop_plan_covers_interval(
        chunk_size in 1u64..=4096,
        offset in 0u64..=100_000,
        extra in 0u64..=100_000,
    ) {
        let end = offset + extra;
        let plan = chunks(chunk_size, offset, end);

        prop_assert_eq!(plan.is_empty(), offset == end);

        let mut expected_start = offset;
        for (i, chunk) in plan.iter().enumerate() {
            prop_assert_eq!(chunk.start, expected_start);
            prop_assert!(chunk.length >= 1);
            if i + 1 < plan.len() {
                // Interior boundary: the chunk ends on an aligned multiple.
                prop_assert_eq!((chunk.start + chunk.length) % chunk_size, 0);
                prop_assert!(chunk.length <= chunk_size);
            }
            expected_start = chunk.start + chunk.length;
        }
        prop_assert_eq!(expected_start, end);
    }

    /// Any `Range` header that parses yields only chunks that cover at least
    /// one byte and stay inside the content.
    #[test]
    fn prop_parsed_ranges_stay_in_bounds(
        size in 1u64..=1_000_000,
        start in 0u64..=1_500_000,
        span in 0u64..=1_500_000,
    ) {
        let header = format!("bytes={}-{}", start, start.saturating_add(span));
        if let Ok(ranges) = parse_range(&header, size) {
            for chunk in ranges {
                prop_assert!(chunk.length >= 1);
                prop_assert!(chunk.start + chunk.length <= size);
            }
        }
    }

    /// Suffix ranges address the final K bytes, clamped to the content.
    #[test]
    fn prop_suffix_ranges_end_at_content(
        size in 1u64..=1_000_000,
        suffix in 1u64..=1_500_000,
    ) {
        let header = format!("bytes=-{}", suffix);
        let ranges = parse_range(&header, size).unwrap();
        prop_assert_eq!(ranges.len(), 1);
        let chunk = ranges[0];
        prop_assert_eq!(chunk.start + chunk.length, size);
        prop_assert_eq!(chunk.length, suffix.min(size));
    }

    /// Formatting a chunk's Content-Range and parsing it back round-trips
    /// the chunk and the size.
    #[test]
    fn prop_content_range_round_trip(
        start in 0u64..=1_000_000,
        length in 1u64..=1_000_000,
        slack in 0u64..=1_000_000,
    ) {
        let size = start + length + slack;
        let chunk = Chunk::new(start, length);
        let header = chunk.content_range_header(size).unwrap();
        let (parsed, parsed_size) = parse_content_range(&header).unwrap();
        prop_assert_eq!(parsed, chunk);
        prop_assert_eq!(parsed_size, size);
    }

    /// A plan for a sub-interval concatenates to the same bytes a plan from
    /// zero would produce for that interval.
    #[test]
    fn prop_plan_matches_range_header_lengths(
        chunk_size in 1u64..=4096,
        size in 1u64..=100_000,
        start in 0u64..=99_999,
    ) {
        prop_assume!(start < size);
        let header = format!("bytes={}-", start);
        let ranges = parse_range(&header, size).unwrap();
        let range = ranges[0];
        let plan = chunks(chunk_size, range.start, range.start + range.length);
        let covered: u64 = plan.iter().map(|c| c.length).sum();
        prop_assert_eq!(covered, size - start);
        prop_assert_eq!(plan.first().map(|c| c.start), Some(start));
    }
}
