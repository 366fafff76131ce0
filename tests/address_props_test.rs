//! Property tests for the address model.

use proptest::prelude::*;
use sheetmap::core::{column_index, column_label, CellAddress, CellRange};

fn plain_sheet() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z_][A-Za-z0-9_]{0,12}( [A-Za-z0-9_]{1,8})?").unwrap()
}

fn quoted_sheet() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[A-Za-z0-9 &.#'-]{1,16}")
        .unwrap()
        .prop_filter("quotable names need a non-plain character", |s| {
            !s.is_empty() && s.chars().any(|c| !(c.is_ascii_alphanumeric() || c == '_' || c == ' '))
        })
}

proptest! {
    #[test]
    fn column_label_round_trips(col in 1u32..=16_384) {
        prop_assert_eq!(column_index(&column_label(col)), Some(col));
    }

    #[test]
    fn address_round_trips(sheet in plain_sheet(), row in 1u32..=1_048_576, col in 1u32..=16_384) {
        let addr = CellAddress::new(sheet, row, col);
        let parsed = CellAddress::parse_a1(&addr.to_a1()).unwrap();
        prop_assert_eq!(parsed, addr);
    }

    #[test]
    fn quoted_address_round_trips(sheet in quoted_sheet(), row in 1u32..=1000, col in 1u32..=1000) {
        let addr = CellAddress::new(sheet, row, col);
        let parsed = CellAddress::parse_a1(&addr.to_a1()).unwrap();
        prop_assert_eq!(parsed, addr);
    }

    #[test]
    fn canonical_form_is_a_fixed_point(sheet in plain_sheet(), row in 1u32..=9999, col in 1u32..=702) {
        let addr = CellAddress::new(sheet, row, col);
        let once = addr.to_a1();
        let twice = CellAddress::parse_a1(&once).unwrap().to_a1();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn ordering_matches_tuples(
        r1 in 1u32..=100, c1 in 1u32..=100,
        r2 in 1u32..=100, c2 in 1u32..=100,
    ) {
        let a = CellAddress::new("S", r1, c1);
        let b = CellAddress::new("S", r2, c2);
        prop_assert_eq!(a.cmp(&b), (r1, c1).cmp(&(r2, c2)));
    }

    #[test]
    fn range_expansion_matches_dimensions(
        r1 in 1u32..=40, c1 in 1u32..=40,
        r2 in 1u32..=40, c2 in 1u32..=40,
    ) {
        let range = CellRange::new(
            CellAddress::new("S", r1, c1),
            CellAddress::new("S", r2, c2),
        ).unwrap();
        let cells: Vec<_> = range.cells().collect();
        prop_assert_eq!(cells.len() as u64, range.len());
        // Row-major: strictly increasing (row, col) tuples.
        for pair in cells.windows(2) {
            prop_assert!((pair[0].row, pair[0].col) < (pair[1].row, pair[1].col));
        }
    }
}
