//! Multi-column sort key.

use std::cmp::Ordering;
use std::str::FromStr;

use csv::ByteRecord;

use crate::sort::SortError;

/// Sorting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Default for Order {
    fn default() -> Self {
        Order::Asc
    }
}

impl FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Order::Asc),
            "desc" => Ok(Order::Desc),
            _ => Err(format!("unknown sorting order: {}", s)),
        }
    }
}

/// Row sort key. Rows are compared column by column using byte-wise lexicographic ordering,
/// the first non-equal column decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    columns: Vec<usize>,
    order: Order,
    /// Minimal number of fields a row must have.
    min_fields: usize,
}

impl SortKey {
    /// Creates a sort key from 0-based column indices.
    pub fn new(columns: Vec<usize>, order: Order) -> Result<Self, SortError> {
        let min_fields = match columns.iter().max() {
            Some(max) => max + 1,
            None => return Err(SortError::InvalidSortKey("no columns given".to_string())),
        };

        return Ok(SortKey {
            columns,
            order,
            min_fields,
        });
    }

    /// Parses a comma separated list of column indices, for example `0,2,3`.
    /// An empty string results in the default key.
    pub fn parse(spec: &str) -> Result<Self, SortError> {
        if spec.trim().is_empty() {
            return Ok(SortKey::default());
        }

        let columns = spec
            .split(',')
            .map(|column| {
                column
                    .trim()
                    .parse::<usize>()
                    .map_err(|err| SortError::InvalidSortKey(format!("column '{}': {}", column, err)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        return SortKey::new(columns, Order::Asc);
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = order;
        return self;
    }

    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// Checks that the row has every key column.
    pub fn check(&self, row: &ByteRecord) -> Result<(), SortError> {
        if row.len() < self.min_fields {
            return Err(SortError::KeyOutOfRange {
                column: self.min_fields - 1,
                fields: row.len(),
                line: row.position().map(|pos| pos.line()),
                run: None,
            });
        }

        return Ok(());
    }

    /// Compares two rows. Both rows must have passed [`SortKey::check`].
    pub fn compare(&self, a: &ByteRecord, b: &ByteRecord) -> Ordering {
        let ordering = self
            .columns
            .iter()
            .map(|&column| a[column].cmp(&b[column]))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal);

        match self.order {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        }
    }

    /// Checks both rows and compares them.
    pub fn try_compare(&self, a: &ByteRecord, b: &ByteRecord) -> Result<Ordering, SortError> {
        self.check(a)?;
        self.check(b)?;

        return Ok(self.compare(a, b));
    }
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey {
            columns: vec![0],
            order: Order::Asc,
            min_fields: 1,
        }
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use csv::ByteRecord;
    use rstest::*;

    use super::{Order, SortKey};
    use crate::sort::SortError;

    fn row(fields: &[&str]) -> ByteRecord {
        ByteRecord::from(fields.to_vec())
    }

    #[rstest]
    #[case("", vec![0])]
    #[case("1", vec![1])]
    #[case("0,2,3", vec![0, 2, 3])]
    #[case(" 1, 0 ", vec![1, 0])]
    fn test_parse(#[case] spec: &str, #[case] expected: Vec<usize>) {
        let key = SortKey::parse(spec).unwrap();
        assert_eq!(key.columns(), expected.as_slice());
        assert_eq!(key.order(), Order::Asc);
    }

    #[rstest]
    #[case("a")]
    #[case("0,,1")]
    #[case("-1")]
    fn test_parse_invalid(#[case] spec: &str) {
        assert!(matches!(SortKey::parse(spec), Err(SortError::InvalidSortKey(_))));
    }

    #[test]
    fn test_empty_columns() {
        assert!(matches!(SortKey::new(vec![], Order::Asc), Err(SortError::InvalidSortKey(_))));
    }

    #[rstest]
    #[case(vec![0], &["a", "2"], &["b", "1"], Ordering::Less)]
    #[case(vec![1], &["a", "2"], &["b", "1"], Ordering::Greater)]
    #[case(vec![0, 1], &["a", "1"], &["a", "2"], Ordering::Less)]
    #[case(vec![0], &["a", "1"], &["a", "2"], Ordering::Equal)]
    #[case(vec![1, 0], &["b", "1"], &["a", "1"], Ordering::Greater)]
    #[case(vec![0], &["B"], &["a"], Ordering::Less)]
    #[case(vec![0], &["ab"], &["abc"], Ordering::Less)]
    fn test_compare(
        #[case] columns: Vec<usize>,
        #[case] a: &[&str],
        #[case] b: &[&str],
        #[case] expected: Ordering,
    ) {
        let key = SortKey::new(columns, Order::Asc).unwrap();
        assert_eq!(key.compare(&row(a), &row(b)), expected);
        assert_eq!(key.compare(&row(b), &row(a)), expected.reverse());
    }

    #[test]
    fn test_compare_desc() {
        let key = SortKey::default().with_order(Order::Desc);
        assert_eq!(key.compare(&row(&["a"]), &row(&["b"])), Ordering::Greater);
    }

    #[test]
    fn test_key_out_of_range() {
        let key = SortKey::parse("0,2").unwrap();

        let result = key.try_compare(&row(&["a", "b", "c"]), &row(&["a", "b"]));
        match result {
            Err(SortError::KeyOutOfRange { column, fields, .. }) => {
                assert_eq!(column, 2);
                assert_eq!(fields, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
