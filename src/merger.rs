//! Binary heap merger.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use csv::ByteRecord;
use log;

use crate::buffer::row_size;
use crate::key::SortKey;
use crate::sort::SortError;

/// Frontier entry: a row read from a run and the run index.
struct FrontierEntry<'a> {
    row: ByteRecord,
    run: usize,
    key: &'a SortKey,
}

impl PartialEq for FrontierEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FrontierEntry<'_> {}

impl PartialOrd for FrontierEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // binary heap is max-heap by default so the comparison is reversed to convert it to min-heap
        self.key
            .compare(&other.row, &self.row)
            .then_with(|| other.run.cmp(&self.run))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeState {
    Filling,
    Emitting,
    Done,
}

/// Binary heap merger implementation.
/// Merges multiple sorted runs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of rows,
/// *n* is the number of runs.
///
/// The heap is filled with up to `memory_limit / (runs + 1)` bytes of rows from every run.
/// After that each emitted row is replaced by the next row from the same run,
/// so every active run always has at least one row in the heap.
pub struct BinaryHeapMerger<'a, C>
where
    C: Iterator<Item = Result<ByteRecord, SortError>>,
{
    key: &'a SortKey,
    frontier: BinaryHeap<FrontierEntry<'a>>,
    // exhausted runs are set to `None`
    runs: Vec<Option<C>>,
    read_ahead_limit: u64,
    state: MergeState,
}

impl<'a, C> BinaryHeapMerger<'a, C>
where
    C: Iterator<Item = Result<ByteRecord, SortError>>,
{
    /// Creates an instance of a binary heap merger using runs as inputs.
    /// Run rows should be sorted by the key otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `runs` - Runs to be merged in a single sorted one
    /// * `key` - Key the runs are sorted by
    /// * `memory_limit` - Memory budget shared by the runs read-ahead
    pub fn new<I>(runs: I, key: &'a SortKey, memory_limit: u64) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let runs = Vec::from_iter(runs.into_iter().map(Some));
        let read_ahead_limit = memory_limit / (runs.len() as u64 + 1);
        log::debug!(
            "merging {} runs (read-ahead limit per run: {})",
            runs.len(),
            read_ahead_limit
        );

        return BinaryHeapMerger {
            key,
            frontier: BinaryHeap::with_capacity(runs.len()),
            runs,
            read_ahead_limit,
            state: MergeState::Filling,
        };
    }

    /// Reads rows from every active run until the read-ahead limit is reached or the run is exhausted.
    fn fill(&mut self) -> Result<(), SortError> {
        for idx in 0..self.runs.len() {
            let mut read = 0;
            while let Some(run) = self.runs[idx].as_mut() {
                match run.next() {
                    Some(row) => {
                        let row = row?;
                        read += row_size(&row);
                        self.push(row, idx);
                        if read >= self.read_ahead_limit {
                            break;
                        }
                    }
                    None => self.runs[idx] = None,
                }
            }
        }

        return Ok(());
    }

    /// Replaces an emitted row by the next row from the same run.
    fn refill(&mut self, idx: usize) -> Result<(), SortError> {
        if let Some(run) = self.runs[idx].as_mut() {
            match run.next() {
                Some(row) => self.push(row?, idx),
                None => self.runs[idx] = None,
            }
        }

        return Ok(());
    }

    fn push(&mut self, row: ByteRecord, run: usize) {
        self.frontier.push(FrontierEntry {
            row,
            run,
            key: self.key,
        });
    }

    fn next_row(&mut self) -> Result<Option<ByteRecord>, SortError> {
        loop {
            match self.state {
                MergeState::Filling => {
                    self.fill()?;
                    self.state = if self.frontier.is_empty() {
                        MergeState::Done
                    } else {
                        MergeState::Emitting
                    };
                }
                MergeState::Emitting => match self.frontier.pop() {
                    Some(entry) => {
                        self.refill(entry.run)?;
                        return Ok(Some(entry.row));
                    }
                    None => self.state = MergeState::Filling,
                },
                MergeState::Done => return Ok(None),
            }
        }
    }
}

impl<'a, C> Iterator for BinaryHeapMerger<'a, C>
where
    C: Iterator<Item = Result<ByteRecord, SortError>>,
{
    type Item = Result<ByteRecord, SortError>;

    /// Returns the next row from the runs in key order.
    /// The merger stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        let result = self.next_row();
        if result.is_err() {
            self.state = MergeState::Done;
            self.frontier.clear();
        }

        return result.transpose();
    }
}

#[cfg(test)]
mod test {
    use std::io;

    use csv::ByteRecord;
    use rand::seq::SliceRandom;
    use rstest::*;

    use super::BinaryHeapMerger;
    use crate::key::SortKey;
    use crate::sort::SortError;

    fn row(value: &str) -> ByteRecord {
        ByteRecord::from(vec![value])
    }

    fn rows(values: &[&str]) -> Vec<Result<ByteRecord, SortError>> {
        values.iter().map(|value| Ok(row(value))).collect()
    }

    fn run_error(run: usize) -> Result<ByteRecord, SortError> {
        Err(SortError::RunRead {
            run,
            err: io::Error::new(io::ErrorKind::Other, "test error").into(),
        })
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![rows(&[]), rows(&[])], vec![])]
    #[case(
        vec![
            rows(&["4", "5", "7"]),
            rows(&["1", "6"]),
            rows(&["3"]),
            rows(&[]),
        ],
        vec!["1", "3", "4", "5", "6", "7"],
    )]
    #[case(
        vec![
            rows(&["a", "a", "c"]),
            rows(&["a", "b"]),
        ],
        vec!["a", "a", "a", "b", "c"],
    )]
    fn test_merger(#[case] runs: Vec<Vec<Result<ByteRecord, SortError>>>, #[case] expected: Vec<&str>) {
        for memory_limit in [1, 4, 1024] {
            let key = SortKey::default();
            let merger = BinaryHeapMerger::new(runs.iter().map(clone_run), &key, memory_limit);

            let actual: Result<Vec<ByteRecord>, SortError> = merger.collect();
            let expected: Vec<ByteRecord> = expected.iter().map(|value| row(value)).collect();
            assert_eq!(actual.unwrap(), expected, "memory limit: {}", memory_limit);
        }
    }

    fn clone_run(run: &Vec<Result<ByteRecord, SortError>>) -> std::vec::IntoIter<Result<ByteRecord, SortError>> {
        run.iter()
            .map(|item| match item {
                Ok(row) => Ok(row.clone()),
                Err(SortError::RunRead { run, .. }) => run_error(*run),
                Err(err) => panic!("unexpected error: {}", err),
            })
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_merger_error() {
        let mut failing = rows(&["3"]);
        failing.push(run_error(0));
        let runs = vec![failing, rows(&["1", "2"])];

        let key = SortKey::default();
        let mut merger = BinaryHeapMerger::new(runs.into_iter().map(|run| run.into_iter()), &key, 100);

        // the first fill reads the failing run past its first row
        assert!(matches!(merger.next(), Some(Err(SortError::RunRead { run: 0, .. }))));
        assert!(merger.next().is_none());
    }

    #[test]
    fn test_merger_error_on_refill() {
        let mut failing = rows(&["1"]);
        failing.push(run_error(0));
        let runs = vec![failing, rows(&["2", "3"])];

        let key = SortKey::default();
        // a single row per run is read ahead
        let mut merger = BinaryHeapMerger::new(runs.into_iter().map(|run| run.into_iter()), &key, 1);

        assert!(matches!(merger.next(), Some(Err(SortError::RunRead { run: 0, .. }))));
        assert!(merger.next().is_none());
    }

    #[test]
    fn test_merger_multi_column() {
        let key = SortKey::parse("1,0").unwrap();
        let runs = vec![
            vec![Ok(ByteRecord::from(vec!["b", "0"])), Ok(ByteRecord::from(vec!["a", "1"]))],
            vec![Ok(ByteRecord::from(vec!["a", "0"])), Ok(ByteRecord::from(vec!["c", "0"]))],
        ];

        let merger = BinaryHeapMerger::new(runs.into_iter().map(|run| run.into_iter()), &key, 100);
        let actual: Result<Vec<ByteRecord>, SortError> = merger.collect();

        let expected = vec![
            ByteRecord::from(vec!["a", "0"]),
            ByteRecord::from(vec!["b", "0"]),
            ByteRecord::from(vec!["c", "0"]),
            ByteRecord::from(vec!["a", "1"]),
        ];
        assert_eq!(actual.unwrap(), expected);
    }

    #[test]
    fn test_merger_many_runs() {
        let mut values: Vec<String> = (0..500).map(|value| format!("{:05}", value)).collect();
        values.shuffle(&mut rand::thread_rng());

        let mut runs: Vec<Vec<String>> = values.chunks(37).map(|chunk| chunk.to_vec()).collect();
        for run in runs.iter_mut() {
            run.sort();
        }

        let key = SortKey::default();
        let merger = BinaryHeapMerger::new(
            runs.into_iter()
                .map(|run| run.into_iter().map(|value| Ok(ByteRecord::from(vec![value])))),
            &key,
            64,
        );
        let actual: Result<Vec<ByteRecord>, SortError> = merger.collect();

        values.sort();
        let expected: Vec<ByteRecord> = values.into_iter().map(|value| ByteRecord::from(vec![value])).collect();
        assert_eq!(actual.unwrap(), expected);
    }
}
