//! Sorted runs builder.

use std::path::Path;

use csv::ByteRecord;
use log;
use rayon::slice::ParallelSliceMut;

use crate::buffer::RowBuffer;
use crate::key::SortKey;
use crate::run::{self, RecordFormat};
use crate::sort::SortError;

/// Accumulates rows in a memory limited buffer and spills them to sorted run files.
/// Runs are named by an incrementing counter starting at 0.
pub struct RunBuilder<'a> {
    dir: &'a Path,
    key: &'a SortKey,
    format: &'a RecordFormat,
    thread_pool: &'a rayon::ThreadPool,
    buffer: RowBuffer,
    runs: usize,
}

impl<'a> RunBuilder<'a> {
    /// Creates a run builder.
    ///
    /// # Arguments
    /// * `dir` - Directory run files are created in
    /// * `key` - Key rows are sorted by
    /// * `format` - Run file record format
    /// * `thread_pool` - Thread pool run data is sorted in
    /// * `memory_limit` - Buffered rows size a spill is triggered at
    pub fn new(
        dir: &'a Path,
        key: &'a SortKey,
        format: &'a RecordFormat,
        thread_pool: &'a rayon::ThreadPool,
        memory_limit: u64,
    ) -> Self {
        RunBuilder {
            dir,
            key,
            format,
            thread_pool,
            buffer: RowBuffer::new(memory_limit),
            runs: 0,
        }
    }

    /// Adds a row to the buffer, spills the buffer if it reached the limit.
    pub fn accumulate(&mut self, row: ByteRecord) -> Result<(), SortError> {
        self.key.check(&row)?;
        self.buffer.push(row);

        if self.buffer.is_full() {
            self.spill()?;
        }

        return Ok(());
    }

    /// Sorts buffered rows and saves them to a new run file.
    pub fn spill(&mut self) -> Result<(), SortError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        log::debug!(
            "sorting run {} data (rows: {}, size: {})",
            self.runs,
            self.buffer.len(),
            self.buffer.mem_size()
        );
        let key = self.key;
        let buffer = &mut self.buffer;
        self.thread_pool.install(|| {
            buffer.par_sort_by(|a, b| key.compare(a, b));
        });

        log::debug!("saving run {} data", self.runs);
        run::dump(self.dir, self.runs, self.buffer.drain(), self.format)?;
        self.runs += 1;

        return Ok(());
    }

    /// Spills the rest of the buffered rows. Returns the number of created runs.
    pub fn finalize(mut self) -> Result<usize, SortError> {
        self.spill()?;

        return Ok(self.runs);
    }

    /// Returns the number of runs created so far.
    pub fn runs(&self) -> usize {
        self.runs
    }
}

#[cfg(test)]
mod test {
    use csv::ByteRecord;
    use rstest::*;

    use super::RunBuilder;
    use crate::key::SortKey;
    use crate::run::{run_path, RecordFormat, RunReader};
    use crate::sort::SortError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[fixture]
    fn thread_pool() -> rayon::ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn read_run(dir: &tempfile::TempDir, index: usize) -> Vec<ByteRecord> {
        let reader = RunReader::open(dir.path(), index, &SortKey::default(), &RecordFormat::default()).unwrap();
        let rows: Result<Vec<_>, SortError> = reader.collect();
        rows.unwrap()
    }

    #[rstest]
    #[case(1000, 1)]
    #[case(6, 2)]
    #[case(4, 3)]
    #[case(1, 5)]
    fn test_run_builder(
        tmp_dir: tempfile::TempDir,
        thread_pool: rayon::ThreadPool,
        #[case] memory_limit: u64,
        #[case] expected_runs: usize,
    ) {
        let key = SortKey::default();
        let format = RecordFormat::default();
        let mut builder = RunBuilder::new(tmp_dir.path(), &key, &format, &thread_pool, memory_limit);

        for value in ["e1", "d1", "c1", "b1", "a1"] {
            builder.accumulate(ByteRecord::from(vec![value])).unwrap();
        }
        let runs = builder.finalize().unwrap();
        assert_eq!(runs, expected_runs);

        let mut restored = Vec::new();
        for index in 0..runs {
            let run = read_run(&tmp_dir, index);
            assert!(run.windows(2).all(|pair| pair[0].as_slice() <= pair[1].as_slice()));
            restored.extend(run);
        }
        assert!(!run_path(tmp_dir.path(), runs).exists());

        restored.sort_by(|a, b| a.as_slice().cmp(b.as_slice()));
        let expected: Vec<ByteRecord> = ["a1", "b1", "c1", "d1", "e1"]
            .iter()
            .map(|value| ByteRecord::from(vec![*value]))
            .collect();
        assert_eq!(restored, expected);
    }

    #[rstest]
    fn test_run_builder_empty(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool) {
        let key = SortKey::default();
        let format = RecordFormat::default();
        let builder = RunBuilder::new(tmp_dir.path(), &key, &format, &thread_pool, 10);

        assert_eq!(builder.finalize().unwrap(), 0);
        assert!(!run_path(tmp_dir.path(), 0).exists());
    }

    #[rstest]
    fn test_run_builder_short_row(tmp_dir: tempfile::TempDir, thread_pool: rayon::ThreadPool) {
        let key = SortKey::parse("1").unwrap();
        let format = RecordFormat::default();
        let mut builder = RunBuilder::new(tmp_dir.path(), &key, &format, &thread_pool, 10);

        builder.accumulate(ByteRecord::from(vec!["a", "1"])).unwrap();
        let result = builder.accumulate(ByteRecord::from(vec!["b"]));
        assert!(matches!(result, Err(SortError::KeyOutOfRange { column: 1, fields: 1, .. })));
        assert_eq!(builder.runs(), 0);
    }
}
