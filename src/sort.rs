//! External sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::Path;

use crate::builder::RunBuilder;
use crate::key::SortKey;
use crate::merger::BinaryHeapMerger;
use crate::run::{RecordFormat, RunReader};

/// Default memory limit: 256 MiB.
pub const DEFAULT_MEMORY_LIMIT: u64 = 256 * 1024 * 1024;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Sort key specification error.
    InvalidSortKey(String),
    /// Memory limit is not positive.
    InvalidMemoryLimit(u64),
    /// Temporary directory creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Input record stream error.
    Input(csv::Error),
    /// Row has no field for a key column.
    KeyOutOfRange {
        column: usize,
        fields: usize,
        /// Input line the row starts at.
        line: Option<u64>,
        /// Run the row was read from.
        run: Option<usize>,
    },
    /// Run file creation or writing error.
    RunWrite { run: usize, err: csv::Error },
    /// Run file opening or reading error.
    RunRead { run: usize, err: csv::Error },
    /// Output record sink error.
    Output(csv::Error),
}

impl SortError {
    /// Tags a malformed row error with the run the row was read from.
    pub fn in_run(self, run: usize) -> Self {
        match self {
            SortError::KeyOutOfRange { column, fields, .. } => SortError::KeyOutOfRange {
                column,
                fields,
                line: None,
                run: Some(run),
            },
            err => err,
        }
    }
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::Input(err) => Some(err),
            SortError::RunWrite { err, .. } => Some(err),
            SortError::RunRead { err, .. } => Some(err),
            SortError::Output(err) => Some(err),
            SortError::InvalidSortKey(_) | SortError::InvalidMemoryLimit(_) | SortError::KeyOutOfRange { .. } => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InvalidSortKey(err) => write!(f, "invalid sort key: {}", err),
            SortError::InvalidMemoryLimit(limit) => write!(f, "invalid memory limit: {}", limit),
            SortError::TempDir(err) => write!(f, "temporary directory not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::Input(err) => write!(f, "input data stream error: {}", err),
            SortError::KeyOutOfRange {
                column,
                fields,
                line,
                run,
            } => {
                write!(f, "malformed record: key column {} not found in {} fields", column, fields)?;
                if let Some(line) = line {
                    write!(f, " (line {})", line)?;
                }
                if let Some(run) = run {
                    write!(f, " (run {})", run)?;
                }
                Ok(())
            }
            SortError::RunWrite { run, err } => write!(f, "run {} saving error: {}", run, err),
            SortError::RunRead { run, err } => write!(f, "run {} reading error: {}", run, err),
            SortError::Output(err) => write!(f, "output data stream error: {}", err),
        }
    }
}

/// Sorting result summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSummary {
    /// Number of sorted rows, header excluded.
    pub rows: u64,
    /// Number of runs spilled to temporary storage.
    pub runs: usize,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder {
    /// Number of threads to be used to sort data in parallel.
    threads_number: Option<usize>,
    /// Directory the private temporary directory is created in.
    tmp_dir: Option<Box<Path>>,
    /// Input, run and output read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Buffered rows size limit.
    memory_limit: u64,
    /// Key rows are sorted by.
    key: SortKey,
    /// Whether the first input record is a header.
    header: bool,
    /// Field delimiter.
    delimiter: u8,
    /// Whether records may have different number of fields.
    flexible: bool,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        ExternalSorter::new(self)
    }

    /// Sets number of threads to be used to sort data in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory the temporary data directory is created in.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets memory limit in bytes. It bounds buffered rows size before a run is spilled
    /// and runs read-ahead during merging.
    pub fn with_memory_limit(mut self, memory_limit: u64) -> ExternalSorterBuilder {
        self.memory_limit = memory_limit;
        return self;
    }

    /// Sets sort key.
    pub fn with_sort_key(mut self, key: SortKey) -> ExternalSorterBuilder {
        self.key = key;
        return self;
    }

    /// Sets whether the first input record is a header passed to the output unsorted.
    pub fn with_header(mut self, header: bool) -> ExternalSorterBuilder {
        self.header = header;
        return self;
    }

    /// Sets field delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> ExternalSorterBuilder {
        self.delimiter = delimiter;
        return self;
    }

    /// Sets whether input records may have different number of fields.
    pub fn with_flexible(mut self, flexible: bool) -> ExternalSorterBuilder {
        self.flexible = flexible;
        return self;
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            key: SortKey::default(),
            header: false,
            delimiter: b',',
            flexible: false,
        }
    }
}

/// External sorter.
pub struct ExternalSorter {
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory the temporary data directory is created in.
    tmp_dir: Option<Box<Path>>,
    /// Buffered rows size limit.
    memory_limit: u64,
    /// Key rows are sorted by.
    key: SortKey,
    /// Whether the first input record is a header.
    header: bool,
    /// Input, run and output record format.
    format: RecordFormat,
}

impl ExternalSorter {
    /// Creates a new external sorter instance. The configuration is validated before any I/O is done.
    pub fn new(config: ExternalSorterBuilder) -> Result<Self, SortError> {
        if config.memory_limit == 0 {
            return Err(SortError::InvalidMemoryLimit(config.memory_limit));
        }

        return Ok(ExternalSorter {
            thread_pool: Self::init_thread_pool(config.threads_number)?,
            tmp_dir: config.tmp_dir,
            memory_limit: config.memory_limit,
            key: config.key,
            header: config.header,
            format: RecordFormat {
                delimiter: config.delimiter,
                flexible: config.flexible,
                buf_size: config.rw_buf_size,
            },
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(&self) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = &self.tmp_dir {
            tempfile::Builder::new().prefix("csvsort-").tempdir_in(tmp_path)
        } else {
            tempfile::Builder::new().prefix("csvsort-").tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    pub fn key(&self) -> &SortKey {
        &self.key
    }

    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    /// Sorts records from the input and writes them to the output.
    /// Temporary data is removed when the sorting ends whether it succeeded or not.
    /// On failure the output may contain a part of the sorted records.
    ///
    /// # Arguments
    /// * `input` - Input stream records to be read from
    /// * `output` - Output stream sorted records to be written to
    pub fn sort<R, W>(&self, input: R, output: W) -> Result<SortSummary, SortError>
    where
        R: io::Read,
        W: io::Write,
    {
        let tmp_dir = self.init_tmp_directory()?;
        let result = self.sort_in(tmp_dir.path(), input, output);

        let tmp_path = tmp_dir.path().to_path_buf();
        if let Err(err) = tmp_dir.close() {
            log::warn!("temporary directory {} not removed: {}", tmp_path.display(), err);
        }

        return result;
    }

    fn sort_in<R, W>(&self, tmp_dir: &Path, input: R, output: W) -> Result<SortSummary, SortError>
    where
        R: io::Read,
        W: io::Write,
    {
        let mut records = self.format.reader_builder().from_reader(input).into_byte_records();

        let header = if self.header {
            records.next().transpose().map_err(SortError::Input)?
        } else {
            None
        };

        log::debug!("building runs ...");
        let mut builder = RunBuilder::new(
            tmp_dir,
            &self.key,
            &self.format,
            &self.thread_pool,
            self.memory_limit,
        );
        let mut rows = 0;
        for row in records {
            builder.accumulate(row.map_err(SortError::Input)?)?;
            rows += 1;
        }
        let runs = builder.finalize()?;
        log::debug!("runs building done (rows: {}, runs: {})", rows, runs);

        let mut writer = self.format.writer_builder().from_writer(output);
        if let Some(header) = header {
            writer.write_byte_record(&header).map_err(SortError::Output)?;
        }

        let readers = (0..runs)
            .map(|index| RunReader::open(tmp_dir, index, &self.key, &self.format))
            .collect::<Result<Vec<_>, _>>()?;

        for row in BinaryHeapMerger::new(readers, &self.key, self.memory_limit) {
            writer.write_byte_record(&row?).map_err(SortError::Output)?;
        }
        writer.flush().map_err(|err| SortError::Output(err.into()))?;
        log::debug!("merging done");

        return Ok(SortSummary { rows, runs });
    }
}
