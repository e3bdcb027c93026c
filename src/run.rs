//! Sorted runs stored on file system.

use std::fs;
use std::path::{Path, PathBuf};

use csv::ByteRecord;

use crate::key::SortKey;
use crate::sort::SortError;

/// Record encoding shared by the input, the runs and the output.
#[derive(Debug, Clone)]
pub struct RecordFormat {
    /// Field delimiter.
    pub delimiter: u8,
    /// Allows input records to have different number of fields.
    pub flexible: bool,
    /// Read/write buffer size.
    pub buf_size: Option<usize>,
}

impl RecordFormat {
    pub fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .delimiter(self.delimiter)
            .flexible(self.flexible);
        if let Some(buf_size) = self.buf_size {
            builder.buffer_capacity(buf_size);
        }

        return builder;
    }

    pub fn writer_builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder.has_headers(false).delimiter(self.delimiter).flexible(true);
        if let Some(buf_size) = self.buf_size {
            builder.buffer_capacity(buf_size);
        }

        return builder;
    }
}

impl Default for RecordFormat {
    fn default() -> Self {
        RecordFormat {
            delimiter: b',',
            flexible: false,
            buf_size: None,
        }
    }
}

/// Run file path inside the working directory.
pub fn run_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(index.to_string())
}

/// Writes sorted rows to a run file.
pub struct RunWriter {
    index: usize,
    writer: csv::Writer<fs::File>,
}

impl RunWriter {
    /// Creates run file number `index` in the directory.
    pub fn create(dir: &Path, index: usize, format: &RecordFormat) -> Result<Self, SortError> {
        let file = fs::File::create(run_path(dir, index)).map_err(|err| SortError::RunWrite {
            run: index,
            err: err.into(),
        })?;

        return Ok(RunWriter {
            index,
            writer: format.writer_builder().from_writer(file),
        });
    }

    pub fn write_row(&mut self, row: &ByteRecord) -> Result<(), SortError> {
        self.writer
            .write_byte_record(row)
            .map_err(|err| SortError::RunWrite { run: self.index, err })
    }

    /// Flushes buffered rows to the file.
    pub fn finish(mut self) -> Result<(), SortError> {
        self.writer.flush().map_err(|err| SortError::RunWrite {
            run: self.index,
            err: err.into(),
        })
    }
}

/// Sequential reader of a run file.
pub struct RunReader {
    index: usize,
    key: SortKey,
    reader: csv::Reader<fs::File>,
}

impl RunReader {
    /// Opens run file number `index` in the directory.
    pub fn open(dir: &Path, index: usize, key: &SortKey, format: &RecordFormat) -> Result<Self, SortError> {
        let reader = format
            .reader_builder()
            .flexible(true)
            .from_path(run_path(dir, index))
            .map_err(|err| SortError::RunRead { run: index, err })?;

        return Ok(RunReader {
            index,
            key: key.clone(),
            reader,
        });
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn read_row(&mut self) -> Result<Option<ByteRecord>, SortError> {
        let mut row = ByteRecord::new();
        if !self
            .reader
            .read_byte_record(&mut row)
            .map_err(|err| SortError::RunRead { run: self.index, err })?
        {
            return Ok(None);
        }

        self.key.check(&row).map_err(|err| err.in_run(self.index))?;

        return Ok(Some(row));
    }
}

impl Iterator for RunReader {
    type Item = Result<ByteRecord, SortError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_row().transpose()
    }
}

/// Writes rows to run file number `index` and returns the number of written rows.
pub fn dump<I>(dir: &Path, index: usize, rows: I, format: &RecordFormat) -> Result<usize, SortError>
where
    I: IntoIterator<Item = ByteRecord>,
{
    let mut writer = RunWriter::create(dir, index, format)?;
    let mut count = 0;
    for row in rows {
        writer.write_row(&row)?;
        count += 1;
    }
    writer.finish()?;

    return Ok(count);
}
