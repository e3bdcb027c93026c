//! `csv-ext-sort` is an external sort implementation for csv records.
//!
//! Records are sorted by a multi-column key, columns are compared as byte strings. The input may not fit into
//! the main memory (RAM): records are accumulated in a memory limited buffer, every time the buffer is full it is
//! sorted and saved to a temporary file (a run). When the input is exhausted the runs are merged
//! into a single sorted output using a binary heap. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Memory limit:**
//!   the sum of buffered field lengths is bounded by the configured limit,
//!   the same limit is shared by the runs read-ahead during merging.
//! * **Multithreading support:**
//!   run data is sorted in multiple threads.
//! * **Header support:**
//!   the first record can be passed to the output unsorted.
//! * **Temporary data cleanup:**
//!   temporary files are removed when the sorting ends whether it succeeded or failed.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//! use std::path;
//!
//! use csv_ext_sort::{ExternalSorter, ExternalSorterBuilder, SortKey};
//!
//! fn main() {
//!     let input_reader = io::BufReader::new(fs::File::open("input.csv").unwrap());
//!     let output_writer = io::BufWriter::new(fs::File::create("output.csv").unwrap());
//!
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_sort_key(SortKey::parse("2,0").unwrap())
//!         .with_memory_limit(50 * 1024 * 1024)
//!         .with_header(true)
//!         .build()
//!         .unwrap();
//!
//!     sorter.sort(input_reader, output_writer).unwrap();
//! }
//! ```

pub mod buffer;
pub mod builder;
pub mod key;
pub mod merger;
pub mod run;
pub mod sort;

pub use buffer::RowBuffer;
pub use builder::RunBuilder;
pub use key::{Order, SortKey};
pub use merger::BinaryHeapMerger;
pub use run::{RecordFormat, RunReader, RunWriter};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortSummary};
