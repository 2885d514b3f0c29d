use csv::{Reader, ReaderBuilder, StringRecord, Terminator, Trim};
use log::debug;
use serde::de::DeserializeOwned;
use std::{
    cell::{Cell, RefCell},
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    core::{
        execution_context::ExecutionContext,
        item::{ItemReader, ItemReaderResult},
        stream::{ItemStream, StreamLifecycle, StreamState},
    },
    error::BatchError,
};

const READ_COUNT: &str = "read.count";

/// A restartable CSV item reader.
///
/// Rows are deserialized into Rust structs with Serde; when headers are
/// enabled, columns are matched to struct fields by name.
///
/// The file is only opened by [`ItemStream::open`]. The reader checkpoints
/// the number of data rows consumed under `<name>.read.count`; restoring
/// that context skips the same number of rows, so a restarted step resumes
/// at the first row of the chunk that did not commit.
///
/// # Examples
///
/// ```
/// use spring_batch_core::item::csv::csv_reader::CsvItemReaderBuilder;
/// use spring_batch_core::core::{item::ItemReader, stream::ItemStream};
/// use serde::Deserialize;
/// use std::io::Write;
///
/// #[derive(Debug, Deserialize)]
/// struct Record {
///     name: String,
///     value: i32,
/// }
///
/// let mut file = tempfile::NamedTempFile::new().unwrap();
/// write!(file, "name,value\nfoo,123\nbar,456\n").unwrap();
///
/// let reader = CsvItemReaderBuilder::new()
///     .has_headers(true)
///     .from_path(file.path());
/// reader.open().unwrap();
///
/// let record: Record = reader.read().unwrap().unwrap();
/// assert_eq!(record.name, "foo");
/// assert_eq!(record.value, 123);
/// ```
pub struct CsvItemReader {
    path: PathBuf,
    delimiter: u8,
    terminator: Terminator,
    has_headers: bool,
    reader: RefCell<Option<Reader<File>>>,
    headers: RefCell<Option<StringRecord>>,
    /// Data rows consumed since the beginning of the file
    read_count: Cell<usize>,
    lifecycle: StreamLifecycle,
}

impl CsvItemReader {
    fn skip_records(&self, count: usize) -> Result<(), BatchError> {
        let mut reader = self.reader.borrow_mut();
        let Some(reader) = reader.as_mut() else {
            return Ok(());
        };

        let mut record = StringRecord::new();
        for skipped in 0..count {
            let found = reader
                .read_record(&mut record)
                .map_err(|error| BatchError::Stream(error.to_string()))?;
            if !found {
                return Err(BatchError::Stream(format!(
                    "can not restore {}: file ends after {} of {} rows",
                    self.lifecycle.name(),
                    skipped,
                    count
                )));
            }
        }
        debug!("{} skipped {} rows", self.lifecycle.name(), count);
        Ok(())
    }
}

impl<T: DeserializeOwned> ItemReader<T> for CsvItemReader {
    /// Reads the next item from the CSV file.
    ///
    /// # Returns
    /// - `Ok(Some(record))` if a record is successfully read
    /// - `Ok(None)` if there are no more records to read
    /// - `Err(BatchError::ItemReader(error))` if the row can not be parsed or deserialized
    /// - `Err(BatchError::Stream(error))` if the reader is not open
    fn read(&self) -> ItemReaderResult<T> {
        self.lifecycle.check_open("read")?;
        self.lifecycle.touch();

        let mut reader = self.reader.borrow_mut();
        let reader = reader
            .as_mut()
            .ok_or_else(|| BatchError::Stream(format!("{} has no open file", self.lifecycle.name())))?;

        let mut record = StringRecord::new();
        let found = reader
            .read_record(&mut record)
            .map_err(|error| BatchError::ItemReader(error.to_string()))?;

        if !found {
            return Ok(None);
        }

        self.read_count.set(self.read_count.get() + 1);

        let headers = self.headers.borrow();
        record
            .deserialize(headers.as_ref())
            .map(Some)
            .map_err(|error| BatchError::ItemReader(error.to_string()))
    }
}

impl ItemStream for CsvItemReader {
    fn open(&self) -> Result<(), BatchError> {
        let restored_rows = match self.lifecycle.state() {
            StreamState::Closed => 0,
            _ => self.read_count.get(),
        };
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .delimiter(self.delimiter)
            .terminator(self.terminator)
            .has_headers(self.has_headers)
            .flexible(false)
            .from_path(&self.path)
            .map_err(|error| BatchError::Stream(format!("{}: {}", self.path.display(), error)))?;
        self.lifecycle.open()?;

        if self.has_headers {
            let headers = reader
                .headers()
                .map_err(|error| BatchError::Stream(error.to_string()))?
                .clone();
            *self.headers.borrow_mut() = Some(headers);
        }

        *self.reader.borrow_mut() = Some(reader);
        self.read_count.set(restored_rows);
        // rows restored before opening are skipped now
        self.skip_records(restored_rows)
    }

    fn close(&self) -> Result<(), BatchError> {
        self.lifecycle.close()?;
        self.reader.borrow_mut().take();
        Ok(())
    }

    fn get_execution_context(&self) -> Result<ExecutionContext, BatchError> {
        self.lifecycle.check_open("checkpoint")?;
        let mut context = ExecutionContext::new();
        context.put(&self.lifecycle.key(READ_COUNT), self.read_count.get() as i64)?;
        Ok(context)
    }

    fn restore_from(&self, context: &ExecutionContext) -> Result<(), BatchError> {
        self.lifecycle.begin_restore()?;

        let read_count = context.get_int_or(&self.lifecycle.key(READ_COUNT), 0)?;
        let read_count = usize::try_from(read_count)
            .map_err(|_| BatchError::Stream(format!("invalid read count {}", read_count)))?;

        self.read_count.set(read_count);
        if self.lifecycle.state() == StreamState::Open {
            self.skip_records(read_count)?;
        }
        Ok(())
    }
}

/// A builder for configuring CSV item reading.
///
/// # Default Configuration
///
/// - Name: `CsvItemReader` (prefix of the context keys)
/// - Delimiter: comma (,)
/// - Terminator: CRLF (Windows-style line endings)
/// - Headers: disabled
/// - Trimming: All fields trimmed
pub struct CsvItemReaderBuilder {
    name: String,
    delimiter: u8,
    terminator: Terminator,
    has_headers: bool,
}

impl Default for CsvItemReaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvItemReaderBuilder {
    pub fn new() -> Self {
        Self {
            name: "CsvItemReader".to_string(),
            delimiter: b',',
            terminator: Terminator::CRLF,
            has_headers: false,
        }
    }

    /// Sets the prefix of the keys this reader stores in the execution context.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the line terminator for the CSV parsing.
    ///
    /// - `Terminator::CRLF`: Windows-style line endings (default)
    /// - `Terminator::Any(byte)`: Custom terminator, often `b'\n'` for Unix-style
    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// When enabled, the first row is treated as headers and is not returned
    /// as part of the data.
    pub fn has_headers(mut self, yes: bool) -> Self {
        self.has_headers = yes;
        self
    }

    /// Creates a `CsvItemReader` for the file at `path`.
    ///
    /// Nothing is opened yet: a missing file is reported by
    /// [`ItemStream::open`] as a `BatchError::Stream`.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> CsvItemReader {
        CsvItemReader {
            path: path.as_ref().to_path_buf(),
            delimiter: self.delimiter,
            terminator: self.terminator,
            has_headers: self.has_headers,
            reader: RefCell::new(None),
            headers: RefCell::new(None),
            read_count: Cell::new(0),
            lifecycle: StreamLifecycle::new(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde::Deserialize;
    use tempfile::NamedTempFile;

    use super::CsvItemReaderBuilder;
    use crate::{
        BatchError,
        core::{execution_context::ExecutionContext, item::ItemReader, stream::ItemStream},
    };

    #[derive(Debug, Deserialize, PartialEq)]
    struct City {
        city: String,
        country: String,
        pop: u32,
    }

    fn cities() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "city,country,pop
        Boston,United States,4628910
        Concord,United States,42695
        Paris,France,2102650
"
        )
        .unwrap();
        file
    }

    #[test]
    fn rows_should_be_deserialized_by_header_name() -> Result<(), BatchError> {
        let file = cities();
        let reader = CsvItemReaderBuilder::new()
            .has_headers(true)
            .from_path(file.path());
        reader.open()?;

        let first: Option<City> = reader.read()?;
        assert_eq!(
            first,
            Some(City {
                city: "Boston".to_string(),
                country: "United States".to_string(),
                pop: 4628910,
            })
        );
        Ok(())
    }

    #[test]
    fn restore_should_skip_committed_rows() -> Result<(), BatchError> {
        let file = cities();
        let mut context = ExecutionContext::new();
        context.put("cities.read.count", 2_i64)?;

        let after_open = CsvItemReaderBuilder::new()
            .name("cities")
            .has_headers(true)
            .from_path(file.path());
        after_open.open()?;
        after_open.restore_from(&context)?;
        let city: Option<City> = after_open.read()?;
        assert_eq!(city.map(|c| c.city), Some("Paris".to_string()));

        let before_open = CsvItemReaderBuilder::new()
            .name("cities")
            .has_headers(true)
            .from_path(file.path());
        before_open.restore_from(&context)?;
        before_open.open()?;
        let city: Option<City> = before_open.read()?;
        assert_eq!(city.map(|c| c.city), Some("Paris".to_string()));
        assert_eq!(
            before_open.get_execution_context()?.get_int("cities.read.count")?,
            3
        );
        Ok(())
    }

    #[test]
    fn missing_file_should_fail_on_open() {
        let reader = CsvItemReaderBuilder::new().from_path("/does/not/exist.csv");

        assert!(matches!(reader.open(), Err(BatchError::Stream(_))));
    }

    #[test]
    fn unopened_or_closed_reader_should_fail() -> Result<(), BatchError> {
        let file = cities();
        let reader = CsvItemReaderBuilder::new()
            .has_headers(true)
            .from_path(file.path());

        let result: Result<Option<City>, BatchError> = reader.read();
        assert!(matches!(result, Err(BatchError::Stream(_))));

        reader.open()?;
        reader.close()?;
        let result: Result<Option<City>, BatchError> = reader.read();
        assert!(matches!(result, Err(BatchError::Stream(_))));
        Ok(())
    }

    #[test]
    fn invalid_row_should_be_a_read_failure() -> Result<(), BatchError> {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "city,country,pop\nBoston,United States,many\n").unwrap();

        let reader = CsvItemReaderBuilder::new()
            .has_headers(true)
            .from_path(file.path());
        reader.open()?;

        let result: Result<Option<City>, BatchError> = reader.read();
        assert!(matches!(result, Err(BatchError::ItemReader(_))));
        Ok(())
    }
}
