use std::{
    cell::{Cell, RefCell},
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom},
    path::{Path, PathBuf},
};

use csv::{Writer, WriterBuilder};
use log::debug;
use serde::Serialize;

use crate::{
    BatchError,
    core::{
        execution_context::ExecutionContext,
        item::{ItemWriter, ItemWriterResult},
        stream::{ItemStream, StreamLifecycle, StreamState},
    },
};

const CURRENT_POSITION: &str = "current.position";
const WRITTEN_COUNT: &str = "written.count";

/// A restartable CSV item writer.
///
/// Records are serialized with Serde. The output file is created lazily, on
/// the first write or flush after [`ItemStream::open`]:
///
/// - a fresh start truncates the file and writes the header row (when enabled)
/// - a restart truncates the file back to the byte position checkpointed at
///   the last commit (`<name>.current.position`) and appends from there,
///   without repeating the headers
///
/// Only flushed records are part of a checkpoint. Records written after the
/// last flush are cut from the file on rollback or when the writer is closed.
pub struct CsvItemWriter {
    path: PathBuf,
    delimiter: u8,
    has_headers: bool,
    writer: RefCell<Option<Writer<File>>>,
    /// Byte offset of the end of the last flushed record
    position: Cell<u64>,
    written_count: Cell<usize>,
    pending_count: Cell<usize>,
    lifecycle: StreamLifecycle,
}

impl CsvItemWriter {
    fn map_error(&self, error: impl ToString) -> BatchError {
        BatchError::ItemWriter(format!("{}: {}", self.path.display(), error.to_string()))
    }

    fn materialize(&self) -> Result<(), BatchError> {
        if self.writer.borrow().is_some() {
            return Ok(());
        }

        let position = self.position.get();
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|error| self.map_error(error))?;
        file.set_len(position).map_err(|error| self.map_error(error))?;
        file.seek(SeekFrom::End(0))
            .map_err(|error| self.map_error(error))?;

        debug!("{} writes from byte {}", self.lifecycle.name(), position);

        let writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_headers && position == 0)
            .from_writer(file);
        *self.writer.borrow_mut() = Some(writer);
        Ok(())
    }

    /// Releases the file and truncates it back to the last flushed position.
    ///
    /// The next write reopens the file at that position.
    fn discard_uncommitted(&self) -> std::io::Result<()> {
        // dropping the csv writer flushes its buffer
        let Some(writer) = self.writer.borrow_mut().take() else {
            return Ok(());
        };
        drop(writer);

        if self.pending_count.replace(0) > 0 {
            debug!(
                "{} drops records written after byte {}",
                self.lifecycle.name(),
                self.position.get()
            );
            let file = OpenOptions::new().write(true).open(&self.path)?;
            file.set_len(self.position.get())?;
        }
        Ok(())
    }

    /// Number of records flushed since the beginning of the file.
    pub fn written_count(&self) -> usize {
        self.written_count.get()
    }
}

impl<R: Serialize> ItemWriter<R> for CsvItemWriter {
    fn write(&self, item: &R) -> ItemWriterResult {
        self.lifecycle.check_open("write")?;
        self.lifecycle.touch();
        self.materialize()?;

        let mut writer = self.writer.borrow_mut();
        let writer = writer
            .as_mut()
            .ok_or_else(|| BatchError::Stream(format!("{} has no open file", self.lifecycle.name())))?;
        writer
            .serialize(item)
            .map_err(|error| self.map_error(error))?;

        self.pending_count.set(self.pending_count.get() + 1);
        Ok(())
    }

    /// Flush the contents of the internal buffer to the file and move the
    /// checkpoint to the end of it.
    fn flush(&self) -> ItemWriterResult {
        self.lifecycle.check_open("flush")?;
        self.lifecycle.touch();
        self.materialize()?;

        let mut writer = self.writer.borrow_mut();
        let writer = writer
            .as_mut()
            .ok_or_else(|| BatchError::Stream(format!("{} has no open file", self.lifecycle.name())))?;
        writer.flush().map_err(|error| self.map_error(error))?;
        let mut file: &File = writer.get_ref();
        let position = file
            .stream_position()
            .map_err(|error| self.map_error(error))?;

        self.position.set(position);
        self.written_count
            .set(self.written_count.get() + self.pending_count.replace(0));
        Ok(())
    }

    /// Cuts the records written since the last flush from the file.
    fn rollback(&self) -> ItemWriterResult {
        self.discard_uncommitted()
            .map_err(|error| self.map_error(error))
    }
}

impl ItemStream for CsvItemWriter {
    fn open(&self) -> Result<(), BatchError> {
        let reopening = self.lifecycle.state() == StreamState::Closed;
        self.lifecycle.open()?;
        if reopening {
            self.position.set(0);
            self.written_count.set(0);
            self.pending_count.set(0);
        }
        Ok(())
    }

    fn close(&self) -> Result<(), BatchError> {
        self.lifecycle.close()?;
        self.discard_uncommitted()
            .map_err(|error| BatchError::Stream(error.to_string()))
    }

    fn get_execution_context(&self) -> Result<ExecutionContext, BatchError> {
        self.lifecycle.check_open("checkpoint")?;
        let mut context = ExecutionContext::new();
        context.put(&self.lifecycle.key(CURRENT_POSITION), self.position.get() as i64)?;
        context.put(&self.lifecycle.key(WRITTEN_COUNT), self.written_count.get() as i64)?;
        Ok(context)
    }

    fn restore_from(&self, context: &ExecutionContext) -> Result<(), BatchError> {
        self.lifecycle.begin_restore()?;

        let position = context.get_int_or(&self.lifecycle.key(CURRENT_POSITION), 0)?;
        let written_count = context.get_int_or(&self.lifecycle.key(WRITTEN_COUNT), 0)?;
        let position = u64::try_from(position)
            .map_err(|_| BatchError::Stream(format!("invalid position {}", position)))?;
        let written_count = usize::try_from(written_count)
            .map_err(|_| BatchError::Stream(format!("invalid written count {}", written_count)))?;

        self.position.set(position);
        self.written_count.set(written_count);
        Ok(())
    }
}

/// A builder for configuring CSV item writing.
///
/// Defaults to a comma delimiter, no header row and `CsvItemWriter` as the
/// prefix of the context keys.
pub struct CsvItemWriterBuilder {
    name: String,
    delimiter: u8,
    has_headers: bool,
}

impl Default for CsvItemWriterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvItemWriterBuilder {
    pub fn new() -> CsvItemWriterBuilder {
        CsvItemWriterBuilder {
            name: "CsvItemWriter".to_string(),
            delimiter: b',',
            has_headers: false,
        }
    }

    pub fn name(mut self, name: &str) -> CsvItemWriterBuilder {
        self.name = name.to_string();
        self
    }

    pub fn delimiter(mut self, delimiter: u8) -> CsvItemWriterBuilder {
        self.delimiter = delimiter;
        self
    }

    /// Writes a header row built from the field names of the first record.
    pub fn has_headers(mut self, yes: bool) -> CsvItemWriterBuilder {
        self.has_headers = yes;
        self
    }

    /// Creates a writer for the file at `path`.
    ///
    /// # Example
    ///
    /// ```
    /// use spring_batch_core::core::{item::ItemWriter, stream::ItemStream};
    /// use spring_batch_core::item::csv::csv_writer::CsvItemWriterBuilder;
    ///
    /// #[derive(serde::Serialize)]
    /// struct Row<'a> {
    ///     city: &'a str,
    ///     #[serde(rename = "popcount")]
    ///     population: u64,
    /// }
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let path = dir.path().join("cities.csv");
    ///
    /// let writer = CsvItemWriterBuilder::new()
    ///     .has_headers(true)
    ///     .from_path(&path);
    /// writer.open().unwrap();
    /// writer.write(&Row { city: "Boston", population: 4628910 }).unwrap();
    /// ItemWriter::<Row>::flush(&writer).unwrap();
    /// writer.close().unwrap();
    ///
    /// let data = std::fs::read_to_string(&path).unwrap();
    /// assert_eq!(data, "city,popcount\nBoston,4628910\n");
    /// ```
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> CsvItemWriter {
        CsvItemWriter {
            path: path.as_ref().to_path_buf(),
            delimiter: self.delimiter,
            has_headers: self.has_headers,
            writer: RefCell::new(None),
            position: Cell::new(0),
            written_count: Cell::new(0),
            pending_count: Cell::new(0),
            lifecycle: StreamLifecycle::new(&self.name),
        }
    }
}
