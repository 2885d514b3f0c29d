use std::cell::{Cell, RefCell};

use crate::{
    BatchError,
    core::{
        execution_context::ExecutionContext,
        item::{ItemReader, ItemReaderResult, ItemWriter, ItemWriterResult},
        stream::{ItemStream, StreamLifecycle, StreamState},
    },
};

const READ_COUNT: &str = "read.count";

/// Restartable reader over an in-memory list.
///
/// As an [`ItemStream`] it checkpoints the number of items read under
/// `<name>.read.count` (`ListItemReader.read.count` by default). It can also
/// be used without being opened, in which case it simply walks the list.
///
/// ```
/// use spring_batch_core::core::item::ItemReader;
/// use spring_batch_core::core::stream::ItemStream;
/// use spring_batch_core::item::list::ListItemReader;
///
/// let reader = ListItemReader::new(vec![1, 2, 3]);
/// reader.open().unwrap();
/// assert_eq!(reader.read().unwrap(), Some(1));
///
/// let checkpoint = reader.get_execution_context().unwrap();
/// reader.close().unwrap();
///
/// let restarted = ListItemReader::new(vec![1, 2, 3]);
/// restarted.open().unwrap();
/// restarted.restore_from(&checkpoint).unwrap();
/// assert_eq!(restarted.read().unwrap(), Some(2));
/// ```
pub struct ListItemReader<T> {
    items: Vec<T>,
    index: Cell<usize>,
    lifecycle: StreamLifecycle,
}

impl<T> ListItemReader<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self::with_name("ListItemReader", items)
    }

    /// Reader whose context keys are prefixed with `name`.
    pub fn with_name(name: &str, items: Vec<T>) -> Self {
        Self {
            items,
            index: Cell::new(0),
            lifecycle: StreamLifecycle::new(name),
        }
    }
}

impl<T: Clone> ItemReader<T> for ListItemReader<T> {
    fn read(&self) -> ItemReaderResult<T> {
        if self.lifecycle.state() == StreamState::Closed {
            return Err(BatchError::Stream(format!(
                "can not read {}: stream is closed",
                self.lifecycle.name()
            )));
        }

        self.lifecycle.touch();
        let index = self.index.get();
        match self.items.get(index) {
            Some(item) => {
                self.index.set(index + 1);
                Ok(Some(item.clone()))
            }
            None => Ok(None),
        }
    }
}

impl<T> ItemStream for ListItemReader<T> {
    fn open(&self) -> Result<(), BatchError> {
        let reopening = self.lifecycle.state() == StreamState::Closed;
        self.lifecycle.open()?;
        if reopening {
            self.index.set(0);
        }
        Ok(())
    }

    fn close(&self) -> Result<(), BatchError> {
        self.lifecycle.close()
    }

    fn get_execution_context(&self) -> Result<ExecutionContext, BatchError> {
        self.lifecycle.check_open("checkpoint")?;
        let mut context = ExecutionContext::new();
        context.put(&self.lifecycle.key(READ_COUNT), self.index.get() as i64)?;
        Ok(context)
    }

    fn restore_from(&self, context: &ExecutionContext) -> Result<(), BatchError> {
        self.lifecycle.begin_restore()?;

        let read_count = context.get_int_or(&self.lifecycle.key(READ_COUNT), 0)?;
        if read_count < 0 || read_count as usize > self.items.len() {
            return Err(BatchError::Stream(format!(
                "can not restore {} at item {}: list holds {} items",
                self.lifecycle.name(),
                read_count,
                self.items.len()
            )));
        }
        self.index.set(read_count as usize);
        Ok(())
    }
}

/// Writer collecting items in memory.
///
/// Written items stay pending until [`flush`](ItemWriter::flush), which the
/// step calls when a chunk commits. A failed chunk is rolled back, so its
/// items never show up in [`written_items`](ListItemWriter::written_items).
#[derive(Debug, Default)]
pub struct ListItemWriter<T> {
    pending: RefCell<Vec<T>>,
    written: RefCell<Vec<T>>,
}

impl<T: Clone> ListItemWriter<T> {
    pub fn new() -> Self {
        Self {
            pending: RefCell::new(Vec::new()),
            written: RefCell::new(Vec::new()),
        }
    }

    /// Items of every committed chunk, in write order.
    pub fn written_items(&self) -> Vec<T> {
        self.written.borrow().clone()
    }

    /// Drops the items written since the last flush.
    pub fn discard_pending(&self) {
        self.pending.borrow_mut().clear();
    }
}

impl<T: Clone> ItemWriter<T> for ListItemWriter<T> {
    fn write(&self, item: &T) -> ItemWriterResult {
        self.pending.borrow_mut().push(item.clone());
        Ok(())
    }

    fn flush(&self) -> ItemWriterResult {
        let mut pending = self.pending.borrow_mut();
        self.written.borrow_mut().append(&mut pending);
        Ok(())
    }

    fn rollback(&self) -> ItemWriterResult {
        self.discard_pending();
        Ok(())
    }
}
