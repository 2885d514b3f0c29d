use std::cell::Cell;

use crate::BatchError;

use super::execution_context::ExecutionContext;

/// Lifecycle and checkpoint contract of restartable readers and writers.
///
/// A stream moves from [`StreamState::Unopened`] to [`StreamState::Open`] on
/// [`open`](ItemStream::open) and to [`StreamState::Closed`] on
/// [`close`](ItemStream::close). Calling `open` again after `close` starts a
/// new lifecycle; any other call on a closed stream fails with
/// `BatchError::Stream`.
///
/// The step driver calls [`get_execution_context`](ItemStream::get_execution_context)
/// at every commit and hands the persisted result back through
/// [`restore_from`](ItemStream::restore_from) when the step is restarted.
pub trait ItemStream {
    /// Acquires the underlying resource (file handle, cursor...).
    fn open(&self) -> Result<(), BatchError>;

    /// Releases the underlying resource.
    fn close(&self) -> Result<(), BatchError>;

    /// Captures the current position of the stream.
    ///
    /// Keys should be prefixed with the stream name so that the contexts of
    /// several streams can be merged into the step's context.
    fn get_execution_context(&self) -> Result<ExecutionContext, BatchError>;

    /// Repositions the stream exactly where a previous
    /// [`get_execution_context`](ItemStream::get_execution_context) left it.
    ///
    /// Called at most once per lifecycle, before or right after `open`. An
    /// empty context leaves the stream at its natural beginning.
    fn restore_from(&self, context: &ExecutionContext) -> Result<(), BatchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unopened,
    Open,
    Closed,
}

/// State machine shared by the `ItemStream` implementations of this crate.
///
/// It only tracks transitions; each implementation keeps its own cursor.
#[derive(Debug)]
pub struct StreamLifecycle {
    name: String,
    state: Cell<StreamState>,
    restored: Cell<bool>,
    touched: Cell<bool>,
}

impl StreamLifecycle {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Cell::new(StreamState::Unopened),
            restored: Cell::new(false),
            touched: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StreamState {
        self.state.get()
    }

    /// Builds the context key `<name>.<suffix>`.
    pub fn key(&self, suffix: &str) -> String {
        format!("{}.{}", self.name, suffix)
    }

    pub fn open(&self) -> Result<(), BatchError> {
        match self.state.get() {
            StreamState::Open => Err(BatchError::Stream(format!(
                "{} is already open",
                self.name
            ))),
            StreamState::Closed => {
                // a new lifecycle, restore is allowed again
                self.restored.set(false);
                self.touched.set(false);
                self.state.set(StreamState::Open);
                Ok(())
            }
            StreamState::Unopened => {
                self.state.set(StreamState::Open);
                Ok(())
            }
        }
    }

    pub fn close(&self) -> Result<(), BatchError> {
        self.check_open("close")?;
        self.state.set(StreamState::Closed);
        Ok(())
    }

    /// Fails unless the stream is open.
    pub fn check_open(&self, operation: &str) -> Result<(), BatchError> {
        match self.state.get() {
            StreamState::Open => Ok(()),
            state => Err(BatchError::Stream(format!(
                "can not {} {}: stream is {:?}",
                operation, self.name, state
            ))),
        }
    }

    /// Records that items have been read or written since `open`.
    pub fn touch(&self) {
        self.touched.set(true);
    }

    /// Validates a `restore_from` call.
    pub fn begin_restore(&self) -> Result<(), BatchError> {
        if self.state.get() == StreamState::Closed {
            return Err(BatchError::Stream(format!(
                "can not restore {}: stream is closed",
                self.name
            )));
        }
        if self.restored.get() {
            return Err(BatchError::Stream(format!(
                "{} has already been restored",
                self.name
            )));
        }
        if self.touched.get() {
            return Err(BatchError::Stream(format!(
                "can not restore {} once items have been processed",
                self.name
            )));
        }
        self.restored.set(true);
        Ok(())
    }
}
