/// In-memory reader and writer, restartable through the reader's checkpoint.
pub mod list;

#[cfg(feature = "logger")]
/// This module provides a logger item writer, useful to debug a step.
pub mod logger;

#[cfg(feature = "csv")]
/// This module provides restartable CSV item reader and writer implementations.
pub mod csv;
