//! Skip / escalate policies applied to failures raised while processing items.
//!
//! An [`ExceptionHandler`] receives each failure together with the
//! [`RepeatContext`] of the running step. Returning `Ok(())` absorbs the
//! failure: the step records a skip and moves on. Returning an error escalates
//! it and the step fails with that error.

use std::collections::HashMap;

use log::{debug, error, warn};

use crate::BatchError;

/// Counters shared by the exception handler across the chunks of one step
/// execution.
///
/// The step driver owns it and passes it down explicitly.
#[derive(Debug, Default, Clone)]
pub struct RepeatContext {
    counters: HashMap<String, usize>,
    previous_skip_count: usize,
}

impl RepeatContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context of a restarted execution that already skipped
    /// `previous_skip_count` items in earlier attempts.
    pub fn resuming(previous_skip_count: usize) -> Self {
        Self {
            counters: HashMap::new(),
            previous_skip_count,
        }
    }

    pub fn previous_skip_count(&self) -> usize {
        self.previous_skip_count
    }

    /// Increments the counter named `key` and returns its new value.
    pub fn increment(&mut self, key: &str) -> usize {
        let counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn count(&self, key: &str) -> usize {
        self.counters.get(key).copied().unwrap_or(0)
    }
}

pub trait ExceptionHandler {
    /// Decides the fate of `error`.
    ///
    /// # Returns
    /// - `Ok(())`: the failure is absorbed and the item counts as skipped
    /// - `Err(error)`: the step must abort; wrapping errors keep the original
    ///   as their source
    fn handle_exception(&self, context: &mut RepeatContext, error: BatchError) -> Result<(), BatchError>;
}

/// Rethrows every failure.
///
/// Recoverable failures come back unchanged, `Error`-class failures
/// ([`BatchError::Fatal`]) are wrapped into [`BatchError::Escalated`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExceptionHandler;

impl DefaultExceptionHandler {
    const NAME: &'static str = "DefaultExceptionHandler";
}

impl ExceptionHandler for DefaultExceptionHandler {
    fn handle_exception(&self, _context: &mut RepeatContext, error: BatchError) -> Result<(), BatchError> {
        if error.is_fatal() {
            error!("Fatal error, aborting step: {}", error);
            return Err(BatchError::Escalated {
                handler: Self::NAME,
                source: Box::new(error),
            });
        }
        Err(error)
    }
}

/// Absorbs recoverable failures until their number exceeds `limit`.
///
/// The running count is kept in the [`RepeatContext`] so that it spans all the
/// chunks of the step, and starts from the skips committed by earlier attempts
/// of a restarted execution. A limit of `n` tolerates `n` failures over all
/// attempts; the next one is
/// raised as [`BatchError::SkipLimitExceeded`]. Non recoverable failures are
/// rethrown as is, fatal ones wrapped.
#[derive(Debug, Clone, Copy)]
pub struct SimpleLimitExceptionHandler {
    limit: usize,
}

impl SimpleLimitExceptionHandler {
    const COUNT_KEY: &'static str = "SimpleLimitExceptionHandler.count";

    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl ExceptionHandler for SimpleLimitExceptionHandler {
    fn handle_exception(&self, context: &mut RepeatContext, error: BatchError) -> Result<(), BatchError> {
        if error.is_fatal() {
            return DefaultExceptionHandler.handle_exception(context, error);
        }
        if !error.is_recoverable() {
            return Err(error);
        }

        let count = context.increment(Self::COUNT_KEY) + context.previous_skip_count();
        if count > self.limit {
            error!("Skip limit of {} reached with: {}", self.limit, error);
            return Err(BatchError::SkipLimitExceeded {
                limit: self.limit,
                source: Box::new(error),
            });
        }

        warn!("Skipping item ({}/{}): {}", count, self.limit, error);
        Ok(())
    }
}

/// What [`LogOrRethrowExceptionHandler`] does with a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Log at debug level and absorb.
    Debug,
    /// Log at warn level and absorb.
    Warn,
    Rethrow,
}

type Classifier = Box<dyn Fn(&BatchError) -> HandlerAction + Send + Sync>;

/// Logs or rethrows each failure according to a classifier.
///
/// The default classifier rethrows everything except recoverable item
/// failures, which are logged as warnings. Fatal failures are always
/// escalated, whatever the classifier answers.
pub struct LogOrRethrowExceptionHandler {
    classifier: Classifier,
}

impl LogOrRethrowExceptionHandler {
    pub fn new() -> Self {
        Self::with_classifier(|error| {
            if error.is_recoverable() {
                HandlerAction::Warn
            } else {
                HandlerAction::Rethrow
            }
        })
    }

    pub fn with_classifier<F>(classifier: F) -> Self
    where
        F: Fn(&BatchError) -> HandlerAction + Send + Sync + 'static,
    {
        Self {
            classifier: Box::new(classifier),
        }
    }
}

impl Default for LogOrRethrowExceptionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionHandler for LogOrRethrowExceptionHandler {
    fn handle_exception(&self, context: &mut RepeatContext, error: BatchError) -> Result<(), BatchError> {
        if error.is_fatal() {
            return DefaultExceptionHandler.handle_exception(context, error);
        }

        match (self.classifier)(&error) {
            HandlerAction::Debug => {
                context.increment(error.kind());
                debug!("Ignoring error: {}", error);
                Ok(())
            }
            HandlerAction::Warn => {
                context.increment(error.kind());
                warn!("Ignoring error: {}", error);
                Ok(())
            }
            HandlerAction::Rethrow => Err(error),
        }
    }
}
