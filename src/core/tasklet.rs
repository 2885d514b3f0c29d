use log::{debug, info};

use crate::BatchError;

use super::{
    contribution::StepContribution,
    exception::{DefaultExceptionHandler, ExceptionHandler, RepeatContext},
    repository::JobRepository,
    step::{Step, StepExecution, StepStatus, StopSignal, commit, end_step, open_step},
    stream::ItemStream,
};

/// Tells a [`TaskletStep`] whether to call its tasklet again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatStatus {
    /// The tasklet can continue to execute.
    Continuable,
    /// The tasklet has finished executing.
    Finished,
}

/// A unit of work that is not read/process/write shaped.
///
/// Each call is one committed unit: the counters recorded on `contribution`
/// are folded into the step when the call returns successfully.
pub trait Tasklet {
    fn execute(&self, contribution: &mut StepContribution) -> Result<RepeatStatus, BatchError>;
}

/// Step calling a [`Tasklet`] until it reports [`RepeatStatus::Finished`].
///
/// Failures go through the exception handler like item failures of a chunk
/// oriented step: an absorbed failure counts as a skip and the tasklet is
/// called again. The stop signal is observed between two calls.
pub struct TaskletStep<'a> {
    name: String,
    tasklet: &'a dyn Tasklet,
    streams: Vec<&'a dyn ItemStream>,
    exception_handler: Box<dyn ExceptionHandler + 'a>,
    stop_signal: StopSignal,
}

impl Step for TaskletStep<'_> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        step_execution: &mut StepExecution,
        repository: &dyn JobRepository,
    ) -> Result<(), BatchError> {
        step_execution.start()?;

        let result = match open_step(step_execution, &self.streams, repository) {
            Ok(()) => self.repeat(step_execution, repository),
            Err(error) => Err(error),
        };

        end_step(step_execution, result, &self.streams, repository)
    }
}

impl TaskletStep<'_> {
    fn repeat(
        &self,
        step_execution: &mut StepExecution,
        repository: &dyn JobRepository,
    ) -> Result<(), BatchError> {
        let mut repeat_context = RepeatContext::resuming(step_execution.skip_count());

        loop {
            if self.stop_signal.is_stop_requested() {
                info!("Stop requested, stopping step: {}", self.name);
                self.stop_signal.reset();
                step_execution.set_status(StepStatus::Stopped);
                return Ok(());
            }

            let mut contribution = step_execution.create_contribution();
            let status = match self.tasklet.execute(&mut contribution) {
                Ok(status) => status,
                Err(error) => {
                    self.exception_handler
                        .handle_exception(&mut repeat_context, error)?;
                    contribution.increment_skip_count();
                    RepeatStatus::Continuable
                }
            };

            commit(step_execution, contribution, &self.streams, repository)?;
            debug!("Tasklet of step {} returned {:?}", self.name, status);

            if status == RepeatStatus::Finished {
                step_execution.set_status(StepStatus::Completed);
                return Ok(());
            }
        }
    }
}

pub struct TaskletStepBuilder<'a> {
    name: String,
    tasklet: Option<&'a dyn Tasklet>,
    streams: Vec<&'a dyn ItemStream>,
    exception_handler: Box<dyn ExceptionHandler + 'a>,
    stop_signal: StopSignal,
}

impl<'a> TaskletStepBuilder<'a> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tasklet: None,
            streams: Vec::new(),
            exception_handler: Box::new(DefaultExceptionHandler),
            stop_signal: StopSignal::new(),
        }
    }

    pub fn tasklet(mut self, tasklet: &'a dyn Tasklet) -> Self {
        self.tasklet = Some(tasklet);
        self
    }

    pub fn stream(mut self, stream: &'a dyn ItemStream) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn exception_handler(mut self, exception_handler: impl ExceptionHandler + 'a) -> Self {
        self.exception_handler = Box::new(exception_handler);
        self
    }

    pub fn stop_signal(mut self, stop_signal: StopSignal) -> Self {
        self.stop_signal = stop_signal;
        self
    }

    pub fn build(self) -> Result<TaskletStep<'a>, BatchError> {
        Ok(TaskletStep {
            name: self.name,
            tasklet: self.tasklet.ok_or_else(|| {
                BatchError::InvalidArgument("Tasklet is required for building a step".to_string())
            })?,
            streams: self.streams,
            exception_handler: self.exception_handler,
            stop_signal: self.stop_signal,
        })
    }
}
