use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    chunk::{ChunkStatus, Chunker, ChunkingResult, ItemChunker},
    contribution::StepContribution,
    exception::{DefaultExceptionHandler, ExceptionHandler, RepeatContext, SimpleLimitExceptionHandler},
    execution_context::ExecutionContext,
    item::{ItemProcessor, ItemReader, ItemWriter},
    repository::{JobRepository, StepExecutionRecord},
    settings::StepSettings,
    stream::ItemStream,
    tasklet::{Tasklet, TaskletStepBuilder},
};

/// Status of a step execution.
///
/// `Ready → Running → {Completed, Failed, Stopped}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    Ready,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Stopped
        )
    }
}

/// Durable state of one attempt at running a step.
///
/// Counters only change through [`apply`](StepExecution::apply), which folds a
/// committed [`StepContribution`] into them.
#[derive(Debug, Clone)]
pub struct StepExecution {
    id: Uuid,
    job_name: String,
    name: String,
    status: StepStatus,
    start_time: Option<Instant>,
    end_time: Option<Instant>,
    item_count: usize,
    commit_count: usize,
    skip_count: usize,
    failure: Option<String>,
    execution_context: ExecutionContext,
}

impl StepExecution {
    pub fn new(job_name: &str, name: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.to_string(),
            name: name.to_string(),
            status: StepStatus::Ready,
            start_time: None,
            end_time: None,
            item_count: 0,
            commit_count: 0,
            skip_count: 0,
            failure: None,
            execution_context: ExecutionContext::new(),
        }
    }

    /// Creates the execution resuming a failed or stopped one.
    ///
    /// The new execution gets its own id but carries over the counters and
    /// the execution context of the last commit.
    pub fn restart(record: &StepExecutionRecord) -> Result<Self, BatchError> {
        if record.status == StepStatus::Completed {
            return Err(BatchError::InvalidState(format!(
                "step {} of job {} is already completed",
                record.step_name, record.job_name
            )));
        }

        let mut step_execution = Self::new(&record.job_name, &record.step_name);
        step_execution.item_count = record.item_count;
        step_execution.commit_count = record.commit_count;
        step_execution.skip_count = record.skip_count;
        step_execution.execution_context = ExecutionContext::from_json(&record.execution_context)?;
        Ok(step_execution)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn commit_count(&self) -> usize {
        self.commit_count
    }

    pub fn skip_count(&self) -> usize {
        self.skip_count
    }

    /// Description of the error that failed the execution, cause chain included.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        &self.execution_context
    }

    pub fn duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    /// Opens a contribution for the next chunk.
    pub fn create_contribution(&self) -> StepContribution {
        StepContribution::new(self.skip_count)
    }

    /// Folds a committed contribution into the step counters.
    pub fn apply(&mut self, contribution: StepContribution) {
        self.item_count += contribution.item_count();
        self.commit_count += contribution.commit_count();
        self.skip_count += contribution.contribution_skip_count();
    }

    pub fn to_record(&self) -> Result<StepExecutionRecord, BatchError> {
        Ok(StepExecutionRecord {
            id: self.id,
            job_name: self.job_name.clone(),
            step_name: self.name.clone(),
            status: self.status,
            item_count: self.item_count,
            commit_count: self.commit_count,
            skip_count: self.skip_count,
            failure: self.failure.clone(),
            execution_context: self.execution_context.to_json()?,
        })
    }

    pub(crate) fn set_status(&mut self, status: StepStatus) {
        self.status = status;
    }

    pub(crate) fn start(&mut self) -> Result<(), BatchError> {
        if self.status != StepStatus::Ready {
            return Err(BatchError::InvalidState(format!(
                "step execution {} can not start from {:?}",
                self.id, self.status
            )));
        }
        self.status = StepStatus::Running;
        self.start_time = Some(Instant::now());
        Ok(())
    }
}

/// Cooperative stop request shared between a running step and its controller.
///
/// A step only looks at the signal between two chunks, so stopping never
/// interrupts a chunk in flight. The step resets the signal when it honors
/// the request, so a restart of the stopped execution runs normally.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the step to stop before its next chunk. A request made before the
    /// step starts is honored right away.
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }
}

pub trait Step {
    fn get_name(&self) -> &str;

    /// Executes the step.
    ///
    /// Progress is persisted through `repository` at start, at every commit
    /// and at the end of the execution.
    ///
    /// # Returns
    /// - `Ok(())`: the step completed or was stopped, see `step_execution.status()`
    /// - `Err(BatchError)`: the step failed; the error keeps its cause chain
    ///   and `step_execution` holds the counters of the last commit
    fn execute(
        &self,
        step_execution: &mut StepExecution,
        repository: &dyn JobRepository,
    ) -> Result<(), BatchError>;
}

/// Persists the running execution, then opens and restores the streams.
pub(crate) fn open_step(
    step_execution: &StepExecution,
    streams: &[&dyn ItemStream],
    repository: &dyn JobRepository,
) -> Result<(), BatchError> {
    info!(
        "Start of step: {}, id: {}",
        step_execution.name, step_execution.id
    );

    repository.save(&step_execution.to_record()?)?;

    for stream in streams {
        stream.open()?;
        stream.restore_from(&step_execution.execution_context)?;
    }
    Ok(())
}

/// Commit boundary: checkpoints every stream, folds the contribution and
/// persists the result.
///
/// `step_execution` is only updated once the repository accepted the new
/// state, so a failure leaves it at the previous commit.
pub(crate) fn commit(
    step_execution: &mut StepExecution,
    mut contribution: StepContribution,
    streams: &[&dyn ItemStream],
    repository: &dyn JobRepository,
) -> Result<(), BatchError> {
    contribution.increment_commit_count();

    let mut committed = step_execution.clone();
    for stream in streams {
        committed
            .execution_context
            .put_all(&stream.get_execution_context()?);
    }
    committed.apply(contribution);

    repository.save(&committed.to_record()?)?;
    committed.execution_context.clear_dirty_flag();

    debug!(
        "Chunk committed: items={}, commits={}, skips={}",
        committed.item_count, committed.commit_count, committed.skip_count
    );

    *step_execution = committed;
    Ok(())
}

/// Closes the streams and persists the final state of the execution.
pub(crate) fn end_step(
    step_execution: &mut StepExecution,
    result: Result<(), BatchError>,
    streams: &[&dyn ItemStream],
    repository: &dyn JobRepository,
) -> Result<(), BatchError> {
    let result = match result {
        Ok(()) => close_streams(streams),
        Err(error) => {
            for stream in streams {
                if let Err(close_error) = stream.close() {
                    warn!("Non-fatal error: {}", close_error);
                }
            }
            Err(error)
        }
    };

    step_execution.end_time = Some(Instant::now());

    match result {
        Ok(()) => {
            repository.save(&step_execution.to_record()?)?;
            info!(
                "End of step: {}, id: {}, status: {:?}",
                step_execution.name, step_execution.id, step_execution.status
            );
            Ok(())
        }
        Err(error) => {
            step_execution.status = StepStatus::Failed;
            step_execution.failure = Some(error.to_string());
            error!(
                "Step {} failed after {} commits: {}",
                step_execution.name, step_execution.commit_count, error
            );
            match step_execution.to_record() {
                Ok(record) => {
                    if let Err(save_error) = repository.save(&record) {
                        error!("Unable to persist failed step execution: {}", save_error);
                    }
                }
                Err(record_error) => error!("Unable to persist failed step execution: {}", record_error),
            }
            Err(error)
        }
    }
}

fn close_streams(streams: &[&dyn ItemStream]) -> Result<(), BatchError> {
    let mut result = Ok(());
    for stream in streams {
        if let Err(error) = stream.close() {
            if result.is_ok() {
                result = Err(error);
            } else {
                warn!("Non-fatal error: {}", error);
            }
        }
    }
    result
}

/// Step reading, processing and writing items chunk by chunk.
///
/// Each chunk is read in full, then every item is processed and written;
/// per-item failures go through the exception handler. A chunk commits by
/// flushing the writer and persisting the counters together with the
/// execution context of every registered stream, so that a restart resumes
/// right after the last committed item.
pub struct ChunkOrientedStep<'a, I, O> {
    name: String,
    reader: &'a dyn ItemReader<I>,
    processor: &'a dyn ItemProcessor<I, O>,
    writer: &'a dyn ItemWriter<O>,
    streams: Vec<&'a dyn ItemStream>,
    chunk_size: usize,
    exception_handler: Box<dyn ExceptionHandler + 'a>,
    stop_signal: StopSignal,
}

impl<I, O> Step for ChunkOrientedStep<'_, I, O> {
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
            Ok(()) => self.run_chunks(step_execution, repository),
            Err(error) => Err(error),
        };

        end_step(step_execution, result, &self.streams, repository)
    }
}

impl<I, O> ChunkOrientedStep<'_, I, O> {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop_signal
    }

    fn run_chunks(
        &self,
        step_execution: &mut StepExecution,
        repository: &dyn JobRepository,
    ) -> Result<(), BatchError> {
        let chunker = ItemChunker::new(self.reader);
        let mut repeat_context = RepeatContext::resuming(step_execution.skip_count());

        loop {
            if self.stop_signal.is_stop_requested() {
                info!("Stop requested, stopping step: {}", self.name);
                self.stop_signal.reset();
                step_execution.status = StepStatus::Stopped;
                return Ok(());
            }

            let mut contribution = step_execution.create_contribution();
            let chunk = chunker.chunk(self.chunk_size, &mut contribution)?;

            if chunk.is_empty() {
                step_execution.status = StepStatus::Completed;
                return Ok(());
            }

            let status = chunk.status();
            let committed = self
                .process_chunk(chunk, &mut contribution, &mut repeat_context)
                .and_then(|()| self.writer.flush())
                .and_then(|()| commit(step_execution, contribution, &self.streams, repository));

            if let Err(error) = committed {
                if let Err(rollback_error) = self.writer.rollback() {
                    warn!("Non-fatal error: {}", rollback_error);
                }
                return Err(error);
            }

            if status == ChunkStatus::Finished {
                step_execution.status = StepStatus::Completed;
                return Ok(());
            }
        }
    }

    fn process_chunk(
        &self,
        chunk: ChunkingResult<I>,
        contribution: &mut StepContribution,
        repeat_context: &mut RepeatContext,
    ) -> Result<(), BatchError> {
        debug!("Processing chunk of {} items", chunk.len());

        for item in chunk.items() {
            if let Err(error) = self.process_item(item) {
                self.exception_handler
                    .handle_exception(repeat_context, error)?;
                contribution.increment_skip_count();
            }
        }
        Ok(())
    }

    fn process_item(&self, item: &I) -> Result<(), BatchError> {
        let processed = self.processor.process(item)?;
        self.writer.write(&processed)
    }
}

/// Entry point of the step builders.
///
/// # Example
///
/// ```
/// use spring_batch_core::core::{
///     item::DefaultProcessor,
///     repository::InMemoryJobRepository,
///     step::{Step, StepBuilder, StepExecution, StepStatus},
/// };
/// use spring_batch_core::item::list::{ListItemReader, ListItemWriter};
///
/// let reader = ListItemReader::new(vec![1, 2, 3, 4, 5]);
/// let writer = ListItemWriter::new();
///
/// let step = StepBuilder::new("numbers")
///     .chunk::<i32, i32>(2)
///     .reader(&reader)
///     .processor(&DefaultProcessor)
///     .writer(&writer)
///     .stream(&reader)
///     .build()
///     .unwrap();
///
/// let repository = InMemoryJobRepository::new();
/// let mut execution = StepExecution::new("job", step.get_name());
/// step.execute(&mut execution, &repository).unwrap();
///
/// assert_eq!(execution.status(), StepStatus::Completed);
/// assert_eq!(execution.commit_count(), 3);
/// assert_eq!(writer.written_items(), vec![1, 2, 3, 4, 5]);
/// ```
pub struct StepBuilder {
    name: String,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// Step named with a random identifier.
    pub fn unnamed() -> Self {
        Self { name: build_name() }
    }

    pub fn tasklet<'a>(self, tasklet: &'a dyn Tasklet) -> TaskletStepBuilder<'a> {
        TaskletStepBuilder::new(&self.name).tasklet(tasklet)
    }

    pub fn chunk<'a, I, O>(self, chunk_size: usize) -> ChunkOrientedStepBuilder<'a, I, O> {
        ChunkOrientedStepBuilder::new(&self.name).chunk_size(chunk_size)
    }
}

pub struct ChunkOrientedStepBuilder<'a, I, O> {
    name: String,
    reader: Option<&'a dyn ItemReader<I>>,
    processor: Option<&'a dyn ItemProcessor<I, O>>,
    writer: Option<&'a dyn ItemWriter<O>>,
    streams: Vec<&'a dyn ItemStream>,
    chunk_size: usize,
    exception_handler: Box<dyn ExceptionHandler + 'a>,
    stop_signal: StopSignal,
}

impl<'a, I, O> ChunkOrientedStepBuilder<'a, I, O> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reader: None,
            processor: None,
            writer: None,
            streams: Vec::new(),
            chunk_size: 10,
            exception_handler: Box::new(DefaultExceptionHandler),
            stop_signal: StopSignal::new(),
        }
    }

    pub fn reader(mut self, reader: &'a dyn ItemReader<I>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a dyn ItemProcessor<I, O>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: &'a dyn ItemWriter<O>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Registers a stream whose context is checkpointed at every commit.
    pub fn stream(mut self, stream: &'a dyn ItemStream) -> Self {
        self.streams.push(stream);
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Tolerates up to `skip_limit` failed items.
    pub fn skip_limit(self, skip_limit: usize) -> Self {
        self.exception_handler(SimpleLimitExceptionHandler::new(skip_limit))
    }

    pub fn exception_handler(mut self, exception_handler: impl ExceptionHandler + 'a) -> Self {
        self.exception_handler = Box::new(exception_handler);
        self
    }

    pub fn stop_signal(mut self, stop_signal: StopSignal) -> Self {
        self.stop_signal = stop_signal;
        self
    }

    pub fn settings(self, settings: &StepSettings) -> Self {
        let builder = self.chunk_size(settings.chunk_size);
        match settings.skip_limit {
            Some(skip_limit) => builder.skip_limit(skip_limit),
            None => builder,
        }
    }

    pub fn build(self) -> Result<ChunkOrientedStep<'a, I, O>, BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::InvalidArgument(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        Ok(ChunkOrientedStep {
            name: self.name,
            reader: self.reader.ok_or_else(|| missing("reader"))?,
            processor: self.processor.ok_or_else(|| missing("processor"))?,
            writer: self.writer.ok_or_else(|| missing("writer"))?,
            streams: self.streams,
            chunk_size: self.chunk_size,
            exception_handler: self.exception_handler,
            stop_signal: self.stop_signal,
        })
    }
}

fn missing(component: &str) -> BatchError {
    BatchError::InvalidArgument(format!("{} is required for building a step", component))
}
