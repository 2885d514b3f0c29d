use std::time::{Duration, Instant};

use log::info;
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    repository::JobRepository,
    step::{Step, StepExecution, StepStatus},
};

/// Type alias for job execution results.
///
/// A `JobResult` is a `Result` that contains either:
/// - A successful `JobExecution` with execution details
/// - A `BatchError` indicating what went wrong
type JobResult<T> = Result<T, BatchError>;

/// Represents a job that can be executed.
///
/// A job is a container for a sequence of steps that are executed in order
/// against one [`JobRepository`]. Running a job again with the same name
/// resumes it: steps whose last execution completed are skipped, a failed or
/// stopped step restarts from its last committed checkpoint.
pub trait Job {
    /// Runs the job and returns the result of the job execution.
    ///
    /// # Returns
    /// - `Ok(JobExecution)` when every step completed, or the job was stopped
    /// - `Err(BatchError::Step)` when a step failed, with the step error as source
    fn run(&self) -> JobResult<JobExecution>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// The batch job has successfully completed its execution.
    Completed,
    /// The batch job has been stopped by request.
    Stopped,
}

/// Represents the execution of a job.
#[derive(Debug)]
pub struct JobExecution {
    /// The time when the job started executing
    pub start: Instant,
    /// The time when the job finished executing
    pub end: Instant,
    /// The total duration of the job execution
    pub duration: Duration,
    pub status: BatchStatus,
    /// Executions of the steps run by this job, in order
    pub step_executions: Vec<StepExecution>,
}

/// Represents an instance of a job.
///
/// A job instance is created through the `JobBuilder` and executed by calling
/// the `run` method. The steps are executed in the order they were added.
pub struct JobInstance<'a> {
    /// Unique identifier for this job instance
    id: Uuid,
    /// Name under which step executions are persisted
    name: String,
    /// Collection of steps that make up this job, in execution order
    steps: Vec<&'a dyn Step>,
    repository: &'a dyn JobRepository,
}

impl JobInstance<'_> {
    pub fn get_name(&self) -> &str {
        &self.name
    }

    fn prepare_step_execution(&self, step: &dyn Step) -> JobResult<Option<StepExecution>> {
        let last = self
            .repository
            .get_last_step_execution(&self.name, step.get_name())?;

        match last {
            Some(record) if record.status == StepStatus::Completed => {
                info!("Step already completed, skipping: {}", step.get_name());
                Ok(None)
            }
            Some(record) => {
                info!(
                    "Restarting step: {} after {} items ({:?})",
                    step.get_name(),
                    record.item_count,
                    record.status
                );
                Ok(Some(StepExecution::restart(&record)?))
            }
            None => Ok(Some(StepExecution::new(&self.name, step.get_name()))),
        }
    }
}

impl Job for JobInstance<'_> {
    fn run(&self) -> JobResult<JobExecution> {
        let start = Instant::now();

        info!("Start of job: {}, id: {}", self.name, self.id);

        let mut status = BatchStatus::Completed;
        let mut step_executions = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let Some(mut step_execution) = self.prepare_step_execution(*step)? else {
                continue;
            };

            // If a step fails, abort the job and return an error
            if let Err(error) = step.execute(&mut step_execution, self.repository) {
                return Err(BatchError::Step {
                    name: step.get_name().to_owned(),
                    source: Box::new(error),
                });
            }

            let stopped = step_execution.status() == StepStatus::Stopped;
            step_executions.push(step_execution);

            if stopped {
                info!("Job stopped: {}, id: {}", self.name, self.id);
                status = BatchStatus::Stopped;
                break;
            }
        }

        info!("End of job: {}, id: {}", self.name, self.id);

        let end = Instant::now();
        Ok(JobExecution {
            start,
            end,
            duration: end - start,
            status,
            step_executions,
        })
    }
}

/// Builder for creating a job instance.
///
/// # Example
///
/// ```
/// use spring_batch_core::core::{
///     item::DefaultProcessor,
///     job::{BatchStatus, Job, JobBuilder},
///     repository::InMemoryJobRepository,
///     step::StepBuilder,
/// };
/// use spring_batch_core::item::list::{ListItemReader, ListItemWriter};
///
/// let reader = ListItemReader::new(vec!["a", "b", "c"]);
/// let writer = ListItemWriter::new();
/// let step = StepBuilder::new("copy")
///     .chunk::<&str, &str>(2)
///     .reader(&reader)
///     .processor(&DefaultProcessor)
///     .writer(&writer)
///     .build()
///     .unwrap();
///
/// let repository = InMemoryJobRepository::new();
/// let job = JobBuilder::new()
///     .name("import".to_string())
///     .repository(&repository)
///     .start(&step)
///     .build()
///     .unwrap();
///
/// let execution = job.run().unwrap();
/// assert_eq!(execution.status, BatchStatus::Completed);
/// ```
#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    /// Collection of steps to be executed, in order
    steps: Vec<&'a dyn Step>,
    repository: Option<&'a dyn JobRepository>,
}

impl<'a> JobBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: None,
            steps: Vec::new(),
            repository: None,
        }
    }

    /// Sets the name of the job.
    ///
    /// The name identifies the job in the repository; a restart must use the
    /// same name.
    pub fn name(mut self, name: String) -> JobBuilder<'a> {
        self.name = Some(name);
        self
    }

    pub fn repository(mut self, repository: &'a dyn JobRepository) -> JobBuilder<'a> {
        self.repository = Some(repository);
        self
    }

    /// Sets the first step of the job.
    pub fn start(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    /// Adds a step to the job. Steps are executed in the order they are added.
    pub fn next(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> JobResult<JobInstance<'a>> {
        Ok(JobInstance {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            steps: self.steps,
            repository: self.repository.ok_or_else(|| {
                BatchError::InvalidArgument("JobRepository is required for building a job".to_string())
            })?,
        })
    }
}
