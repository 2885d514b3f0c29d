mod common;

use std::{
    cell::Cell,
    sync::atomic::{AtomicUsize, Ordering},
};

use common::{MockReader, MockRepository, MockWriter, init_logger};

use spring_batch_core::{
    BatchError,
    core::{
        contribution::StepContribution,
        item::{DefaultProcessor, ItemProcessor, ItemProcessorResult},
        job::{BatchStatus, Job, JobBuilder},
        repository::{InMemoryJobRepository, JobRepository},
        step::{Step, StepBuilder, StepExecution, StepStatus, StopSignal},
        tasklet::{RepeatStatus, Tasklet},
    },
    item::list::{ListItemReader, ListItemWriter},
};

/// Rejects the items of `failing`, at most `failures` times in total.
struct FlakyProcessor {
    failing: Vec<u32>,
    failures: Cell<usize>,
}

impl ItemProcessor<u32, u32> for FlakyProcessor {
    fn process(&self, item: &u32) -> ItemProcessorResult<u32> {
        if self.failing.contains(item) && self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(BatchError::ItemProcessor(format!("bad item {}", item)));
        }
        Ok(*item)
    }
}

/// Requests a stop the first time it sees `stop_at`.
struct StoppingProcessor {
    signal: StopSignal,
    stop_at: u32,
    stopped: Cell<bool>,
}

impl ItemProcessor<u32, u32> for StoppingProcessor {
    fn process(&self, item: &u32) -> ItemProcessorResult<u32> {
        if *item == self.stop_at && !self.stopped.get() {
            self.stopped.set(true);
            self.signal.request_stop();
        }
        Ok(*item)
    }
}

struct CountdownTasklet {
    remaining: Cell<usize>,
}

impl Tasklet for CountdownTasklet {
    fn execute(&self, contribution: &mut StepContribution) -> Result<RepeatStatus, BatchError> {
        contribution.increment_item_count();
        self.remaining.set(self.remaining.get() - 1);
        if self.remaining.get() == 0 {
            Ok(RepeatStatus::Finished)
        } else {
            Ok(RepeatStatus::Continuable)
        }
    }
}

#[test]
fn writer_failure_should_leave_the_last_commit_persisted() -> Result<(), BatchError> {
    init_logger();

    let reader = ListItemReader::new((1..=8).collect::<Vec<u32>>());
    let mut writer = MockWriter::new();
    writer.expect_write().times(6).returning(|item| {
        if *item == 6 {
            Err(BatchError::ItemWriter("disk full".to_string()))
        } else {
            Ok(())
        }
    });
    writer.expect_flush().times(2).returning(|| Ok(()));
    writer.expect_rollback().times(1).returning(|| Ok(()));

    let step = StepBuilder::new("load")
        .chunk::<u32, u32>(2)
        .reader(&reader)
        .processor(&DefaultProcessor)
        .writer(&writer)
        .stream(&reader)
        .build()?;

    let repository = InMemoryJobRepository::new();
    let mut execution = StepExecution::new("mocked", "load");
    let result = step.execute(&mut execution, &repository);

    assert!(matches!(result, Err(BatchError::ItemWriter(message)) if message == "disk full"));
    assert_eq!(execution.status(), StepStatus::Failed);
    assert_eq!(execution.commit_count(), 2);
    assert_eq!(execution.item_count(), 4);

    let record = repository
        .get_last_step_execution("mocked", "load")?
        .expect("a record must have been saved");
    assert_eq!(record.status, StepStatus::Failed);
    assert_eq!(record.commit_count, 2);
    assert!(record.execution_context.contains("\"ListItemReader.read.count\""));
    Ok(())
}

#[test]
fn read_failure_should_fail_the_step_even_with_a_skip_limit() -> Result<(), BatchError> {
    init_logger();

    let calls = AtomicUsize::new(0);
    let mut reader = MockReader::new();
    reader.expect_read().times(3).returning(move || {
        match calls.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(Some(1)),
            1 => Ok(Some(2)),
            _ => Err(BatchError::ItemReader("corrupted input".to_string())),
        }
    });
    let writer = ListItemWriter::new();

    let step = StepBuilder::new("read")
        .chunk::<u32, u32>(2)
        .reader(&reader)
        .processor(&DefaultProcessor)
        .writer(&writer)
        .skip_limit(10)
        .build()?;

    let repository = InMemoryJobRepository::new();
    let mut execution = StepExecution::new("mocked", "read");
    let result = step.execute(&mut execution, &repository);

    assert!(matches!(result, Err(BatchError::ItemReader(_))));
    assert_eq!(execution.status(), StepStatus::Failed);
    assert_eq!(execution.commit_count(), 1);
    assert_eq!(execution.skip_count(), 0);
    assert_eq!(writer.written_items(), vec![1, 2]);
    Ok(())
}

#[test]
fn repository_failure_at_commit_should_not_apply_the_chunk() -> Result<(), BatchError> {
    init_logger();

    let saves = AtomicUsize::new(0);
    let mut repository = MockRepository::new();
    // start, first commit, failing second commit, failed end of step
    repository.expect_save().times(4).returning(move |_| {
        if saves.fetch_add(1, Ordering::SeqCst) == 2 {
            Err(BatchError::Repository("connection lost".to_string()))
        } else {
            Ok(())
        }
    });

    let reader = ListItemReader::new(vec![1_u32, 2, 3, 4, 5]);
    let writer = ListItemWriter::new();
    let step = StepBuilder::new("persist")
        .chunk::<u32, u32>(2)
        .reader(&reader)
        .processor(&DefaultProcessor)
        .writer(&writer)
        .stream(&reader)
        .build()?;

    let mut execution = StepExecution::new("mocked", "persist");
    let result = step.execute(&mut execution, &repository);

    assert!(matches!(result, Err(BatchError::Repository(_))));
    assert_eq!(execution.status(), StepStatus::Failed);
    assert_eq!(execution.commit_count(), 1);
    assert_eq!(execution.item_count(), 2);
    assert_eq!(execution.execution_context().get_int("ListItemReader.read.count")?, 2);
    Ok(())
}

#[test]
fn stopped_job_should_resume_after_the_last_commit() -> Result<(), BatchError> {
    init_logger();

    let signal = StopSignal::new();
    let reader = ListItemReader::new((1..=6).collect::<Vec<u32>>());
    let processor = StoppingProcessor {
        signal: signal.clone(),
        stop_at: 3,
        stopped: Cell::new(false),
    };
    let writer = ListItemWriter::new();
    let step = StepBuilder::new("numbers")
        .chunk::<u32, u32>(2)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .stream(&reader)
        .stop_signal(signal.clone())
        .build()?;

    let tasklet = CountdownTasklet {
        remaining: Cell::new(3),
    };
    let cleanup = StepBuilder::new("cleanup").tasklet(&tasklet).build()?;

    let repository = InMemoryJobRepository::new();
    let job = JobBuilder::new()
        .name("stoppable".to_string())
        .repository(&repository)
        .start(&step)
        .next(&cleanup)
        .build()?;

    let execution = job.run()?;
    assert_eq!(execution.status, BatchStatus::Stopped);
    assert_eq!(execution.step_executions.len(), 1);
    assert_eq!(execution.step_executions[0].status(), StepStatus::Stopped);
    assert_eq!(writer.written_items(), vec![1, 2, 3, 4]);
    assert!(repository.get_last_step_execution("stoppable", "cleanup")?.is_none());

    assert!(!signal.is_stop_requested());
    let execution = job.run()?;
    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.step_executions.len(), 2);

    let resumed = &execution.step_executions[0];
    assert_eq!(resumed.status(), StepStatus::Completed);
    assert_eq!(resumed.item_count(), 6);
    assert_eq!(writer.written_items(), vec![1, 2, 3, 4, 5, 6]);

    let cleaned = &execution.step_executions[1];
    assert_eq!(cleaned.status(), StepStatus::Completed);
    assert_eq!(cleaned.commit_count(), 3);
    assert_eq!(cleaned.item_count(), 3);

    let records = repository.step_executions("stoppable", "numbers");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, StepStatus::Stopped);
    assert_ne!(records[0].id, records[1].id);
    Ok(())
}

#[test]
fn restart_should_not_write_items_of_the_failed_chunk_twice() -> Result<(), BatchError> {
    init_logger();

    let reader = ListItemReader::new((1..=6).collect::<Vec<u32>>());
    let processor = FlakyProcessor {
        failing: vec![6],
        failures: Cell::new(1),
    };
    let writer = ListItemWriter::new();
    let step = StepBuilder::new("numbers")
        .chunk::<u32, u32>(2)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .stream(&reader)
        .build()?;

    let repository = InMemoryJobRepository::new();
    let job = JobBuilder::new()
        .name("rollback".to_string())
        .repository(&repository)
        .start(&step)
        .build()?;

    assert!(matches!(job.run(), Err(BatchError::Step { .. })));
    assert_eq!(writer.written_items(), vec![1, 2, 3, 4]);

    let execution = job.run()?;
    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(writer.written_items(), vec![1, 2, 3, 4, 5, 6]);
    Ok(())
}

#[test]
fn skip_limit_should_span_restarts() -> Result<(), BatchError> {
    init_logger();

    let reader = ListItemReader::new((1..=4).collect::<Vec<u32>>());
    let processor = FlakyProcessor {
        failing: vec![1, 3],
        failures: Cell::new(usize::MAX),
    };
    let writer = ListItemWriter::new();
    let step = StepBuilder::new("limited")
        .chunk::<u32, u32>(2)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .stream(&reader)
        .skip_limit(1)
        .build()?;

    let repository = InMemoryJobRepository::new();
    let job = JobBuilder::new()
        .name("skips".to_string())
        .repository(&repository)
        .start(&step)
        .build()?;

    for _ in 0..2 {
        match job.run() {
            Err(BatchError::Step { source, .. }) => {
                assert!(matches!(*source, BatchError::SkipLimitExceeded { limit: 1, .. }));
            }
            other => panic!("unexpected result: {:?}", other.map(|execution| execution.status)),
        }
    }

    let records = repository.step_executions("skips", "limited");
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.skip_count == 1));
    assert_eq!(writer.written_items(), vec![2]);
    Ok(())
}
