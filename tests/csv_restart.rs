mod common;

use std::{cell::Cell, fs, path::Path};

use common::init_logger;
use serde::{Deserialize, Serialize};
use tempfile::tempdir;

use spring_batch_core::{
    BatchError,
    core::{
        item::{ItemProcessor, ItemProcessorResult},
        job::{BatchStatus, Job, JobBuilder},
        repository::{InMemoryJobRepository, JobRepository},
        step::{Step, StepBuilder, StepExecution, StepStatus},
    },
    item::csv::{
        csv_reader::{CsvItemReader, CsvItemReaderBuilder},
        csv_writer::{CsvItemWriter, CsvItemWriterBuilder},
    },
};

#[derive(Deserialize, Serialize, Debug, Clone)]
struct Car {
    year: u16,
    make: String,
}

/// Upper cases the make, failing on `fail_on` as long as `failures` allows.
struct UpperCaseProcessor {
    fail_on: u16,
    failures: Cell<usize>,
}

impl ItemProcessor<Car, Car> for UpperCaseProcessor {
    fn process(&self, item: &Car) -> ItemProcessorResult<Car> {
        if item.year == self.fail_on && self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(BatchError::ItemProcessor(format!(
                "unsupported car from {}",
                item.year
            )));
        }
        Ok(Car {
            year: item.year,
            make: item.make.to_uppercase(),
        })
    }
}

fn write_cars(path: &Path) -> std::io::Result<()> {
    fs::write(
        path,
        "year,make
    1948,Porsche
    2011,Peugeot
    2012,Citroen
    2021,Mazda
    1967,Ford
",
    )
}

fn reader(path: &Path) -> CsvItemReader {
    CsvItemReaderBuilder::new()
        .name("cars.input")
        .has_headers(true)
        .from_path(path)
}

fn writer(path: &Path) -> CsvItemWriter {
    CsvItemWriterBuilder::new()
        .name("cars.output")
        .has_headers(true)
        .from_path(path)
}

#[test]
fn failed_csv_job_should_resume_without_duplicating_rows() -> anyhow::Result<()> {
    init_logger();

    let dir = tempdir()?;
    let input = dir.path().join("cars.csv");
    let output = dir.path().join("cars_upper.csv");
    write_cars(&input)?;

    let reader = reader(&input);
    let writer = writer(&output);
    let processor = UpperCaseProcessor {
        fail_on: 2012,
        failures: Cell::new(1),
    };

    let step = StepBuilder::new("upper-case")
        .chunk::<Car, Car>(2)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .stream(&reader)
        .stream(&writer)
        .build()?;

    let repository = InMemoryJobRepository::new();
    let job = JobBuilder::new()
        .name("cars".to_string())
        .repository(&repository)
        .start(&step)
        .build()?;

    let result = job.run();
    assert!(matches!(result, Err(BatchError::Step { .. })));
    assert_eq!(
        fs::read_to_string(&output)?,
        "year,make\n1948,PORSCHE\n2011,PEUGEOT\n"
    );

    let failed = repository
        .get_last_step_execution("cars", "upper-case")?
        .expect("the failed execution must be persisted");
    assert_eq!(failed.status, StepStatus::Failed);
    assert_eq!(failed.item_count, 2);
    assert!(failed.failure.is_some());

    let execution = job.run()?;
    assert_eq!(execution.status, BatchStatus::Completed);

    let resumed = &execution.step_executions[0];
    assert_eq!(resumed.item_count(), 5);
    assert_eq!(resumed.commit_count(), 3);
    assert_eq!(resumed.execution_context().get_int("cars.input.read.count")?, 5);
    assert_eq!(resumed.execution_context().get_int("cars.output.written.count")?, 5);

    assert_eq!(
        fs::read_to_string(&output)?,
        "year,make\n1948,PORSCHE\n2011,PEUGEOT\n2012,CITROEN\n2021,MAZDA\n1967,FORD\n"
    );
    Ok(())
}

#[test]
fn skipped_rows_should_not_reach_the_output() -> anyhow::Result<()> {
    init_logger();

    let dir = tempdir()?;
    let input = dir.path().join("cars.csv");
    let output = dir.path().join("cars_upper.csv");
    write_cars(&input)?;

    let reader = reader(&input);
    let writer = writer(&output);
    let processor = UpperCaseProcessor {
        fail_on: 2021,
        failures: Cell::new(usize::MAX),
    };

    let step = StepBuilder::new("upper-case")
        .chunk::<Car, Car>(3)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .stream(&reader)
        .stream(&writer)
        .skip_limit(1)
        .build()?;

    let repository = InMemoryJobRepository::new();
    let mut execution = StepExecution::new("cars", "upper-case");
    step.execute(&mut execution, &repository)?;

    assert_eq!(execution.status(), StepStatus::Completed);
    assert_eq!(execution.skip_count(), 1);
    assert_eq!(execution.item_count(), 5);
    assert_eq!(
        fs::read_to_string(&output)?,
        "year,make\n1948,PORSCHE\n2011,PEUGEOT\n2012,CITROEN\n1967,FORD\n"
    );
    Ok(())
}

#[test]
fn missing_input_should_fail_the_step_at_open() -> anyhow::Result<()> {
    init_logger();

    let dir = tempdir()?;
    let reader = reader(&dir.path().join("missing.csv"));
    let writer = writer(&dir.path().join("out.csv"));
    let processor = UpperCaseProcessor {
        fail_on: 0,
        failures: Cell::new(0),
    };

    let step = StepBuilder::new("upper-case")
        .chunk::<Car, Car>(2)
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .stream(&reader)
        .stream(&writer)
        .build()?;

    let repository = InMemoryJobRepository::new();
    let mut execution = StepExecution::new("cars", "upper-case");
    let result = step.execute(&mut execution, &repository);

    assert!(matches!(result, Err(BatchError::Stream(_))));
    assert_eq!(execution.status(), StepStatus::Failed);
    assert_eq!(execution.commit_count(), 0);
    assert!(!dir.path().join("out.csv").exists());
    Ok(())
}
