#![cfg_attr(docsrs, feature(doc_cfg))]

/*!
 # Spring-Batch core for Rust

 The execution core of a chunk-oriented batch framework: items are read one
 at a time, grouped into chunks, processed, written, and committed together
 with a checkpoint of every participating stream. A step that fails or is
 stopped can be restarted and resumes right after its last committed chunk.

 ## Core Concepts

- **Job:** A sequence of `Step`s run against a `JobRepository`. Running a job
  again resumes it: completed steps are skipped, a failed step restarts.
- **Step:** A phase of a job. `ChunkOrientedStep` reads, processes and writes
  items chunk by chunk; `TaskletStep` repeats a single `Tasklet`.
- **StepExecution:** The runtime record of one run of a step: status
  (`Ready`, `Running`, `Completed`, `Failed`, `Stopped`), counters and the
  `ExecutionContext` holding the last checkpoint.
- **StepContribution:** Counters accumulated by one chunk, folded into the
  step execution only when the chunk commits.
- **ItemStream:** A reader or writer that can be opened, closed,
  checkpointed into an `ExecutionContext` and restored from it.
- **ExceptionHandler:** Decides whether an item failure is absorbed (the item
  is skipped) or fails the step.

 ## Features

| **Feature**   | **Description**                                               |
|---------------|---------------------------------------------------------------|
| csv           | Enables restartable CSV `ItemReader` and `ItemWriter`         |
| logger        | Enables a logger `ItemWriter`, useful for debugging purposes  |
| full          | Enables all available features                                |

 ## Getting Started

```rust
# use spring_batch_core::{
#     core::{
#         item::{ItemProcessor, ItemProcessorResult},
#         job::{BatchStatus, Job, JobBuilder},
#         repository::InMemoryJobRepository,
#         step::StepBuilder,
#     },
#     error::BatchError,
#     item::list::{ListItemReader, ListItemWriter},
# };
#[derive(Default)]
struct UpperCaseProcessor {}

impl ItemProcessor<String, String> for UpperCaseProcessor {
    fn process(&self, item: &String) -> ItemProcessorResult<String> {
        Ok(item.to_uppercase())
    }
}

fn main() -> Result<(), BatchError> {
    let reader = ListItemReader::new(vec![
        "porsche".to_string(),
        "peugeot".to_string(),
        "mazda".to_string(),
    ]);
    let processor = UpperCaseProcessor::default();
    let writer = ListItemWriter::new();

    let step = StepBuilder::new("upper-case")
        .chunk::<String, String>(2) // set commit interval
        .reader(&reader)
        .processor(&processor)
        .writer(&writer)
        .stream(&reader) // checkpoint the reader position
        .skip_limit(2) // set fault tolerance
        .build()?;

    let repository = InMemoryJobRepository::new();
    let job = JobBuilder::new()
        .name("cars".to_string())
        .repository(&repository)
        .start(&step)
        .build()?;
    let execution = job.run()?;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(writer.written_items(), vec!["PORSCHE", "PEUGEOT", "MAZDA"]);

    Ok(())
}
```
 */

/// Core module for batch operations
pub mod core;

/// Error types for batch operations
pub mod error;

#[doc(inline)]
pub use error::*;

/// Set of items readers / writers  (for example: csv reader and writer)
pub mod item;
