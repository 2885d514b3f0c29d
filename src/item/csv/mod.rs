/// Restartable CSV readers and writers.
///
/// Both components are [`ItemStream`](crate::core::stream::ItemStream)s
/// working on a file path, configured through a builder:
///
/// - [`CsvItemReader`](csv_reader::CsvItemReader) deserializes rows with Serde
///   and checkpoints the number of rows consumed
/// - [`CsvItemWriter`](csv_writer::CsvItemWriter) serializes records with Serde
///   and checkpoints the byte position of the last flushed record
///
/// Register them with
/// [`ChunkOrientedStepBuilder::stream`](crate::core::step::ChunkOrientedStepBuilder::stream)
/// so that a failed step resumes where its last chunk committed.
///
/// # Examples
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use spring_batch_core::core::{
///     item::DefaultProcessor,
///     repository::InMemoryJobRepository,
///     step::{Step, StepBuilder, StepExecution, StepStatus},
/// };
/// use spring_batch_core::item::csv::{
///     csv_reader::CsvItemReaderBuilder, csv_writer::CsvItemWriterBuilder,
/// };
///
/// #[derive(Debug, Clone, Deserialize, Serialize)]
/// struct City {
///     city: String,
///     pop: u32,
/// }
///
/// let dir = tempfile::tempdir().unwrap();
/// let input = dir.path().join("cities.csv");
/// let output = dir.path().join("copy.csv");
/// std::fs::write(&input, "city,pop\nBoston,4628910\nConcord,42695\n").unwrap();
///
/// let reader = CsvItemReaderBuilder::new().has_headers(true).from_path(&input);
/// let writer = CsvItemWriterBuilder::new().has_headers(true).from_path(&output);
///
/// let step = StepBuilder::new("copy")
///     .chunk::<City, City>(10)
///     .reader(&reader)
///     .processor(&DefaultProcessor)
///     .writer(&writer)
///     .stream(&reader)
///     .stream(&writer)
///     .build()
///     .unwrap();
///
/// let repository = InMemoryJobRepository::new();
/// let mut execution = StepExecution::new("cities", "copy");
/// step.execute(&mut execution, &repository).unwrap();
///
/// assert_eq!(execution.status(), StepStatus::Completed);
/// assert_eq!(
///     std::fs::read_to_string(&output).unwrap(),
///     "city,pop\nBoston,4628910\nConcord,42695\n"
/// );
/// ```
pub mod csv_reader;

pub mod csv_writer;
