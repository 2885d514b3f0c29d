use crate::error::BatchError;

/// Result of reading one item: `Ok(None)` signals the end of the input.
pub type ItemReaderResult<R> = Result<Option<R>, BatchError>;

pub type ItemProcessorResult<W> = Result<W, BatchError>;

pub type ItemWriterResult = Result<(), BatchError>;

/// Supplies the items of a step, one at a time.
///
/// Readers take `&self` and keep their cursor behind interior mutability so
/// that the same instance can also be registered as an
/// [`ItemStream`](super::stream::ItemStream).
pub trait ItemReader<R> {
    fn read(&self) -> ItemReaderResult<R>;
}

/// Business transformation applied to each read item.
pub trait ItemProcessor<R, W> {
    fn process(&self, item: &R) -> ItemProcessorResult<W>;
}

/// Consumes the processed items of a step.
///
/// `write` is called once per item; `flush` is called when the chunk
/// commits and must make every item written since the previous flush durable.
/// When a chunk fails before committing, `rollback` is called instead and must
/// discard those items.
pub trait ItemWriter<W> {
    fn write(&self, item: &W) -> ItemWriterResult;

    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    fn rollback(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Pass-through processor for steps that read and write the same type.
#[derive(Default, Debug, Clone, Copy)]
pub struct DefaultProcessor;

impl<R: Clone> ItemProcessor<R, R> for DefaultProcessor {
    fn process(&self, item: &R) -> ItemProcessorResult<R> {
        Ok(item.clone())
    }
}
