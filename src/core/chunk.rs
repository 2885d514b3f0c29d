use log::{debug, error};

use crate::error::BatchError;

use super::{contribution::StepContribution, item::ItemReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// `chunk_size` items were read, the source may hold more.
    Full,
    /// The source reported its end while the chunk was filled.
    Finished,
}

/// Items read for one chunk, in read order.
///
/// Holds at most the requested chunk size; fewer items only at the end of the
/// input, and none once the input is exhausted.
#[derive(Debug)]
pub struct ChunkingResult<T> {
    items: Vec<T>,
    status: ChunkStatus,
}

impl<T> ChunkingResult<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn status(&self) -> ChunkStatus {
        self.status
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Reads the next chunk of a step.
pub trait Chunker<T> {
    /// Reads up to `chunk_size` items, incrementing the item count of
    /// `contribution` for each successful read.
    ///
    /// # Errors
    /// - `BatchError::InvalidArgument` when `chunk_size` is zero; the
    ///   contribution is left untouched.
    /// - the reader's error (`BatchError::ItemReader` for a failed read); the
    ///   items already read for this chunk are dropped.
    fn chunk(
        &self,
        chunk_size: usize,
        contribution: &mut StepContribution,
    ) -> Result<ChunkingResult<T>, BatchError>;
}

/// [`Chunker`] pulling its items from an [`ItemReader`].
pub struct ItemChunker<'a, T> {
    reader: &'a dyn ItemReader<T>,
}

impl<'a, T> ItemChunker<'a, T> {
    pub fn new(reader: &'a dyn ItemReader<T>) -> Self {
        Self { reader }
    }
}

impl<T> Chunker<T> for ItemChunker<'_, T> {
    fn chunk(
        &self,
        chunk_size: usize,
        contribution: &mut StepContribution,
    ) -> Result<ChunkingResult<T>, BatchError> {
        if chunk_size == 0 {
            return Err(BatchError::InvalidArgument(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        debug!("Start reading chunk");
        let mut items = Vec::with_capacity(chunk_size);

        while items.len() < chunk_size {
            match self.reader.read() {
                Ok(Some(item)) => {
                    items.push(item);
                    contribution.increment_item_count();
                }
                Ok(None) => {
                    debug!("End reading chunk: FINISHED ({} items)", items.len());
                    return Ok(ChunkingResult {
                        items,
                        status: ChunkStatus::Finished,
                    });
                }
                Err(err) => {
                    error!(
                        "Error occured during read item, dropping {} read items: {}",
                        items.len(),
                        err
                    );
                    return Err(err);
                }
            }
        }

        debug!("End reading chunk: FULL");
        Ok(ChunkingResult {
            items,
            status: ChunkStatus::Full,
        })
    }
}
