/// Counters of one in-flight chunk.
///
/// A contribution is created at the start of each chunk with a snapshot of the
/// skip count already accumulated by the step, buffers the chunk's counters,
/// and is consumed by [`StepExecution::apply`](super::step::StepExecution::apply)
/// when the chunk commits. Counters only ever grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContribution {
    item_count: usize,
    commit_count: usize,
    skip_count: usize,
    parent_skip_count: usize,
}

impl StepContribution {
    pub fn new(parent_skip_count: usize) -> Self {
        Self {
            item_count: 0,
            commit_count: 0,
            skip_count: 0,
            parent_skip_count,
        }
    }

    pub fn increment_item_count(&mut self) {
        self.item_count += 1;
    }

    pub fn increment_commit_count(&mut self) {
        self.commit_count += 1;
    }

    pub fn increment_skip_count(&mut self) {
        self.skip_count += 1;
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn commit_count(&self) -> usize {
        self.commit_count
    }

    /// Skips recorded by this contribution only.
    pub fn contribution_skip_count(&self) -> usize {
        self.skip_count
    }

    /// Skips of the whole step, parent snapshot included.
    pub fn step_skip_count(&self) -> usize {
        self.skip_count + self.parent_skip_count
    }

    pub fn parent_skip_count(&self) -> usize {
        self.parent_skip_count
    }
}
