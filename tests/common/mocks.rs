//! Mock versions of the item and repository traits.
use mockall::mock;

use spring_batch_core::{
    BatchError,
    core::{
        item::{ItemReader, ItemReaderResult, ItemWriter, ItemWriterResult},
        repository::{JobRepository, StepExecutionRecord},
    },
};

mock! {
    pub Reader {}
    impl ItemReader<u32> for Reader {
        fn read(&self) -> ItemReaderResult<u32>;
    }
}

mock! {
    pub Writer {}
    impl ItemWriter<u32> for Writer {
        fn write(&self, item: &u32) -> ItemWriterResult;
        fn flush(&self) -> ItemWriterResult;
        fn rollback(&self) -> ItemWriterResult;
    }
}

mock! {
    pub Repository {}
    impl JobRepository for Repository {
        fn save(&self, record: &StepExecutionRecord) -> Result<(), BatchError>;
        fn get_last_step_execution(
            &self,
            job_name: &str,
            step_name: &str,
        ) -> Result<Option<StepExecutionRecord>, BatchError>;
    }
}
