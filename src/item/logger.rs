use std::fmt::Debug;

use log::info;

use crate::{BatchError, core::item::ItemWriter};

/// Writer logging every item at info level, handy to debug a step.
#[derive(Default)]
pub struct LoggerWriter {}

impl<T> ItemWriter<T> for LoggerWriter
where
    T: Debug,
{
    fn write(&self, item: &T) -> Result<(), BatchError> {
        info!("Record:{:?}", item);
        Ok(())
    }
}
