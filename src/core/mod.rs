use rand::distr::{Alphanumeric, SampleString};

pub mod chunk;

pub mod contribution;

pub mod exception;

pub mod execution_context;

pub mod item;

pub mod job;

pub mod repository;

pub mod settings;

pub mod step;

pub mod stream;

pub mod tasklet;

/// Generates a random name consisting of alphanumeric characters.
///
/// # Returns
///
/// A `String` containing the generated random name.
fn build_name() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 8)
}
