pub mod cli;
pub mod dataset;
pub mod protocol;

pub use cli::{Command, print_response, prompt};
pub use dataset::{Dataset, Record};
