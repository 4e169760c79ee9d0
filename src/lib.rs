pub mod config;
pub mod domain;
pub mod error;
pub mod git;
pub mod resolver;
pub mod store;
pub mod topology;
pub mod ui;

pub use error::{Result, StashError};
