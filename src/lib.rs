pub mod base;
pub mod bucket;
pub mod builder;
pub mod codec;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod gauge;
pub mod merger;
pub mod retrieval;
pub mod search;
pub mod segment;
pub mod tokenizer;
pub mod utils;

pub use error::{Error, Result};
