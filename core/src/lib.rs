pub mod index;
pub mod persist;
pub mod query;
pub mod tokenizer;

pub use index::*;
pub use query::{rank, rank_scored, search, search_directory};
