#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, QuestionCatalog, QuestionSelector, QuestionSupply, ResultRepository,
    ResultRow, SnapshotRepository, Storage, StorageError,
};
