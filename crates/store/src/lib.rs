//! Persistence for price series and run artifacts.

pub mod file;
pub mod import;
pub mod sqlite;

pub use file::FileStore;
pub use import::{import_csv, parse_csv};
pub use sqlite::SqliteStore;
