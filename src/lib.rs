#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod fs;

pub use config::RunConfig;
pub use error::*;
pub use fs::tmpdir::TxTmpDir;
pub use fs::transaction::{StagedFiles, with_file_transaction, with_tx_file};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
