//! File system staging with transaction support.
//!
//! Provides per-transaction temp directories and transactional file moves
//! that commit or discard as a unit.

pub mod tmpdir;
pub mod transaction;
pub mod util;

pub use tmpdir::TxTmpDir;
pub use transaction::{StagedFiles, with_file_transaction, with_tx_file};
