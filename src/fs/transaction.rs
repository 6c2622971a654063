//! Transactional staging of output files.
//!
//! Output is produced in a transaction-private temp directory and only
//! relocated onto its final destinations when the producing code finishes
//! without error, so a crash mid-write never leaves a half-written final
//! file.
//!
//! ## Flow
//!
//! 1. **Stage**: map each target path to `<tmpdir>/<basename>`
//! 2. **Work**: the caller writes to the staging paths
//! 3. **Commit** (on success): rename each produced staging path onto its
//!    target, replacing whatever is there
//! 4. **Discard** (on failure): nothing is moved; the temp directory and
//!    all partial output are removed
//!
//! ## Example
//!
//! ```no_run
//! # use bcbiotx::with_tx_file;
//! # use std::fs;
//! # fn example() -> bcbiotx::Result<()> {
//! with_tx_file(None, "results/summary.tsv", |tx_path| {
//!     fs::write(tx_path, "sample\treads\n")?;
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

use crate::config::RunConfig;
use crate::error::{Result, TxError};
use crate::fs::tmpdir::TxTmpDir;
use crate::fs::util::{move_dir, move_file, remove_path_quiet};

use std::fs;
use std::path::{Path, PathBuf};

/// Output files staged for a transaction.
///
/// Write to [`tx_paths`](Self::tx_paths); [`commit`](Self::commit)
/// relocates whatever was produced onto the matching
/// [`targets`](Self::targets). Dropping without committing discards the
/// staging directory and leaves every target untouched.
#[must_use = "staged files are discarded unless committed"]
pub struct StagedFiles {
    tmpdir: TxTmpDir,
    tx_paths: Vec<PathBuf>,
    targets: Vec<PathBuf>,
}

impl StagedFiles {
    /// Maps `targets` to staging paths under a fresh transaction temp
    /// directory.
    ///
    /// The temp directory is resolved against the parent of the *first*
    /// target: all targets of one transaction are assumed to share one
    /// logical output directory. At least one target is required; an empty
    /// set indicates a caller bug and is rejected.
    pub fn stage(config: Option<&RunConfig>, targets: &[PathBuf]) -> Result<Self> {
        let first = targets.first().ok_or(TxError::NoTargetPaths)?;
        let base_dir = parent_dir(first)?;
        let tmpdir = TxTmpDir::new(config, base_dir.as_deref(), true)?;

        let mut tx_paths = Vec::with_capacity(targets.len());
        for target in targets {
            let name = target
                .file_name()
                .ok_or_else(|| TxError::InvalidTarget(target.clone()))?;
            tx_paths.push(tmpdir.path().join(name));
        }

        // clear leftovers from an earlier interrupted transaction
        for tx_path in &tx_paths {
            remove_path_quiet(tx_path);
        }

        log::debug!(
            "staged {} path(s) under {}",
            tx_paths.len(),
            tmpdir.path().display()
        );
        Ok(Self {
            tmpdir,
            tx_paths,
            targets: targets.to_vec(),
        })
    }

    /// Staging paths to write to, ordered to match
    /// [`targets`](Self::targets).
    pub fn tx_paths(&self) -> &[PathBuf] {
        &self.tx_paths
    }

    /// Final target paths, ordered to match [`tx_paths`](Self::tx_paths).
    pub fn targets(&self) -> &[PathBuf] {
        &self.targets
    }

    /// Relocates every staged path that exists onto its target, replacing
    /// whatever is there.
    ///
    /// Staging paths the work never produced are skipped silently. The
    /// first failing move aborts the commit; earlier moves stay in place
    /// and the staging directory is still removed.
    pub fn commit(self) -> Result<()> {
        for (tx_path, target) in self.tx_paths.iter().zip(&self.targets) {
            let meta = match fs::symlink_metadata(tx_path) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if meta.is_dir() {
                move_dir(tx_path, target)?;
            } else {
                move_file(tx_path, target)?;
            }
            log::info!("committed {}", target.display());
        }
        Ok(())
    }
}

/// Runs `work` against staging paths for `targets`, committing on success.
///
/// On `Ok` every staging path the work produced is moved onto its target;
/// on `Err` nothing is moved, all staged output is discarded, and the error
/// is returned unchanged. The temp directory is cleaned up on every exit
/// path, including unwinds out of `work`.
pub fn with_file_transaction<T, F>(
    config: Option<&RunConfig>,
    targets: &[PathBuf],
    work: F,
) -> Result<T>
where
    F: FnOnce(&[PathBuf]) -> Result<T>,
{
    let staged = StagedFiles::stage(config, targets)?;
    let value = work(staged.tx_paths())?;
    staged.commit()?;
    Ok(value)
}

/// Single-target convenience over [`with_file_transaction`]: the work
/// closure receives one staging path instead of a slice.
pub fn with_tx_file<T, F>(
    config: Option<&RunConfig>,
    target: impl AsRef<Path>,
    work: F,
) -> Result<T>
where
    F: FnOnce(&Path) -> Result<T>,
{
    let targets = [target.as_ref().to_path_buf()];
    with_file_transaction(config, &targets, |tx_paths| work(&tx_paths[0]))
}

fn parent_dir(target: &Path) -> Result<Option<PathBuf>> {
    match target.parent() {
        // bare file name: resolve against the working directory
        Some(parent) if parent.as_os_str().is_empty() => Ok(None),
        Some(parent) => Ok(Some(parent.to_path_buf())),
        None => Err(TxError::InvalidTarget(target.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stage_single_path_preserves_basename() {
        let sandbox = TempDir::new().unwrap();
        let target = sandbox.path().join("somefile");

        let staged = StagedFiles::stage(None, &[target.clone()]).unwrap();

        assert_eq!(staged.tx_paths().len(), 1);
        assert!(staged.tx_paths()[0].ends_with("somefile"));
        assert_ne!(staged.tx_paths()[0], target);
        assert_eq!(staged.targets(), &[target]);
    }

    #[test]
    fn stage_multiple_paths_share_one_tmpdir() {
        let sandbox = TempDir::new().unwrap();
        let other = sandbox.path().join("elsewhere");
        fs::create_dir(&other).unwrap();
        let targets = vec![sandbox.path().join("somefile"), other.join("otherfile")];

        let staged = StagedFiles::stage(None, &targets).unwrap();

        assert_eq!(staged.tx_paths().len(), 2);
        assert!(staged.tx_paths()[0].ends_with("somefile"));
        assert!(staged.tx_paths()[1].ends_with("otherfile"));
        assert_eq!(
            staged.tx_paths()[0].parent(),
            staged.tx_paths()[1].parent()
        );
        assert_eq!(staged.targets(), targets.as_slice());
    }

    #[test]
    fn stage_rejects_empty_target_set() {
        let result = StagedFiles::stage(None, &[]);
        assert!(matches!(result, Err(TxError::NoTargetPaths)));
    }

    #[test]
    fn drop_without_commit_discards_staging() {
        let sandbox = TempDir::new().unwrap();
        let target = sandbox.path().join("out.txt");

        let leaf;
        {
            let staged = StagedFiles::stage(None, &[target.clone()]).unwrap();
            leaf = staged.tx_paths()[0].parent().unwrap().to_path_buf();
            fs::write(&staged.tx_paths()[0], "partial").unwrap();
        }

        assert!(!target.exists());
        assert!(!leaf.exists());
    }

    #[test]
    fn commit_skips_unwritten_staging_paths() {
        let sandbox = TempDir::new().unwrap();
        let written = sandbox.path().join("written.txt");
        let skipped = sandbox.path().join("skipped.txt");

        let staged = StagedFiles::stage(None, &[written.clone(), skipped.clone()]).unwrap();
        fs::write(&staged.tx_paths()[0], "content").unwrap();
        staged.commit().unwrap();

        assert_eq!(fs::read_to_string(&written).unwrap(), "content");
        assert!(!skipped.exists());
    }
}
