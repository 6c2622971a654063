//! Transaction temp-directory resolution and lifecycle.
//!
//! Where a transaction's scratch space lives, in priority order:
//!
//! 1. a configured override (`resources.tmp.dir`), env-expanded and
//!    normalized, hosting a per-transaction `bcbiotx/<uuid>` staging
//!    subtree (typically fast scratch storage on cluster nodes);
//! 2. an explicit base directory from the caller, hosting a shared `tx`
//!    staging directory;
//! 3. the current working directory, likewise under `tx`.
//!
//! The configured override wins even when the caller also supplies a base
//! directory: operators pointing a run at scratch storage expect every
//! transaction to land there.

use crate::config::RunConfig;
use crate::error::Result;
use crate::fs::util::{ensure_dir, expand_env_vars, normalize_path, remove_tree_quiet};

use std::env;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Staging directory name used under a configured tmp root.
const CONFIG_STAGING_DIR: &str = "bcbiotx";

/// Staging directory name used under caller-supplied and cwd base dirs.
const LOCAL_STAGING_DIR: &str = "tx";

/// Scratch directory for a single transaction.
///
/// Created on construction. On drop, whether the transaction succeeded,
/// failed, or unwound, the leaf directory and any staging directories
/// created solely to host it are removed, ignoring errors. Construct with
/// `remove = false` to keep everything on disk for post-mortem inspection
/// of a failed run.
#[must_use = "the temp directory is removed when the guard is dropped"]
pub struct TxTmpDir {
    path: PathBuf,
    remove: bool,
    doomed: Vec<PathBuf>,
}

impl TxTmpDir {
    /// Resolves, creates, and claims a transaction temp directory.
    pub fn new(
        config: Option<&RunConfig>,
        base_dir: Option<&Path>,
        remove: bool,
    ) -> Result<Self> {
        let cwd = env::current_dir()?;
        let config_tmp = config_tmpdir_path(config.and_then(RunConfig::tmp_dir), &cwd);
        let tx_id = Uuid::new_v4().to_string();
        let base = base_tmpdir(base_dir, config_tmp.as_deref(), &cwd, &tx_id);

        ensure_dir(&base)?;
        let path = tempfile::Builder::new()
            .prefix("tmp")
            .tempdir_in(&base)?
            .keep();
        log::debug!("transaction temp dir at {}", path.display());

        let doomed = dirs_to_remove(Some(&path), Some(&base), config_tmp.as_deref());
        Ok(Self {
            path,
            remove,
            doomed,
        })
    }

    /// Path of the leaf temp directory owned by this transaction.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TxTmpDir {
    fn drop(&mut self) {
        if !self.remove {
            return;
        }
        for dir in &self.doomed {
            remove_tree_quiet(dir);
        }
    }
}

/// Resolves a configured tmp-dir value to a normalized path.
///
/// Environment-variable references are expanded first; relative values are
/// anchored at `cwd`. `None` in, `None` out.
pub fn config_tmpdir_path(raw: Option<&str>, cwd: &Path) -> Option<PathBuf> {
    let expanded = expand_env_vars(raw?);
    Some(normalize_path(&cwd.join(expanded)))
}

/// Picks the base directory under which the transaction's unique leaf
/// directory is created.
///
/// A configured tmp root always wins and gets a per-transaction
/// `bcbiotx/<tx_id>` subtree, so concurrent transactions sharing that root
/// never collide. Otherwise the caller's base directory, then the working
/// directory, each hosting a shared `tx` staging directory.
pub fn base_tmpdir(
    base_dir: Option<&Path>,
    config_tmp: Option<&Path>,
    cwd: &Path,
    tx_id: &str,
) -> PathBuf {
    if let Some(config_tmp) = config_tmp {
        config_tmp.join(CONFIG_STAGING_DIR).join(tx_id)
    } else if let Some(base_dir) = base_dir {
        base_dir.join(LOCAL_STAGING_DIR)
    } else {
        cwd.join(LOCAL_STAGING_DIR)
    }
}

/// Directories torn down when a transaction's scratch space is released.
///
/// The leaf is always removed. The base staging directory joins it only
/// when a configured tmp root is in play: only then is the base private to
/// this transaction (`bcbiotx/<id>`), while the shared `tx` bases must
/// survive for concurrent transactions. The configured root itself is
/// never removed. Undefined slots are filtered out and duplicates
/// collapsed, leaf before base.
pub fn dirs_to_remove(
    tmp_dir: Option<&Path>,
    tmp_dir_base: Option<&Path>,
    config_tmpdir: Option<&Path>,
) -> Vec<PathBuf> {
    let mut candidates = vec![tmp_dir];
    if config_tmpdir.is_some() {
        candidates.push(tmp_dir_base);
    }

    let mut dirs: Vec<PathBuf> = Vec::new();
    for dir in candidates.into_iter().flatten() {
        if !dir.as_os_str().is_empty() && !dirs.iter().any(|seen| seen == dir) {
            dirs.push(dir.to_path_buf());
        }
    }
    dirs
}
