//! Shared filesystem primitives for the staging layer.
//!
//! Everything here follows the same discipline: creation is idempotent and
//! tolerant of concurrent creators, removal is tolerant of concurrent
//! removers, and moves prefer an atomic rename with a size-checked
//! copy+delete fallback when source and target live on different
//! filesystems.

use crate::error::{Result, TxError};

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Suffix of the sentinel file marking an in-flight transfer onto a target.
const INFLIGHT_SUFFIX: &str = ".bcbiotmp";

/// Creates `dir` and any missing parents.
///
/// Safe to call when the directory already exists, including when a
/// concurrent process creates it between check and creation.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(TxError::Io(io::Error::new(
            e.kind(),
            format!("failed to create {}: {}", dir.display(), e),
        ))),
    }
}

/// Expands `$VAR` and `${VAR}` references against the process environment.
///
/// Unknown variables are left verbatim: configured locations commonly
/// reference variables that are only defined on the execution host.
pub fn expand_env_vars(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

fn expand_with<F>(input: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    let name = &braced[..end];
                    match lookup(name) {
                        Some(value) => out.push_str(&value),
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &braced[end + 1..];
                }
                None => {
                    // unterminated brace, treat the rest as literal
                    out.push('$');
                    rest = after;
                }
            }
        } else {
            let len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            if len == 0 {
                out.push('$');
                rest = after;
            } else {
                let name = &after[..len];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('$');
                        out.push_str(name);
                    }
                }
                rest = &after[len..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Lexically resolves `.` and `..` components without touching the
/// filesystem, so configured locations that do not exist yet still
/// normalize.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() && !path.has_root() {
                    normalized.push(Component::ParentDir);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Moves a staged file onto its final location, replacing any existing
/// file at the target.
///
/// Renames atomically when source and target share a filesystem; otherwise
/// copies, verifies the transferred size, and deletes the source. An empty
/// `<target>.bcbiotmp` sentinel exists for the duration of the transfer so
/// interrupted commits are detectable afterwards.
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    log::debug!("moving {} -> {}", from.display(), to.display());
    let sentinel = inflight_sentinel(to);
    fs::File::create(&sentinel).map_err(|e| {
        TxError::Io(io::Error::new(
            e.kind(),
            format!("failed to mark transfer {}: {}", to.display(), e),
        ))
    })?;

    if is_same_filesystem(from, to)? {
        rename_over(from, to)?;
    } else {
        copy_with_sizecheck(from, to)?;
    }
    // the sentinel outlives a failed transfer on purpose
    remove_file_quiet(&sentinel);
    Ok(())
}

/// Moves a staged directory tree onto its final location, replacing any
/// existing entry at the target.
pub fn move_dir(from: &Path, to: &Path) -> Result<()> {
    log::debug!("moving directory {} -> {}", from.display(), to.display());
    match fs::symlink_metadata(to) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(to)?,
        Ok(_) => fs::remove_file(to)?,
        Err(_) => {}
    }

    if is_same_filesystem(from, to)? {
        fs::rename(from, to).map_err(|e| {
            TxError::Io(io::Error::new(
                e.kind(),
                format!(
                    "failed to move {} -> {}: {}",
                    from.display(),
                    to.display(),
                    e
                ),
            ))
        })?;
    } else {
        copy_dir_recursive(from, to)?;
        fs::remove_dir_all(from)?;
    }
    Ok(())
}

/// Recursively removes `dir`, ignoring all errors.
///
/// Cleanup must never raise: the directory may already be gone, or a
/// sibling process may be tearing down the same staging area.
pub fn remove_tree_quiet(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != io::ErrorKind::NotFound {
            log::debug!("ignoring cleanup failure for {}: {}", dir.display(), e);
        }
    }
}

/// Removes a file, ignoring all errors.
pub fn remove_file_quiet(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::debug!("ignoring cleanup failure for {}: {}", path.display(), e);
        }
    }
}

/// Removes whatever exists at `path`, file or directory, ignoring errors.
pub fn remove_path_quiet(path: &Path) {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_tree_quiet(path),
        Ok(_) => remove_file_quiet(path),
        Err(_) => {}
    }
}

fn inflight_sentinel(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(INFLIGHT_SUFFIX);
    target.with_file_name(name)
}

fn rename_over(from: &Path, to: &Path) -> Result<()> {
    if let Err(first) = fs::rename(from, to) {
        // Windows refuses to rename over an existing file
        if to.exists() && fs::remove_file(to).is_ok() && fs::rename(from, to).is_ok() {
            return Ok(());
        }
        return Err(TxError::Io(io::Error::new(
            first.kind(),
            format!(
                "failed to move {} -> {}: {}",
                from.display(),
                to.display(),
                first
            ),
        )));
    }
    Ok(())
}

fn copy_with_sizecheck(from: &Path, to: &Path) -> Result<()> {
    let expected = fs::metadata(from)?.len();
    fs::copy(from, to).map_err(|e| {
        TxError::Io(io::Error::new(
            e.kind(),
            format!(
                "failed to copy {} -> {}: {}",
                from.display(),
                to.display(),
                e
            ),
        ))
    })?;
    let found = fs::metadata(to)?.len();
    if expected != found {
        return Err(TxError::SizeMismatch {
            path: to.to_path_buf(),
            expected,
            found,
        });
    }
    fs::remove_file(from)?;
    Ok(())
}

/// Checks whether `from` and the target's parent are on one filesystem,
/// deciding between atomic rename and copy+delete.
fn is_same_filesystem(from: &Path, to: &Path) -> Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let from_meta = fs::metadata(from)?;
        let to_parent = to.parent().unwrap_or(to);
        let to_meta = fs::metadata(to_parent).map_err(|e| {
            TxError::Io(io::Error::new(
                e.kind(),
                format!("target directory unavailable {}: {}", to_parent.display(), e),
            ))
        })?;
        Ok(from_meta.dev() == to_meta.dev())
    }

    #[cfg(not(unix))]
    {
        let from_str = from.to_string_lossy();
        let to_str = to.to_string_lossy();

        if from_str.len() >= 2 && to_str.len() >= 2 {
            Ok(from_str.chars().next() == to_str.chars().next())
        } else {
            Ok(true)
        }
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to)?;

    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let from_path = entry.path();
        let to_path = to.join(entry.file_name());

        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&from_path, &to_path)?;
        } else {
            fs::copy(&from_path, &to_path)?;
        }
    }

    Ok(())
}
