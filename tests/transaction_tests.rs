//! End-to-end transactional output tests.
//!
//! Each test runs a real transaction inside a tempfile sandbox and checks
//! the only two outcomes the layer promises: on success the targets hold
//! the new content and the scratch space is gone; on failure the targets
//! are untouched and the scratch space is gone.

use bcbiotx::{RunConfig, StagedFiles, TxError, with_file_transaction, with_tx_file};
use std::fs;
use std::io;
use std::path::PathBuf;
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn single_file_commit() {
    init_logging();
    let sandbox = TempDir::new().unwrap();
    let target = sandbox.path().join("out.txt");

    let mut leaf = None;
    with_tx_file(None, &target, |tx_path| {
        assert!(tx_path.ends_with("out.txt"));
        assert_ne!(tx_path, target.as_path());
        leaf = Some(tx_path.parent().unwrap().to_path_buf());
        fs::write(tx_path, "done")?;
        Ok(())
    })
    .unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "done");
    assert!(!leaf.unwrap().exists());
}

#[test]
fn commit_overwrites_existing_target() {
    let sandbox = TempDir::new().unwrap();
    let target = sandbox.path().join("out.txt");
    fs::write(&target, "previous version").unwrap();

    with_tx_file(None, &target, |tx_path| {
        fs::write(tx_path, "new version")?;
        Ok(())
    })
    .unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "new version");
}

#[test]
fn no_op_body_commits_nothing_and_succeeds() {
    let sandbox = TempDir::new().unwrap();
    let target = sandbox.path().join("out.txt");

    with_tx_file(None, &target, |_tx_path| Ok(())).unwrap();

    assert!(!target.exists());
}

#[test]
fn failed_body_leaves_target_untouched() {
    let sandbox = TempDir::new().unwrap();
    let target = sandbox.path().join("out.txt");
    fs::write(&target, "original").unwrap();

    let mut leaf = None;
    let result = with_tx_file(None, &target, |tx_path| -> bcbiotx::Result<()> {
        leaf = Some(tx_path.parent().unwrap().to_path_buf());
        fs::write(tx_path, "partial output")?;
        Err(io::Error::other("aligner crashed").into())
    });

    assert!(result.is_err());
    assert_eq!(fs::read_to_string(&target).unwrap(), "original");
    assert!(!leaf.unwrap().exists());
}

#[test]
fn work_error_is_propagated_unchanged() {
    let sandbox = TempDir::new().unwrap();
    let target = sandbox.path().join("out.txt");

    let result = with_tx_file(None, &target, |_tx_path| -> bcbiotx::Result<()> {
        Err(io::Error::new(io::ErrorKind::TimedOut, "cluster timeout").into())
    });

    match result {
        Err(TxError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
        other => panic!("expected the work error back, got {other:?}"),
    }
}

#[test]
fn multi_file_commit_lands_every_target() {
    let sandbox = TempDir::new().unwrap();
    let other_dir = sandbox.path().join("elsewhere");
    fs::create_dir(&other_dir).unwrap();
    let targets = vec![
        sandbox.path().join("calls.vcf"),
        other_dir.join("calls.stats"),
    ];

    with_file_transaction(None, &targets, |tx_paths| {
        assert_eq!(tx_paths.len(), 2);
        // one temp dir serves the whole transaction
        assert_eq!(tx_paths[0].parent(), tx_paths[1].parent());
        for tx_path in tx_paths {
            fs::write(tx_path, "content")?;
        }
        Ok(())
    })
    .unwrap();

    for target in &targets {
        assert_eq!(fs::read_to_string(target).unwrap(), "content");
    }
}

#[test]
fn empty_target_set_is_rejected() {
    let result = with_file_transaction(None, &[], |_| Ok(()));
    assert!(matches!(result, Err(TxError::NoTargetPaths)));
}

#[test]
fn directory_target_is_moved_whole() {
    let sandbox = TempDir::new().unwrap();
    let target = sandbox.path().join("index-dir");

    with_tx_file(None, &target, |tx_path| {
        fs::create_dir(tx_path)?;
        fs::write(tx_path.join("chunk-0.bin"), "indexed")?;
        Ok(())
    })
    .unwrap();

    assert!(target.is_dir());
    assert_eq!(
        fs::read_to_string(target.join("chunk-0.bin")).unwrap(),
        "indexed"
    );
}

#[test]
fn no_transfer_sentinels_survive_a_commit() {
    let sandbox = TempDir::new().unwrap();
    let target = sandbox.path().join("out.txt");

    with_tx_file(None, &target, |tx_path| {
        fs::write(tx_path, "data")?;
        Ok(())
    })
    .unwrap();

    let leftovers: Vec<PathBuf> = fs::read_dir(sandbox.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|p| p.to_string_lossy().ends_with(".bcbiotmp"))
        .collect();
    assert!(leftovers.is_empty(), "found sentinels: {leftovers:?}");
}

#[test]
fn configured_tmp_root_is_used_and_cleaned() {
    let sandbox = TempDir::new().unwrap();
    let scratch = sandbox.path().join("scratch");
    let target = sandbox.path().join("out.txt");
    let config = RunConfig::from_yaml(&format!(
        "resources:\n  tmp:\n    dir: {}\n",
        scratch.display()
    ))
    .unwrap();

    with_tx_file(Some(&config), &target, |tx_path| {
        assert!(tx_path.starts_with(scratch.join("bcbiotx")));
        fs::write(tx_path, "done")?;
        Ok(())
    })
    .unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "done");
    assert_eq!(fs::read_dir(scratch.join("bcbiotx")).unwrap().count(), 0);
}

#[test]
fn staged_files_expose_paired_path_lists() {
    let sandbox = TempDir::new().unwrap();
    let targets = vec![
        sandbox.path().join("a.txt"),
        sandbox.path().join("b.txt"),
        sandbox.path().join("c.txt"),
    ];

    let staged = StagedFiles::stage(None, &targets).unwrap();

    assert_eq!(staged.tx_paths().len(), staged.targets().len());
    for (tx_path, target) in staged.tx_paths().iter().zip(staged.targets()) {
        assert_eq!(tx_path.file_name(), target.file_name());
        assert_ne!(tx_path, target);
    }
}

#[test]
fn manual_stage_and_commit() {
    let sandbox = TempDir::new().unwrap();
    let target = sandbox.path().join("manual.txt");

    let staged = StagedFiles::stage(None, &[target.clone()]).unwrap();
    fs::write(&staged.tx_paths()[0], "manual flow").unwrap();
    staged.commit().unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "manual flow");
}
