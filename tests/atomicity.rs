//! Atomic restore guarantees: a failed run leaves no trace.

mod common;

use common::*;
use std::path::Path;
use tempfile::TempDir;

/// A merge that cannot be replayed: the left side modifies `f1.txt`, the
/// right side deletes it, and the recorded resolution keeps the modified
/// file. Both the standard and the ours-favoring strategies fail on the
/// modify/delete conflict, so the build dies midway.
fn broken_merge_fixture() -> (TempDir, String) {
    let dir = setup_repo();
    let root = dir.path();
    let initial = rev(root, "HEAD");

    let left = commit_file(root, "f1.txt", "L\n", "left: modify f1");

    git(root, &["checkout", "--quiet", "--detach", &initial]);
    git(root, &["rm", "--quiet", "f1.txt"]);
    git(root, &["commit", "--quiet", "-m", "right: delete f1"]);
    let right = rev(root, "HEAD");

    git(root, &["checkout", "--quiet", "--detach", &left]);
    let out = try_git(root, &["merge", "--no-edit", &right]);
    assert!(!out.status.success(), "merge should conflict");
    git(root, &["add", "f1.txt"]);
    git(root, &["commit", "--quiet", "--no-edit"]);
    let merge = rev(root, "HEAD");

    git(root, &["branch", "--force", "main", &merge]);
    git(root, &["checkout", "--quiet", "main"]);

    (dir, merge)
}

fn snapshot(root: &Path) -> (String, String, String, String) {
    (
        git(root, &["branch", "--show-current"]),
        rev(root, "HEAD"),
        git(root, &["status", "--porcelain"]),
        git(root, &["for-each-ref", "refs/heads"]),
    )
}

#[test]
fn failed_run_restores_clean_state() {
    let (dir, merge) = broken_merge_fixture();
    let root = dir.path();
    let before = snapshot(root);

    let stderr = linearize_fails(root, &[]);
    assert!(stderr.contains("fatal:"), "stderr: {stderr}");

    assert_eq!(snapshot(root), before);
    assert_eq!(rev(root, "HEAD"), merge);
}

#[test]
fn failed_run_restores_dirty_working_tree() {
    let (dir, _merge) = broken_merge_fixture();
    let root = dir.path();

    std::fs::write(root.join("f2.txt"), "uncommitted\n").unwrap();
    let before = snapshot(root);

    linearize_fails(root, &[]);

    assert_eq!(snapshot(root), before);
    assert_eq!(
        std::fs::read_to_string(root.join("f2.txt")).unwrap(),
        "uncommitted\n"
    );
}

#[test]
fn successful_run_restores_dirty_working_tree() {
    let fx = graph_fixture();
    let root = fx.dir.path();

    std::fs::write(root.join("f4.txt"), "wip\n").unwrap();
    let before = snapshot(root);

    let stdout = linearize_ok(root, &[]);
    let (_base, tip) = parse_result(&stdout);

    assert_eq!(snapshot(root), before);
    assert_eq!(tree(root, &tip), tree(root, &fx.e));
    assert_eq!(
        std::fs::read_to_string(root.join("f4.txt")).unwrap(),
        "wip\n"
    );
}

#[test]
fn detached_head_start_is_restored_detached() {
    let fx = graph_fixture();
    let root = fx.dir.path();
    git(root, &["checkout", "--quiet", "--detach", &fx.e]);

    linearize_ok(root, &[]);

    assert_eq!(git(root, &["branch", "--show-current"]).trim(), "");
    assert_eq!(rev(root, "HEAD"), fx.e);
}
