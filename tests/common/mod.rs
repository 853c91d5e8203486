//! Shared test helpers for linearize integration tests.
//!
//! All tests use temp directories — no side effects on the real repo.
//! Each test gets its own git repo via [`setup_repo`] or one of the graph
//! fixtures.

#![allow(dead_code)]

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Create a fresh git repo on branch `main` with an initial commit of the
/// five fixture files (`f1.txt` … `f5.txt`, all containing `A`).
pub fn setup_repo() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    let root = dir.path();

    git(root, &["init", "--quiet", "-b", "main"]);
    git(root, &["config", "user.name", "Test User"]);
    git(root, &["config", "user.email", "test@example.com"]);
    git(root, &["config", "commit.gpgsign", "false"]);

    for i in 1..=5 {
        std::fs::write(root.join(format!("f{i}.txt")), "A\n").unwrap();
    }
    git(root, &["add", "-A"]);
    git(root, &["commit", "--quiet", "-m", "initial"]);

    dir
}

/// Run git with the given args, asserting success. Returns stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {e}", args.join(" ")));
    assert!(
        out.status.success(),
        "git {} failed:\nstdout: {}\nstderr: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr),
    );
    String::from_utf8_lossy(&out.stdout).to_string()
}

/// Run git without asserting; returns the raw output.
pub fn try_git(dir: &Path, args: &[&str]) -> Output {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git")
}

/// Write a file, stage everything, and commit. Returns the new commit id.
pub fn commit_file(dir: &Path, name: &str, content: &str, msg: &str) -> String {
    std::fs::write(dir.join(name), content).unwrap();
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "--quiet", "--allow-empty", "-m", msg]);
    rev(dir, "HEAD")
}

/// Resolve a revision to its full hex id.
pub fn rev(dir: &Path, r: &str) -> String {
    git(dir, &["rev-parse", &format!("{r}^{{commit}}")])
        .trim()
        .to_string()
}

/// The tree id of a revision.
pub fn tree(dir: &Path, r: &str) -> String {
    git(dir, &["rev-parse", &format!("{r}^{{tree}}")])
        .trim()
        .to_string()
}

/// File content at a revision.
pub fn show(dir: &Path, r: &str, path: &str) -> String {
    git(dir, &["show", &format!("{r}:{path}")])
}

/// All commit ids reachable from `r`, newest first.
pub fn history(dir: &Path, r: &str) -> Vec<String> {
    git(dir, &["rev-list", r])
        .lines()
        .map(|l| l.trim().to_string())
        .collect()
}

/// Commit subjects reachable from `r`, newest first.
pub fn subjects(dir: &Path, r: &str) -> Vec<String> {
    git(dir, &["log", "--format=%s", r])
        .lines()
        .map(|l| l.to_string())
        .collect()
}

/// Count reachable commits whose subject starts with `prefix`.
pub fn count_prefixed(dir: &Path, r: &str, prefix: &str) -> usize {
    subjects(dir, r)
        .iter()
        .filter(|s| s.starts_with(prefix))
        .count()
}

/// Assert every commit reachable from `r` has at most one parent.
pub fn assert_linear(dir: &Path, r: &str) {
    let out = git(dir, &["rev-list", "--parents", r]);
    for line in out.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        assert!(
            tokens.len() <= 2,
            "commit {} has {} parents — history is not linear",
            tokens[0],
            tokens.len() - 1
        );
    }
}

/// Run the linearize binary with the given args in the given directory.
pub fn linearize_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_linearize"))
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to execute linearize")
}

/// Run linearize and assert it succeeds. Returns stdout.
pub fn linearize_ok(dir: &Path, args: &[&str]) -> String {
    let out = linearize_in(dir, args);
    assert!(
        out.status.success(),
        "linearize {} failed:\nstdout: {}\nstderr: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr),
    );
    String::from_utf8_lossy(&out.stdout).to_string()
}

/// Run linearize and assert it fails. Returns stderr.
pub fn linearize_fails(dir: &Path, args: &[&str]) -> String {
    let out = linearize_in(dir, args);
    assert!(
        !out.status.success(),
        "expected linearize {} to fail, but it succeeded.\nstdout: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
    );
    String::from_utf8_lossy(&out.stderr).to_string()
}

/// Parse `<base> <tip>` from linearize stdout.
pub fn parse_result(stdout: &str) -> (String, String) {
    let mut parts = stdout.split_whitespace();
    let base = parts.next().expect("missing base in output").to_string();
    let tip = parts.next().expect("missing tip in output").to_string();
    (base, tip)
}

// ---------------------------------------------------------------------------
// Graph fixtures
// ---------------------------------------------------------------------------

/// The cascaded merge fixture.
///
/// ```text
/// initial ──── b1 ──── b2 ──── d1 ─────────┐
///     │         \     /                     E (head)
///     │          \  c1        m1 ──────────┘
///     └──────────────┴────────┘
/// ```
///
/// - `c1` (from initial): sets `f3 = C`, `f5 = C`.
/// - `b1` (from initial): sets `f3 = B`.
/// - `b2`: merges `c1` into `b1` preferring ours — tree `f3 = B, f5 = C`.
/// - `d1` (on `b2`): sets `f3 = D`.
/// - `m1` (from initial): adds `README.md`.
/// - `e`: clean merge of `d1` into `m1` — tree `f3 = D, f5 = C` + README.
pub struct GraphFixture {
    pub dir: TempDir,
    pub initial: String,
    pub c1: String,
    pub b1: String,
    pub b2: String,
    pub d1: String,
    pub m1: String,
    pub e: String,
}

/// Build the cascaded merge fixture.
pub fn graph_fixture() -> GraphFixture {
    let dir = setup_repo();
    let root = dir.path();
    let initial = rev(root, "HEAD");

    // Side branch c: disjoint + conflicting edits in one commit.
    git(root, &["checkout", "--quiet", "--detach", &initial]);
    std::fs::write(root.join("f3.txt"), "C\n").unwrap();
    std::fs::write(root.join("f5.txt"), "C\n").unwrap();
    git(root, &["add", "-A"]);
    git(root, &["commit", "--quiet", "-m", "c: set f3 and f5"]);
    let c1 = rev(root, "HEAD");

    // Branch b: conflicting edit, then an ours-preferring merge of c.
    git(root, &["checkout", "--quiet", "--detach", &initial]);
    let b1 = commit_file(root, "f3.txt", "B\n", "b: set f3");
    git(root, &["merge", "--quiet", "--no-edit", "-Xours", &c1]);
    let b2 = rev(root, "HEAD");

    // d continues on top of the merge.
    let d1 = commit_file(root, "f3.txt", "D\n", "d: set f3");

    // Mainline m: an unrelated docs commit.
    git(root, &["checkout", "--quiet", "--detach", &initial]);
    let m1 = commit_file(root, "README.md", "docs\n", "m: add readme");

    // E merges the whole b/c/d subgraph into the mainline (clean).
    git(root, &["merge", "--quiet", "--no-edit", &d1]);
    let e = rev(root, "HEAD");

    // Leave main pointing at the full history.
    git(root, &["branch", "--force", "main", &e]);
    git(root, &["checkout", "--quiet", "main"]);

    GraphFixture {
        dir,
        initial,
        c1,
        b1,
        b2,
        d1,
        m1,
        e,
    }
}

/// A merge whose recorded tree matches neither side's strategy result:
/// both sides edit `f3`, the user resolves to `Z`.
///
/// Returns `(dir, left, right, merge)`.
pub fn manual_resolution_fixture() -> (TempDir, String, String, String) {
    let dir = setup_repo();
    let root = dir.path();
    let initial = rev(root, "HEAD");

    git(root, &["checkout", "--quiet", "--detach", &initial]);
    let left = commit_file(root, "f3.txt", "L\n", "left: set f3");

    git(root, &["checkout", "--quiet", "--detach", &initial]);
    let right = commit_file(root, "f3.txt", "R\n", "right: set f3");

    git(root, &["checkout", "--quiet", "--detach", &left]);
    let out = try_git(root, &["merge", "--no-edit", &right]);
    assert!(!out.status.success(), "merge should conflict");
    std::fs::write(root.join("f3.txt"), "Z\n").unwrap();
    git(root, &["add", "-A"]);
    git(root, &["commit", "--quiet", "--no-edit"]);
    let merge = rev(root, "HEAD");

    git(root, &["branch", "--force", "main", &merge]);
    git(root, &["checkout", "--quiet", "main"]);

    (dir, left, right, merge)
}
