//! Typed git subprocess wrapper.
//!
//! Every git operation the engine consumes goes through [`GitRepo`]; raw
//! output is parsed by dedicated functions rather than split ad hoc at call
//! sites. Operations that can legitimately "fail" as part of normal control
//! flow (merges, cherry-picks, rebases) are exposed as `try_*` methods
//! returning `Ok(bool)`, so the caller can abort and fall back without
//! string-matching stderr.

use std::fmt;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use crate::model::{CommitId, TreeId};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from the git wrapper.
#[derive(Debug)]
pub enum GitError {
    /// A git command failed.
    GitCommand {
        command: String,
        stderr: String,
        exit_code: Option<i32>,
    },
    /// An I/O error spawning or talking to git.
    Io(std::io::Error),
    /// Git returned an object id that failed validation.
    InvalidObjectId { context: String, raw: String },
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitCommand {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::Io(e) => write!(f, "I/O error running git: {e}"),
            Self::InvalidObjectId { context, raw } => {
                write!(f, "git returned an invalid object id while {context}: '{raw}'")
            }
        }
    }
}

impl std::error::Error for GitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GitError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Parsed output types
// ---------------------------------------------------------------------------

/// One line of `git rev-list --parents`: a commit and its actual parents
/// (parents are listed even when the limits exclude them from the range).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevEntry {
    pub id: CommitId,
    pub parents: Vec<CommitId>,
}

/// Result of `git merge-tree --write-tree`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeTreeResult {
    /// The computed merge tree (with conflict markers baked in when not
    /// clean).
    pub tree: TreeId,
    /// Whether the merge completed without conflicts.
    pub clean: bool,
}

// ---------------------------------------------------------------------------
// GitRepo
// ---------------------------------------------------------------------------

/// A handle on a git repository, addressed by its working-tree root.
pub struct GitRepo {
    root: PathBuf,
}

impl GitRepo {
    /// Open a repository at a known root. No validation is performed; the
    /// first git invocation surfaces any problem.
    #[must_use]
    pub fn open(root: PathBuf) -> Self {
        Self { root }
    }

    /// Discover the repository containing the current working directory.
    ///
    /// # Errors
    /// Fails when the current directory is not inside a git working tree.
    pub fn discover() -> Result<Self, GitError> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .map_err(GitError::Io)?;
        if !output.status.success() {
            return Err(command_error(&["rev-parse", "--show-toplevel"], &output));
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok(Self {
            root: PathBuf::from(root),
        })
    }

    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    // -- command plumbing ---------------------------------------------------

    fn raw(&self, args: &[&str]) -> Result<Output, GitError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(GitError::Io)
    }

    /// Run a git command and return its stdout; non-zero exit is an error.
    fn git_stdout(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.raw(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(command_error(args, &output))
        }
    }

    /// Run a git command, ignoring output.
    fn git_run(&self, args: &[&str]) -> Result<(), GitError> {
        self.git_stdout(args)?;
        Ok(())
    }

    /// Run a git command whose non-zero exit is an expected outcome
    /// (conflict, no-op). Returns whether it succeeded.
    fn git_try(&self, args: &[&str]) -> Result<bool, GitError> {
        let output = self.raw(args)?;
        Ok(output.status.success())
    }

    /// Run a git command, swallowing any failure. Used for best-effort
    /// aborts where "nothing in progress" is fine.
    fn git_best_effort(&self, args: &[&str]) {
        let _ = self.raw(args);
    }

    // -- queries ------------------------------------------------------------

    /// Resolve a revision to a commit id.
    pub fn rev_parse(&self, rev: &str) -> Result<CommitId, GitError> {
        let out = self.git_stdout(&["rev-parse", "--verify", &format!("{rev}^{{commit}}")])?;
        parse_commit_id(out.trim(), "resolving a revision")
    }

    /// The current HEAD commit.
    pub fn head(&self) -> Result<CommitId, GitError> {
        self.rev_parse("HEAD")
    }

    /// The tree of a revision.
    pub fn tree_of(&self, rev: &str) -> Result<TreeId, GitError> {
        let out = self.git_stdout(&["rev-parse", "--verify", &format!("{rev}^{{tree}}")])?;
        TreeId::new(out.trim()).map_err(|_| GitError::InvalidObjectId {
            context: "resolving a tree".to_owned(),
            raw: out.trim().to_owned(),
        })
    }

    /// The parents of a commit, in order (first parent = mainline).
    pub fn parents(&self, commit: &CommitId) -> Result<Vec<CommitId>, GitError> {
        let out = self.git_stdout(&["rev-list", "--parents", "-n", "1", commit.as_str()])?;
        let entries = parse_rev_list_parents(&out)?;
        entries
            .into_iter()
            .next()
            .map(|e| e.parents)
            .ok_or_else(|| GitError::InvalidObjectId {
                context: "listing parents".to_owned(),
                raw: out.trim().to_owned(),
            })
    }

    /// `rev-list --topo-order --parents <head> ^<limit>…`, newest first.
    pub fn rev_list(
        &self,
        head: &CommitId,
        limits: &[CommitId],
    ) -> Result<Vec<RevEntry>, GitError> {
        let mut args = vec![
            "rev-list".to_owned(),
            "--topo-order".to_owned(),
            "--parents".to_owned(),
            head.as_str().to_owned(),
        ];
        for l in limits {
            args.push(format!("^{}", l.as_str()));
        }
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.git_stdout(&refs)?;
        parse_rev_list_parents(&out)
    }

    /// The boundary commits of `rev-list <head> ^<limit>…`: the excluded
    /// frontier adjacent to the range.
    pub fn boundary(
        &self,
        head: &CommitId,
        limits: &[CommitId],
    ) -> Result<Vec<CommitId>, GitError> {
        let mut args = vec![
            "rev-list".to_owned(),
            "--topo-order".to_owned(),
            "--boundary".to_owned(),
            head.as_str().to_owned(),
        ];
        for l in limits {
            args.push(format!("^{}", l.as_str()));
        }
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.git_stdout(&refs)?;
        parse_boundary(&out)
    }

    /// Whether `ancestor` is an ancestor of `descendant` (a commit counts
    /// as its own ancestor).
    pub fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> Result<bool, GitError> {
        let args = [
            "merge-base",
            "--is-ancestor",
            ancestor.as_str(),
            descendant.as_str(),
        ];
        let output = self.raw(&args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(command_error(&args, &output)),
        }
    }

    /// Compute the default three-way merge of `right` onto `left` without
    /// touching the working tree.
    pub fn merge_tree(&self, left: &CommitId, right: &CommitId) -> Result<MergeTreeResult, GitError> {
        let args = [
            "merge-tree",
            "--write-tree",
            left.as_str(),
            right.as_str(),
        ];
        let output = self.raw(&args)?;
        let clean = match output.status.code() {
            Some(0) => true,
            // Exit 1 means the merge has conflicts; the tree is still
            // written (with markers) on the first output line.
            Some(1) => false,
            _ => return Err(command_error(&args, &output)),
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        let tree = parse_merge_tree(&stdout)?;
        Ok(MergeTreeResult { tree, clean })
    }

    /// Full commit message (subject and body) of a commit.
    pub fn commit_message(&self, commit: &CommitId) -> Result<String, GitError> {
        self.git_stdout(&["log", "-n", "1", "--format=%B", commit.as_str()])
    }

    /// The checked-out branch name, or `None` when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<String>, GitError> {
        let out = self.git_stdout(&["branch", "--show-current"])?;
        let name = out.trim();
        Ok(if name.is_empty() {
            None
        } else {
            Some(name.to_owned())
        })
    }

    /// Whether the working tree or index differs from HEAD (untracked files
    /// excluded, matching what a stash snapshot would capture).
    pub fn is_dirty(&self) -> Result<bool, GitError> {
        let out = self.git_stdout(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(!out.trim().is_empty())
    }

    // -- working-tree mutations --------------------------------------------

    /// Detach HEAD at a revision.
    pub fn checkout_detach(&self, rev: &str) -> Result<(), GitError> {
        self.git_run(&["checkout", "--quiet", "--detach", rev])
    }

    /// Check out a branch by name.
    pub fn checkout_branch(&self, name: &str) -> Result<(), GitError> {
        self.git_run(&["checkout", "--quiet", name])
    }

    /// Force-move a branch ref to a target commit.
    pub fn branch_force(&self, name: &str, target: &CommitId) -> Result<(), GitError> {
        self.git_run(&["branch", "--force", name, target.as_str()])
    }

    pub fn reset_hard(&self, rev: &str) -> Result<(), GitError> {
        self.git_run(&["reset", "--quiet", "--hard", rev])
    }

    pub fn reset_soft(&self, rev: &str) -> Result<(), GitError> {
        self.git_run(&["reset", "--quiet", "--soft", rev])
    }

    /// Materialize the dirty working state as a commit without modifying
    /// the working tree. Returns `None` when there is nothing to snapshot.
    pub fn stash_create(&self) -> Result<Option<CommitId>, GitError> {
        let out = self.git_stdout(&["stash", "create"])?;
        let oid = out.trim();
        if oid.is_empty() {
            return Ok(None);
        }
        parse_commit_id(oid, "creating a stash snapshot").map(Some)
    }

    /// Register a stash-create commit in the stash list so it survives as
    /// a recoverable entry.
    pub fn stash_store(&self, oid: &CommitId, message: &str) -> Result<(), GitError> {
        self.git_run(&["stash", "store", "-m", message, oid.as_str()])
    }

    /// Re-apply a stash snapshot onto the working tree.
    pub fn stash_apply(&self, oid: &CommitId) -> Result<(), GitError> {
        self.git_run(&["stash", "apply", "--quiet", oid.as_str()])
    }

    // -- replay primitives --------------------------------------------------

    /// Merge a commit into HEAD, always creating a merge commit, optionally
    /// with an `-X` strategy option (`"ours"` / `"theirs"`). Returns whether
    /// the merge completed.
    pub fn try_merge(&self, rev: &CommitId, xopt: Option<&str>) -> Result<bool, GitError> {
        let mut args = vec!["merge", "--no-ff", "--no-edit", "--no-verify"];
        let xarg;
        if let Some(opt) = xopt {
            xarg = format!("-X{opt}");
            args.push(&xarg);
        }
        args.push(rev.as_str());
        self.git_try(&args)
    }

    /// Merge a commit into HEAD with the default strategy, surfacing the
    /// failure (with git's stderr) as an error. Used where a conflict is
    /// fatal rather than a fallback trigger.
    pub fn merge_default(&self, rev: &CommitId) -> Result<(), GitError> {
        self.git_run(&["merge", "--no-edit", "--no-verify", rev.as_str()])
    }

    /// Abort an in-progress merge, if any.
    pub fn merge_abort(&self) {
        self.git_best_effort(&["merge", "--abort"]);
    }

    /// Cherry-pick a commit, preserving empty and redundant commits.
    /// `mainline` selects the parent for merge-commit picks. Returns
    /// whether the pick completed.
    pub fn try_cherry_pick(
        &self,
        commit: &CommitId,
        xopt: Option<&str>,
        mainline: Option<u32>,
    ) -> Result<bool, GitError> {
        let mut args: Vec<String> = vec![
            "cherry-pick".to_owned(),
            "--allow-empty".to_owned(),
            "--keep-redundant-commits".to_owned(),
        ];
        if let Some(m) = mainline {
            args.push("-m".to_owned());
            args.push(m.to_string());
        }
        if let Some(opt) = xopt {
            args.push(format!("-X{opt}"));
        }
        args.push(commit.as_str().to_owned());
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git_try(&refs)
    }

    /// Abort an in-progress cherry-pick, if any.
    pub fn cherry_pick_abort(&self) {
        self.git_best_effort(&["cherry-pick", "--abort"]);
    }

    /// Straight rebase of `(base, tip]` onto `onto`, keeping commits that
    /// become empty. Leaves HEAD detached at the rebased tip on success.
    pub fn try_rebase_onto(
        &self,
        onto: &CommitId,
        base: &CommitId,
        tip: &CommitId,
    ) -> Result<bool, GitError> {
        self.git_try(&[
            "rebase",
            "--quiet",
            "--empty=keep",
            "--onto",
            onto.as_str(),
            base.as_str(),
            tip.as_str(),
        ])
    }

    /// Abort an in-progress rebase, if any.
    pub fn rebase_abort(&self) {
        self.git_best_effort(&["rebase", "--abort"]);
    }

    /// The full-index binary patch transforming `a`'s tree into `b`'s.
    pub fn diff_patch(&self, a: &str, b: &str) -> Result<String, GitError> {
        self.git_stdout(&["diff", "--full-index", "--binary", a, b])
    }

    /// Apply a patch to the index and working tree. Empty patches are
    /// accepted.
    pub fn apply_patch(&self, patch: &str) -> Result<(), GitError> {
        let mut child = Command::new("git")
            .args(["apply", "--index", "--allow-empty", "--whitespace=nowarn"])
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(GitError::Io)?;
        child
            .stdin
            .as_mut()
            .expect("stdin was piped")
            .write_all(patch.as_bytes())
            .map_err(GitError::Io)?;
        let output = child.wait_with_output().map_err(GitError::Io)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(command_error(&["apply", "--index", "--allow-empty"], &output))
        }
    }

    /// Commit the index with a message, bypassing hooks.
    pub fn commit(&self, message: &str, allow_empty: bool) -> Result<(), GitError> {
        let mut args = vec!["commit", "--quiet", "--no-verify", "-m", message];
        if allow_empty {
            args.push("--allow-empty");
        }
        self.git_run(&args)
    }
}

fn command_error(args: &[&str], output: &Output) -> GitError {
    GitError::GitCommand {
        command: format!("git {}", args.join(" ")),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        exit_code: output.status.code(),
    }
}

fn parse_commit_id(raw: &str, context: &str) -> Result<CommitId, GitError> {
    CommitId::new(raw).map_err(|_| GitError::InvalidObjectId {
        context: context.to_owned(),
        raw: raw.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Output parsers
// ---------------------------------------------------------------------------

/// Parse `git rev-list --parents` output: one line per commit, the commit
/// id followed by its parent ids, newest first.
fn parse_rev_list_parents(output: &str) -> Result<Vec<RevEntry>, GitError> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut tokens = line.split_ascii_whitespace();
        let id = parse_commit_id(
            tokens.next().unwrap_or_default(),
            "parsing rev-list output",
        )?;
        let mut parents = Vec::new();
        for tok in tokens {
            parents.push(parse_commit_id(tok, "parsing rev-list parents")?);
        }
        entries.push(RevEntry { id, parents });
    }
    Ok(entries)
}

/// Parse `git rev-list --boundary` output, keeping only the `-`-prefixed
/// boundary commits.
fn parse_boundary(output: &str) -> Result<Vec<CommitId>, GitError> {
    let mut bases = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if let Some(id) = line.strip_prefix('-') {
            bases.push(parse_commit_id(id, "parsing boundary commits")?);
        }
    }
    Ok(bases)
}

/// Parse `git merge-tree --write-tree` output: the first line is the
/// resulting tree id (conflict details follow when the merge was not
/// clean).
fn parse_merge_tree(output: &str) -> Result<TreeId, GitError> {
    let first = output.lines().next().unwrap_or_default().trim();
    TreeId::new(first).map_err(|_| GitError::InvalidObjectId {
        context: "parsing merge-tree output".to_owned(),
        raw: first.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
