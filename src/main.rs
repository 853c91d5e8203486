use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use linearize::engine::{self, Config, ConflictMode};
use linearize::model::CommitId;
use linearize::repo::GitRepo;
use linearize::{diag, plan, reduce, replay};

/// Flatten a branching git history into a linear, tree-identical chain
///
/// linearize rebuilds the history reachable from <head> as a sequence of
/// non-merge commits whose final tree is byte-identical to <head>'s tree.
/// Merges are flattened by replaying their side branches onto the
/// mainline; merges that cannot be reproduced by the standard three-way
/// strategy (manual conflict resolutions, ours-style merges) are repaired
/// with synthesized compensation commits.
///
/// The run is atomic: the current branch, HEAD, index, and working tree
/// are restored whether it succeeds or fails. On success the linear tip is
/// printed (or, with --update-head, checked out).
///
/// EXAMPLES:
///
///   # Print the linearized base and tip for the current branch
///   linearize
///
///   # Linearize a feature branch, stopping below main
///   linearize feature ^main
///
///   # Rewrite the current branch in place
///   linearize --update-head
#[derive(Parser)]
#[command(name = "linearize")]
#[command(version, about)]
struct Cli {
    /// Emit debug diagnostics (also: DEBUG=true)
    #[arg(long)]
    debug: bool,

    /// Recursively linearize right subgraphs before folding them in
    /// (default; also: RECURSIVE=true|false)
    #[arg(long, overrides_with = "no_recursive")]
    recursive: bool,

    /// Only flatten the merge structure, without recursing into right
    /// subgraphs
    #[arg(long, overrides_with = "recursive")]
    no_recursive: bool,

    /// How to materialize conflicted replays: 'merge' folds the
    /// compensation into one commit, 'split' keeps it separate
    /// (also: ON_CONFLICT=merge|split)
    #[arg(long, value_name = "MODE")]
    on_conflict: Option<String>,

    /// On success, hard-reset HEAD to the linearized tip instead of
    /// printing it
    #[arg(long)]
    update_head: bool,

    /// The head to linearize (default: HEAD) and ^<limit> exclusions
    #[arg(value_name = "REVISION")]
    revisions: Vec<String>,

    /// Internal entry points for testing subsystems directly:
    /// plan [--json] | reduce <commit>... | pick <commit> |
    /// resolve-merge-conflict <merge>
    #[arg(last = true, value_name = "SUBCOMMAND")]
    internal: Vec<String>,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let cfg = resolve_config(&cli)?;
    init_tracing(cfg.debug);

    let repo = GitRepo::discover().context("not inside a git repository")?;

    let (head_ref, limit_refs) = split_revisions(&cli.revisions)?;
    let head = repo
        .rev_parse(&head_ref)
        .with_context(|| format!("cannot resolve head revision '{head_ref}'"))?;
    let limits = limit_refs
        .iter()
        .map(|l| {
            repo.rev_parse(l)
                .with_context(|| format!("cannot resolve limit revision '^{l}'"))
        })
        .collect::<Result<Vec<CommitId>>>()?;

    if !cli.internal.is_empty() {
        return dispatch_internal(&repo, &cli.internal, &head, &limits, &cfg);
    }

    let result = engine::run(&repo, &head, &limits, &cfg)?;

    if cli.update_head {
        if result.base == result.tip {
            // Already linear; moving or detaching the branch would only
            // lose information.
            diag::info("history is already linear; leaving HEAD untouched");
        } else {
            if repo.is_dirty()?
                && let Some(snap) = repo.stash_create()?
            {
                repo.stash_store(&snap, "linearize: pre-update-head working-tree state")?;
                diag::warning(format!(
                    "uncommitted changes stashed before --update-head; recover them with: git stash apply {snap}"
                ));
            }
            repo.reset_hard(result.tip.as_str())?;
            diag::info(format!("HEAD reset to linearized tip {}", result.tip.short()));
        }
    } else {
        println!("{} {}", result.base, result.tip);
    }

    Ok(())
}

/// Resolve flags over environment defaults into the immutable engine
/// configuration.
fn resolve_config(cli: &Cli) -> Result<Config> {
    let debug = cli.debug || env_flag("DEBUG").unwrap_or(false);

    let recursive = if cli.recursive {
        true
    } else if cli.no_recursive {
        false
    } else {
        env_flag("RECURSIVE").unwrap_or(true)
    };

    let on_conflict = match &cli.on_conflict {
        Some(raw) => raw
            .parse::<ConflictMode>()
            .map_err(|e| anyhow::anyhow!(e))
            .context("invalid --on-conflict")?,
        None => match std::env::var("ON_CONFLICT") {
            Ok(raw) => raw
                .parse::<ConflictMode>()
                .map_err(|e| anyhow::anyhow!(e))
                .context("invalid ON_CONFLICT environment variable")?,
            Err(_) => ConflictMode::default(),
        },
    };

    Ok(Config {
        recursive,
        on_conflict,
        debug,
    })
}

fn env_flag(name: &str) -> Option<bool> {
    match std::env::var(name).ok()?.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        other => {
            diag::warning(format!("ignoring unrecognized {name}={other}"));
            None
        }
    }
}

/// Partition positional revisions into one head and the `^`-prefixed
/// limits.
fn split_revisions(revisions: &[String]) -> Result<(String, Vec<String>)> {
    let mut head: Option<String> = None;
    let mut limits = Vec::new();
    for rev in revisions {
        if let Some(limit) = rev.strip_prefix('^') {
            if limit.is_empty() {
                bail!("empty limit revision '^'");
            }
            limits.push(limit.to_owned());
        } else if let Some(existing) = &head {
            bail!("expected at most one head revision, got '{existing}' and '{rev}'");
        } else {
            head = Some(rev.clone());
        }
    }
    Ok((head.unwrap_or_else(|| "HEAD".to_owned()), limits))
}

/// Dispatch a `-- <subcommand>` internal entry point.
fn dispatch_internal(
    repo: &GitRepo,
    args: &[String],
    head: &CommitId,
    limits: &[CommitId],
    cfg: &Config,
) -> Result<()> {
    match args[0].as_str() {
        "plan" => {
            let json = args[1..].iter().any(|a| a == "--json");
            let stream = plan::plan(repo, head, limits, cfg)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stream)?);
            } else {
                for instruction in &stream {
                    println!("{instruction}");
                }
            }
            Ok(())
        }
        "reduce" => {
            if args.len() < 2 {
                bail!("usage: linearize -- reduce <commit>...");
            }
            let ids = args[1..]
                .iter()
                .map(|a| {
                    repo.rev_parse(a)
                        .with_context(|| format!("cannot resolve '{a}'"))
                })
                .collect::<Result<Vec<CommitId>>>()?;
            for id in reduce::reduce(repo, ids)? {
                println!("{id}");
            }
            Ok(())
        }
        "pick" => {
            let rev = args
                .get(1)
                .context("usage: linearize -- pick <commit>")?;
            let commit = repo
                .rev_parse(rev)
                .with_context(|| format!("cannot resolve '{rev}'"))?;
            replay::cherry_pick_compensated(repo, &commit, None, cfg)?;
            println!("{}", repo.head()?);
            Ok(())
        }
        "resolve-merge-conflict" => {
            let rev = args
                .get(1)
                .context("usage: linearize -- resolve-merge-conflict <merge>")?;
            let merge = repo
                .rev_parse(rev)
                .with_context(|| format!("cannot resolve '{rev}'"))?;
            replay::resolve_merge_conflict(repo, &merge, cfg)?;
            println!("{}", repo.head()?);
            Ok(())
        }
        other => bail!(
            "unknown internal entry point '{other}' (expected plan, reduce, pick, or resolve-merge-conflict)"
        ),
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "linearize=debug"
    } else {
        "linearize=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
