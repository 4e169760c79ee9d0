use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use build_stash::config::{self, Config};
use build_stash::domain::{MajorMinor, VersionMarker};
use build_stash::git::Git2Oracle;
use build_stash::resolver::StashRepository;
use build_stash::store::LocalStashStore;
use build_stash::topology::{build_number, CommitTopology, GitCommitTopology};
use build_stash::ui;

#[derive(Parser)]
#[command(
    name = "build-stash",
    version,
    about = "Store build artifacts by version marker and find the closest ancestor build"
)]
struct Args {
    #[arg(short, long, global = true, help = "Custom configuration file path")]
    config: Option<String>,

    #[arg(
        short = 'C',
        long,
        global = true,
        default_value = ".",
        help = "Git repository used to resolve markers"
    )]
    repo: PathBuf,

    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase log verbosity")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Complete a marker (commit, version or hash@version) from the repository
    Resolve { marker: String },

    /// Closest stored ancestor of a marker
    Closest {
        marker: String,

        #[arg(long, help = "Match by version numbers only, without the repository")]
        heuristic: bool,
    },

    /// List stored stashes
    List {
        #[arg(long, help = "Only stashes of this major.minor line")]
        line: Option<String>,
    },

    /// Store files under a marker and commit them
    Put {
        marker: String,

        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(long, default_value = ".", help = "Directory the paths are relative to")]
        from: PathBuf,
    },

    /// Print a stored file, or list the stash when no path is given
    Get {
        marker: String,

        path: Option<PathBuf>,

        #[arg(short, long, help = "Write the file here instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Remove a committed stash
    Delete { marker: String },

    /// Remove abandoned transactions and locks
    Gc,

    /// Build number of a commit relative to a base commit
    BuildNumber { base: String, commit: String },

    /// Commit with build number N on the first-parent spine of END
    FindCommit { base: String, end: String, n: i64 },

    /// Main-line version that first integrated a commit
    Landed { commit: String },
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::display_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    // 0 = warn, 1 = info, 2+ = debug; RUST_LOG wins when set
    let default_level = match args.verbose {
        0 => "build_stash=warn",
        1 => "build_stash=info",
        _ => "build_stash=debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .init();

    let config = config::load_config(args.config.as_deref()).context("Error loading config")?;
    debug!(root = %config.store.root.display(), "configuration loaded");

    match args.command {
        Command::Resolve { ref marker } => {
            let marker = parse_marker(marker)?;
            let mut topology = open_topology(&args.repo, &config)?;
            let resolved = topology.resolve(&marker)?;
            ui::display_resolved(&resolved);
        }
        Command::Closest {
            ref marker,
            heuristic,
        } => {
            let marker = parse_marker(marker)?;
            let store = LocalStashStore::open(&config.store)?;
            let closest = if heuristic {
                store.closest(&marker, None)?
            } else {
                let mut topology = open_topology(&args.repo, &config)?;
                store.closest(&marker, Some(&mut topology))?
            };
            ui::display_marker(&closest);
        }
        Command::List { ref line } => {
            let store = LocalStashStore::open(&config.store)?;
            let markers = match line {
                Some(line) => store.list_major_minor(&MajorMinor::parse(line)?)?,
                None => store.list_all()?,
            };
            ui::display_stashes(&markers);
        }
        Command::Put {
            ref marker,
            ref paths,
            ref from,
        } => {
            let marker = parse_marker(marker)?;
            put(&config, &marker, paths, from)?;
        }
        Command::Get {
            ref marker,
            ref path,
            ref output,
        } => {
            let marker = parse_marker(marker)?;
            get(&config, &marker, path.as_deref(), output.as_deref())?;
        }
        Command::Delete { ref marker } => {
            let marker = parse_marker(marker)?;
            let store = LocalStashStore::open(&config.store)?;
            if store.delete(&marker)? {
                ui::display_success(&format!("Deleted {}", marker));
            } else {
                ui::display_status(&format!("No stash stored for {}", marker));
            }
        }
        Command::Gc => {
            let store = LocalStashStore::open(&config.store)?;
            let report = store.garbage_collector(config.gc.grace_period()).collect()?;
            ui::display_gc_report(&report);
        }
        Command::BuildNumber {
            ref base,
            ref commit,
        } => {
            let mut topology = open_topology(&args.repo, &config)?;
            let cache = topology.cache();
            let base = cache.resolve(base)?;
            let commit = cache.resolve(commit)?;
            println!("{}", build_number::build_number(cache, &base, &commit)?);
        }
        Command::FindCommit {
            ref base,
            ref end,
            n,
        } => {
            let mut topology = open_topology(&args.repo, &config)?;
            let cache = topology.cache();
            let base = cache.resolve(base)?;
            let end = cache.resolve(end)?;
            println!("{}", build_number::find_commit(cache, &base, &end, n)?);
        }
        Command::Landed { ref commit } => {
            let mut topology = open_topology(&args.repo, &config)?;
            let landed = topology.landed_in(commit)?;
            ui::display_resolved(&landed);
        }
    }

    Ok(())
}

fn parse_marker(input: &str) -> Result<VersionMarker> {
    VersionMarker::from_user_input(input).with_context(|| format!("Invalid marker '{}'", input))
}

fn open_topology(repo: &Path, config: &Config) -> Result<GitCommitTopology<Git2Oracle>> {
    let oracle = Git2Oracle::open(repo)
        .with_context(|| format!("Git repository error at {}", repo.display()))?;
    Ok(GitCommitTopology::new(oracle, &config.topology)?)
}

fn put(config: &Config, marker: &VersionMarker, paths: &[PathBuf], from: &Path) -> Result<()> {
    let store = LocalStashStore::open(&config.store)?;
    // Reclaim crashed writers' leftovers while this one runs
    let gc = store
        .garbage_collector(config.gc.grace_period())
        .spawn(config.gc.interval());

    let mut stash = store.get_or_create_exact(marker)?;
    for path in paths {
        let source = from.join(path);
        let file =
            File::open(&source).with_context(|| format!("Cannot open {}", source.display()))?;
        stash.store(file, path)?;
        ui::display_status(&format!("Staged {}", path.display()));
    }
    stash.commit()?;
    gc.stop();

    ui::display_success(&format!("Stored {} files under {}", paths.len(), marker));
    Ok(())
}

fn get(
    config: &Config,
    marker: &VersionMarker,
    path: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let store = LocalStashStore::open(&config.store)?;
    let Some(found) = store.find(marker)? else {
        bail!("No stash stored for {}", marker);
    };
    let stash = store.get_or_create(&found)?;

    let Some(path) = path else {
        ui::display_entries(stash.marker(), &stash.list()?);
        return Ok(());
    };

    let Some(mut file) = stash.get(path)? else {
        bail!("{} has no entry {}", found, path.display());
    };
    match output {
        Some(output) => {
            let mut out = File::create(output)
                .with_context(|| format!("Cannot create {}", output.display()))?;
            io::copy(&mut file, &mut out)?;
            ui::display_success(&format!("Wrote {}", output.display()));
        }
        None => {
            io::copy(&mut file, &mut io::stdout().lock())?;
        }
    }
    Ok(())
}
