use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use haircuts::{
    preview::DEFAULT_PREVIEW_ROWS, CacheStore, Category, Config, HaircutError, HttpPublisher,
    Manager, Period,
};
use std::{
    io::Write,
    path::PathBuf,
    process::ExitCode,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Browse and download DCV haircut files (Repos BR & External Debt)"
)]
struct Args {
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Overrides `cache_dir` from the config
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cached periods, newest first (offline)
    List { category: Category },
    /// Walk the publisher's listing for a category
    Remote {
        category: Category,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Cached file for a period, downloading it on a miss
    Get {
        category: Category,
        period: Period,
        /// Copy the file here (a directory gets the suggested file name)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Force a fresh download of a period
    Refresh { category: Category, period: Period },
    /// Print the first rows of a cached file
    Preview {
        category: Category,
        period: Period,
        #[arg(long, default_value_t = DEFAULT_PREVIEW_ROWS)]
        rows: usize,
    },
    /// Drop a cached period
    Evict { category: Category, period: Period },
    /// Read commands from stdin, one per line
    Shell,
}

/// One line typed into the interactive shell.
#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    // ─── 2) config & cache ───────────────────────────────────────────
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = args.cache_dir {
        config.cache_dir = dir;
    }
    debug!(?config, "startup");

    let publisher = HttpPublisher::new(&config)?;
    let store = CacheStore::open(&config.cache_dir)
        .with_context(|| format!("opening cache {}", config.cache_dir.display()))?;
    info!(cache = %config.cache_dir.display(), entries = store.len(), "cache ready");
    let mut manager = Manager::new(publisher, store, config.listing_url()?);

    // ─── 3) dispatch ─────────────────────────────────────────────────
    match args.command {
        Command::Shell => {
            shell(&mut manager).await?;
            Ok(ExitCode::SUCCESS)
        }
        command => match run(&mut manager, command).await {
            Ok(()) => Ok(ExitCode::SUCCESS),
            Err(e) => {
                report(&e);
                Ok(ExitCode::FAILURE)
            }
        },
    }
}

fn report(e: &HaircutError) {
    eprintln!("error [{}]: {}", e.kind(), e);
}

async fn shell(manager: &mut Manager<HttpPublisher>) -> Result<()> {
    println!("haircuts shell; type `help` for commands, `quit` to leave");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("haircuts> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "quit" | "exit" => break,
            _ => {}
        }

        let parsed = match ShellLine::try_parse_from(line.split_whitespace()) {
            Ok(parsed) => parsed,
            Err(e) => {
                // clap renders help and usage errors itself
                let _ = e.print();
                continue;
            }
        };
        if matches!(parsed.command, Command::Shell) {
            println!("already in the shell");
            continue;
        }
        // a failure on one period leaves the shell usable for the rest
        if let Err(e) = run(manager, parsed.command).await {
            report(&e);
        }
    }
    Ok(())
}

async fn run(manager: &mut Manager<HttpPublisher>, command: Command) -> Result<(), HaircutError> {
    match command {
        Command::List { category } => {
            let mut any = false;
            for period in manager.list_available(category) {
                any = true;
                let entry = manager.store().get(category, period);
                match entry {
                    Some(e) => println!(
                        "{period}  {:<28} {:>9} B  {}  {}",
                        e.file_name,
                        e.size_bytes,
                        e.convention.version(),
                        e.retrieved_at.format("%Y-%m-%d %H:%M")
                    ),
                    None => println!("{period}"),
                }
            }
            if !any {
                println!("no cached {category} files");
            }
        }
        Command::Remote { category, limit } => {
            let stream = manager.list_remote(category).await?;
            let mut stream = stream.take(limit.unwrap_or(usize::MAX)).boxed_local();
            let mut shown = 0usize;
            while let Some(item) = stream.next().await {
                shown += 1;
                let remote = match item {
                    Ok(r) => r,
                    Err(e) => {
                        report(&e);
                        continue;
                    }
                };
                let cached = if manager.store().contains(category, remote.period) {
                    "*"
                } else {
                    " "
                };
                match manager.validate(&remote) {
                    Ok(v) => println!(
                        "{cached} {}  {:<44} {}",
                        remote.period,
                        v.file_name,
                        v.convention.version()
                    ),
                    Err(e) => println!("{cached} {}  [{}] {}", remote.period, e.kind(), e),
                }
            }
            if shown == 0 {
                println!("publisher lists no {category} files");
            }
        }
        Command::Get {
            category,
            period,
            out,
        } => {
            let entry = manager.get(category, period).await?;
            println!("{}", entry.path.display());
            if let Some(out) = out {
                let written = manager.export(&entry, &out)?;
                println!("saved {}", written.display());
            }
        }
        Command::Refresh { category, period } => {
            let entry = manager.refresh(category, period).await?;
            println!(
                "{} {} refreshed: {} ({} B, {})",
                category, period, entry.file_name, entry.size_bytes, entry.convention
            );
        }
        Command::Preview {
            category,
            period,
            rows,
        } => {
            let entry = manager.get(category, period).await?;
            let table = manager.preview(&entry, rows)?;
            if table.is_empty() {
                println!("(no rows)");
            } else {
                print!("{}", table.render());
            }
        }
        Command::Evict { category, period } => match manager.evict(category, period)? {
            Some(_) => println!("evicted {category} {period}"),
            None => println!("{category} {period} was not cached"),
        },
        Command::Shell => {}
    }
    Ok(())
}
