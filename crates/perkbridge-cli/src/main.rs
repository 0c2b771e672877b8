use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use perkbridge_core::{deliver_item_command, grant_rank_command, strip_namespace, CommandDispatcher, RankDuration};
use perkbridge_fs::{QueueFile, StockIndex};
use perkbridge_host::HostHandle;
use perkbridge_runner::{handle_admin_command, spawn_bridge, CommandSender, Config, MemoryWorld, PublishTrigger};

#[derive(Parser)]
#[command(name = "perkbridge", version, about = "File-mailbox bridge between a web backend and a game host")]
struct Cli {
    /// Config file (created with defaults when missing)
    #[arg(long, global = true, default_value = "perkbridge.toml")]
    config: PathBuf,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config and create the bridge directory
    Init {
        /// Bridge directory shared with the web backend
        #[arg(long)]
        dir: Option<String>,
    },

    /// Run the bridge against an in-memory world until Ctrl-C
    Serve {
        /// World description (JSON). Starts empty when the file is missing.
        #[arg(long)]
        world: PathBuf,
        /// Write the world back to the same file on shutdown
        #[arg(long, default_value_t = false)]
        save: bool,
    },

    /// Append a raw command line to the queue (producer side)
    Enqueue {
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },

    /// Queue a rank grant
    GrantRank {
        #[arg(long)]
        player: String,
        #[arg(long)]
        rank: String,
        #[arg(long, conflicts_with = "permanent", required_unless_present = "permanent")]
        days: Option<u32>,
        #[arg(long, default_value_t = false)]
        permanent: bool,
    },

    /// Queue an item delivery
    DeliverItem {
        #[arg(long)]
        player: String,
        #[arg(long)]
        item: String,
        #[arg(long, default_value_t = 1)]
        quantity: u32,
    },

    /// Show the published stock snapshot (reader side)
    Stock {
        #[arg(long)]
        shop: Option<String>,
        #[arg(long)]
        item: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.cmd {
        Command::Init { dir } => {
            let cfg = match dir {
                Some(dir) => {
                    let cfg = Config::default_for_dir(&dir);
                    cfg.save_to(&cli.config)?;
                    cfg
                }
                None => Config::load_or_init(&cli.config)?,
            };
            std::fs::create_dir_all(cfg.bridge_dir())
                .with_context(|| format!("create bridge dir {}", cfg.bridge_dir().display()))?;
            println!("Initialized perkbridge: config {} bridge {}", cli.config.display(), cfg.bridge_dir().display());
        }
        Command::Serve { world, save } => {
            let cfg = Config::load_or_init(&cli.config)?;
            let rt = tokio::runtime::Runtime::new().context("start tokio runtime")?;
            rt.block_on(serve(cfg, world, save))?;
        }
        Command::Enqueue { command } => {
            let cfg = Config::load_or_init(&cli.config)?;
            enqueue(&cfg, &command.join(" "))?;
        }
        Command::GrantRank { player, rank, days, permanent } => {
            let cfg = Config::load_or_init(&cli.config)?;
            let duration = match (permanent, days) {
                (true, _) => RankDuration::Permanent,
                (false, Some(d)) => RankDuration::Days(d),
                (false, None) => return Err(anyhow!("either --days or --permanent is required")),
            };
            enqueue(&cfg, &grant_rank_command(&player, &rank, duration))?;
        }
        Command::DeliverItem { player, item, quantity } => {
            let cfg = Config::load_or_init(&cli.config)?;
            enqueue(&cfg, &deliver_item_command(&player, &item, quantity))?;
        }
        Command::Stock { shop, item } => {
            let cfg = Config::load_or_init(&cli.config)?;
            let index = StockIndex::load(&cfg.stock_path())?;
            let rows = index
                .sorted()
                .into_iter()
                .filter(|(s, _, _)| shop.as_deref().map_or(true, |want| want == *s))
                .filter(|(_, i, _)| item.as_deref().map_or(true, |want| want == *i));
            let mut shown = 0usize;
            for (s, i, n) in rows {
                println!("{s}\t{i}\t{n}");
                shown += 1;
            }
            println!("{shown} of {} stock entries", index.len());
        }
    }

    Ok(())
}

fn enqueue(cfg: &Config, line: &str) -> Result<()> {
    strip_namespace(&cfg.commands.namespace, line).with_context(|| format!("refusing to queue {line:?}"))?;
    let queued = QueueFile::new(cfg.queue_path()).append(line)?;
    println!("Queued {} ({})", queued.id, queued.command);
    Ok(())
}

async fn serve(cfg: Config, world_path: PathBuf, save: bool) -> Result<()> {
    let world = load_world(&world_path)?;
    let (host, join) = perkbridge_host::spawn(world)?;
    let tasks = spawn_bridge(&cfg, host.clone());
    spawn_console(host.clone(), tasks.trigger.clone(), cfg.commands.namespace.clone())?;

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutdown requested");

    tasks.abort();
    host.shutdown()?;
    let world = tokio::task::spawn_blocking(move || join.join())
        .await?
        .map_err(|_| anyhow!("host thread panicked"))?;

    if save {
        world.save(&world_path)?;
        info!(path = %world_path.display(), "world saved");
    }
    Ok(())
}

fn load_world(path: &Path) -> Result<MemoryWorld> {
    if path.exists() {
        return MemoryWorld::load(path);
    }
    warn!(path = %path.display(), "world file not found; starting with an empty world");
    Ok(MemoryWorld::default())
}

/// Read console lines from stdin. `webperks ...` goes to the admin handler,
/// anything else is dispatched on the owner thread as a console command.
fn spawn_console(host: HostHandle<MemoryWorld>, trigger: PublishTrigger<MemoryWorld>, namespace: String) -> Result<()> {
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let tokens: Vec<&str> = line.split_whitespace().collect();
                let Some((&head, args)) = tokens.split_first() else { continue };

                if head.eq_ignore_ascii_case(&namespace) {
                    let reply = handle_admin_command(&CommandSender::Console, args, &trigger);
                    for l in reply.lines {
                        println!("{l}");
                    }
                    continue;
                }

                let command_line = line.trim().to_string();
                let submitted = host.submit(move |world: &mut MemoryWorld| {
                    match world.dispatch_console(&command_line) {
                        Ok(()) => info!(command = %command_line, "console command executed"),
                        Err(e) => error!(command = %command_line, error = %e, "console command failed"),
                    }
                });
                if submitted.is_err() {
                    break;
                }
            }
        })
        .context("spawn console thread")?;
    Ok(())
}
