//! Binary entrypoint for the Villehaven CLI.
//!
//! Commands:
//! - `init` - write a starter config file
//! - `create [--instance <id>]` - initialize a game instance (random uuid when omitted)
//! - `join`, `act`, `challenge`, `event`, `adopt` - play as a user
//! - `status [--user <name>]` - print the instance (or a player's view) as JSON
//! - `leaderboard [--top <n>] [--all]` - print the top players
//! - `daily-reset`, `weekly` - run maintenance jobs
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;

use villehaven::config::Config;
use villehaven::metrics;
use villehaven::validation::{validate_instance_id, validate_username};
use villehaven::village::{start_maintenance, ActionKind, ActionOutcome, MaintenanceJob, PetKind, Village};

#[derive(Parser)]
#[command(name = "villehaven")]
#[command(about = "Shared-state village engine: sharded players, quests and community progress")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "villehaven.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Initialize a game instance
    Create {
        #[arg(short, long)]
        instance: Option<String>,
    },
    /// Join the village
    Join {
        #[arg(short, long)]
        instance: String,
        #[arg(short, long)]
        user: String,
    },
    /// Perform a player action (plant, clean, help, learn)
    Act {
        #[arg(short, long)]
        instance: String,
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        action: String,
        #[arg(long, default_value_t = 1)]
        amount: u32,
    },
    /// Take part in today's challenge
    Challenge {
        #[arg(short, long)]
        instance: String,
        #[arg(short, long)]
        user: String,
    },
    /// Take part in a community event
    Event {
        #[arg(short, long)]
        instance: String,
        #[arg(short, long)]
        user: String,
        #[arg(long)]
        id: String,
    },
    /// Adopt a pet (cat, dog, bird, rabbit)
    Adopt {
        #[arg(short, long)]
        instance: String,
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        pet: String,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Show instance status, or a player's snapshot with --user
    Status {
        #[arg(short, long)]
        instance: String,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Show the top players
    Leaderboard {
        #[arg(short, long)]
        instance: String,
        #[arg(short, long, default_value_t = 10)]
        top: usize,
        /// Rank every player from the score index instead of the bounded board
        #[arg(long)]
        all: bool,
    },
    /// Refresh the daily challenge, recount players and rotate ended events
    DailyReset {
        #[arg(short, long)]
        instance: String,
    },
    /// Recount players, check shard capacity and post weekly stats
    Weekly {
        #[arg(short, long)]
        instance: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        Config::create_default(&cli.config).await?;
        println!("Created default configuration at {}", cli.config);
        return Ok(());
    }

    let config = Config::load(&cli.config).await?;
    init_logging(&config, cli.verbose);
    info!("Villehaven v{} using {}", env!("CARGO_PKG_VERSION"), config.storage.data_dir);
    let village = Village::open(&config.storage.data_dir, config.engine.clone())?;

    match cli.command {
        Commands::Init => {}
        Commands::Create { instance } => {
            let instance = instance.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            validate_instance_id(&instance)?;
            if village.is_initialized(&instance) {
                println!("Instance {} already exists", instance);
            } else if village.initialize_instance(&instance) {
                println!("Created instance {}", instance);
            } else {
                return Err(anyhow!("failed to initialize {}", instance));
            }
        }
        Commands::Join { instance, user } => {
            let (instance, user) = identify(&instance, &user)?;
            finish(village.join(instance, user))?;
        }
        Commands::Act {
            instance,
            user,
            action,
            amount,
        } => {
            let (instance, user) = identify(&instance, &user)?;
            let action = ActionKind::parse(&action).ok_or_else(|| anyhow!("unknown action '{}'", action))?;
            finish(village.perform_action(instance, user, action, amount))?;
        }
        Commands::Challenge { instance, user } => {
            let (instance, user) = identify(&instance, &user)?;
            finish(village.participate_in_daily_challenge(instance, user))?;
        }
        Commands::Event { instance, user, id } => {
            let (instance, user) = identify(&instance, &user)?;
            finish(village.participate_in_event(instance, user, &id))?;
        }
        Commands::Adopt {
            instance,
            user,
            pet,
            name,
        } => {
            let (instance, user) = identify(&instance, &user)?;
            let kind = PetKind::parse(&pet).ok_or_else(|| anyhow!("unknown pet '{}'", pet))?;
            finish(village.adopt_pet(instance, user, kind, name.as_deref()))?;
        }
        Commands::Status { instance, user } => {
            validate_instance_id(&instance)?;
            match user {
                Some(user) => {
                    validate_username(&user)?;
                    let snapshot = village
                        .snapshot(&instance, &user)
                        .ok_or_else(|| anyhow!("instance {} is not available", instance))?;
                    print_json(&snapshot)?;
                }
                None => {
                    let overview = village
                        .overview(&instance)
                        .ok_or_else(|| anyhow!("instance {} is not available", instance))?;
                    print_json(&serde_json::json!({
                        "overview": overview,
                        "metrics": metrics::snapshot(),
                    }))?;
                }
            }
        }
        Commands::Leaderboard { instance, top, all } => {
            validate_instance_id(&instance)?;
            if all {
                for (i, entry) in village.score_ranking(&instance, top).iter().enumerate() {
                    println!("{:>3}. {:<24} {:>8}", i + 1, entry.member, entry.score);
                }
            } else {
                for (i, entry) in village.leaderboard(&instance, top).iter().enumerate() {
                    println!("{:>3}. {:<24} {:>8}", i + 1, entry.username, entry.total_points);
                }
            }
        }
        Commands::DailyReset { instance } => {
            validate_instance_id(&instance)?;
            run_job(village, &instance, MaintenanceJob::DailyReset).await?;
        }
        Commands::Weekly { instance } => {
            validate_instance_id(&instance)?;
            run_job(village, &instance, MaintenanceJob::WeeklyMaintenance).await?;
        }
    }

    Ok(())
}

fn identify<'a>(instance: &'a str, user: &'a str) -> Result<(&'a str, &'a str)> {
    Ok((validate_instance_id(instance)?, validate_username(user)?))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn finish(outcome: ActionOutcome) -> Result<()> {
    println!("{}", outcome.message);
    if let Some(player) = &outcome.player {
        println!(
            "{}: {} env / {} social / {} personal, {} actions",
            player.username,
            player.stats.environmental,
            player.stats.social,
            player.stats.personal,
            player.stats.total_actions
        );
    }
    if outcome.success {
        Ok(())
    } else {
        Err(anyhow!("request was not completed"))
    }
}

async fn run_job(village: Village, instance: &str, job: MaintenanceJob) -> Result<()> {
    let handle = start_maintenance(Arc::new(village));
    let report = handle.run(instance, job).await?;
    handle.shutdown().await;
    print_json(&report)
}

fn init_logging(config: &Config, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .logging
            .level
            .parse::<log::LevelFilter>()
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config.logging.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    match file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Mirror to the console only when attached to a terminal
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
