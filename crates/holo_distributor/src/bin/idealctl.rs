//! Offline inspection of maintenance decisions over a distributor snapshot.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use holo_distributor::{
    Bucket, BucketDbEntry, BucketId, BucketSpace, DistributorConfig, IdealStateManager,
    MaintenancePriorityAndType, NodeMaintenanceStatsTracker, Snapshot, StateChecker, SystemClock,
};

#[derive(Parser)]
#[command(name = "idealctl")]
#[command(about = "Inspect ideal-state maintenance decisions for a HoloStore snapshot", long_about = None)]
struct Args {
    /// Snapshot JSON with cluster state and bucket databases.
    #[arg(long, env = "HOLO_SNAPSHOT")]
    snapshot: PathBuf,
    /// Distributor config JSON; overrides a config embedded in the snapshot.
    #[arg(long, env = "HOLO_DISTRIBUTOR_CONFIG")]
    config: Option<PathBuf>,
    /// Distributor node index evaluating the snapshot.
    #[arg(long, env = "HOLO_NODE_INDEX", default_value_t = 0)]
    node_index: u16,
    /// Disable a state checker by name (repeatable).
    #[arg(long = "disable-checker")]
    disabled_checkers: Vec<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the HTML status fragment for every bucket space.
    Status,
    /// Print the arbitrated priority and operation type for one bucket.
    Prioritize {
        #[arg(long, default_value = "default")]
        space: BucketSpace,
        #[arg(long)]
        bucket: BucketId,
    },
    /// Print the operation(s) generated for one bucket.
    Generate {
        #[arg(long, default_value = "default")]
        space: BucketSpace,
        #[arg(long)]
        bucket: BucketId,
        /// Print one operation per checker instead of the winning one.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Prioritize every bucket and print the maintenance queue, most urgent first.
    Plan {
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    // Enable ANSI colors only when stderr is a terminal and NO_COLOR is unset.
    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let snapshot = Snapshot::from_json_file(&args.snapshot)?;
    let (repo, embedded_config) = snapshot.into_repo();
    let mut config = match &args.config {
        Some(path) => DistributorConfig::from_json_file(path)?,
        None => embedded_config.unwrap_or_default(),
    };
    let known = StateChecker::default_chain(true)
        .iter()
        .map(StateChecker::name)
        .collect::<Vec<_>>();
    for name in &args.disabled_checkers {
        if !known.contains(&name.as_str()) {
            anyhow::bail!("unknown state checker {name:?}; known: {}", known.join(", "));
        }
        config.set_state_checker_active(name, false);
    }

    let manager = IdealStateManager::new(args.node_index, config, repo, Arc::new(SystemClock));
    if !manager.i_am_up() {
        tracing::warn!(node_index = args.node_index, "distributor is not up in the snapshot cluster state");
    }

    match args.command {
        Command::Status => {
            let mut out = String::new();
            manager
                .get_bucket_status(&mut out)
                .context("render bucket status")?;
            print!("{out}");
        }
        Command::Prioritize { space, bucket } => {
            let mut stats = NodeMaintenanceStatsTracker::new();
            let decision = manager.prioritize(Bucket::new(space, bucket), &mut stats);
            println!("{}", format_decision(&decision));
        }
        Command::Generate { space, bucket, all } => {
            let bucket = Bucket::new(space, bucket);
            let operations = if all {
                let mut stats = NodeMaintenanceStatsTracker::new();
                manager.generate_all(bucket, &mut stats)
            } else {
                manager.generate(bucket).into_iter().collect()
            };
            if operations.is_empty() {
                println!("{bucket}: no maintenance needed");
            }
            for op in operations {
                println!("{op}");
            }
        }
        Command::Plan { limit } => {
            let mut stats = NodeMaintenanceStatsTracker::new();
            let mut queue = Vec::new();
            let mut total = 0;
            for (space, bucket_space) in manager.bucket_spaces().iter() {
                let mut ids = Vec::new();
                bucket_space.database().for_each(&mut |entry: &BucketDbEntry| {
                    ids.push(entry.bucket_id);
                    true
                });
                total += ids.len();
                for id in ids {
                    let bucket = Bucket::new(space, id);
                    let decision = manager.prioritize(bucket, &mut stats);
                    if decision.requires_maintenance() {
                        queue.push((bucket, decision));
                    }
                }
            }
            queue.sort_by(|a, b| b.1.priority.cmp(&a.1.priority));
            let shown = limit.unwrap_or(queue.len()).min(queue.len());
            for (bucket, decision) in &queue[..shown] {
                println!("{bucket} {}", format_decision(decision));
            }
            println!(
                "{} of {} buckets need maintenance, {} checker verdicts pending",
                queue.len(),
                total,
                stats.total_pending()
            );
            for (node, node_stats) in stats.nodes() {
                println!(
                    "node {node}: moving_out={} syncing={} copying_in={} copying_out={}",
                    node_stats.moving_out,
                    node_stats.syncing,
                    node_stats.copying_in,
                    node_stats.copying_out
                );
            }
        }
    }
    Ok(())
}

fn format_decision(decision: &MaintenancePriorityAndType) -> String {
    format!("priority={} type={}", decision.priority, decision.op_type)
}
