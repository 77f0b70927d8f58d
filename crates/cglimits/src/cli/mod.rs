//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::time::Duration;

use cglimits_common::SysPaths;
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::Limits;
use crate::pressure::Threshold;

/// cglimits - inspect the cgroup limits of this process
#[derive(Parser)]
#[command(name = "cglimits")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Filesystem root that /proc and /sys are resolved under
    #[arg(long, global = true, env = "CGLIMITS_ROOT", default_value = "/")]
    pub root: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show the CPU quota and period
    Cpu,

    /// Show the memory soft and hard limits
    Memory,

    /// Show where the unified hierarchy is mounted
    Mount,

    /// Print a line whenever memory pressure crosses the threshold
    Watch {
        /// Stall time per 10s window, in milliseconds
        #[arg(long, default_value_t = 100)]
        threshold_ms: u64,

        /// Polling tick in milliseconds, when a trigger cannot be armed
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let limits = Limits::detect(SysPaths::with_root(&self.root));

        match self.command {
            Commands::Cpu => {
                let quota = limits.cpu_quota()?;
                if self.json {
                    println!(
                        "{}",
                        json!({ "quota": quota, "cores": quota.cores() })
                    );
                } else if let Some(cores) = quota.cores() {
                    println!(
                        "quota={} period={} ({cores:.2} CPUs)",
                        quota.quota, quota.period
                    );
                } else {
                    println!("unlimited");
                }
                Ok(())
            }

            Commands::Memory => {
                let memory = limits.memory_limits()?;
                if self.json {
                    println!("{}", serde_json::to_string(&memory)?);
                } else if memory.is_unlimited() {
                    println!("unlimited");
                } else {
                    println!(
                        "high={} max={}",
                        bound(memory.high()),
                        bound(memory.max())
                    );
                }
                Ok(())
            }

            Commands::Mount => {
                let mount = limits.mount();
                if self.json {
                    println!(
                        "{}",
                        json!({
                            "root": mount.root,
                            "path": mount.relative_path,
                            "v2_enabled": mount.v2_enabled,
                            "read_only": mount.read_only,
                        })
                    );
                } else {
                    println!(
                        "root={} path={} v2={} read_only={}",
                        mount.root.display(),
                        mount.relative_path.display(),
                        mount.v2_enabled,
                        mount.read_only
                    );
                }
                Ok(())
            }

            Commands::Watch {
                threshold_ms,
                interval_ms,
            } => {
                let threshold = Threshold::new(Duration::from_millis(threshold_ms))?;
                let cancel = CancellationToken::new();
                let mut events = limits
                    .pressure_monitor(threshold)
                    .with_poll_interval(Duration::from_millis(interval_ms))
                    .watch(cancel.clone())?;

                if let Some(strategy) = events.strategy() {
                    tracing::info!(%strategy, %threshold, "watching memory pressure");
                }

                let interrupt = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        interrupt.cancel();
                    }
                });

                while events.recv().await.is_some() {
                    if self.json {
                        println!("{}", json!({ "event": "memory_pressure" }));
                    } else {
                        println!("memory pressure");
                    }
                }

                if !cancel.is_cancelled() {
                    return Err(color_eyre::eyre::eyre!("pressure watch stopped unexpectedly"));
                }
                Ok(())
            }
        }
    }
}

fn bound(value: Option<u64>) -> String {
    value.map_or_else(|| "max".to_string(), |v| v.to_string())
}
