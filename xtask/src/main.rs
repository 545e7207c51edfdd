//! Sunder development tasks
//!
//! Run with: cargo xtask <command>

use clap::{Parser, Subcommand};
use std::process::Command;

/// Targets defined in fuzz/Cargo.toml
const FUZZ_TARGETS: &[&str] = &["fuzz_plan", "fuzz_segment_name", "fuzz_copy"];

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Sunder development tasks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Format check, clippy and the whole test suite
    Ci,

    /// Run the split/join benchmarks
    Bench,

    /// Run fuzz targets (requires cargo-fuzz and nightly)
    Fuzz {
        /// Single target to run; all targets when omitted
        target: Option<String>,

        /// Time budget per target in seconds
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },
}

fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Commands::Ci => {
            cargo(&["fmt", "--all", "--check"])?;
            cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
            cargo(&["test", "--workspace"])?;
            println!("CI checks passed");
        }
        Commands::Bench => {
            cargo(&["bench", "-p", "sunder-files"])?;
        }
        Commands::Fuzz { target, seconds } => {
            let targets: Vec<&str> = match target.as_deref() {
                Some(name) if FUZZ_TARGETS.contains(&name) => vec![name],
                Some(name) => anyhow::bail!(
                    "unknown fuzz target {name}, expected one of: {}",
                    FUZZ_TARGETS.join(", ")
                ),
                None => FUZZ_TARGETS.to_vec(),
            };

            let max_time = format!("-max_total_time={seconds}");
            for name in targets {
                println!("Fuzzing {name} for {seconds}s");
                cargo(&["+nightly", "fuzz", "run", name, "--", &max_time])?;
            }
        }
    }

    Ok(())
}

fn cargo(args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new("cargo").args(args).status()?;

    if !status.success() {
        anyhow::bail!("cargo {} failed", args.join(" "));
    }

    Ok(())
}
