//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "motionflash")]
#[command(
    author,
    version,
    about = "Configure, persist and bench-test packet-serial motor controllers",
    long_about = None,
    after_help = "Examples:\n  \
        motionflash list\n  \
        motionflash info --port /dev/ttyACM0 --address 0x80\n  \
        motionflash dump --port /dev/ttyACM0 --out config.json\n  \
        motionflash flash --port /dev/ttyACM0 --config config.json --verify\n  \
        motionflash test --port /dev/ttyACM0 --recipe smoke_v1 --csv"
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Controller backend, optionally with options (e.g. dummy:motion=off)
    #[arg(long, global = true, default_value = "serial")]
    pub backend: String,

    /// Extra recipe file or directory of .ron recipes
    #[arg(long, global = true)]
    pub recipes: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Device selection shared by every command that opens a session
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// Serial port path (e.g. /dev/ttyACM0)
    #[arg(long)]
    pub port: String,

    /// Packet-serial address, decimal or 0x hex (0x80-0x87 on most controllers)
    #[arg(long, default_value = "0x80")]
    pub address: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List candidate controller serial ports
    List,

    /// Read firmware information from a controller
    Info {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Take a one-shot telemetry snapshot
    Status {
        #[command(flatten)]
        target: TargetArgs,

        /// Fields to read (comma-separated)
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "battery_voltage,motor1_current,motor2_current,encoder1,encoder2"
        )]
        fields: Vec<String>,
    },

    /// Dump the controller configuration as a config v1 document
    Dump {
        #[command(flatten)]
        target: TargetArgs,

        /// Output path (e.g. config.json)
        #[arg(long)]
        out: PathBuf,
    },

    /// Apply a configuration and persist it to NVM
    Flash {
        #[command(flatten)]
        target: TargetArgs,

        /// Config document to apply
        #[arg(long)]
        config: PathBuf,

        /// Reload settings from NVM and compare
        #[arg(long)]
        verify: bool,

        /// Fail the run when verification does not pass (implies --verify)
        #[arg(long)]
        strict: bool,

        /// Directory for report artifacts
        #[arg(long, default_value = "reports")]
        report_dir: PathBuf,
    },

    /// Run a test recipe with safety limits
    Test {
        #[command(flatten)]
        target: TargetArgs,

        /// Recipe ID (see list-recipes)
        #[arg(long)]
        recipe: String,

        /// Also write the per-sample telemetry trace as CSV
        #[arg(long)]
        csv: bool,

        /// Directory for report artifacts
        #[arg(long, default_value = "reports")]
        report_dir: PathBuf,
    },

    /// List available controller backends
    ListBackends,

    /// List available test recipes
    ListRecipes,
}
