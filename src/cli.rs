//! 명령줄 인자 정의
//!
//! ```text
//! hs-updater update <payload> <target_dir> [--pid=N] [--pause[=FLAG]] [--main-program=PATH] [--gui]
//! hs-updater check <current_version> [-d] [-n] [-i] [-r gitee|github]
//! hs-updater latest [-d] [-n] [-i] [-r gitee|github]
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use hs_updater_lib::SourceKind;

/// hs-updater - Hearthstone-Script updater
#[derive(Parser, Debug)]
#[command(name = "hs-updater")]
#[command(about = "Installs Hearthstone-Script updates and checks for new releases")]
#[command(version)]
pub struct Cli {
    /// Settings file (overrides the default lookup)
    #[arg(long, global = true, hide = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply an update package to an installation
    Update(UpdateArgs),
    /// Compare a version against the latest release
    Check(CheckArgs),
    /// Show the latest release
    Latest(ReleaseArgs),
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Update package: a zip archive or an extracted directory
    pub payload: PathBuf,

    /// Installation directory to update
    pub target_dir: PathBuf,

    /// Wait for this process to exit before touching files
    #[arg(long, require_equals = true)]
    pub pid: Option<u32>,

    /// Forwarded to the restarted program as --pause=<FLAG>
    #[arg(long, require_equals = true, num_args = 0..=1, default_missing_value = "true")]
    pub pause: Option<String>,

    /// Program to start after a successful update
    #[arg(long = "main-program", require_equals = true)]
    pub main_program: Option<PathBuf>,

    /// Show the progress window instead of console output
    #[arg(long)]
    pub gui: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReleaseArgs {
    /// Include preview (pre-release) builds
    #[arg(short = 'd', long = "dev")]
    pub dev: bool,

    /// Native build instead of the JVM build
    #[arg(short = 'n', long = "native")]
    pub native: bool,

    /// Print a readable report instead of JSON
    #[arg(short = 'i', long = "interactive")]
    pub interactive: bool,

    /// Release repository
    #[arg(short = 'r', long = "repo")]
    pub repo: Option<SourceKind>,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Installed version tag, e.g. v4.2.1-GA
    pub current_version: String,

    #[command(flatten)]
    pub release: ReleaseArgs,
}
