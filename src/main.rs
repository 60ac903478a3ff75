use std::fs::File;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hs_updater::cli::{Cli, Command};
use hs_updater::{commands, config};

fn main() {
    // 인자 오류도 종료 코드 1
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    let gui = matches!(&cli.command, Command::Update(args) if args.gui);
    init_logging(gui);

    if let Err(e) = run(cli) {
        eprintln!("✗ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = config::load_settings(cli.config.as_deref())?;

    match &cli.command {
        Command::Update(args) => commands::cmd_update(&settings, args),
        Command::Check(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::cmd_check(&settings, args))
        }
        Command::Latest(args) => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::cmd_latest(&settings, args))
        }
    }
}

/// 로그는 stderr로 (stdout의 JSON을 오염시키지 않음).
/// 진행 창 모드에서는 터미널을 창이 점유하므로 임시 디렉터리의 로그 파일로.
fn init_logging(gui: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if gui {
        let path = std::env::temp_dir().join("hs-updater.log");
        match File::create(&path) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_writer(Mutex::new(file))
                    .with_env_filter(filter)
                    .with_target(false)
                    .with_ansi(false)
                    .init();
                return;
            }
            Err(e) => eprintln!("⚠ Could not create log file {}: {}", path.display(), e),
        }
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
