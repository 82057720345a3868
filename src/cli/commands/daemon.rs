use crate::cli::current_repo;
use crate::cli::output::Output;
use crate::config::{self, Settings};
use crate::daemon::Daemon;
use crate::errors::Result;
use crate::repo::WeaveRepo;
use clap::Subcommand;
use console::style;
use std::time::Duration;

#[derive(Debug, Subcommand)]
pub enum DaemonAction {
    /// Start the daemon in the background
    Start,

    /// Stop the running daemon
    Stop,

    /// Show whether the daemon runs and what it watches
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Run the snapshot loop in the foreground
    Run {
        /// Seconds between passes (defaults to daemon.interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
}

pub async fn run(action: DaemonAction) -> Result<()> {
    let daemon = Daemon::new(&config::get_config_dir()?);

    match action {
        DaemonAction::Start => {
            let exe = std::env::current_exe()?;
            let pid = daemon.start(&exe)?;
            Output::success(format!("Daemon started (pid {pid})"));
            Output::sub_item(format!("Log: {}", style(daemon.log_file().display()).dim()));
            Ok(())
        }
        DaemonAction::Stop => {
            let pid = daemon.stop()?;
            Output::success(format!("Daemon stopped (pid {pid})"));
            Ok(())
        }
        DaemonAction::Status { json } => {
            let status = daemon.status()?;
            if json {
                return Output::json(&status);
            }
            match status.pid {
                Some(pid) => Output::success(format!("Daemon running (pid {pid})")),
                None => Output::info("Daemon not running"),
            }
            if status.repositories.is_empty() {
                Output::sub_item("No repositories registered");
            }
            for repo in &status.repositories {
                Output::bullet(repo.display());
            }
            Ok(())
        }
        DaemonAction::Run { interval } => {
            let secs = interval.unwrap_or_else(|| {
                current_repo()
                    .map(|r| r.settings().daemon.interval_secs)
                    .unwrap_or_else(|_| Settings::default().daemon.interval_secs)
            });
            daemon
                .run(Duration::from_secs(secs.max(1)), |root| WeaveRepo::open(root))
                .await
        }
    }
}
