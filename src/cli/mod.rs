pub mod commands;
pub mod output;

use crate::errors::Result;
use crate::repo::WeaveRepo;
use clap::{Parser, Subcommand};
use commands::completions::CompletionsAction;
use commands::config::ConfigAction;
use commands::daemon::DaemonAction;
use commands::focus::FocusAction;
use commands::resolve::ResolveAction;
use commands::stack::StackAction;
use commands::workspace::WorkspaceAction;

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Parallel agent workspaces and stacked PRs on top of Jujutsu")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, remove and inspect agent workspaces
    #[command(visible_alias = "ws")]
    Workspace {
        #[command(subcommand)]
        action: WorkspaceAction,
    },

    /// Compose workspaces into the preview in the main checkout
    Focus {
        #[command(subcommand)]
        action: FocusAction,
    },

    /// Stacked bookmarks and their pull requests
    #[command(visible_alias = "s")]
    Stack {
        #[command(subcommand)]
        action: StackAction,
    },

    /// Walk conflicts left behind by a restack or sync
    Resolve {
        #[command(subcommand)]
        action: Option<ResolveAction>,
    },

    /// Background snapshot daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// Repository settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        #[command(subcommand)]
        action: CompletionsAction,
    },

    /// Print the command registry as JSON
    Commands {
        /// Only commands of this category
        #[arg(long)]
        category: Option<String>,
    },
}

/// Open the repository containing the current directory
pub(crate) fn current_repo() -> Result<WeaveRepo> {
    let cwd = std::env::current_dir()?;
    WeaveRepo::open(&cwd)
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let daemon_run = matches!(
            self.command,
            Commands::Daemon {
                action: DaemonAction::Run { .. }
            }
        );
        self.setup_logging(daemon_run);

        match self.command {
            Commands::Workspace { action } => commands::workspace::run(action),
            Commands::Focus { action } => commands::focus::run(action),
            Commands::Stack { action } => commands::stack::run(action).await,
            Commands::Resolve { action } => commands::resolve::run(action),
            Commands::Daemon { action } => commands::daemon::run(action).await,
            Commands::Config { action } => commands::config::run(action),
            Commands::Completions { action } => commands::completions::run(action),
            Commands::Commands { category } => commands::registry::run(category.as_deref()),
        }
    }

    /// The daemon logs with timestamps; interactive commands without
    fn setup_logging(&self, with_time: bool) {
        if self.no_color {
            console::set_colors_enabled(false);
        }
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        let builder = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_ansi(!self.no_color);

        let result = if with_time {
            builder.try_init()
        } else {
            builder.without_time().try_init()
        };
        if result.is_err() {
            tracing::debug!("Logging was already initialized");
        }
    }
}
