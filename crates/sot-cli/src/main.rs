mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sot_core::config::get_data_dir;
use sot_storage::Strictness;

use commands::{config, data, host, score, session};

#[derive(Parser)]
#[command(name = "sot")]
#[command(about = "Stay On Track: keep browser tabs on your focus goal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a focus session in the running host
    Start {
        /// What you want to focus on
        #[arg(short, long)]
        goal: String,
        /// soft warns only, hard also closes off-topic tabs
        #[arg(short, long)]
        strictness: Option<Strictness>,
        /// Minimum relevance score (0 to 1) for a tab to count as on topic
        #[arg(short, long)]
        threshold: Option<f64>,
    },
    /// End the active focus session
    End,
    /// Show the host and the active session
    Status,
    /// Keep a tab that is scheduled to close ("continue anyway")
    Cancel {
        /// Browser tab id
        tab_id: i64,
    },
    /// Close a tab now
    Close {
        /// Browser tab id
        tab_id: i64,
    },
    /// Score a page against a goal without a running host
    Score {
        #[arg(short, long)]
        goal: String,
        #[arg(long)]
        title: String,
        #[arg(short, long)]
        url: String,
        #[arg(long, default_value_t = sot_relevance::DEFAULT_THRESHOLD)]
        threshold: f64,
    },
    /// Settings management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataAction,
    },
    /// Run as the browser's native messaging host
    Host {
        /// Caller origin passed by the browser
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
        origin: Vec<String>,
    },
    /// Stop the running host
    Stop,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show all settings
    Show,
    /// Get one setting
    Get { key: String },
    /// Set one setting
    Set { key: String, value: String },
    /// Restore the default settings
    Reset,
}

#[derive(Subcommand, Debug)]
enum DataAction {
    /// Delete the saved session and all settings
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Browsers launch the host directly with the extension origin as the only argument
    let args: Vec<String> = std::env::args().collect();
    if host::launched_by_browser(&args) {
        return host::run_host(&args[1..]).await;
    }

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Host { .. }) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .init();
    }

    let data_dir = get_data_dir()?;
    let sock_path = data_dir.join("sot.sock");

    match cli.command {
        Commands::Start {
            goal,
            strictness,
            threshold,
        } => session::start_session(&sock_path, goal, strictness, threshold).await,
        Commands::End => session::end_session(&sock_path).await,
        Commands::Status => session::show_status(&sock_path).await,
        Commands::Cancel { tab_id } => session::cancel_closure(&sock_path, tab_id).await,
        Commands::Close { tab_id } => session::close_tab(&sock_path, tab_id).await,
        Commands::Score {
            goal,
            title,
            url,
            threshold,
        } => score::handle_score(&goal, &title, &url, threshold),
        Commands::Config { action } => match action {
            ConfigAction::Show => config::handle_config_show(),
            ConfigAction::Get { key } => config::handle_config_get(&key),
            ConfigAction::Set { key, value } => config::handle_config_set(&key, &value),
            ConfigAction::Reset => config::handle_config_reset(),
        },
        Commands::Data { action } => match action {
            DataAction::Clear { yes } => data::handle_data_clear(yes),
        },
        Commands::Host { origin } => host::run_host(&origin).await,
        Commands::Stop => session::stop_host(&sock_path).await,
    }
}
