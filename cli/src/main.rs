mod commands;
mod config;
mod http_gateway;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_log, cmd_login, cmd_logout, cmd_onboard, cmd_settings_set, cmd_settings_show, cmd_status,
    cmd_user_add, cmd_user_list, cmd_user_revoke, cmd_watch,
};
use crate::config::{ClientProfile, Config};
use dietsync_core::db::Database;
use dietsync_core::engine::{DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};

#[derive(Parser)]
#[command(
    name = "dietsync",
    version,
    about = "Calorie goals and streaks, synced across devices"
)]
struct Cli {
    /// Log sync activity to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Data directory (default: platform data dir)
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<std::path::PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the sync server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Manage users allowed on this server
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Save the server and token this device syncs with
    Login {
        /// Server URL, e.g. http://127.0.0.1:8080
        #[arg(long)]
        server: String,
        /// Token issued by `dietsync user add`
        #[arg(long)]
        token: String,
        /// Expected user id; login fails if the token belongs to someone else
        #[arg(long)]
        user: Option<String>,
        /// Seconds between polls in `watch`
        #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
        poll_interval: u64,
        /// Seconds before a request to the server is abandoned
        #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
        timeout: u64,
    },
    /// Forget the saved login and cached data
    Logout,
    /// Show today's calories, streak and goals
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a meal
    Log {
        /// Meal name
        name: String,
        /// Calories
        calories: u32,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or change nickname and goals
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Set nickname and goals for the first time
    Onboard {
        /// What to call you
        #[arg(long)]
        nickname: String,
        /// Daily calorie goal (1000-5000)
        #[arg(long)]
        calories: u32,
        /// Days in a row to reach the goal (3-30)
        #[arg(long)]
        streak_goal: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep the summary on screen and refresh it when other devices sync
    Watch,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Issue a token for a user
    Add {
        /// User id
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List issued tokens
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Revoke every token of a user
    Revoke {
        /// User id
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one or more settings
    Set {
        /// New nickname
        #[arg(long)]
        nickname: Option<String>,
        /// New daily calorie goal
        #[arg(long)]
        calories: Option<u32>,
        /// New streak goal in days
        #[arg(long)]
        streak_goal: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "dietsync=debug,dietsync_core=debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.data_dir {
        Some(dir) => Config::at(dir)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Serve { port, bind } => {
            let db = Database::open(&config.server_db_path)?;
            server::start_server(db, port, &bind).await
        }
        Commands::User { command } => {
            let db = Database::open(&config.server_db_path)?;
            match command {
                UserCommands::Add { user_id, json } => cmd_user_add(&db, &user_id, json),
                UserCommands::List { json } => cmd_user_list(&db, json),
                UserCommands::Revoke { user_id, json } => cmd_user_revoke(&db, &user_id, json),
            }
        }
        Commands::Login {
            server,
            token,
            user,
            poll_interval,
            timeout,
        } => {
            let profile = ClientProfile {
                server_url: server,
                token,
                user_id: String::new(),
                poll_interval_secs: poll_interval,
                request_timeout_secs: timeout,
            };
            cmd_login(&config, profile, user.as_deref()).await
        }
        Commands::Logout => cmd_logout(&config),
        Commands::Status { json } => cmd_status(&config, json).await,
        Commands::Log {
            name,
            calories,
            meal,
            json,
        } => cmd_log(&config, &name, calories, &meal, json).await,
        Commands::Settings { command } => match command {
            SettingsCommands::Show { json } => cmd_settings_show(&config, json).await,
            SettingsCommands::Set {
                nickname,
                calories,
                streak_goal,
                json,
            } => cmd_settings_set(&config, nickname, calories, streak_goal, json).await,
        },
        Commands::Onboard {
            nickname,
            calories,
            streak_goal,
            json,
        } => cmd_onboard(&config, &nickname, calories, streak_goal, json).await,
        Commands::Watch => cmd_watch(&config).await,
    }
}
