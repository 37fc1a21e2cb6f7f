mod api;
mod charts;
mod config;
mod controller;
mod db;
mod error;
mod models;
mod session;
mod tui;

use anyhow::{Context, Result, bail};
use api::ApiGateway;
use clap::{Parser, Subcommand};
use config::Config;
use controller::{UploadController, UploadState};
use db::Database;
use models::ResumeFile;
use session::AuthSession;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resumex")]
#[command(about = "Upload a resume for analysis and view its score, keywords and feedback")]
struct Cli {
    /// Base URL of the analysis service
    #[arg(long, global = true, env = "RESUMEX_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with an email address and store the access token
    Login {
        /// Email address
        email: String,
    },

    /// Upload a resume (.pdf, .docx, .txt) and show the analysis
    Analyze {
        /// Path to resume file
        file: PathBuf,
    },

    /// Show the result of your most recent analysis
    Last,

    /// Print the stored access token
    Token,

    /// Forget the stored access token
    Logout,

    /// Interactive view: pick a resume, analyze it and browse the charts
    Ui {
        /// Directory to list resumes from
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

fn init_logging(config: &Config, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if to_file {
        // The terminal belongs to the UI; keep log lines out of it
        std::fs::create_dir_all(&config.data_dir)?;
        let path = config.log_path();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        builder.with_writer(Mutex::new(file)).with_ansi(false).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}

fn print_outcome(controller: &UploadController) -> Result<()> {
    match controller.state() {
        UploadState::Ready(result) => {
            if let Some(projection) = charts::project(Some(result)) {
                print!("{}", tui::text_report(&projection, result));
            }
            Ok(())
        }
        UploadState::Failed(_) => bail!("{}", controller.status_line()),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.api_url.as_deref())?;
    init_logging(&config, matches!(cli.command, Commands::Ui { .. }))?;
    info!(api_url = %config.api_url, "starting");

    let db = Database::open(&config.database_path())?;
    let db_path = db.path().clone();
    let mut session = AuthSession::new(Box::new(db));
    let gateway = ApiGateway::http(&config)?;

    match cli.command {
        Commands::Login { email } => match session.authenticate(&gateway, &email).await {
            Ok(login) => {
                let shown = login.email.unwrap_or_else(|| email.trim().to_lowercase());
                println!("Logged in as {}.", shown);
                println!("Token stored in {}", db_path.display());
            }
            Err(e) => bail!("{}", e.user_message()),
        },

        Commands::Analyze { file } => {
            let resume = ResumeFile::load(&file).await?;
            let mut controller = UploadController::new();
            controller.select_file(resume)?;
            println!("Analyzing {}...", file.display());
            controller.analyze(&gateway, &mut session).await?;
            print_outcome(&controller)?;
        }

        Commands::Last => {
            let mut controller = UploadController::new();
            controller.load_last(&gateway, &mut session).await?;
            print_outcome(&controller)?;
        }

        Commands::Token => match session.token() {
            Some(token) => println!("{}", token.as_str()),
            None => println!("Not logged in."),
        },

        Commands::Logout => {
            session.sign_out()?;
            println!("Logged out.");
        }

        Commands::Ui { dir } => {
            tui::run_ui(Arc::new(gateway), &mut session, &dir).await?;
        }
    }

    Ok(())
}
