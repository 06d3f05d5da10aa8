//! Kiosko CLI
//!
//! Runs the visitor kiosk on the terminal, or the admin operations.

use clap::{Parser, Subcommand};
use kiosko::admin::AdminDashboard;
use kiosko::config::{resolve_home, KioskConfig};
use kiosko::kiosk::{KioskApp, KioskServices};
use kiosko::{JsonFileStore, LocalAnonymousAuth, Locale, RagClient, SurveySchema};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Kiosko - visitor kiosk with survey, AI agent chat and success stories
#[derive(Parser, Debug)]
#[command(name = "kiosko")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory for config, session and stored data (default ~/.kiosko)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Base URL of the retrieval service
    #[arg(long, global = true)]
    rag_url: Option<String>,

    /// Kiosk language (es or en)
    #[arg(long, global = true)]
    lang: Option<Locale>,

    /// Verbose output: debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Dashboard operations on stored visitors
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// List visitors with their survey responses
    List,
    /// Write all responses to a CSV file
    Export {
        /// Directory the CSV file is written to
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Delete a visitor's profile and every response
    Delete { uid: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let home = resolve_home(cli.home.clone())?;
    let mut config = KioskConfig::load(home)
        .await
        .with_rag_url(cli.rag_url.clone());
    if let Some(locale) = cli.lang {
        config = config.with_locale(locale);
    }

    match cli.command {
        Some(Commands::Admin { action }) => run_admin(config, action).await,
        None => run_kiosk(config).await,
    }
}

async fn run_kiosk(config: KioskConfig) -> anyhow::Result<()> {
    info!("Starting Kiosko");
    info!("Home: {:?}", config.home);
    match &config.rag_url {
        Some(url) => info!("RAG service: {}", url),
        None => info!("RAG service not configured, chat answers will fail"),
    }

    let services = KioskServices {
        auth: Arc::new(LocalAnonymousAuth::new(config.data_dir())),
        store: Arc::new(JsonFileStore::open(config.data_dir()).await?),
        backend: Arc::new(RagClient::new(
            config.rag_url.as_deref(),
            config.request_timeout,
        )),
    };
    let app = KioskApp::new(config, services)?;

    // Setup channels for communication
    let (input_tx, input_rx) = mpsc::channel::<String>(32);
    let (output_tx, mut output_rx) = mpsc::channel::<String>(32);

    // Spawn blocking thread to read from stdin
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if input_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {}", e);
                    break;
                }
            }
        }
    });

    // Spawn task to write to stdout
    let writer = tokio::spawn(async move {
        while let Some(msg) = output_rx.recv().await {
            if let Err(e) = writeln!(io::stdout(), "{}", msg) {
                error!("Error writing stdout: {}", e);
                break;
            }
            let _ = io::stdout().flush();
        }
    });

    app.run(input_rx, output_tx).await?;
    let _ = writer.await;
    Ok(())
}

async fn run_admin(config: KioskConfig, action: AdminAction) -> anyhow::Result<()> {
    let store = Arc::new(JsonFileStore::open(config.data_dir()).await?);
    let mut dashboard = AdminDashboard::new(store);

    match action {
        AdminAction::List => {
            dashboard.load_all().await?;
            let users = dashboard.grouped_users();
            println!("{} visitors", users.len());
            for user in users {
                let (name, email, role) = user
                    .profile
                    .as_ref()
                    .map(|p| (p.name.as_str(), p.email.as_str(), p.role.as_str()))
                    .unwrap_or(("-", "-", "-"));
                let latest = user
                    .latest_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {}  <{}>  {}  responses={}  latest={}",
                    user.uid,
                    name,
                    email,
                    role,
                    user.responses.len(),
                    latest
                );
            }
        }
        AdminAction::Export { out } => {
            dashboard.load_all().await?;
            let schema = SurveySchema::for_locale(config.locale)?;
            let path = dashboard.write_csv(&out, &schema).await?;
            println!(
                "Exported {} responses to {}",
                dashboard.responses().len(),
                path.display()
            );
        }
        AdminAction::Delete { uid } => {
            let summary = dashboard.delete_user(&uid).await?;
            println!(
                "Deleted {}: profile={} responses={}",
                uid, summary.profile_deleted, summary.responses_deleted
            );
        }
    }
    Ok(())
}
