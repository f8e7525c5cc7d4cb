//! Mailsync CLI
//!
//! Registers users, walks them through Gmail authorization, and runs
//! incremental sync passes against the local user database.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use serde_json::json;

use mailsync::{
    CredentialStore, GmailClientFactory, GmailCredentials, GoogleTokenEndpoint, MailObject,
    PushNotification, SENTINEL_TOKEN, SqliteCredentialStore, SyncOrchestrator, SyncReport,
    SyncSettings, TokenManager, User, http_agent,
};

#[derive(Parser)]
#[command(name = "mailsync")]
#[command(about = "Incremental Gmail sync driven by history checkpoints")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Google OAuth client file to use instead of the configured credentials
    #[arg(long, global = true, value_name = "PATH")]
    credentials: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write settings.json with default values if it does not exist yet
    Init,
    /// Register a user with no authorization yet
    AddUser {
        email: String,
        /// Starting checkpoint (Gmail historyId)
        #[arg(long, default_value_t = 0)]
        history_id: u64,
    },
    /// Print the consent URL for a user
    AuthUrl {
        email: String,
        /// Open the URL in the default browser
        #[arg(long)]
        open: bool,
    },
    /// Exchange an authorization code and store the resulting token
    Exchange { email: String, code: String },
    /// Fetch mail added since the stored checkpoint and advance it
    Sync {
        email: String,
        /// Checkpoint to commit once all mail was fetched
        history_id: u64,
        /// Print the fetched mail as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run a sync pass from a Pub/Sub push body read on stdin
    Push {
        #[arg(long)]
        json: bool,
    },
}

struct App {
    store: Arc<dyn CredentialStore>,
    tokens: TokenManager,
    orchestrator: SyncOrchestrator,
}

impl App {
    fn new(credentials_file: Option<&Path>) -> Result<Self> {
        let loaded = match credentials_file {
            Some(path) => GmailCredentials::from_file(path),
            None => GmailCredentials::load(),
        };
        let credentials = match loaded {
            Ok(credentials) => credentials,
            Err(e) => {
                if let Some(path) = GmailCredentials::default_credentials_path() {
                    warn!(
                        "To configure Gmail access, either:\n\
                         1. Place your Google OAuth credentials at: {}\n\
                         2. Or set environment variables: GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET",
                        path.display()
                    );
                }
                return Err(e.context("Gmail credentials not found"));
            }
        };
        let settings = SyncSettings::load()?;
        let db_path = settings.database_path()?;
        info!("Using user database at {}", db_path.display());

        let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::open(&db_path)?);
        let agent = http_agent(settings.http_timeout());
        let tokens = TokenManager::new(
            credentials,
            store.clone(),
            Arc::new(GoogleTokenEndpoint::new(agent.clone())),
        );
        let orchestrator = SyncOrchestrator::new(
            tokens.clone(),
            store.clone(),
            Box::new(GmailClientFactory::new(agent)),
        );

        Ok(Self {
            store,
            tokens,
            orchestrator,
        })
    }

    fn user(&self, email: &str) -> Result<User> {
        self.store
            .find_user_by_email(email)?
            .with_context(|| format!("No user registered for {}", email))
    }

    fn sync(&self, email: &str, history_id: u64, as_json: bool) -> Result<()> {
        match self.orchestrator.sync_with_report(email, history_id) {
            Ok(outcome) => print_mail(&outcome.mail, &outcome.report, as_json),
            Err(e) => {
                if e.requires_reauthorization() {
                    error!("{} needs to authorize again: mailsync auth-url {}", email, email);
                }
                Err(e.into())
            }
        }
    }
}

fn print_mail(mail: &[MailObject], report: &SyncReport, as_json: bool) -> Result<()> {
    if as_json {
        let items: Vec<_> = mail
            .iter()
            .map(|m| {
                json!({
                    "id": m.id,
                    "message": m.message,
                    "attachments": m.attachments.iter().map(|a| json!({
                        "name": a.name,
                        "size": a.data.len(),
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        let output = json!({
            "previous_checkpoint": report.previous_checkpoint,
            "new_checkpoint": report.new_checkpoint,
            "duration_ms": report.duration_ms,
            "mail": items,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{} new messages (checkpoint {} -> {})",
        mail.len(),
        report.previous_checkpoint,
        report.new_checkpoint
    );
    for m in mail {
        let subject = subject_of(&m.message).unwrap_or("(no subject)");
        println!("  {}  {}", m.id, subject);
        for a in &m.attachments {
            println!("      + {} ({} bytes)", a.name, a.data.len());
        }
    }
    Ok(())
}

/// The Subject header of a rendered message, looking only at the header block
fn subject_of(message: &str) -> Option<&str> {
    message
        .lines()
        .take_while(|line| !line.is_empty())
        .find_map(|line| line.strip_prefix("Subject:"))
        .map(str::trim)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        match SyncSettings::default_path() {
            Some(path) if path.exists() => println!("Settings already exist at {}", path.display()),
            _ => {
                let path = SyncSettings::default().save()?;
                println!("Wrote default settings to {}", path.display());
            }
        }
        return Ok(());
    }

    let app = App::new(cli.credentials.as_deref())?;

    match cli.command {
        Commands::Init => {}
        Commands::AddUser { email, history_id } => {
            let user = app.store.insert_user(
                User::new(email)
                    .with_token(SENTINEL_TOKEN)
                    .with_history_id(history_id),
            )?;
            println!("Registered {} (id {})", user.email, user.id);
        }
        Commands::AuthUrl {
            email,
            open: launch,
        } => {
            let user = app.user(&email)?;
            let handle = app.tokens.authorize_for_consent(user.id)?;
            if handle.authorized {
                info!("{} already has a stored credential", email);
            }
            let url = app.tokens.authorization_url(&handle.client);
            println!("{}", url);
            if launch && let Err(e) = open::that(url.as_str()) {
                warn!("Failed to open browser: {}", e);
            }
        }
        Commands::Exchange { email, code } => {
            let user = app.user(&email)?;
            app.tokens
                .exchange_code(user.id, app.tokens.client(), code.trim())?;
            println!("Authorized {}", email);
        }
        Commands::Sync {
            email,
            history_id,
            json,
        } => app.sync(&email, history_id, json)?,
        Commands::Push { json } => {
            let mut body = String::new();
            std::io::stdin()
                .read_to_string(&mut body)
                .context("Failed to read push body from stdin")?;
            if body.trim().is_empty() {
                bail!("Expected a Pub/Sub push body on stdin");
            }
            let notification = PushNotification::from_push_body(&body)?;
            info!(
                "Push for {} at history {}",
                notification.email_address, notification.history_id
            );
            app.sync(&notification.email_address, notification.history_id, json)?;
        }
    }

    Ok(())
}
