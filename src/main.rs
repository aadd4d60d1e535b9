use anyhow::Result;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "jobtrail", version, about = "Job application tracking service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the request-triggered job server over stdio
    Serve,
    /// Manage tracked owners
    Owners {
        #[command(subcommand)]
        command: OwnerCommands,
    },
    /// Manage per-owner mail sync credentials
    Credentials {
        #[command(subcommand)]
        command: CredentialCommands,
    },
    /// Inspect and edit tracked applications
    Applications {
        #[command(subcommand)]
        command: ApplicationCommands,
    },
    /// List staged unmatched notifications
    Unmatched {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show database stats
    Stats,
}

#[derive(Debug, Subcommand)]
enum OwnerCommands {
    /// List configured owners
    List,
    /// Add an owner
    Add {
        owner_id: String,
        email: String,
        #[arg(long)]
        display_name: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum CredentialCommands {
    /// Store refresh/access credentials for an owner
    Set(SetCredentialsArgs),
    /// Enable mail sync for an owner
    Enable { owner_id: String },
    /// Disable mail sync for an owner
    Disable { owner_id: String },
    /// Show per-owner sync status
    Status,
}

#[derive(Debug, Args)]
struct SetCredentialsArgs {
    owner_id: String,
    #[arg(long)]
    refresh_token: String,
    #[arg(long, default_value = "")]
    access_token: String,
    /// RFC3339 expiry of the access token; defaults to already-expired so
    /// the first sync refreshes.
    #[arg(long)]
    expires_at: Option<String>,
}

#[derive(Debug, Subcommand)]
enum ApplicationCommands {
    /// List applications for an owner
    List {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Add an application by hand
    Add {
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        company: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Set an application's status (writes a manual history entry)
    SetStatus {
        application_id: String,
        status: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Show an application's status history
    History { application_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli).await
}

mod commands {
    use anyhow::{anyhow, Context, Result};
    use chrono::{SecondsFormat, Utc};
    use uuid::Uuid;

    use jobtrail::db::models::{
        Application, ApplicationStatus, ChangeSource, CredentialState, Owner, StatusHistoryEntry,
    };
    use jobtrail::db::Database;
    use jobtrail::sync::credentials;

    use super::{
        ApplicationCommands, Cli, Commands, CredentialCommands, OwnerCommands, SetCredentialsArgs,
    };

    pub async fn dispatch(cli: Cli) -> Result<()> {
        match cli.command {
            Commands::Serve => jobtrail::jobs::run_stdio_server().await,
            Commands::Owners { command } => handle_owners(command),
            Commands::Credentials { command } => handle_credentials(command),
            Commands::Applications { command } => handle_applications(command, cli.json),
            Commands::Unmatched { owner } => handle_unmatched(owner.as_deref(), cli.json),
            Commands::Stats => handle_stats(cli.json),
        }
    }

    fn open_db() -> Result<Database> {
        let db_path = Database::default_db_path().context("resolve default database path")?;
        Database::open(&db_path)
            .with_context(|| format!("open database at {}", db_path.display()))
    }

    fn handle_owners(command: OwnerCommands) -> Result<()> {
        let db = open_db()?;
        match command {
            OwnerCommands::List => {
                let owners = db.list_owners()?;
                if owners.is_empty() {
                    println!("No owners configured.");
                } else {
                    for owner in owners {
                        println!("{}  {}", owner.owner_id, owner.email_address);
                    }
                }
            }
            OwnerCommands::Add {
                owner_id,
                email,
                display_name,
            } => {
                db.insert_owner(&Owner {
                    owner_id: owner_id.clone(),
                    email_address: email,
                    display_name,
                    created_at: None,
                })?;
                println!("Added owner: {owner_id}");
            }
        }
        Ok(())
    }

    fn handle_credentials(command: CredentialCommands) -> Result<()> {
        let db = open_db()?;
        match command {
            CredentialCommands::Set(args) => {
                ensure_owner_exists(&db, &args.owner_id)?;
                let expiry = args
                    .expires_at
                    .unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string());
                credentials::save_credentials(
                    &db,
                    &CredentialState {
                        owner_id: args.owner_id.clone(),
                        access_token: args.access_token,
                        refresh_token: args.refresh_token,
                        token_expiry: expiry,
                        sync_enabled: true,
                        last_sync_at: None,
                        updated_at: None,
                    },
                )?;
                println!("Stored credentials for owner: {}", args.owner_id);
            }
            CredentialCommands::Enable { owner_id } => {
                set_sync_enabled(&db, &owner_id, true)?;
                println!("Mail sync enabled for owner: {owner_id}");
            }
            CredentialCommands::Disable { owner_id } => {
                set_sync_enabled(&db, &owner_id, false)?;
                println!("Mail sync disabled for owner: {owner_id}");
            }
            CredentialCommands::Status => {
                let owners = db.list_owners()?;
                if owners.is_empty() {
                    println!("No owners configured.");
                    return Ok(());
                }
                for owner in owners {
                    match db.get_credentials(&owner.owner_id)? {
                        Some(creds) => println!(
                            "{}  enabled={}  last_sync={}",
                            owner.owner_id,
                            creds.sync_enabled,
                            creds.last_sync_at.as_deref().unwrap_or("never")
                        ),
                        None => println!("{}  not configured", owner.owner_id),
                    }
                }
            }
        }
        Ok(())
    }

    fn set_sync_enabled(db: &Database, owner_id: &str, enabled: bool) -> Result<()> {
        let mut creds = credentials::load_credentials(db, owner_id)?
            .ok_or_else(|| anyhow!("no credentials stored for owner: {owner_id}"))?;
        creds.sync_enabled = enabled;
        credentials::save_credentials(db, &creds)
    }

    fn handle_applications(command: ApplicationCommands, json: bool) -> Result<()> {
        let db = open_db()?;
        match command {
            ApplicationCommands::List { owner } => {
                let owner = resolve_owner(&db, owner.as_deref())?;
                let applications = db.list_applications(&owner.owner_id)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&applications)?);
                    return Ok(());
                }
                if applications.is_empty() {
                    println!("No applications tracked.");
                }
                for app in applications {
                    println!(
                        "{}  {}  {}  {}",
                        app.id,
                        app.status,
                        app.company_name,
                        app.job_title.as_deref().unwrap_or("-")
                    );
                }
            }
            ApplicationCommands::Add {
                owner,
                company,
                title,
            } => {
                let owner = resolve_owner(&db, owner.as_deref())?;
                let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                let id = Uuid::new_v4().to_string();
                db.insert_application(&Application {
                    id: id.clone(),
                    owner_id: owner.owner_id,
                    company_name: company,
                    job_title: title,
                    status: ApplicationStatus::Applied,
                    application_date: Some(Utc::now().format("%Y-%m-%d").to_string()),
                    location: None,
                    salary_min: None,
                    salary_max: None,
                    company_size: None,
                    annual_revenue: None,
                    industry: None,
                    company_type: None,
                    stock_ticker: None,
                    company_summary: None,
                    source_file: None,
                    drive_file_id: None,
                    job_description_text: None,
                    fit_score: None,
                    fit_analysis: None,
                    status_updated_at: None,
                    created_at: now.clone(),
                    updated_at: now,
                })?;
                println!("Added application: {id}");
            }
            ApplicationCommands::SetStatus {
                application_id,
                status,
                note,
            } => {
                let new_status: ApplicationStatus = status
                    .parse()
                    .map_err(|e: String| anyhow!(e))?;
                let application = db
                    .get_application(&application_id)?
                    .ok_or_else(|| anyhow!("application not found: {application_id}"))?;
                if application.status == new_status {
                    println!("Status unchanged ({new_status}).");
                    return Ok(());
                }

                let changed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
                db.update_application_status(&application_id, new_status, &changed_at)?;
                db.insert_status_history(&StatusHistoryEntry {
                    id: Uuid::new_v4().to_string(),
                    owner_id: application.owner_id,
                    application_id: application_id.clone(),
                    previous_status: application.status,
                    new_status,
                    source: ChangeSource::Manual,
                    mail_message_id: None,
                    notes: note,
                    changed_at,
                })?;
                println!(
                    "{}: {} -> {}",
                    application.company_name, application.status, new_status
                );
            }
            ApplicationCommands::History { application_id } => {
                let application = db
                    .get_application(&application_id)?
                    .ok_or_else(|| anyhow!("application not found: {application_id}"))?;
                let history = db.list_status_history(&application.owner_id, 200)?;
                for entry in history
                    .iter()
                    .filter(|entry| entry.application_id == application_id)
                {
                    println!(
                        "{}  {} -> {}  [{}]  {}",
                        entry.changed_at,
                        entry.previous_status,
                        entry.new_status,
                        entry.source,
                        entry.notes.as_deref().unwrap_or("")
                    );
                }
            }
        }
        Ok(())
    }

    fn handle_unmatched(owner: Option<&str>, json: bool) -> Result<()> {
        let db = open_db()?;
        let owner = resolve_owner(&db, owner)?;
        let notifications = db.list_unmatched(&owner.owner_id)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&notifications)?);
            return Ok(());
        }
        if notifications.is_empty() {
            println!("No unmatched notifications.");
        }
        for n in notifications {
            println!(
                "{}  [{}] {}  from {}",
                n.received_at.as_deref().unwrap_or("-"),
                n.suggested_status,
                n.subject.as_deref().unwrap_or("(no subject)"),
                n.sender_email.as_deref().unwrap_or("?")
            );
        }
        Ok(())
    }

    fn handle_stats(json: bool) -> Result<()> {
        let db = open_db()?;
        let stats = db.get_stats()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }
        println!("Owners: {}", stats.total_owners);
        println!("Applications: {}", stats.total_applications);
        println!("History entries: {}", stats.total_history_entries);
        println!("Unmatched notifications: {}", stats.total_unmatched);
        for row in stats.applications_by_status {
            println!("  {}: {}", row.status, row.count);
        }
        Ok(())
    }

    fn ensure_owner_exists(db: &Database, owner_id: &str) -> Result<()> {
        db.get_owner(owner_id)?
            .map(|_| ())
            .ok_or_else(|| anyhow!("owner not found: {owner_id}; add it with 'jobtrail owners add'"))
    }

    fn resolve_owner(db: &Database, owner_id: Option<&str>) -> Result<Owner> {
        if let Some(owner_id) = owner_id {
            return db
                .get_owner(owner_id)?
                .ok_or_else(|| anyhow!("owner not found: {owner_id}"));
        }

        let mut owners = db.list_owners()?;
        match owners.len() {
            0 => Err(anyhow!("no owners configured; use 'jobtrail owners add' first")),
            1 => Ok(owners.remove(0)),
            _ => Err(anyhow!(
                "multiple owners configured; pass --owner to disambiguate"
            )),
        }
    }
}
