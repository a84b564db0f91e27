//! `notesync` - CLI for the notesync client
//!
//! This binary provides an interactive shell and one-shot commands over the
//! local identity provider and the SQLite note store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;

use notesync::cli::{Cli, Command, ConfigCommand, NotesCommand, ShellArgs};
use notesync::session::SignInRequest;
use notesync::{
    init_logging, AuthProvider, Config, CreateOutcome, DocumentStore, LocalAuthProvider,
    NoteGateway, NoteQuery, NotesApp, Session, SqliteStore, SubscriberOptions,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Validation reports a broken file instead of failing to load it
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        validate_config(file.clone().or_else(|| cli.config.clone()));
        return Ok(());
    }

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Config(config_cmd) => handle_config(&config, config_cmd),
        command => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(run(&config, command))
        }
    }
}

async fn run(config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Shell(args) => handle_shell(config, args).await,
        Command::Notes(notes_cmd) => handle_notes(config, notes_cmd).await,
        Command::Status(status_cmd) => handle_status(config, status_cmd.json),
        Command::Config(config_cmd) => handle_config(config, config_cmd),
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.database_path();
    SqliteStore::open(&path, config.storage.change_buffer)
        .with_context(|| format!("failed to open note store at {}", path.display()))
}

fn open_provider(config: &Config) -> Result<LocalAuthProvider> {
    let provider =
        LocalAuthProvider::from_config(&config.auth).context("failed to set up identity provider")?;
    provider.resolve(None);
    Ok(provider)
}

async fn handle_shell(config: &Config, args: ShellArgs) -> Result<()> {
    let store = open_store(config)?;
    let provider = open_provider(config)?;

    let mut options = SubscriberOptions::from_config(config);
    if let Some(mode) = args.mode {
        options.strategy = mode.into();
    }

    let mut app = NotesApp::new(Arc::new(provider), Arc::new(store), options);
    if let Some(account) = args.account {
        // A failed sign-in shows up as a notice on the first screen
        let _ = app.sign_in(&account).await;
    }

    let stdin = BufReader::new(tokio::io::stdin());
    notesync::shell::run_shell(&mut app, stdin, tokio::io::stdout())
        .await
        .context("shell I/O failed")
}

async fn sign_in(provider: &LocalAuthProvider, account: &str) -> Result<Session> {
    provider
        .sign_in(&SignInRequest::new(account))
        .await
        .with_context(|| format!("could not sign in as {account}"))
}

async fn handle_notes(config: &Config, cmd: NotesCommand) -> Result<()> {
    let store = Arc::new(open_store(config)?);
    let provider = open_provider(config)?;
    let timeout = config.operation_timeout();

    match cmd {
        NotesCommand::List {
            account,
            limit,
            json,
        } => {
            let session = sign_in(&provider, &account).await?;
            let query = NoteQuery::owned_by(session.uid.clone())
                .with_limit(limit.or_else(|| config.list_limit()));
            let notes = tokio::time::timeout(timeout, store.query(&session, &query))
                .await
                .context("listing notes timed out")?
                .context("could not list notes")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&notes)?);
            } else if notes.is_empty() {
                println!("No notes for {}.", session.label());
            } else {
                for note in &notes {
                    println!("[{}] {}  ({})", note.id, note.text, note.created_at);
                }
            }
        }
        NotesCommand::Add { account, text } => {
            let session = sign_in(&provider, &account).await?;
            let gateway = NoteGateway::new(store, None, timeout);
            match gateway.create(Some(&session), &text).await? {
                CreateOutcome::Created(note) => println!("Saved note {}.", note.id),
                CreateOutcome::Skipped(_) => println!("Nothing to save: the note is empty."),
            }
        }
        NotesCommand::Delete { account, id } => {
            let session = sign_in(&provider, &account).await?;
            let gateway = NoteGateway::new(store, None, timeout);
            gateway
                .delete(&session, id)
                .await
                .with_context(|| format!("could not delete note {id}"))?;
            println!("Deleted note {id}.");
        }
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let store = open_store(config)?;
    let stats = store.stats().context("could not read store statistics")?;
    let newest = stats
        .newest_note
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "sync_mode": config.sync.mode,
            "provider": config.auth.provider_name,
            "total_notes": stats.total_notes,
            "owners": stats.owners,
            "newest_note": newest,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("notesync status");
        println!("---------------");
        println!("Database:      {}", config.database_path().display());
        println!("Sync mode:     {}", config.sync.mode);
        println!("Provider:      {}", config.auth.provider_name);
        println!("Notes:         {}", stats.total_notes);
        println!("Accounts:      {}", stats.owners);
        println!("Newest note:   {}", newest.as_deref().unwrap_or("-"));
        println!("Size (bytes):  {}", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Change buffer:      {}", config.storage.change_buffer);
                println!();
                println!("[Sync]");
                println!("  Mode:               {}", config.sync.mode);
                println!("  Timeout (ms):       {}", config.sync.operation_timeout_ms);
                println!();
                println!("[Auth]");
                println!("  Provider:           {}", config.auth.provider_name);
                println!("  Account pattern:    {}", config.auth.account_pattern);
                println!();
                println!("[Notes]");
                match config.list_limit() {
                    Some(limit) => println!("  List limit:         {limit}"),
                    None => println!("  List limit:         unlimited"),
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => validate_config(file),
    }
    Ok(())
}

fn validate_config(file: Option<std::path::PathBuf>) {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
}
