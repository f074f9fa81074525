use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use futures::future::join_all;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::FetchCache;
use crate::client::ApiClient;
use crate::config::Config;
use crate::error::ApiError;
use crate::listing;
use crate::types::Resource;
use crate::utils::mask_token;

/// Read when `login` is given no `--password`
pub const PASSWORD_ENV: &str = "CASEDESK_PASSWORD";

#[derive(Parser)]
#[command(name = "casedesk")]
#[command(about = "Command-line client for the case-management records API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(long, global = true, help = "Override the API base URL for this run")]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Log in and store the session")]
    Login {
        #[arg(help = "Username or badge number")]
        identifier: String,
        #[arg(long, help = "Password (falls back to CASEDESK_PASSWORD)")]
        password: Option<String>,
    },

    #[command(about = "Forget the stored session")]
    Logout,

    #[command(about = "Show the server and session in use")]
    Status,

    #[command(about = "GET a path and print the JSON response")]
    Get { path: String },

    #[command(about = "POST a JSON body to a path")]
    Post { path: String, body: String },

    #[command(about = "PUT a JSON body to a path")]
    Put { path: String, body: String },

    #[command(about = "DELETE a path")]
    Delete { path: String },

    #[command(about = "List records of a collection")]
    List {
        resource: Resource,
        #[arg(long, short, help = "Only records containing this text")]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        per_page: usize,
    },

    #[command(about = "Show a single record")]
    Show {
        resource: Resource,
        id: String,
        #[arg(long, help = "Attach the records its foreign keys point to")]
        resolve: bool,
    },

    #[command(about = "Inspect or change the configuration")]
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Print the effective configuration")]
    Show,

    #[command(about = "Persist the API base URL")]
    SetUrl { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let mut config = Config::load()?;
    apply_overrides(&cli, &mut config)?;

    let command = match cli.command {
        Commands::Config { cmd } => return handle_config(&cmd, &mut config, output_format),
        command => command,
    };

    let client = Arc::new(ApiClient::from_config(&config)?);
    let cache = FetchCache::new(Arc::clone(&client), config.client.dedupe_interval());

    dispatch(command, &cache, &mut config, output_format)
        .await
        .map_err(explain)
}

/// Fold flags that only apply to this run into the loaded configuration
fn apply_overrides(cli: &Cli, config: &mut Config) -> Result<()> {
    if let Some(base_url) = &cli.base_url {
        config.override_base_url(base_url)?;
    }
    Ok(())
}

async fn dispatch(
    command: Commands,
    cache: &FetchCache,
    config: &mut Config,
    output_format: OutputFormat,
) -> Result<()> {
    let client = cache.client();

    match command {
        Commands::Login {
            identifier,
            password,
        } => login(client, &identifier, password, output_format).await,
        Commands::Logout => {
            client.logout()?;
            print_message(output_format, "Logged out");
            Ok(())
        }
        Commands::Status => status(client, output_format),
        Commands::Get { path } => print_value(client.get(&path).await?),
        Commands::Post { path, body } => {
            let body = parse_body(&body)?;
            print_value(client.post(&path, &body).await?)
        }
        Commands::Put { path, body } => {
            let body = parse_body(&body)?;
            print_value(client.put(&path, &body).await?)
        }
        Commands::Delete { path } => print_value(client.delete(&path).await?),
        Commands::List {
            resource,
            search,
            page,
            per_page,
        } => {
            list(
                cache,
                resource,
                search.as_deref().unwrap_or(""),
                page,
                per_page,
                output_format,
            )
            .await
        }
        Commands::Show {
            resource,
            id,
            resolve,
        } => show(cache, resource, &id, resolve).await,
        Commands::Config { cmd } => handle_config(&cmd, config, output_format),
    }
}

/// Turn client errors into the message a user should see
fn explain(report: color_eyre::Report) -> color_eyre::Report {
    let Some(err) = report.downcast_ref::<ApiError>() else {
        return report;
    };

    match err {
        ApiError::SessionExpired => {
            eyre!("Session expired. Run `casedesk login <identifier>` to sign in again")
        }
        ApiError::Request { status, .. } => eyre!("{} (HTTP {})", err.user_message(), status),
        _ => report,
    }
}

fn handle_config(
    cmd: &ConfigCommands,
    config: &mut Config,
    output_format: OutputFormat,
) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let effective = json!({
                "base_url": config.base_url(),
                "replay": config.client.replay,
                "dedupe_interval_ms": config.client.dedupe_interval_ms,
                "config_path": Config::config_path()?.display().to_string(),
            });
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&effective)?),
                OutputFormat::Text => println!("{}", toml::to_string_pretty(&effective)?),
            }
            Ok(())
        }
        ConfigCommands::SetUrl { url } => {
            config.set_base_url(url)?;
            config.save()?;
            print_message(output_format, &format!("Base URL set to {}", url));
            Ok(())
        }
    }
}

async fn login(
    client: &ApiClient,
    identifier: &str,
    password: Option<String>,
    output_format: OutputFormat,
) -> Result<()> {
    let password = password
        .or_else(|| std::env::var(PASSWORD_ENV).ok())
        .ok_or_else(|| eyre!("No password given; pass --password or set {}", PASSWORD_ENV))?;

    client.login(identifier, &password).await?;
    print_message(output_format, &format!("Logged in as {}", identifier));
    Ok(())
}

fn status(client: &ApiClient, output_format: OutputFormat) -> Result<()> {
    let session = client.session()?;
    let masked = |token: &Option<String>| token.as_deref().map(mask_token);

    match output_format {
        OutputFormat::Json => {
            let value = json!({
                "base_url": client.base_url(),
                "logged_in": session.access_token.is_some(),
                "access_token": masked(&session.access_token),
                "refresh_token": masked(&session.refresh_token),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("Server: {}", client.base_url());
            match &session.access_token {
                Some(token) => println!("Logged in (access token {})", mask_token(token)),
                None => println!("Not logged in"),
            }
            if session.refresh_token.is_none() {
                println!("No refresh token stored");
            }
        }
    }
    Ok(())
}

async fn list(
    cache: &FetchCache,
    resource: Resource,
    query: &str,
    page: usize,
    per_page: usize,
    output_format: OutputFormat,
) -> Result<()> {
    let body = cache.get(resource.path()).await.map_err(unshare)?;
    let records = listing::records(&body);
    let matched: Vec<Value> = listing::search(&records, query).into_iter().cloned().collect();
    let page = listing::paginate(&matched, page, per_page);

    match output_format {
        OutputFormat::Json => {
            let value = json!({
                "resource": resource,
                "page": page.page,
                "total_pages": page.total_pages,
                "total": page.total,
                "items": page.items,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!(
                "{} (page {}/{}, {} total)",
                resource, page.page, page.total_pages, page.total
            );
            for record in page.items {
                println!("{}", summary_line(record));
            }
        }
    }
    Ok(())
}

async fn show(cache: &FetchCache, resource: Resource, id: &str, resolve: bool) -> Result<()> {
    let record = cache.client().get(&resource.item_path(id)).await?;

    if !resolve {
        return print_value(record);
    }

    let targets: Vec<Resource> = resource.foreign_keys().iter().map(|k| k.target).collect();
    let fetched = join_all(targets.iter().map(|target| cache.get(target.path()))).await;

    let mut collections = HashMap::new();
    for (target, result) in targets.into_iter().zip(fetched) {
        match result {
            Ok(body) => {
                collections.insert(target, listing::records(&body));
            }
            Err(e) if e.is_session_expired() => return Err(unshare(e)),
            Err(e) => {
                tracing::warn!(resource = %target, error = %e, "could not load related records")
            }
        }
    }

    print_value(listing::resolve_references(&record, resource, &collections))
}

/// Recover an owned error from the cache's shared one
fn unshare(err: Arc<ApiError>) -> color_eyre::Report {
    match Arc::try_unwrap(err) {
        Ok(err) => err.into(),
        Err(shared) => match shared.as_ref() {
            ApiError::SessionExpired => ApiError::SessionExpired.into(),
            ApiError::Request { status, info } => ApiError::Request {
                status: *status,
                info: info.clone(),
            }
            .into(),
            other => eyre!("{}", other),
        },
    }
}

fn parse_body(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).wrap_err("Request body must be valid JSON")
}

fn print_value(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_message(output_format: OutputFormat, message: &str) {
    match output_format {
        OutputFormat::Json => println!("{}", json!({ "success": true, "message": message })),
        OutputFormat::Text => println!("✓ {}", message),
    }
}

/// One line per record: id followed by its short string fields
fn summary_line(record: &Value) -> String {
    let id = record
        .get("id")
        .and_then(listing::id_string)
        .unwrap_or_else(|| "-".to_string());

    let fields: Vec<String> = record
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(k, _)| k.as_str() != "id")
                .filter_map(|(k, v)| v.as_str().map(|s| format!("{}={}", k, s)))
                .take(4)
                .collect()
        })
        .unwrap_or_default();

    format!("{:>6}  {}", id, fields.join("  "))
}
