use std::path::PathBuf;
use std::sync::Arc;

use admin_client::{
    AdminClient, ApiError, ApiRequest, ClientConfig, ConfigError, FileTokenStore, Method, SessionEvent,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tokio::sync::broadcast;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{} (HTTP {})", .0.message, .0.status)]
    Api(#[from] ApiError),
    #[error("not logged in; run `admin-cli login` first")]
    NotLoggedIn,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "admin-cli", about = "Admin dashboard API client")]
struct Cli {
    /// Overrides ADMIN_API_BASE_URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Overrides ADMIN_TOKEN_FILE.
    #[arg(long)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login(LoginArgs),
    Whoami,
    Refresh,
    Logout,
    Api(ApiArgs),
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long, env = "ADMIN_USERNAME")]
    username: String,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct ApiArgs {
    #[arg(value_enum)]
    method: HttpMethod,

    /// Path relative to the base URL, e.g. /api/v1/users
    path: String,

    /// JSON request body
    #[arg(long)]
    data: Option<String>,

    /// Query parameter as key=value; repeatable
    #[arg(long = "query", value_parser = parse_query_pair)]
    query: Vec<(String, String)>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: could not read .env: {e}");
        }
    }
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let token_store = Arc::new(FileTokenStore::new(config.token_file.clone()));
    let client = AdminClient::from_config(config, token_store)?;
    let mut events = client.session().subscribe();

    let result = match cli.command {
        Command::Login(args) => run_login(&client, args).await,
        Command::Whoami => run_whoami(&client).await,
        Command::Refresh => run_refresh(&client).await,
        Command::Logout => run_logout(&client).await,
        Command::Api(args) => run_api(&client, args).await,
    };

    report_events(&mut events);
    result
}

fn load_config(cli: &Cli) -> Result<ClientConfig, CliError> {
    let mut config = match (ClientConfig::from_env(), &cli.base_url) {
        (Ok(config), _) => config,
        (Err(ConfigError::MissingVar { .. }), Some(base_url)) => ClientConfig::new(base_url.clone()),
        (Err(e), _) => return Err(e.into()),
    };
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_owned();
    }
    if let Some(path) = &cli.token_file {
        config.token_file = path.clone();
    }
    tracing::debug!(base_url = %config.base_url, refresh_mode = ?config.refresh_mode, "client configured");
    Ok(config)
}

async fn run_login(client: &AdminClient, args: LoginArgs) -> Result<(), CliError> {
    let body = json!({ "username": args.username, "password": args.password });
    let user = client.with_loading(client.session().login(&body)).await?;
    print_json(&user)
}

async fn run_whoami(client: &AdminClient) -> Result<(), CliError> {
    if !client.with_loading(client.session().check_auth()).await {
        return Err(CliError::NotLoggedIn);
    }
    match client.session().snapshot().user {
        Some(user) => print_json(&user),
        None => Err(CliError::NotLoggedIn),
    }
}

async fn run_refresh(client: &AdminClient) -> Result<(), CliError> {
    client.session().restore();
    client.with_loading(client.session().refresh()).await?;
    eprintln!("access token refreshed");
    Ok(())
}

async fn run_logout(client: &AdminClient) -> Result<(), CliError> {
    if !client.session().restore() {
        eprintln!("no stored session");
        return Ok(());
    }
    client.session().logout().await;
    eprintln!("logged out");
    Ok(())
}

async fn run_api(client: &AdminClient, args: ApiArgs) -> Result<(), CliError> {
    client.session().restore();

    let mut request = ApiRequest::new(args.method.into(), args.path);
    for (key, value) in args.query {
        request = request.with_query(key, value);
    }
    if let Some(data) = args.data {
        request = request.with_body(serde_json::from_str::<Value>(&data)?);
    }

    let response = client.with_loading(client.pipeline().send(request)).await?;
    print_json(&response.body)
}

fn report_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        tracing::debug!(?event, "session event");
        if let SessionEvent::Invalidated { .. } = event {
            eprintln!("session expired, please log in again");
        }
    }
}

fn parse_query_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
