use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the policy gateway admin API", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GATEWAY_ADMIN_URL", default_value = "http://127.0.0.1:9876")]
    url: String,

    /// Admin API key, sent as a bearer token.
    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status and active configuration version
    Status,
    /// Print the active configuration
    Config,
    /// Show active and last-good versions with reload counters
    Versions,
    /// Queue a configuration reload
    Reload,
    /// List registered policies
    Policies,
    /// Manage key-auth API keys
    #[command(subcommand)]
    Keys(KeyCommands),
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Issue a new key
    Issue {
        /// Consumer the key belongs to
        #[arg(short, long)]
        consumer: Option<String>,
    },
    /// List issued keys
    List,
    /// Revoke a key
    Revoke { key: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
    }

    let (method, path, body) = match cli.command {
        Commands::Status => (Method::GET, "/status".to_string(), None),
        Commands::Config => (Method::GET, "/config".to_string(), None),
        Commands::Versions => (Method::GET, "/config/versions".to_string(), None),
        Commands::Reload => (Method::POST, "/config/reload".to_string(), None),
        Commands::Policies => (Method::GET, "/policies".to_string(), None),
        Commands::Keys(KeyCommands::Issue { consumer }) => (
            Method::POST,
            "/key-auth/keys".to_string(),
            Some(json!({ "consumer": consumer })),
        ),
        Commands::Keys(KeyCommands::List) => (Method::GET, "/key-auth/keys".to_string(), None),
        Commands::Keys(KeyCommands::Revoke { key }) => {
            (Method::DELETE, format!("/key-auth/keys/{key}"), None)
        }
    };

    let mut request = client
        .request(method, format!("{base}{path}"))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }
    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
