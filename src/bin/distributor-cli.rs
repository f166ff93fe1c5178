use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "distributor-cli")]
#[command(about = "Management CLI for the distributor admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "DISTRIBUTOR_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show pool status
    Status,
    /// List configured backends and their health
    Backends,
    /// Run a health sweep now
    Check,
    /// List rate-limited clients and their buckets
    Clients,
    /// Set the bucket limits of one client
    SetLimit {
        client: String,
        #[arg(long)]
        capacity: u32,
        #[arg(long)]
        refill_per_sec: u32,
    },
    /// Drop the bucket of one client
    RemoveLimit { client: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Backends => client.get(format!("{base}/admin/backends")),
        Commands::Check => client.post(format!("{base}/admin/health-check")),
        Commands::Clients => client.get(format!("{base}/admin/clients")),
        Commands::SetLimit {
            client: id,
            capacity,
            refill_per_sec,
        } => client
            .put(format!("{base}/admin/clients/{id}"))
            .json(&json!({ "capacity": capacity, "refill_per_sec": refill_per_sec })),
        Commands::RemoveLimit { client: id } => client.delete(format!("{base}/admin/clients/{id}")),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
