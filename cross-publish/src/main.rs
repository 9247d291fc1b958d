//! cross-publish - Fan one piece of content out across connected accounts
//!
//! Request-level failures (bad token, bad role, malformed request) exit
//! non-zero. A completed fan-out always exits zero and reports its status in
//! the output, including a fully failed one: provider failure is an outcome,
//! not a broken call.

use std::io::Read;
use std::sync::Arc;

use clap::Parser;
use uuid::Uuid;

use libcrosscast::providers::AdapterRegistry;
use libcrosscast::types::{MediaType, OutcomeStatus};
use libcrosscast::{
    Config, CrosscastError, Database, PublishOutcome, PublishRequest, PublishService, Result,
};

#[derive(Parser, Debug)]
#[command(name = "cross-publish")]
#[command(about = "Publish content to connected social accounts", long_about = None)]
struct Cli {
    /// Content to publish (reads from stdin if not provided)
    content: Option<String>,

    /// Target workspace id
    #[arg(short, long)]
    workspace: Uuid,

    /// Target account ids (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    targets: Vec<Uuid>,

    /// Link to attach
    #[arg(long)]
    link: Option<String>,

    /// Media URL to attach
    #[arg(long)]
    media: Option<String>,

    /// Media type (image or video)
    #[arg(long, requires = "media")]
    media_type: Option<MediaType>,

    /// API token (defaults to CROSSCAST_API_TOKEN)
    #[arg(long, env = "CROSSCAST_API_TOKEN", hide_env_values = true)]
    token: String,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "error" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.format == "json";

    if let Err(e) = run(cli).await {
        if json {
            println!(
                "{}",
                serde_json::json!({ "error": e.to_string(), "status": e.status_class() })
            );
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let content = match &cli.content {
        Some(content) => content.clone(),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| CrosscastError::Validation(format!("cannot read stdin: {}", e)))?;
            buf.trim_end().to_string()
        }
    };

    let config = Arc::new(Config::load()?);
    let db = Arc::new(Database::new(&config.database.path).await?);
    let adapters = Arc::new(AdapterRegistry::new());
    let service = PublishService::new(db, config, adapters);

    let request = PublishRequest {
        workspace_id: cli.workspace,
        content,
        link_url: cli.link.clone(),
        media_url: cli.media.clone(),
        media_type: cli.media_type,
        target_account_ids: cli.targets.clone(),
    };

    let outcome = service.publish(&cli.token, request).await?;

    if cli.format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).unwrap_or_default()
        );
    } else {
        print_text(&outcome);
    }

    Ok(())
}

fn print_text(outcome: &PublishOutcome) {
    let status = match outcome.status {
        OutcomeStatus::Published => "published",
        OutcomeStatus::Partial => "partial",
        OutcomeStatus::Failed => "failed",
    };
    println!(
        "{} ({} of {} targets succeeded)",
        status, outcome.summary.succeeded, outcome.summary.total
    );

    for result in &outcome.results {
        let provider = result
            .provider
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        if result.success {
            let location = result
                .post_url
                .as_deref()
                .or(result.post_id.as_deref())
                .unwrap_or("-");
            println!("  ok    {:10} {}  {}", provider, result.account_id, location);
        } else {
            println!(
                "  fail  {:10} {}  {}",
                provider,
                result.account_id,
                result.error.as_deref().unwrap_or("-")
            );
        }
    }
}
