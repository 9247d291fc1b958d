//! cross-connect - Manage workspace platform connections
//!
//! Drives the connection manager from the command line: start and finish
//! OAuth flows, log in to direct-credential providers, list and disconnect
//! accounts, and run maintenance sweeps.

use std::io::Read;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use libcrosscast::connection::{callback_redirect, ConnectionManager};
use libcrosscast::providers::AdapterRegistry;
use libcrosscast::types::WorkspaceRole;
use libcrosscast::{Config, CrosscastError, Database, ProviderKind, Result};

#[derive(Parser)]
#[command(name = "cross-connect")]
#[command(about = "Connect and manage workspace social accounts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, global = true, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an OAuth connection flow and print the authorization URL
    Init {
        /// Platform name (x, facebook, linkedin, instagram)
        provider: String,

        /// Requesting user id
        #[arg(long)]
        user: Uuid,

        /// Target workspace id
        #[arg(long)]
        workspace: Uuid,

        /// Path the browser returns to after the flow
        #[arg(long, default_value = "/connections")]
        return_path: String,
    },

    /// Complete an OAuth flow from the provider's callback parameters
    Callback {
        /// Platform name (x, facebook, linkedin, instagram)
        provider: String,

        /// Authorization code from the callback query
        #[arg(long)]
        code: String,

        /// State parameter from the callback query
        #[arg(long)]
        state: String,

        /// PKCE verifier printed by `init`, when the provider used one
        #[arg(long)]
        pkce_verifier: Option<String>,
    },

    /// Connect a direct-credential provider (bluesky app password)
    Direct {
        /// Account identifier (e.g. user.bsky.social)
        identifier: String,

        /// Requesting user id
        #[arg(long)]
        user: Uuid,

        /// Target workspace id
        #[arg(long)]
        workspace: Uuid,

        /// Read the app password from stdin (for automation)
        #[arg(long)]
        stdin: bool,

        /// App password (prefer --stdin; flags leak into shell history)
        #[arg(long)]
        password: Option<String>,
    },

    /// Disconnect an account from its workspace
    Disconnect {
        /// Account id to disconnect
        account: Uuid,

        /// Workspace the account belongs to
        #[arg(long)]
        workspace: Uuid,
    },

    /// List connected accounts in a workspace
    List {
        /// Workspace id
        workspace: Uuid,
    },

    /// Grant a user an API token and workspace role
    Grant {
        /// User id to grant
        user: Uuid,

        /// Workspace id
        #[arg(long)]
        workspace: Uuid,

        /// Role (owner, admin, editor, viewer)
        #[arg(long, default_value = "editor")]
        role: String,

        /// API token to register for the user
        #[arg(long)]
        token: String,
    },

    /// Flip accounts with expired credentials to needs_refresh
    Sweep,
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
    let config = Arc::new(Config::load()?);
    let db = Arc::new(Database::new(&config.database.path).await?);
    let adapters = Arc::new(AdapterRegistry::new());
    let manager = ConnectionManager::new(db.clone(), config, adapters);
    let json = cli.format == "json";

    match cli.command {
        Commands::Init {
            provider,
            user,
            workspace,
            return_path,
        } => {
            let provider = parse_provider(&provider)?;
            let flow = manager.initiate_connection(user, workspace, provider, return_path)?;

            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "authorization_url": flow.authorization_url,
                        "pkce_verifier": flow.pkce_verifier,
                    })
                );
            } else {
                println!("Open this URL to authorize {}:", provider);
                println!("{}", flow.authorization_url);
                if let Some(verifier) = flow.pkce_verifier {
                    println!("\nKeep this PKCE verifier for the callback step:");
                    println!("{}", verifier);
                }
            }
        }

        Commands::Callback {
            provider,
            code,
            state,
            pkce_verifier,
        } => {
            let provider = parse_provider(&provider)?;
            let outcome = manager
                .complete_connection(provider, &code, &state, pkce_verifier.as_deref())
                .await;

            match outcome {
                Ok(account) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&account).unwrap_or_default());
                    } else {
                        println!(
                            "Connected {} account '{}' ({})",
                            account.provider,
                            account.display_name,
                            account.handle.as_deref().unwrap_or("-")
                        );
                        println!(
                            "Redirect: {}",
                            callback_redirect("/connections", Ok(&account))
                        );
                    }
                }
                Err(e) => {
                    if !json {
                        eprintln!(
                            "Redirect: {}",
                            callback_redirect("/connections", Err(&e))
                        );
                    }
                    return Err(e);
                }
            }
        }

        Commands::Direct {
            identifier,
            user,
            workspace,
            stdin,
            password,
        } => {
            let app_password = if stdin {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .map_err(|e| CrosscastError::Validation(format!("cannot read stdin: {}", e)))?;
                buf.trim().to_string()
            } else {
                password.ok_or_else(|| {
                    CrosscastError::Validation(
                        "provide the app password via --stdin or --password".to_string(),
                    )
                })?
            };

            let account = manager
                .authenticate_direct(&identifier, &app_password, user, workspace)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&account).unwrap_or_default());
            } else {
                println!(
                    "Connected {} account '{}' ({})",
                    account.provider,
                    account.display_name,
                    account.handle.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Disconnect { account, workspace } => {
            manager.disconnect(account, workspace).await?;
            if json {
                println!("{}", serde_json::json!({ "success": true }));
            } else {
                println!("Disconnected {}", account);
            }
        }

        Commands::List { workspace } => {
            let accounts = db.list_accounts(workspace).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&accounts).unwrap_or_default());
            } else if accounts.is_empty() {
                println!("No connected accounts");
            } else {
                for account in accounts {
                    println!(
                        "{}  {:10}  {:24}  {:?}",
                        account.id,
                        account.provider.to_string(),
                        account.display_name,
                        account.status
                    );
                }
            }
        }

        Commands::Grant {
            user,
            workspace,
            role,
            token,
        } => {
            let role = parse_role(&role)?;
            db.insert_api_token(&libcrosscast::dispatch::hash_token(&token), user)
                .await?;
            db.upsert_workspace_member(workspace, user, role).await?;
            if json {
                println!("{}", serde_json::json!({ "success": true }));
            } else {
                println!("Granted {:?} in {} to {}", role, workspace, user);
            }
        }

        Commands::Sweep => {
            let flipped = manager.sweep_expired().await?;
            if json {
                println!("{}", serde_json::json!({ "marked_needs_refresh": flipped }));
            } else {
                println!("Marked {} account(s) as needing refresh", flipped);
            }
        }
    }

    Ok(())
}

fn parse_provider(raw: &str) -> Result<ProviderKind> {
    ProviderKind::from_str(raw).map_err(CrosscastError::Validation)
}

fn parse_role(raw: &str) -> Result<WorkspaceRole> {
    match raw.to_lowercase().as_str() {
        "owner" => Ok(WorkspaceRole::Owner),
        "admin" => Ok(WorkspaceRole::Admin),
        "editor" => Ok(WorkspaceRole::Editor),
        "viewer" => Ok(WorkspaceRole::Viewer),
        _ => Err(CrosscastError::Validation(format!(
            "unknown role '{}'; valid: owner, admin, editor, viewer",
            raw
        ))),
    }
}
