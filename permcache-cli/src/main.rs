//! Permcache CLI - inspect and edit device grants
//!
//! Runs a permission cache manager over a JSON grant file.
//!
//! Usage:
//!     permcache grant device:7 42 READ
//!     permcache check 42 device:7 READ
//!     permcache revoke device:7 42 READ
//!     permcache list device:7
//!     permcache batch < queries.txt        # "subject resource action" per line
//!
//! Exit status:
//!     0  success (for `check`: allowed)
//!     1  `check`: denied
//!     2  store unavailable, the answer is unknown
//!     3  any other error (bad input, bad config, corrupt grant file)
//!
//! Environment:
//!     PERMCACHE_STORE    grant file (default: grants.json)
//!     PERMCACHE_CONFIG   manager config JSON
//!     RUST_LOG           log filter (default: permcache_cli=info,permcache_core=info)

use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use permcache_core::{
    Action, FileStore, ManagerConfig, PermCacheError, PermissionCacheManager, ResourceRef,
    SubjectId,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "permcache")]
#[command(about = "Check and manage resource permissions through the permission cache")]
#[command(version)]
struct Args {
    /// Path to the grant file
    #[arg(long, env = "PERMCACHE_STORE", default_value = "grants.json")]
    store: PathBuf,

    /// Path to a manager config JSON file
    #[arg(long, env = "PERMCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a subject may perform an action on a resource
    ///
    /// Exit status: 0 allowed, 1 denied, 2 unknown (store unavailable),
    /// 3 other errors
    Check {
        subject: String,
        /// `type:id`, or a bare device id
        resource: String,
        action: String,
    },

    /// Grant an action on a resource to a subject
    Grant {
        resource: String,
        subject: String,
        action: String,
    },

    /// Revoke an action on a resource from a subject
    Revoke {
        resource: String,
        subject: String,
        action: String,
    },

    /// List grants, optionally for one resource
    List { resource: Option<String> },

    /// Answer `subject resource action` queries from stdin, one per line
    Batch,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "permcache_cli=info,permcache_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(failure_status(e.as_ref()))
        }
    }
}

const EXIT_UNKNOWN: u8 = 2;
const EXIT_ERROR: u8 = 3;

/// Store unavailability is "unknown"; everything else is a plain failure
fn failure_status(err: &(dyn std::error::Error + 'static)) -> u8 {
    match err.downcast_ref::<PermCacheError>() {
        Some(e) if e.is_store_unavailable() => EXIT_UNKNOWN,
        _ => EXIT_ERROR,
    }
}

async fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => ManagerConfig::from_json_file(path)?,
        None => ManagerConfig::default(),
    };

    let store = Arc::new(FileStore::new(&args.store)?);
    tracing::debug!(store = %store.path().display(), "opened grant file");
    let manager = PermissionCacheManager::with_memory_cache(store.clone(), config)?;

    match args.command {
        Command::Check {
            subject,
            resource,
            action,
        } => {
            let allowed = match manager.check(&subject, &resource, &action).await {
                Ok(allowed) => allowed,
                Err(e) if e.is_store_unavailable() => {
                    output_error(&e, args.json);
                    return Ok(ExitCode::from(EXIT_UNKNOWN));
                }
                Err(e) => return Err(e.into()),
            };
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "subject": subject,
                        "resource": resource,
                        "action": action,
                        "allowed": allowed,
                    })
                );
            } else {
                println!("{}", if allowed { "allowed" } else { "denied" });
            }
            Ok(if allowed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Command::Grant {
            resource,
            subject,
            action,
        } => {
            let (resource, subject, action) = parse_triple(&resource, &subject, &action)?;
            let grant = manager.grant_permission(&resource, &subject, &action).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&grant)?);
            } else {
                println!(
                    "granted {} {} on {} ({})",
                    grant.subject, grant.action, grant.resource, grant.grant_id
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Revoke {
            resource,
            subject,
            action,
        } => {
            let (resource, subject, action) = parse_triple(&resource, &subject, &action)?;
            let removed = manager.revoke_permission(&resource, &subject, &action).await?;
            if args.json {
                println!("{}", serde_json::json!({ "removed": removed }));
            } else if removed {
                println!("revoked {} {} on {}", subject, action, resource);
            } else {
                println!("no matching grant");
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::List { resource } => {
            let mut grants = store.all_grants().await?;
            if let Some(resource) = resource {
                let resource = ResourceRef::parse(&resource)?;
                grants.retain(|g| g.resource == resource);
            }
            if args.json {
                println!("{}", serde_json::to_string_pretty(&grants)?);
            } else if grants.is_empty() {
                println!("no grants");
            } else {
                for g in &grants {
                    println!(
                        "{:<24} {:<16} {:<10} {}",
                        g.resource,
                        g.subject,
                        g.action,
                        g.granted_at.to_rfc3339()
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Batch => {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = line?;
                let fields: Vec<&str> = line.split_whitespace().collect();
                let answer = match fields.as_slice() {
                    [] => continue,
                    [subject, resource, action] => {
                        match manager.check(subject, resource, action).await {
                            Ok(true) => "allowed".to_string(),
                            Ok(false) => "denied".to_string(),
                            Err(e) => format!("error {}", e.error_code()),
                        }
                    }
                    _ => "error MALFORMED_QUERY".to_string(),
                };
                println!("{}\t{}", line.trim(), answer);
            }
            let stats = manager.stats();
            if args.json {
                eprintln!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                eprintln!(
                    "checks={} hits={} misses={} loads={} hit_rate={:.2}",
                    stats.checks, stats.cache_hits, stats.cache_misses, stats.loads, stats.cache.hit_rate
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn parse_triple(
    resource: &str,
    subject: &str,
    action: &str,
) -> permcache_core::Result<(ResourceRef, SubjectId, Action)> {
    Ok((
        ResourceRef::parse(resource)?,
        SubjectId::new(subject)?,
        Action::new(action)?,
    ))
}

fn output_error(err: &PermCacheError, json: bool) {
    if json {
        match serde_json::to_string_pretty(&err.to_error_response()) {
            Ok(body) => println!("{}", body),
            Err(_) => eprintln!("Error: {}", err),
        }
    } else {
        eprintln!("unknown: {}", err);
    }
}
