use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use mount_proxy::config::load_config;
use mount_proxy::events::EventHub;
use mount_proxy::forward::engine::upstream_uri;
use mount_proxy::forward::options::resolve;
use mount_proxy::http::RequestContext;
use mount_proxy::routing::RouteTable;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Offline tooling for mount-proxy configs", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "mount-proxy.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the config file
    Check,
    /// List routes in match order
    Routes,
    /// Show which route a path hits and where it is forwarded
    Match {
        /// Request path, optionally with a query string
        path: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let table = RouteTable::from_config(&config)?;

    match cli.command {
        Commands::Check => {
            println!("{}: OK ({} routes)", cli.config.display(), table.len());
        }
        Commands::Routes => {
            let routes: Vec<Value> = config
                .routes
                .iter()
                .map(|r| {
                    json!({
                        "name": r.name,
                        "path": r.path,
                        "target": r.target,
                        "timeout_ms": r.timeout_ms.unwrap_or(config.timeouts.default_route_ms),
                        "rewrite": r.rewrite,
                        "match": r.match_options,
                    })
                })
                .collect();
            print_json(&Value::Array(routes))?;
        }
        Commands::Match { path } => {
            let ctx = RequestContext::for_path(&path);
            let Some((route, matched)) = table.match_path(ctx.path()) else {
                print_json(&json!({ "matched": false, "path": path }))?;
                return Ok(());
            };

            let forward = resolve(&route.source, &matched, &ctx, &EventHub::new())?;
            let original = ctx.path_and_query();
            let forwarded = match &forward.rewrite {
                Some(rewrite) => rewrite.apply(original, &forward.mount_prefix, forward.sensitive, &ctx)?,
                None => original.to_string(),
            };
            let upstream = upstream_uri(&forward.target, &forwarded)?;

            print_json(&json!({
                "matched": true,
                "route": route.name,
                "prefix": matched.prefix,
                "params": matched.params,
                "forwarded_path": forwarded,
                "upstream": upstream.to_string(),
                "timeout_ms": forward.timeout_ms,
            }))?;
        }
    }

    Ok(())
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
