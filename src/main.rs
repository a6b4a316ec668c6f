#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::assigning_clones,
    clippy::bool_to_int_with_if,
    clippy::cast_possible_wrap,
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::implicit_clone,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::needless_raw_string_hashes,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_self,
    clippy::cast_precision_loss,
    clippy::unnecessary_cast,
    clippy::unnecessary_lazy_evaluations,
    clippy::unnecessary_literal_bound,
    clippy::unnecessary_map_or,
    clippy::unnecessary_wraps,
    dead_code
)]

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use switchyard::bootstrap::build_orchestrator;
use switchyard::config::Config;
use switchyard::gateway;
use switchyard::providers;
use switchyard::routing::{InboundRequest, Router};

/// `switchyard` - route customer requests to the right agent.
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(version)]
#[command(
    about = "Routes customer requests to specialized conversational agents.",
    long_about = None
)]
struct Cli {
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Route a single request and print the JSON response
    #[command(long_about = "\
Route a single request and print the JSON response.

The request is classified, handled by one agent and recorded in the \
session history of this process.

Examples:
  switchyard route -m \"Where is my order 12345?\"
  switchyard route -m \"Do you ship abroad?\" --user alice --session s-1")]
    Route {
        /// Request text
        #[arg(short, long)]
        message: String,

        /// User identifier
        #[arg(long, default_value = "cli-user")]
        user: String,

        /// Session identifier
        #[arg(long, default_value = "cli-session")]
        session: String,
    },

    /// Start the HTTP gateway
    #[command(long_about = "\
Start the HTTP gateway.

Serves POST /v1/route, POST /v1/events, GET /v1/agents, GET /health \
and GET /metrics until interrupted with Ctrl-C.

Examples:
  switchyard serve
  switchyard serve --host 0.0.0.0 --port 8080")]
    Serve {
        /// Port to listen on; defaults to the configured gateway port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to the configured gateway host
        #[arg(long)]
        host: Option<String>,
    },

    /// List routable agents and their capabilities
    Agents,

    /// Show the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config_dir = match &cli.config_dir {
        Some(dir) if dir.trim().is_empty() => bail!("--config-dir cannot be empty"),
        Some(dir) => Some(switchyard::config::expand_path(dir)),
        None => None,
    };
    let config = Config::load_or_init(config_dir.as_deref()).await?;

    match cli.command {
        Commands::Route {
            message,
            user,
            session,
        } => {
            let orchestrator = build_orchestrator(&config)?;
            let response = orchestrator
                .route_request(&InboundRequest::new(&message, &user, &session))
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        Commands::Serve { port, host } => {
            let mut gateway_config = config.gateway.clone();
            if let Some(port) = port {
                gateway_config.port = port;
            }
            if let Some(host) = host {
                gateway_config.host = host;
            }
            if gateway_config.port == 0 {
                info!("Starting Switchyard gateway on {} (random port)", gateway_config.host);
            } else {
                info!(
                    "Starting Switchyard gateway on {}:{}",
                    gateway_config.host, gateway_config.port
                );
            }
            let orchestrator = build_orchestrator(&config)?;
            gateway::run_gateway(Arc::new(orchestrator), &gateway_config).await
        }

        Commands::Agents => {
            let orchestrator = build_orchestrator(&config)?;
            let agents = orchestrator.agents();
            println!("Routable agents ({} total):\n", agents.len());
            for agent in &agents {
                let marker = if agent.name == orchestrator.fallback_agent() {
                    " (fallback)"
                } else {
                    ""
                };
                let capabilities: Vec<&str> =
                    agent.capabilities.iter().map(|c| c.as_str()).collect();
                println!("  {}{}", agent.name, marker);
                println!("    {}", agent.description);
                println!("    [{}]", capabilities.join(", "));
            }
            Ok(())
        }

        Commands::Status => {
            print_status(&config);
            Ok(())
        }
    }
}

fn print_status(config: &Config) {
    println!("Switchyard Status");
    println!();
    println!("Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("Config:      {}", config.config_path.display());
    println!();
    println!("Provider:    {}", config.provider_name());
    let supported: Vec<&str> = providers::list_providers().iter().map(|p| p.name).collect();
    println!("  Supported:   {}, custom:<URL>", supported.join(", "));
    println!("  Model:       {}", config.model());
    println!("  API key:     {}", mask_secret(config.api_key.as_deref()));
    println!(
        "  API URL:     {}",
        config.api_url.as_deref().unwrap_or("(provider default)")
    );
    println!();
    println!("Routing:");
    println!("  Fallback agent:        {}", config.classifier.fallback_agent);
    println!(
        "  Confidence threshold:  {:.2}",
        config.classifier.confidence_threshold
    );
    println!("  Tool loop budget:      {}", config.tool_loop.max_recursions);
    println!("  History window:        {} messages", config.history.max_messages);
    println!(
        "  Verified chain:        {}",
        if config.escalation.verified_chain { "on" } else { "off" }
    );
    println!();
    println!(
        "Gateway:     {}:{}",
        config.gateway.host, config.gateway.port
    );
    for (label, path) in [
        ("Orders", &config.data.orders_path),
        ("Shipments", &config.data.shipments_path),
        ("Products", &config.data.products_path),
        ("Knowledge", &config.data.knowledge_path),
    ] {
        let shown = path
            .as_deref()
            .map_or_else(|| "(built-in sample)".to_string(), |p| {
                PathBuf::from(p).display().to_string()
            });
        println!("  {label:<10} {shown}");
    }
}

/// Keep the first four characters of a secret and mask the rest.
fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(s) if s.chars().count() <= 8 => "****".to_string(),
        Some(s) => format!("{}****", s.chars().take(4).collect::<String>()),
    }
}
