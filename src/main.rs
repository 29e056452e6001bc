//! Hive client command line
//!
//! Usage: hive-client [--node URL]... [--config PATH] [--plain-logs] [--metrics] <command>

use hive_client::{
    Account, AppConfig, Asset, CallParams, Hive, NodeList, Weights, Witness,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "\
Usage: hive-client [OPTIONS] <COMMAND>

Commands:
  nodes [--update]                      List candidate nodes by score
  config                                Print dialect and chain properties
  call <method> [json-args] [--api NAME]
                                        Call a remote method
  account <name>                        Print an account
  witness <owner>                       Print a witness
  asset <symbol>                        Print a native asset
  methods [api]                         List methods served by the node

Options:
  --node URL       Node to use (repeatable, overrides configuration)
  --config PATH    Configuration file (default: hive.* / config/hive.*)
  --plain-logs     Human readable logs instead of JSON
  --metrics        Print Prometheus metrics after the command";

#[derive(Debug)]
enum Command {
    Nodes { update: bool },
    Config,
    Call { method: String, args: Option<String>, api: Option<String> },
    Account(String),
    Witness(String),
    Asset(String),
    Methods(Option<String>),
}

#[derive(Debug)]
struct Args {
    nodes: Vec<String>,
    config: Option<PathBuf>,
    plain_logs: bool,
    metrics: bool,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut nodes = Vec::new();
    let mut config = None;
    let mut plain_logs = false;
    let mut metrics = false;
    let mut api = None;
    let mut update = false;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--node" | "--config" | "--api" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("ERROR: {} requires a value", args[i]);
                    std::process::exit(1);
                };
                match args[i].as_str() {
                    "--node" => nodes.push(value.clone()),
                    "--config" => config = Some(PathBuf::from(value)),
                    _ => api = Some(value.clone()),
                }
                i += 2;
            }
            "--plain-logs" => {
                plain_logs = true;
                i += 1;
            }
            "--metrics" => {
                metrics = true;
                i += 1;
            }
            "--update" => {
                update = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => {
                eprintln!("Unknown argument: {flag}");
                std::process::exit(1);
            }
            _ => {
                positional.push(args[i].clone());
                i += 1;
            }
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("nodes") => Command::Nodes { update },
        Some("config") => Command::Config,
        Some("call") => match positional.next() {
            Some(method) => Command::Call {
                method,
                args: positional.next(),
                api,
            },
            None => usage_error("call requires a method"),
        },
        Some("account") => Command::Account(required(positional.next(), "account requires a name")),
        Some("witness") => Command::Witness(required(positional.next(), "witness requires an owner")),
        Some("asset") => Command::Asset(required(positional.next(), "asset requires a symbol")),
        Some("methods") => Command::Methods(positional.next()),
        Some(other) => usage_error(&format!("unknown command: {other}")),
        None => usage_error("missing command"),
    };

    Args {
        nodes,
        config,
        plain_logs,
        metrics,
        command,
    }
}

fn required(value: Option<String>, message: &str) -> String {
    value.unwrap_or_else(|| usage_error(message))
}

fn usage_error(message: &str) -> ! {
    eprintln!("ERROR: {message}\n\n{USAGE}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    init_tracing(args.plain_logs);

    let mut config = load_config(args.config.as_deref())?;
    if !args.nodes.is_empty() {
        config.rpc.nodes = args.nodes.clone();
    }

    if let Command::Nodes { update: false } = args.command {
        print_nodes(&NodeList::new());
        return Ok(());
    }

    let hive = Arc::new(Hive::connect(&config).await?);
    let node = hive.rpc().await.url().to_string();
    tracing::info!(node = %node, "Session ready");

    match &args.command {
        Command::Nodes { .. } => {
            let mut list = NodeList::new();
            if !list.update_nodes(&hive, &Weights::Equal).await {
                tracing::warn!("No node report available, showing bundled scores");
            }
            print_nodes(&list);
        }
        Command::Config => {
            let rpc = hive.rpc().await;
            println!("node:    {}", rpc.url());
            if let Some(dialect) = rpc.dialect() {
                println!("dialect: {dialect}");
            }
            println!("chain:   {}", hive_client::chains::detect(rpc.chain_properties(), rpc.dialect()).name);
            if let Some(props) = rpc.chain_properties() {
                print_json(props)?;
            }
        }
        Command::Call { method, args, api } => {
            let params = match args {
                Some(raw) => CallParams::from_value(serde_json::from_str(raw)?),
                None => CallParams::none(),
            };
            let result = hive.rpc().await.call(api.as_deref(), method, params).await?;
            print_json(&result)?;
        }
        Command::Account(name) => {
            let account = Account::new(Arc::clone(&hive), name).await?;
            print_object(account.as_map())?;
        }
        Command::Witness(owner) => {
            let witness = Witness::new(Arc::clone(&hive), owner).await?;
            println!("{witness} active={}", witness.is_active());
            print_object(witness.as_map())?;
        }
        Command::Asset(symbol) => {
            let asset = Asset::new(Arc::clone(&hive), symbol).await?;
            print_object(asset.as_map())?;
        }
        Command::Methods(api) => {
            for method in hive.rpc().await.get_methods(api.as_deref()).await? {
                println!("{method}");
            }
        }
    }

    if args.metrics {
        print!("{}", hive.metrics().render());
    }

    Ok(())
}

fn print_nodes(list: &NodeList) {
    for node in list.nodes() {
        println!("{:>6.1}  {:<16} {}", node.score, node.node_type.to_string(), node.url);
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_object(data: Option<&hive_client::ObjectData>) -> anyhow::Result<()> {
    let data = data.ok_or_else(|| anyhow::anyhow!("object was not loaded"))?;
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Initialize tracing subscriber, logging to stderr
fn init_tracing(plain: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "hive_client=info".into());
    let json = (!plain).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text = plain.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}

/// Load and validate configuration
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<AppConfig> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = match path {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    Ok(config)
}
