use clap::{Parser, Subcommand};
use std::collections::HashMap;
use tokio::io::{AsyncBufReadExt, BufReader};

use lib::events::{ChatEvent, Command};
use lib::timeline::SentBy;

#[derive(Parser)]
#[command(name = "pigeon")]
#[command(about = "Pigeon CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default config file.
    Init {
        /// Config file path (default: PIGEON_CONFIG_PATH or ~/.pigeon/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Chat from the terminal via the backend bridge (interactive).
    Chat {
        /// Config file path (default: PIGEON_CONFIG_PATH or ~/.pigeon/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Bridge host (default from config or 127.0.0.1)
        #[arg(long)]
        host: Option<String>,

        /// Bridge port (default from config or 8000)
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("pigeon {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, host, port }) => {
            if let Err(e) = run_chat(config, host, port).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let host = host.unwrap_or_else(|| config.bridge.host.clone());
    let port = port.unwrap_or_else(|| lib::config::resolve_bridge_port(&config));

    let (push_tx, push_rx) = tokio::sync::mpsc::channel(64);
    let bridge = lib::bridge::WsBridge::connect(&host, port, push_tx).await?;

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
    let controller = lib::sync::SyncController::new(bridge, event_tx);
    let engine = tokio::spawn(controller.run(push_rx, cmd_rx));

    println!(
        "commands: /contacts, /select <uuid>, /clear, /add <uuid>, /quit; anything else sends"
    );

    // Render model rebuilt from events only: display names and selection.
    let mut names: HashMap<String, String> = HashMap::new();
    let mut active: Option<String> = None;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    println!("engine stopped");
                    break;
                };
                print_event(event, &mut names, &mut active);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                if line == "/contacts" {
                    if names.is_empty() {
                        println!("(no contacts)");
                    }
                    for (uuid, name) in &names {
                        println!("  {} <{}>", name, uuid);
                    }
                    continue;
                }
                if let Some(uuid) = line.strip_prefix("/select ") {
                    let _ = cmd_tx.send(Command::SetActive(uuid.trim().to_string()));
                    continue;
                }
                if line == "/clear" {
                    let _ = cmd_tx.send(Command::ClearActive);
                    active = None;
                    println!("selection cleared");
                    continue;
                }
                if let Some(uuid) = line.strip_prefix("/add ") {
                    let _ = cmd_tx.send(Command::RequestContact(uuid.trim().to_string()));
                    continue;
                }
                if active.is_none() {
                    println!("no conversation selected; use /select <uuid>");
                    continue;
                }
                let _ = cmd_tx.send(Command::Send(line.to_string()));
            }
        }
    }

    engine.abort();
    Ok(())
}

fn print_event(
    event: ChatEvent,
    names: &mut HashMap<String, String>,
    active: &mut Option<String>,
) {
    match event {
        ChatEvent::Ready { identity } => {
            println!("connected as {} <{}>", identity.display_name, identity.uuid);
        }
        ChatEvent::ContactAdded(contact) => {
            println!("contact added: {} <{}>", contact.display_name, contact.id);
            names.insert(contact.id, contact.display_name);
        }
        ChatEvent::MessageAppended { contact_id, message } => {
            let who = match message.sent_by {
                SentBy::Me => "you",
                SentBy::Peer => names
                    .get(&contact_id)
                    .map(String::as_str)
                    .unwrap_or(contact_id.as_str()),
            };
            println!("[{}] {}", who, message.body);
        }
        ChatEvent::SelectionChanged { contact_id } => {
            let name = names
                .get(&contact_id)
                .cloned()
                .unwrap_or_else(|| contact_id.clone());
            println!("now chatting with {}", name);
            *active = Some(contact_id);
        }
        ChatEvent::ContactRequestFailed => {
            println!("contact request failed");
        }
        ChatEvent::Error(message) => {
            println!("error: {}", message);
        }
    }
}
