//! remora-ctl: command-line interface for the Remora daemon.

use anyhow::{Context, Result};

use remora_core::config::{DEFAULT_PORT, ServerAddress};

mod cmd;

fn print_usage() {
    println!("Usage: remora-ctl [--server <host:port>] <command>");
    println!();
    println!("Commands:");
    println!("  submit <json>   Submit a command, print its result id");
    println!("  get <id>        Wait for a result and print it");
    println!("  status <id>     Show whether a result is ready");
    println!("  state <id>      Show a result or its latest checkpoint");
    println!("  abort <id>      Cancel an unfinished unit of work");
    println!("  contract        List the classes the server offers");
    println!();
    println!("Options:");
    println!(
        "  --server <host:port>   Server address (default: $REMORA_SERVER or 127.0.0.1:{})",
        DEFAULT_PORT
    );
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --server option
    let mut server = None;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--server" {
            i += 1;
            let raw = args.get(i).context("--server requires a value")?;
            server = Some(ServerAddress::parse(raw)?);
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }
    let server = match server {
        Some(s) => s,
        None => ServerAddress::from_env()?
            .unwrap_or_else(|| ServerAddress {
                host: "127.0.0.1".to_string(),
                port: DEFAULT_PORT,
            }),
    };

    match remaining.as_slice() {
        ["submit", json]               => cmd::commands::cmd_submit(&server, json).await,
        ["abort", id]                  => cmd::commands::cmd_abort(&server, id).await,
        ["get", id]                    => cmd::results::cmd_get(&server, id).await,
        ["status", id]                 => cmd::results::cmd_status(&server, id).await,
        ["state", id]                  => cmd::results::cmd_state(&server, id).await,
        ["contract"]                   => cmd::contract::cmd_contract(&server).await,
        ["help"] | ["--help"] | ["-h"] | [] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
