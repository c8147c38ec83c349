//! Listing the classes a server offers.

use anyhow::{Context, Result};

use remora_core::config::ServerAddress;
use remora_core::Contract;

use super::http::{base_url, get};

pub async fn cmd_contract(server: &ServerAddress) -> Result<()> {
    let contract: Contract = get(&format!("{}/contract", base_url(server)))
        .await?
        .json()
        .await
        .context("failed to parse contract")?;

    println!("═══════════════════════════════════════");
    println!("  Classes ({})", contract.classes.len());
    println!("═══════════════════════════════════════");

    for class in &contract.classes {
        println!("  ┌─ {}", class.qualified_name());
        for m in &class.methods {
            let sync = if m.synchronous { " (sync)" } else { "" };
            match &m.returns {
                Some(ret) => println!("  │  {}(){} -> {}", m.name, sync, ret),
                None => println!("  │  {}(){}", m.name, sync),
            }
        }
        for f in &class.factories {
            println!("  │  {}.{}()", class.name, f.name);
        }
        println!("  └─ attributes : {}", class.attributes.join(", "));
    }

    Ok(())
}
