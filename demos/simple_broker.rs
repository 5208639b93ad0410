//! Simple MQTT broker example
//!
//! Run with: cargo run --example simple_broker [LISTEN_URI]
//!
//! Examples:
//!   cargo run --example simple_broker                          # tcp://0.0.0.0:1883
//!   cargo run --example simple_broker tcp://127.0.0.1:1884
//!   cargo run --example simple_broker tcp6://[::1]:1883
//!
//! ## Trying it out
//!
//! With mosquitto clients:
//!   mosquitto_sub -h localhost -t room1
//!   mosquitto_pub -h localhost -t room1 -m hello
//!
//! Topics match exactly: no wildcards, no retained messages, QoS 0 only.

use std::sync::Arc;
use std::time::Duration;

use relaymq::{Broker, ServerConfig};

fn print_usage() {
    eprintln!("Usage: simple_broker [LISTEN_URI]");
    eprintln!();
    eprintln!("LISTEN_URI: tcp://host:port, tcp4://host:port or tcp6://[host]:port");
    eprintln!("            (default: tcp://0.0.0.0:1883)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relaymq=debug".parse()?)
                .add_directive("simple_broker=debug".parse()?),
        )
        .init();

    let uri = args.get(1).map(String::as_str).unwrap_or("tcp://0.0.0.0:1883");
    let config = match ServerConfig::from_uri(uri).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    println!("Starting MQTT broker on {}", config.bind_addr);

    let broker = Arc::new(Broker::new(config));

    // Periodic stats
    let stats_broker = Arc::clone(&broker);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        interval.tick().await;
        loop {
            interval.tick().await;
            let stats = stats_broker.stats().await;
            println!(
                "Stats: clients={} (total {}) received={} sent={} delivered={} dropped={}",
                stats_broker.registry().live_count().await,
                stats_broker.registry().size(),
                stats.messages_received,
                stats.messages_sent,
                stats.deliveries,
                stats.dropped_deliveries,
            );
        }
    });

    // Run with Ctrl+C handling
    broker
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
