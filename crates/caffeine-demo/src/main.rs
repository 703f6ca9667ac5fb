//! Command-line demonstration of the broadcast control plane: signs in,
//! negotiates a broadcast against the configured stage service, and runs
//! until the broadcast ends or fails.
//!
//! This binary stands in for a host application; it drives [`Instance`]
//! through the in-memory [`caffeine_core::test_support`] fakes rather than a
//! real WebRTC engine, since that engine is an external collaborator this
//! crate never owns.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use caffeine_core::Instance;
use caffeine_core::test_support::{FakeJpegEncoder, FakePeerConnection};
use caffeine_protocol::CaffeineConfig;

struct Args {
    config_path: PathBuf,
    username: String,
    password: String,
    otp: Option<String>,
    title: String,
    width: u32,
    height: u32,
}

fn parse_args() -> Args {
    let mut config_path = PathBuf::from("./config/caffeine.toml");
    let mut username = String::new();
    let mut password = String::new();
    let mut otp = None;
    let mut title = "LIVE on Caffeine!".to_string();
    let mut width = 1280u32;
    let mut height = 720u32;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--username" | "-u" => {
                if i + 1 < args.len() {
                    username = args[i + 1].clone();
                    i += 1;
                }
            }
            "--password" | "-p" => {
                if i + 1 < args.len() {
                    password = args[i + 1].clone();
                    i += 1;
                }
            }
            "--otp" => {
                if i + 1 < args.len() {
                    otp = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--title" | "-t" => {
                if i + 1 < args.len() {
                    title = args[i + 1].clone();
                    i += 1;
                }
            }
            "--width" => {
                if i + 1 < args.len() {
                    width = args[i + 1].parse().unwrap_or(width);
                    i += 1;
                }
            }
            "--height" => {
                if i + 1 < args.len() {
                    height = args[i + 1].parse().unwrap_or(height);
                    i += 1;
                }
            }
            "-h" | "--help" => {
                println!("caffeine-demo - Caffeine broadcast control plane demo");
                println!();
                println!("USAGE:");
                println!("    caffeine-demo --username <NAME> --password <PASSWORD> [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    --config <PATH>     Config file [default: ./config/caffeine.toml]");
                println!("    --username <NAME>   Account username");
                println!("    --password <PASS>   Account password");
                println!("    --otp <CODE>        Multi-factor code, if required");
                println!("    --title <TITLE>     Broadcast title");
                println!("    --width <PIXELS>    Capture width [default: 1280]");
                println!("    --height <PIXELS>   Capture height [default: 720]");
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    Args {
        config_path,
        username,
        password,
        otp,
        title,
        width,
        height,
    }
}

fn load_config(path: &PathBuf) -> Result<CaffeineConfig> {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).context("parsing caffeine config"),
        Err(_) => Ok(CaffeineConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    caffeine_core::init();

    let args = parse_args();
    let config = load_config(&args.config_path)?;
    if let Err(issues) = config.validate() {
        for issue in &issues {
            if issue.starts_with("ERROR:") {
                tracing::error!("{}", issue);
            } else {
                tracing::warn!("{}", issue);
            }
        }
        if issues.iter().any(|issue| issue.starts_with("ERROR:")) {
            anyhow::bail!("configuration is invalid, see above");
        }
    }

    if args.username.is_empty() || args.password.is_empty() {
        anyhow::bail!("--username and --password are required (see --help)");
    }

    let instance = Arc::new(Instance::new(config));

    if let Err(error) = instance.check_version().await {
        tracing::warn!(%error, "version check failed, continuing anyway");
    }

    instance
        .sign_in(&args.username, &args.password, args.otp.as_deref())
        .await
        .context("sign in failed")?;
    tracing::info!(username = %args.username, "signed in");

    if !instance.can_broadcast().await {
        anyhow::bail!("this account is not permitted to broadcast");
    }

    let peer = Arc::new(FakePeerConnection::new());
    let encoder = Arc::new(FakeJpegEncoder);
    instance
        .start_broadcast(&args.title, args.width, args.height, peer, encoder)
        .await
        .context("failed to start broadcast")?;
    tracing::info!(title = %args.title, "broadcast started");

    match instance.next_failure().await {
        Some(error) => tracing::error!(%error, "broadcast ended with an error"),
        None => tracing::info!("broadcast ended"),
    }

    instance.end_broadcast().await;
    Ok(())
}
