//! Command-line interface for signal-alarm.
//!
//! This binary controls the alarm daemon via the HTTP API.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use time::OffsetDateTime;

use signal_alarm::api_client::{self, types::AlarmView};
use signal_alarm::signal::{AntidelaySeconds, Signal};
use signal_alarm::trigger;

fn usage() -> ! {
    eprintln!("Usage: signal-alarm-cli <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  status             Show alarm state");
    eprintln!("  dismiss            Silence a ringing alarm");
    eprintln!("  antidelay <secs>   Set the lead time applied to every signal");
    eprintln!("  signals            List signals still waiting to ring");
    eprintln!("  save <file>        Replace the signal list with a JSON array from <file>");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SIGNAL_ALARM_API_URL    API base URL (default: http://127.0.0.1:7786)");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        usage();
    }

    let command = &args[1];

    match command.as_str() {
        "status" => cmd_status().await?,
        "dismiss" => cmd_dismiss().await?,
        "antidelay" => {
            let Some(secs) = args.get(2) else { usage() };
            let secs: u32 = secs
                .parse()
                .with_context(|| format!("antidelay must be a non-negative integer, got {secs:?}"))?;
            cmd_antidelay(AntidelaySeconds(secs)).await?
        }
        "signals" => cmd_signals().await?,
        "save" => {
            let Some(path) = args.get(2) else { usage() };
            cmd_save(path).await?
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Build an API client, honoring SIGNAL_ALARM_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("SIGNAL_ALARM_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

fn print_view(view: &AlarmView) {
    if view.ringing {
        println!("Alarm:     RINGING");
    } else {
        println!("Alarm:     idle");
    }
    if let Some(signal) = &view.signal {
        println!("Signal:    {} {}", signal.asset, signal.direction);
    }
    if view.ringing_signals.len() > 1 {
        println!("Also ringing:");
        for signal in view.ringing_signals.iter().skip(1) {
            println!("  - {} {}", signal.asset, signal.direction);
        }
    }
    println!("Antidelay: {}", view.antidelay_secs);
}

/// Print the current alarm state.
async fn cmd_status() -> Result<()> {
    let client = make_client();
    let view = client.get_alarm().await?;
    print_view(&view);
    Ok(())
}

async fn cmd_dismiss() -> Result<()> {
    let client = make_client();
    let view = client.dismiss().await?;
    print_view(&view);
    Ok(())
}

async fn cmd_antidelay(antidelay: AntidelaySeconds) -> Result<()> {
    let client = make_client();
    let config = client.set_antidelay(antidelay).await?;
    println!("Antidelay: {}", config.antidelay_secs);
    Ok(())
}

/// List pending signals with the time left until each one rings.
async fn cmd_signals() -> Result<()> {
    let client = make_client();
    let signals = client.get_signals().await?;
    let config = client.get_config().await?;

    if signals.is_empty() {
        println!("Signals: (none)");
        return Ok(());
    }

    let now = OffsetDateTime::now_utc();
    println!("Signals:");
    for signal in &signals {
        let remaining = trigger::fire_at(signal, config.antidelay_secs)
            .map(|at| (at - now).whole_seconds())
            .unwrap_or(-1);
        if remaining >= 0 {
            println!(
                "  - {} {} @ {} (in {} s)",
                signal.asset,
                signal.direction,
                signal.timestamp.unix_timestamp(),
                remaining
            );
        } else {
            println!(
                "  - {} {} @ {} (missed)",
                signal.asset,
                signal.direction,
                signal.timestamp.unix_timestamp()
            );
        }
    }

    Ok(())
}

/// Parse a signal list: a JSON array of `{asset, direction, timestamp}`.
fn parse_signals(json: &str) -> Result<Vec<Signal>> {
    serde_json::from_str(json).context("expected a JSON array of signals")
}

/// Replace the daemon's signal list with the contents of `path`.
async fn cmd_save(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let signals = parse_signals(&json)?;

    let client = make_client();
    let pending = client.put_signals(&signals).await?;
    println!("Saved {} signal(s), {} pending", signals.len(), pending.len());
    Ok(())
}
