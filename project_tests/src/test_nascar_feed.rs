//! # NASCAR Live Feed Test
//!
//! Runs the NASCAR polling monitor against the live endpoint and prints every
//! flag change with the bulb color it maps to. Stops on Ctrl-C.

use clap::Parser;
use lib_common::actuators::ColorTables;
use lib_common::ingestors::nascar_polling::flag_name;
use lib_common::ingestors::{FeedKind, FeedMonitor, FlagCode, MonitorContext, NascarSchema, PollingMonitor};
use lib_common::loggers::LogSink;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[clap(about = "Live smoke test of the NASCAR flag feed")]
struct Args {
    /// Seconds between polls.
    #[clap(long, default_value_t = 5)]
    poll_seconds: u64,

    /// Only print the code table and exit.
    #[clap(long)]
    table_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // // Statement: Mirror monitor logs to stdout with a short timestamp
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}] {}",
                chrono::Local::now().format("[%H:%M:%S]"),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("flags", log::LevelFilter::Debug)
        .chain(std::io::stdout())
        .apply()?;

    let colors = ColorTables::default();
    println!("NASCAR flag codes:");
    println!("-----------------------------------------------");
    for code in 0..10 {
        let color = colors.lookup(FeedKind::Nascar, &FlagCode::new(code.to_string()));
        let hex = color.map(|c| c.hex.as_str()).unwrap_or("-");
        println!("  {:>2}  {:<14} {}", code, flag_name(code), hex);
    }
    println!("-----------------------------------------------");
    if args.table_only {
        return Ok(());
    }

    let mut config = NascarSchema::default_config();
    config.poll_interval = Duration::from_secs(args.poll_seconds.max(1));
    config.error_interval = config.poll_interval;
    let mut monitor = PollingMonitor::new(NascarSchema, config)?;

    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let ctx = MonitorContext::new(tx, cancel.clone(), LogSink::discard());
    let task = tokio::spawn(async move { monitor.run(ctx).await });

    println!("[*] Polling the live feed. Ctrl-C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = rx.recv() => match update {
                Some(update) => {
                    let flag = update.get("NascarFlag").cloned().unwrap_or_default();
                    let code = update.flag_code();
                    let color = code.as_ref().and_then(|c| colors.lookup(FeedKind::Nascar, c));
                    println!(
                        "[FLAG] {} (code {}) lap {}/{} -> {}",
                        flag["flag_name"].as_str().unwrap_or("?"),
                        code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
                        flag["lap_number"],
                        flag["laps_in_race"],
                        color.map(|c| format!("{} {}", c.label, c.hex)).unwrap_or_else(|| "no color".to_string()),
                    );
                }
                None => break,
            },
        }
    }

    cancel.cancel();
    task.await?;
    println!("[*] Stopped.");
    Ok(())
}
