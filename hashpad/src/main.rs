use std::path::PathBuf;

use anyhow::{Context, Result};
use hashpad_lib::channel::{fragment_from_link, link_for};
use hashpad_lib::{
    Channel, EditorEngine, EngineConfig, EngineHandle, LoadStatus, MemoryChannel, init_logging,
    spawn_engine,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const BASE_URL: &str = "https://hashpad.local/";
const ENV_CONFIG_PATH: &str = "HASHPAD_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(init_err) = init_logging() {
        eprintln!("logging bootstrap failed: {init_err}");
    }

    let config_path = std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref()).context("load configuration")?;
    info!(?config, "starting hashpad");

    let link = std::env::args().nth(1).unwrap_or_default();
    let channel = MemoryChannel::new(fragment_from_link(&link));
    let navigation = channel.subscribe();
    let (handle, task) = spawn_engine(EditorEngine::new(channel.clone(), &config), navigation);

    let snapshot = handle.snapshot().await?;
    if snapshot.load_status == LoadStatus::Unreadable {
        println!("! this link could not be read; starting from an empty document");
    }
    if !snapshot.text.is_empty() {
        println!("{}", snapshot.text);
    }
    print_status(&handle).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        match line.trim() {
            ":quit" => break,
            ":flush" => handle.force_flush().await?,
            ":back" => {
                if !channel.back() {
                    println!("! no earlier entry");
                }
            }
            ":forward" => {
                if !channel.forward() {
                    println!("! no later entry");
                }
            }
            ":link" => println!("{}", link_for(BASE_URL, &channel.read())),
            ":report" => {
                let report = handle.report().await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            command if command.starts_with(":dictate ") => {
                handle.recording_started().await?;
                handle
                    .insert_transcript(&command[":dictate ".len()..], None)
                    .await?;
            }
            _ => {
                let current = handle.snapshot().await?.text;
                let next = if current.is_empty() {
                    line.clone()
                } else {
                    format!("{current}\n{line}")
                };
                handle.apply_mutation(next).await?;
            }
        }
        print_status(&handle).await?;
    }

    let outcome = handle.shutdown().await?;
    info!(?outcome, "final flush");
    if let Err(err) = task.await {
        warn!("engine task ended abnormally: {err}");
    }
    println!("{}", link_for(BASE_URL, &channel.read()));
    Ok(())
}

async fn print_status(handle: &EngineHandle) -> Result<()> {
    let snapshot = handle.snapshot().await?;
    let marker = if snapshot.capacity.over_limit {
        " (too long to save)"
    } else if snapshot.dirty {
        " (unsaved)"
    } else {
        ""
    };
    println!("[{}% used{marker}]", snapshot.capacity.percent_used);
    Ok(())
}
