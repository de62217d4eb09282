//! `webblock watch`: live view of the blocking decision.
//!
//! Stdin commands: `b`/`bypass` starts the default bypass, `r`/`retry`
//! reconnects now, `q`/`quit` exits. Closing stdin keeps watching.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use webblock_client::{ClientState, SyncConfig, SyncManager};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchCommand {
    Bypass,
    Retry,
    Quit,
}

pub fn parse_command(line: &str) -> Option<WatchCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "b" | "bypass" => Some(WatchCommand::Bypass),
        "r" | "retry" => Some(WatchCommand::Retry),
        "q" | "quit" | "exit" => Some(WatchCommand::Quit),
        _ => None,
    }
}

/// One status line per state.
pub fn format_state(state: &ClientState) -> String {
    let verdict = if state.blocked { "BLOCKED" } else { "open" };
    let link = if state.server_connected {
        "connected"
    } else {
        "disconnected"
    };
    let mut line = format!(
        "{verdict:<8} {link:<12} sessions={} working={} waiting={}",
        state.sessions, state.working, state.waiting_for_input
    );
    if let Some(secs) = state.bypass_remaining_secs {
        line.push_str(&format!(" bypass={secs}s"));
    }
    line
}

pub async fn run(config: SyncConfig) -> Result<()> {
    let manager = SyncManager::start(config);
    let mut updates = manager.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let mut last = manager.state();
    println!("{}", format_state(&last));

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                if state != last {
                    println!("{}", format_state(&state));
                    last = state;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match parse_command(&line) {
                        Some(WatchCommand::Bypass) => {
                            manager.activate_default_bypass();
                        }
                        Some(WatchCommand::Retry) => manager.retry_connection().await,
                        Some(WatchCommand::Quit) => break,
                        None => eprintln!("unknown command '{}' (b = bypass, r = retry, q = quit)", line.trim()),
                    },
                    None => stdin_open = false,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.shutdown();
    info!("watch stopped");
    Ok(())
}
