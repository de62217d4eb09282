//! `webblock check <host>`: would this host be blocked right now?

use anyhow::Result;
use tracing::debug;
use webblock_client::{ClientState, DomainList, SyncConfig, SyncManager};

pub async fn run(config: SyncConfig, domains: &DomainList, target: &str) -> Result<()> {
    let host = host_of(target);
    if host.is_empty() {
        anyhow::bail!("no host in '{target}'");
    }
    let manager = SyncManager::new(config);
    let state = manager.current_state().await;
    debug!(
        host = %host,
        connected = state.server_connected,
        working = state.working,
        waiting = state.waiting_for_input,
        "checking host"
    );
    println!("{}", verdict(domains, host, &state));
    Ok(())
}

/// `blocked` only for listed domains while the derived state blocks.
pub fn verdict(domains: &DomainList, host: &str, state: &ClientState) -> &'static str {
    if domains.matches(host) && state.blocked {
        "blocked"
    } else {
        "open"
    }
}

/// Host part of a bare host or a URL.
pub fn host_of(target: &str) -> &str {
    let rest = target
        .split_once("://")
        .map_or(target, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    host_port.split(':').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(blocked: bool) -> ClientState {
        ClientState {
            server_connected: true,
            sessions: 1,
            working: usize::from(!blocked),
            waiting_for_input: 0,
            blocked,
            bypass_active: false,
            bypass_remaining_secs: None,
        }
    }

    #[test]
    fn extracts_host() {
        assert_eq!(host_of("youtube.com"), "youtube.com");
        assert_eq!(host_of("https://www.youtube.com/watch?v=1"), "www.youtube.com");
        assert_eq!(host_of("http://user@x.com:8080/"), "x.com");
        assert_eq!(host_of("https://"), "");
    }

    #[test]
    fn only_listed_domains_block() {
        let domains = DomainList::default();
        assert_eq!(verdict(&domains, "m.youtube.com", &state(true)), "blocked");
        assert_eq!(verdict(&domains, "m.youtube.com", &state(false)), "open");
        assert_eq!(verdict(&domains, "docs.rs", &state(true)), "open");
    }
}
