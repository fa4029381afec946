//! Token signal feed
//!
//! Turns raw message text (Telegram forwards, pasted lines on stdin) into
//! token mint addresses and pushes them into a bounded queue for the
//! controller. A `t.me/...?start=<mint>` deep link wins over any bare
//! base58 blob in the same message, since call channels bury the real CA
//! inside referral links.

use std::sync::OnceLock;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const BASE58_RUN: &str = r"[1-9A-HJ-NP-Za-km-z]{32,44}(?:pump|bonk)?";

fn start_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"t\.me/[A-Za-z0-9_]+\?start=({})", BASE58_RUN))
            .unwrap_or_else(|e| unreachable!("static regex: {}", e))
    })
}

fn address_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(BASE58_RUN).unwrap_or_else(|e| unreachable!("static regex: {}", e))
    })
}

/// Pull the first token address out of a message, if any
pub fn extract_address(text: &str) -> Option<String> {
    if let Some(caps) = start_link_re().captures(text) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    address_re().find(text).map(|m| m.as_str().to_string())
}

/// Read messages from stdin (one per line), extract addresses and feed
/// them into the queue until EOF or shutdown. Backpressure from a full
/// queue simply pauses reading.
pub async fn run_stdin_feed(tx: mpsc::Sender<String>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("Reading signals from stdin");
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let Some(address) = extract_address(&line) else {
                    debug!("No token address in line, ignoring");
                    continue;
                };
                if tx.send(address).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("Signal input closed");
                break;
            }
            Err(e) => {
                warn!("Signal input error: {}", e);
                break;
            }
        }
    }
}
