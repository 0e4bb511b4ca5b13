use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::driver::adb;
use crate::utils::binary_resolver;

/// Ring capacity of the entry buffer. When the engine falls behind, the
/// oldest entries are silently evicted.
const BUFFER_CAPACITY: usize = 256;

/// One observed network exchange from the device log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    pub method: String,
    pub endpoint: String,
    /// HTTP status code, or "-" when the response was never observed
    pub status: String,
}

/// Fold one logcat line into the pending-request state, returning an entry
/// once its request/response pair is complete.
fn fold_line(pending: &mut Option<NetworkEntry>, line: &str) -> Option<NetworkEntry> {
    // OkHttp-style markers: "--> GET https://host/path" and "<-- 200 ..."
    let request = Regex::new(r"-->\s+(GET|POST|PUT|DELETE|PATCH)\s+(http\S+)").unwrap();
    let response = Regex::new(r"<--\s+(\d{3})").unwrap();

    if let Some(caps) = request.captures(line) {
        let endpoint = shorten_url(&caps[2]);
        let fresh = NetworkEntry {
            method: caps[1].to_string(),
            endpoint,
            status: "-".to_string(),
        };
        // A second request before any response flushes the first as pending
        return pending.replace(fresh);
    }

    if let Some(caps) = response.captures(line) {
        if let Some(mut entry) = pending.take() {
            entry.status = caps[1].to_string();
            return Some(entry);
        }
    }

    None
}

/// Keep only the path portion of a full URL
fn shorten_url(url: &str) -> String {
    let path: Vec<&str> = url.split('/').skip(3).collect();
    format!("/{}", path.join("/"))
}

/// Background worker tailing `adb logcat` and publishing network entries into
/// a bounded auto-evicting buffer. Single writer (the tail task), single
/// reader (the execution engine draining snapshots between steps).
pub struct LogSniffer {
    child: Child,
    task: JoinHandle<()>,
    receiver: broadcast::Receiver<NetworkEntry>,
}

impl LogSniffer {
    /// Clear the device log backlog and start tailing
    pub async fn start(serial: Option<&str>) -> Result<Self> {
        let _ = adb::exec(serial, &["logcat", "-c"]).await;

        let adb_path = binary_resolver::find_adb()?;
        let mut cmd = Command::new(adb_path);
        if let Some(s) = serial {
            cmd.args(["-s", s]);
        }
        cmd.args(["logcat", "-v", "time"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().context("Failed to spawn adb logcat")?;
        let stdout = child
            .stdout
            .take()
            .context("adb logcat produced no stdout")?;

        let (sender, receiver) = broadcast::channel(BUFFER_CAPACITY);

        let task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut pending: Option<NetworkEntry> = None;

            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(entry) = fold_line(&mut pending, &line) {
                    let _ = sender.send(entry);
                }
            }

            if let Some(entry) = pending.take() {
                let _ = sender.send(entry);
            }
        });

        Ok(Self {
            child,
            task,
            receiver,
        })
    }

    /// Drain everything captured since the previous call. Non-blocking.
    pub fn recent_entries(&mut self) -> Vec<NetworkEntry> {
        let mut entries = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(entry) => entries.push(entry),
                // Evicted by the ring; newer entries are still readable
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        entries
    }

    pub async fn stop(mut self) {
        let _ = self.child.kill().await;
        self.task.abort();
    }
}
