mod backup;
mod claims;
mod config;
mod db;
mod error;
mod ipc;
mod model;
mod ordering;
mod results;
mod storage;
mod store;
mod visibility;

use std::io::{self, BufRead, Write};

use clap::Parser;
use serde_json::json;

fn main() {
    let args = config::Args::parse();
    config::init_tracing(&args.log_level);

    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };
    if let Some(path) = args.workspace {
        match db::open_db(&path) {
            Ok(conn) => {
                tracing::info!(workspace = %path.display(), "opened workspace");
                state.workspace = Some(path);
                state.db = Some(conn);
            }
            Err(e) => tracing::error!(workspace = %path.display(), "failed to open workspace: {e:#}"),
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                tracing::warn!("unparseable request: {e}");
                let reply = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", reply);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, shutting down");
}
