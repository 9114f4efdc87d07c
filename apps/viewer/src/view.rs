use std::fmt::Write as _;

use client_core::{ListSnapshot, SyncStatus};
use shared::domain::RankedEntry;

pub fn render_entry(entry: &RankedEntry) -> String {
    format!(
        "#{:<6} {:<24} {}",
        entry.rank, entry.display_name, entry.score
    )
}

fn status_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Idle => "idle",
        SyncStatus::Loading => "loading",
        SyncStatus::Refreshing => "refreshing",
        SyncStatus::LoadingMore => "loading more",
        SyncStatus::Polling => "updating",
        SyncStatus::Ready => "ready",
        SyncStatus::Error => "error",
    }
}

pub fn render_status(snapshot: &ListSnapshot, live: Option<bool>) -> String {
    let mut line = format!(
        "[{}] {} rows",
        status_label(snapshot.status),
        snapshot.items.len()
    );
    if let Some(query) = &snapshot.query {
        let _ = write!(line, " matching \"{query}\"");
    }
    if snapshot.has_more {
        line.push_str(", more available");
    }
    match live {
        Some(true) => line.push_str(" | LIVE"),
        Some(false) => line.push_str(" | paused"),
        None => {}
    }
    if let Some(error) = &snapshot.error {
        let _ = write!(line, " | {error}");
    }
    line
}

/// Renders the whole list followed by a status line.
pub fn render_snapshot(snapshot: &ListSnapshot, live: Option<bool>) -> String {
    let mut out = String::new();
    if snapshot.items.is_empty() && snapshot.status == SyncStatus::Ready {
        out.push_str("(no entries)\n");
    }
    for entry in &snapshot.items {
        out.push_str(&render_entry(entry));
        out.push('\n');
    }
    out.push_str(&render_status(snapshot, live));
    out
}
