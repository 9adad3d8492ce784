//! Output formatting helpers for the CLI.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;

use quill_core::merge::MergeConflict;
use quill_core::session::SessionStatus;
use quill_core::Note;

static QUIET: AtomicBool = AtomicBool::new(false);

pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::Relaxed);
}

pub fn success(message: &str) {
    if !QUIET.load(Ordering::Relaxed) {
        println!("{} {}", "ok".green().bold(), message);
    }
}

pub fn warning(message: &str) {
    eprintln!("{} {}", "warning".yellow().bold(), message);
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn short_id(note: &Note) -> String {
    note.id.to_string()[..8].to_string()
}

pub fn print_note_list(notes: &[Note]) {
    if notes.is_empty() {
        println!("No notes.");
        return;
    }
    for note in notes {
        println!(
            "{}  {}  {}",
            short_id(note).dimmed(),
            format_timestamp(note.updated_at).dimmed(),
            note.title
        );
    }
}

pub fn print_note(note: &Note) {
    println!("{}", note.title.bold());
    println!(
        "{}",
        format!("{}  updated {}", note.id, format_timestamp(note.updated_at)).dimmed()
    );
    if !note.content.is_empty() {
        println!();
        println!("{}", note.content);
    }
}

pub fn print_conflicts(conflicts: &[MergeConflict]) {
    if conflicts.is_empty() {
        println!("Both sides changed; keep-both merge applied.");
    } else {
        println!(
            "{} diverged on {} note(s); keep-both merge applied:",
            "conflict".red().bold(),
            conflicts.len()
        );
        for conflict in conflicts {
            let copy = match conflict.conflict_copy_id {
                Some(id) => format!("copy {}", &id.to_string()[..8]),
                None => "no copy (deleted)".to_string(),
            };
            println!(
                "  {}  winner: {}  {}",
                &conflict.note_id.to_string()[..8],
                conflict.winner,
                copy.dimmed()
            );
        }
    }
    println!(
        "Review the merge, then run {} or {}.",
        "quill resolve local".bold(),
        "quill resolve server".bold()
    );
}

pub fn print_status(status: &SessionStatus) {
    let state = if !status.initialized {
        "not initialized".to_string()
    } else if status.unlocked {
        "unlocked".green().to_string()
    } else {
        "locked".to_string()
    };
    println!("Session:       {}", state);
    println!(
        "Storage:       {}",
        if status.degraded_storage {
            "fallback (key-value)".yellow().to_string()
        } else {
            "primary (sqlite)".to_string()
        }
    );
    println!("Auto-lock:     {:?}", status.auto_lock);
    println!(
        "Endpoint:      {}",
        status.endpoint.as_deref().unwrap_or("not configured")
    );
    println!(
        "Device id:     {}",
        status.sync.device_id
    );
    println!(
        "Last synced:   {}",
        status
            .sync
            .last_synced_at
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string())
    );
    if status.pending_conflict {
        println!("{}", "A sync conflict is pending resolution.".red());
    }
}
