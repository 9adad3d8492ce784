//! Command handlers.

use std::path::PathBuf;

use anyhow::Context;

use quill_core::backup::BackupFile;
use quill_core::session::{ConflictResolution, Session, SyncOutcome};
use quill_core::SessionConfig;

use crate::cli::ResolveSide;
use crate::helpers;
use crate::output;

/// Resolve the data directory: flag, env (via clap), or platform default.
pub fn data_dir(flag: Option<&str>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::data_dir().context("Could not determine a data directory; pass --data-dir")?;
    Ok(base.join("quill"))
}

pub fn open_session(flag: Option<&str>) -> anyhow::Result<Session> {
    let dir = data_dir(flag)?;
    tracing::debug!(path = %dir.display(), "opening session");
    let session = Session::open(&dir, SessionConfig::default())?;
    if session.status().degraded_storage {
        output::warning("primary note database unavailable; using the key-value fallback");
    }
    Ok(session)
}

/// Unlock an already-initialized session, prompting for the passphrase.
async fn unlock(session: &Session) -> anyhow::Result<()> {
    if !session.is_initialized() {
        anyhow::bail!("No passphrase configured. Run `quill init` first.");
    }
    let passphrase = helpers::prompt_passphrase()?;
    session.unlock(&passphrase).await?;
    Ok(())
}

pub async fn init(session: &Session) -> anyhow::Result<()> {
    if session.is_initialized() {
        anyhow::bail!("Already initialized. Use `quill rotate` to change the passphrase.");
    }
    let passphrase = helpers::prompt_new_passphrase("Enter passphrase")?;
    session.setup(&passphrase, &passphrase).await?;
    output::success("Encrypted note store created.");
    Ok(())
}

pub async fn list(session: &Session) -> anyhow::Result<()> {
    unlock(session).await?;
    output::print_note_list(&session.notes()?);
    Ok(())
}

pub async fn add(session: &Session, title: &str, content: Option<&str>) -> anyhow::Result<()> {
    unlock(session).await?;
    let content = match content {
        Some(content) => content.to_string(),
        None => helpers::read_stdin_content()?,
    };
    let note = session.create_note(title, &content).await?;
    output::success(&format!("Added note {}", &note.id.to_string()[..8]));
    Ok(())
}

pub async fn show(session: &Session, raw_id: &str) -> anyhow::Result<()> {
    unlock(session).await?;
    let notes = session.notes()?;
    let id = helpers::resolve_note_id(&notes, raw_id)?;
    output::print_note(&session.note(id)?);
    Ok(())
}

pub async fn edit(
    session: &Session,
    raw_id: &str,
    title: Option<&str>,
    content: Option<&str>,
) -> anyhow::Result<()> {
    unlock(session).await?;
    let notes = session.notes()?;
    let id = helpers::resolve_note_id(&notes, raw_id)?;
    let current = session.note(id)?;
    let title = title.unwrap_or(&current.title);
    let content = content.unwrap_or(&current.content);
    session.update_note(id, title, content).await?;
    output::success("Note updated.");
    Ok(())
}

pub async fn delete(session: &Session, raw_id: &str) -> anyhow::Result<()> {
    unlock(session).await?;
    let notes = session.notes()?;
    let id = helpers::resolve_note_id(&notes, raw_id)?;
    session.delete_note(id).await?;
    output::success("Note deleted. It disappears everywhere on the next sync.");
    Ok(())
}

pub async fn sync(session: &Session, endpoint: Option<&str>) -> anyhow::Result<()> {
    if let Some(endpoint) = endpoint {
        session.set_endpoint(endpoint)?;
    }
    unlock(session).await?;
    match session.sync().await? {
        SyncOutcome::Pushed => output::success("Synced. Local changes pushed."),
        SyncOutcome::FastForwarded => output::success("Synced. Updated to the server version."),
        SyncOutcome::Merged { conflicts } => output::print_conflicts(&conflicts),
    }
    Ok(())
}

pub async fn resolve(session: &Session, side: ResolveSide) -> anyhow::Result<()> {
    unlock(session).await?;
    let resolution = match side {
        ResolveSide::Local => ConflictResolution::KeepLocal,
        ResolveSide::Server => ConflictResolution::KeepServer,
    };
    session.resolve_conflict(resolution).await?;
    match resolution {
        ConflictResolution::KeepLocal => {
            output::success("Kept the local version. Sync again to push it.")
        }
        ConflictResolution::KeepServer => output::success("Kept the server version."),
    }
    Ok(())
}

pub async fn rotate(session: &Session) -> anyhow::Result<()> {
    unlock(session).await?;
    let current = helpers::prompt_passphrase()?;
    let next = helpers::prompt_new_passphrase("New passphrase")?;
    session.rotate(&current, &next, &next).await?;
    output::success("Passphrase changed and data re-encrypted. Export a fresh backup.");
    Ok(())
}

pub async fn export(session: &Session, path: &str) -> anyhow::Result<()> {
    let backup = session.export_backup().await?;
    std::fs::write(path, backup.to_json()?)
        .with_context(|| format!("Failed to write backup to {}", path))?;
    output::success(&format!("Encrypted backup written to {}", path));
    Ok(())
}

pub async fn import(session: &Session, path: &str, yes: bool) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read backup from {}", path))?;
    let backup = BackupFile::parse(&raw)?;

    if !yes
        && !helpers::confirm("Importing this backup replaces your local encrypted notes. Continue?")?
    {
        println!("Import canceled.");
        return Ok(());
    }

    session.import_backup(&backup).await?;
    output::success("Backup imported. Unlock with its passphrase to access notes.");
    Ok(())
}

pub async fn wipe(session: &Session, yes: bool) -> anyhow::Result<()> {
    if !yes
        && !helpers::confirm(
            "This permanently erases all local notes, passphrase setup, and sync metadata. Continue?",
        )?
    {
        println!("Wipe canceled.");
        return Ok(());
    }
    session.wipe().await?;
    output::success("Local data wiped. Run `quill init` to start over.");
    Ok(())
}

pub fn status(session: &Session) -> anyhow::Result<()> {
    output::print_status(&session.status());
    Ok(())
}
