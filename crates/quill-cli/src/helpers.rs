//! Input and parsing helper functions for the CLI.

use std::io::{IsTerminal, Read};

use dialoguer::{Confirm, Password};
use secrecy::SecretString;
use uuid::Uuid;

use quill_core::Note;

/// Prompt for the passphrase, or read from the QUILL_PASSPHRASE env var.
pub fn prompt_passphrase() -> anyhow::Result<SecretString> {
    if let Ok(value) = std::env::var("QUILL_PASSPHRASE") {
        if !value.trim().is_empty() {
            return Ok(SecretString::from(value));
        }
    }
    if !std::io::stdin().is_terminal() {
        return Err(anyhow::anyhow!(
            "No passphrase provided and no TTY available. Set QUILL_PASSPHRASE."
        ));
    }
    let value = Password::new()
        .with_prompt("Passphrase")
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to read passphrase: {}", e))?;
    Ok(SecretString::from(value))
}

/// Prompt for a new passphrase with confirmation (init and rotation).
pub fn prompt_new_passphrase(prompt: &str) -> anyhow::Result<SecretString> {
    if let Ok(value) = std::env::var("QUILL_PASSPHRASE") {
        if !value.trim().is_empty() {
            return Ok(SecretString::from(value));
        }
    }
    let value = Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm passphrase", "Passphrases do not match")
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to read passphrase: {}", e))?;
    Ok(SecretString::from(value))
}

/// Ask a yes/no question, defaulting to no.
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to read confirmation: {}", e))
}

/// Read note content from stdin when it is piped in.
pub fn read_stdin_content() -> anyhow::Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(String::new());
    }
    let mut content = String::new();
    stdin.read_to_string(&mut content)?;
    Ok(content)
}

/// Resolve a full UUID or a unique prefix against the note list.
pub fn resolve_note_id(notes: &[Note], raw: &str) -> anyhow::Result<Uuid> {
    if let Ok(id) = Uuid::parse_str(raw) {
        return Ok(id);
    }

    let needle = raw.to_lowercase();
    let matches: Vec<&Note> = notes
        .iter()
        .filter(|note| note.id.to_string().starts_with(&needle))
        .collect();

    match matches.len() {
        0 => Err(anyhow::anyhow!("No note matches id '{}'", raw)),
        1 => Ok(matches[0].id),
        n => Err(anyhow::anyhow!(
            "Id prefix '{}' is ambiguous ({} matches)",
            raw,
            n
        )),
    }
}
