//! Sync wire schema (version 1) and its validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::KeyCheckRecord;
use crate::error::{QuillError, Result};
use crate::model::EncryptedNotesRecord;

/// Wire protocol version spoken by this adapter.
pub const PROTOCOL_VERSION: u32 = 1;

/// The only action defined by protocol v1.
const SYNC_ACTION: &str = "sync";

/// Full encrypted state of one installation.
///
/// Carried in both directions so a brand-new device can bootstrap its
/// key material from its first sync. Both records are opaque sealed
/// bytes; plaintext titles or contents never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedState {
    #[serde(rename = "keyCheck")]
    pub key_check: KeyCheckRecord,
    #[serde(rename = "encryptedNotes")]
    pub encrypted_notes: EncryptedNotesRecord,
}

impl EncryptedState {
    pub fn is_well_formed(&self) -> bool {
        self.key_check.is_well_formed() && self.encrypted_notes.is_well_formed()
    }
}

/// Client half of a sync request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncClientPayload {
    #[serde(rename = "deviceId")]
    pub device_id: String,
    /// Last revision this device believes the server holds
    #[serde(rename = "knownServerRevision")]
    pub known_server_revision: Option<String>,
    /// Revision id of the encrypted state being sent
    #[serde(rename = "localRevision")]
    pub local_revision: String,
    #[serde(rename = "sentAt")]
    pub sent_at: DateTime<Utc>,
    #[serde(rename = "encryptedState")]
    pub encrypted_state: EncryptedState,
}

/// A complete sync request envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncRequest {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u32,
    pub action: String,
    pub client: SyncClientPayload,
}

impl SyncRequest {
    /// Wrap a client payload with protocol metadata, validating it first.
    pub fn new(client: SyncClientPayload) -> Result<Self> {
        let request = Self {
            protocol_version: PROTOCOL_VERSION,
            action: SYNC_ACTION.to_string(),
            client,
        };
        validate_request(&request)?;
        Ok(request)
    }
}

/// A sync response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncResponse {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: u32,
    /// New authoritative server revision, or `None` if unchanged
    #[serde(rename = "serverRevision")]
    pub server_revision: Option<String>,
    /// Full server state when its content differs from what was sent
    #[serde(rename = "serverEncryptedState")]
    pub server_encrypted_state: Option<EncryptedState>,
    /// Opaque conflict marker; any non-null object is a conflict signal
    #[serde(default)]
    pub conflict: Option<serde_json::Value>,
}

/// Field-by-field validation of an outgoing request.
pub fn validate_request(request: &SyncRequest) -> Result<()> {
    if request.protocol_version != PROTOCOL_VERSION {
        return Err(QuillError::MalformedMessage(format!(
            "Unsupported protocol version {}",
            request.protocol_version
        )));
    }
    if request.action != SYNC_ACTION {
        return Err(QuillError::MalformedMessage(format!(
            "Unknown action {:?}",
            request.action
        )));
    }
    if request.client.device_id.is_empty() {
        return Err(QuillError::MalformedMessage(
            "Empty deviceId".to_string(),
        ));
    }
    if request.client.local_revision.is_empty() {
        return Err(QuillError::MalformedMessage(
            "Empty localRevision".to_string(),
        ));
    }
    if !request.client.encrypted_state.is_well_formed() {
        return Err(QuillError::MalformedMessage(
            "Malformed encrypted state in request".to_string(),
        ));
    }
    Ok(())
}

/// Parse and validate a raw response body.
///
/// The nullable fields must still be present: serde alone would default
/// an absent `Option` to `None`, silently accepting a truncated body.
/// Unknown and mistyped fields fail deserialization outright; the
/// semantic checks after it cover what the type system cannot express.
pub fn validate_response(raw: &str) -> Result<SyncResponse> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| QuillError::MalformedMessage(format!("Invalid sync response: {}", e)))?;
    let fields = value.as_object().ok_or_else(|| {
        QuillError::MalformedMessage("Sync response must be a JSON object".to_string())
    })?;
    for required in ["protocolVersion", "serverRevision", "serverEncryptedState"] {
        if !fields.contains_key(required) {
            return Err(QuillError::MalformedMessage(format!(
                "Missing field {:?} in sync response",
                required
            )));
        }
    }

    let response: SyncResponse = serde_json::from_value(value)
        .map_err(|e| QuillError::MalformedMessage(format!("Invalid sync response: {}", e)))?;

    if response.protocol_version != PROTOCOL_VERSION {
        return Err(QuillError::MalformedMessage(format!(
            "Unsupported protocol version {}",
            response.protocol_version
        )));
    }
    if let Some(revision) = &response.server_revision {
        if revision.is_empty() {
            return Err(QuillError::MalformedMessage(
                "Empty serverRevision".to_string(),
            ));
        }
    }
    if let Some(state) = &response.server_encrypted_state {
        if !state.is_well_formed() {
            return Err(QuillError::MalformedMessage(
                "Malformed server encrypted state".to_string(),
            ));
        }
    }
    if let Some(conflict) = &response.conflict {
        if !conflict.is_object() {
            return Err(QuillError::MalformedMessage(
                "Conflict marker must be an object".to_string(),
            ));
        }
    }
    Ok(response)
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use crate::crypto::{create_key_check, KdfConfig, SessionKey};
    use crate::model::{seal_notes_snapshot, Note};

    pub fn fast_kdf() -> KdfConfig {
        KdfConfig {
            memory_kib: 8 * 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    pub fn sealed_state(notes: &[Note], key: &SessionKey, key_check: KeyCheckRecord) -> EncryptedState {
        EncryptedState {
            key_check,
            encrypted_notes: seal_notes_snapshot(notes, key).unwrap(),
        }
    }

    pub fn sample_state() -> EncryptedState {
        let (derived, key_check) = create_key_check("test-passphrase", &fast_kdf()).unwrap();
        sealed_state(&[Note::new("A", "body")], &derived.key, key_check)
    }

    pub fn sample_request() -> SyncRequest {
        SyncRequest::new(SyncClientPayload {
            device_id: "device-1".to_string(),
            known_server_revision: None,
            local_revision: "rev-local-1".to_string(),
            sent_at: Utc::now(),
            encrypted_state: sample_state(),
        })
        .unwrap()
    }

    pub fn sample_response_json(server_revision: &str) -> String {
        let response = SyncResponse {
            protocol_version: PROTOCOL_VERSION,
            server_revision: Some(server_revision.to_string()),
            server_encrypted_state: None,
            conflict: None,
        };
        serde_json::to_string(&response).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;

    #[test]
    fn test_request_wraps_payload_with_protocol_metadata() {
        let request = sample_request();
        assert_eq!(request.protocol_version, PROTOCOL_VERSION);
        assert_eq!(request.action, "sync");
        assert_eq!(request.client.device_id, "device-1");
    }

    #[test]
    fn test_request_rejects_malformed_state() {
        let mut request = sample_request();
        request.client.encrypted_state.encrypted_notes.revision_id = String::new();

        assert!(matches!(
            validate_request(&request),
            Err(QuillError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_response_round_trip() {
        let raw = sample_response_json("rev-2");
        let response = validate_response(&raw).unwrap();
        assert_eq!(response.server_revision.as_deref(), Some("rev-2"));
        assert!(response.conflict.is_none());
    }

    #[test]
    fn test_response_allows_null_fields_and_omitted_conflict() {
        let raw = r#"{"protocolVersion":1,"serverRevision":null,"serverEncryptedState":null}"#;
        let response = validate_response(raw).unwrap();
        assert!(response.server_revision.is_none());
        assert!(response.server_encrypted_state.is_none());
        assert!(response.conflict.is_none());
    }

    #[test]
    fn test_response_rejects_extra_fields() {
        let raw = r#"{"protocolVersion":1,"serverRevision":null,"serverEncryptedState":null,"notes":[{"title":"leak"}]}"#;
        assert!(matches!(
            validate_response(raw),
            Err(QuillError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_response_rejects_missing_fields() {
        // Null is a legal value; absence is not.
        let raw = r#"{"protocolVersion":1}"#;
        assert!(matches!(
            validate_response(raw),
            Err(QuillError::MalformedMessage(_))
        ));

        let raw = r#"{"protocolVersion":1,"serverRevision":null}"#;
        assert!(matches!(
            validate_response(raw),
            Err(QuillError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_response_rejects_non_object_body() {
        assert!(matches!(
            validate_response(r#"[1,2,3]"#),
            Err(QuillError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_response_rejects_wrong_protocol_version() {
        let raw = r#"{"protocolVersion":2,"serverRevision":null,"serverEncryptedState":null}"#;
        assert!(matches!(
            validate_response(raw),
            Err(QuillError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_response_rejects_mistyped_revision() {
        let raw = r#"{"protocolVersion":1,"serverRevision":7,"serverEncryptedState":null}"#;
        assert!(matches!(
            validate_response(raw),
            Err(QuillError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_response_rejects_non_object_conflict() {
        let raw = r#"{"protocolVersion":1,"serverRevision":null,"serverEncryptedState":null,"conflict":"yes"}"#;
        assert!(matches!(
            validate_response(raw),
            Err(QuillError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_serialized_request_is_ciphertext_only() {
        // Wire hygiene: plaintext note fields must never appear in the body.
        let plaintext_sentinel = "__SYNC_PLAINTEXT_SENTINEL::do-not-leak__";
        let (derived, key_check) = crate::crypto::create_key_check("test-passphrase", &fast_kdf()).unwrap();
        let notes = vec![crate::model::Note::new("Private title", plaintext_sentinel)];
        let state = sealed_state(&notes, &derived.key, key_check);

        let request = SyncRequest::new(SyncClientPayload {
            device_id: "device-plain-check".to_string(),
            known_server_revision: None,
            local_revision: state.encrypted_notes.revision_id.clone(),
            sent_at: Utc::now(),
            encrypted_state: state,
        })
        .unwrap();

        let body = serde_json::to_string(&request).unwrap();
        assert!(!body.contains(plaintext_sentinel));
        assert!(!body.contains("Private title"));
        assert!(!body.contains("\"title\""));
        assert!(!body.contains("\"content\""));
    }
}
