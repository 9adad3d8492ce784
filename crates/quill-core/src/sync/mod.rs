//! Sync protocol: wire schema, validation, and the retrying adapter.
//!
//! The wire format only ever carries sealed state. Requests and
//! responses are schema-validated field by field; a message with extra,
//! missing, or mistyped fields is rejected as malformed and never
//! partially trusted.

pub mod adapter;
pub mod protocol;

pub use adapter::{AttemptState, HttpTransport, RestAdapter, RetryPolicy, SyncTransport, TransportReply};
pub use protocol::{
    validate_request, validate_response, EncryptedState, SyncClientPayload, SyncRequest,
    SyncResponse, PROTOCOL_VERSION,
};
