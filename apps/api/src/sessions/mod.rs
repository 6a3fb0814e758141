// Persisted analysis sessions: archive uploads, run the batch, store results.
// Ownership is checked against the caller-supplied user_id.

pub mod archive;
pub mod handlers;
pub mod service;
pub mod store;
