// sss-common - Shared error types and record format for the simple stream server
//
// This crate is used by the store, the server and the client

pub mod error;
pub mod protocol;

// Re-export for convenience
pub use error::*;
pub use protocol::*;
