//! Loreweave Client — reqwest-backed implementations of the workspace and
//! asset-mirror client traits.
//!
//! The workspace API is bearer-token-authenticated JSON over HTTPS,
//! versioned by a protocol header. Every HTTP or decoding failure is mapped
//! onto [`loreweave_core::error::SyncError`] here so nothing above this
//! crate sees a transport type.

mod http;
mod mirror;
mod notify;

pub use http::HttpWorkspaceClient;
pub use mirror::HttpAssetMirror;
pub use notify::HttpNotificationDispatcher;
