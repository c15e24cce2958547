//! Viewer-side live synchronization
//!
//! A viewer reconciles two channels: a periodic full snapshot from
//! `/api/messages` and one incremental WebSocket stream per in-flight reply.
//! The snapshot is authoritative; stream overlays are transient display
//! state dropped as soon as a reply completes.

pub mod client;
pub mod merge;

pub use client::{Snapshot, ViewerClient};
pub use merge::{ReplyOverlays, merged_view, resolve_correlation_id, wanted_subscriptions};
