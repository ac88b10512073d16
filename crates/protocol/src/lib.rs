//! Wire types for the portal session manager.
//!
//! This crate contains the serde-serializable types that cross a process or
//! page boundary: Chrome DevTools Protocol messages exchanged with the
//! browser, target metadata served by the debugging endpoint, and the
//! request/response shapes of in-page portal fetches.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with the wire: Field names match what the browser or page produces
//! * Stable: Changes only when the wire shape changes
//!
//! Session state, retry policy and error classification live in `portal-rs`.

pub mod cdp;
pub mod fetch;
pub mod target;

pub use cdp::*;
pub use fetch::*;
pub use target::*;
