//! HTTP notify endpoint (axum).
//!
//! Resolves `/notify/{token}` through the core registry and relays the
//! `message` query parameter into the owning chat.

pub mod listen;
pub mod notify;

pub use listen::{bind, serve, BoundListener};
pub use notify::{router, NotifyError, NotifyState};
