//! Local link between the host and its worker processes.
//!
//! # Architecture
//!
//! ```text
//! host thread                     blender-link-service thread
//! ───────────                     ───────────────────────────
//! LinkBroker ── ServiceCommand ──▶ LinkService (actor)
//!     ▲                              │  listener, AuthTable,
//!     │◀──── LinkSession (watch) ────┤  pending approval,
//!     │◀──── LinkEvent (broadcast) ──┘  live CallChannels
//!                                        ▲
//!                                        │ loopback TCP
//!                                        ▼
//!                                  WorkerClient (worker process)
//! ```
//!
//! # Modules
//!
//! - [`broker`] - host-facing API
//! - `service` - the actor owning the listener and handshakes
//! - [`worker`] - worker-side client
//! - [`channel`] - post-handshake call protocol used by both sides
//! - [`launch`] - spawning worker processes

pub(crate) mod auth_table;
pub mod broker;
pub mod channel;
pub(crate) mod handle;
pub(crate) mod handshake;
pub mod launch;
pub(crate) mod service;
pub mod worker;

pub use broker::LinkBroker;
pub use channel::{CallChannel, CallHandler, NoopHandler, PING_METHOD};
pub use launch::LaunchedWorker;
pub use worker::WorkerClient;
