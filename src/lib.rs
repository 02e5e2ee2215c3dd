//! # postage-gate
//!
//! Upload authorization gateway for Swarm storage nodes.
//!
//! The gateway sits in front of a storage node's HTTP API and only lets an
//! upload (`POST`) through when the uploader proves control of a wallet and
//! that wallet is the registered payer of the postage batch being spent.
//! A successful proof can mint a short-lived upload session so that a
//! multi-file upload is signed once.
//!
//! ```text
//! POST received
//!      │
//!      ▼
//! ┌──────────────────┐  valid   ┌──────────────────┐
//! │ session token?   │ ───────▶ │ forward upstream │
//! └────────┬─────────┘          └──────────────────┘
//!          │ none / stale                ▲
//!          ▼                             │
//! ┌──────────────────┐  ok  ┌────────────┴─────┐
//! │ verify signature │ ───▶ │ check batch payer│
//! └────────┬─────────┘      └────────┬─────────┘
//!          │ fail                    │ fail
//!          ▼                         ▼
//!        401                  403 / 500
//! ```
//!
//! Everything other than `POST` is forwarded untouched.

pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod gateway;
pub mod proxy;
pub mod server;
pub mod session;

pub use chain::{ChainVerifier, RpcChainVerifier};
pub use config::GatewayConfig;
pub use error::{Error, Result};
pub use event::{GatewayEvent, GatewayEventsChannel, GatewayEventsSender};
pub use gateway::{Admission, Rejection, UploadAuthorizer, UploadHeaders};
pub use proxy::UpstreamProxy;
pub use server::{GatewayBuilder, RunningGateway};
pub use session::{Clock, ManualClock, SessionStore, SessionSweeper, SystemClock, UploadSession};
