//! Upload sessions.
//!
//! A session amortizes one full signature and batch payer verification over
//! a multi-file upload. Sessions live in memory only and expire a fixed time
//! after creation.

mod clock;
mod store;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{SessionStats, SessionStore, UploadSession};
pub use sweeper::SessionSweeper;
