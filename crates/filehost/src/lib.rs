//! Rapidgator API client.
//!
//! Drives the remote upload protocol for one file: authenticate, negotiate
//! an upload slot, transfer the bytes when the host asks for them, then
//! poll until remote processing finishes and a download URL exists.

use std::time::Duration;

pub mod client;
pub mod error;
pub mod types;

pub use client::Client;
pub use error::FileHostError;
pub use types::{PollConfig, PollOutcome, TransferFields, UploadOutcome};

/// Default delay between status polls.
///
/// The host processes uploads in batches; five seconds matches its typical
/// turnaround without hammering the endpoint.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
