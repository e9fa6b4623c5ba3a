//! Publishing pipeline: package input files, publish a cover image, upload
//! the bundle to the file host, and format the announcement post.
//!
//! [`Pipeline`] exposes one async action per caller-facing step. Each action
//! returns exactly one terminal result; optional progress events arrive on
//! the channel returned by [`Pipeline::take_events`].

mod error;
mod pipeline;
mod post;
mod types;

pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineConfig};
pub use post::format_post;
pub use relpost_filehost::PollConfig;
pub use types::{
    ActionKind, Credentials, ImageJob, ImageState, JobState, PipelineEvent, UploadJob,
};
