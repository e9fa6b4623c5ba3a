//! imgbb upload client for publishing cover images.
//!
//! One multipart POST per image: the [imgbb](https://imgbb.com) API takes
//! an API key and the raw image bytes and returns a public display URL.

pub mod client;

pub use client::{Client, Error};
