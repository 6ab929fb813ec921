//! HTTP client shared by the write transport and the connectivity probe.

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
