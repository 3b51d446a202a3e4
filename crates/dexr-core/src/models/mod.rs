//! Data models for extraction requests, records and configuration.

pub mod config;
pub mod document;
pub mod record;
