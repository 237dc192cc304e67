//! Helpers for URL handling and form encoding.

pub mod http;
