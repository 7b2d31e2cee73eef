//! Stampa renders HTML or Markdown+LaTeX documents to PDF through headless Chromium.
//!
//! The [`application::convert::Converter`] orchestrates one engine session per
//! conversion; [`infra::http::build_router`] exposes it over HTTP.

pub mod application;
pub mod config;
pub mod infra;
