//! # lectern-server
//!
//! HTTP front for the Lectern media server state.
//!
//! - **Derived-image cache** ([`image_cache`]): resized covers and entity
//!   images kept on disk under `<metadata>/cache`, produced on demand by a
//!   [`resize::ImageResizer`] (ffmpeg in production)
//! - **Account API** ([`api`]): listing, inspecting and updating user
//!   accounts stored in SQLite, with bearer-token authentication
//! - **Scan logs**: read access to the per-run scan ledgers written under
//!   `<metadata>/logs/scans`
//!
//! Item and author routes build on [`image_cache::ImageCache::serve`] and
//! hand the returned [`image_cache::ServedImage`] straight back to axum.

pub mod api;
pub mod config;
pub mod error;
pub mod image_cache;
pub mod resize;
