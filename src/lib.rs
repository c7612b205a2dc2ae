//! Profile photo processing service
//!
//! Customers upload a profile photo, get a job id back immediately, and a
//! worker pool generates a styled variant with Cloudflare Workers AI, stores
//! both images in R2 and reports progress through polling, Server-Sent Events
//! and an optional webhook.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
