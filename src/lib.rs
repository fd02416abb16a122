//! # repo-sync
//!
//! Connects GitHub repositories on behalf of users, stores their access tokens
//! encrypted, and keeps a snapshot of recent commits, pull requests and issues.

pub mod auth;
pub mod config;
pub mod connectors;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod normalization;
pub mod repositories;
pub mod rotation;
pub mod server;
pub mod sweeper;
pub mod sync_service;
pub mod telemetry;
pub use migration;
