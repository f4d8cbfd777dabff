//! # showsync
//!
//! Durable ingestion of the TVMaze show catalog into a relational store. A
//! small replay-based workflow engine drives full and delta syncs; activities
//! fetch from upstream and reconcile records inside per-show transactions.

pub mod activities;
pub mod auth;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod reconcile;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod update_timer;
pub mod upstream;
pub mod workflow;
pub mod workflows;
pub use migration;
