//! Database migrations for the show catalog ingestion service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_12_01_000001_create_workflow_runs;
mod m2025_12_01_000002_create_history_events;
mod m2025_12_01_000003_create_networks;
mod m2025_12_01_000004_create_web_channels;
mod m2025_12_01_000005_create_shows;
mod m2025_12_01_000006_create_genres;
mod m2025_12_01_000007_create_show_genres;
mod m2025_12_01_000008_create_seasons;
mod m2025_12_01_000009_create_episodes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_12_01_000001_create_workflow_runs::Migration),
            Box::new(m2025_12_01_000002_create_history_events::Migration),
            Box::new(m2025_12_01_000003_create_networks::Migration),
            Box::new(m2025_12_01_000004_create_web_channels::Migration),
            Box::new(m2025_12_01_000005_create_shows::Migration),
            Box::new(m2025_12_01_000006_create_genres::Migration),
            Box::new(m2025_12_01_000007_create_show_genres::Migration),
            Box::new(m2025_12_01_000008_create_seasons::Migration),
            Box::new(m2025_12_01_000009_create_episodes::Migration),
        ]
    }
}
