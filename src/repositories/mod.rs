//! # Repository Layer
//!
//! Upsert-oriented repositories for the reconciled catalog. Every repository
//! borrows a [`sea_orm::ConnectionTrait`] so the same code runs against the
//! pool or inside the per-show transaction.
//!
//! Upserts are keyed by the upstream identifier (plus the owning show for
//! seasons and episodes): an existing row has every mapped field overwritten
//! and keeps its internal id, otherwise a new row is inserted.

pub mod episode;
pub mod genre;
pub mod network;
pub mod season;
pub mod show;
pub mod web_channel;

pub use episode::{EpisodeFields, EpisodeRepository};
pub use genre::{GenreLinkChanges, GenreRepository};
pub use network::{NetworkRepository, OutletFields};
pub use season::{SeasonFields, SeasonRepository};
pub use show::{ShowFields, ShowRepository};
pub use web_channel::WebChannelRepository;
