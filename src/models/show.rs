//! Show entity model
//!
//! This module contains the SeaORM entity model for the shows table, the root
//! of the reconciled catalog graph.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Catalog show keyed by its upstream identifier
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "shows")]
pub struct Model {
    /// Internal identifier assigned on first insert
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Upstream identifier (unique)
    pub external_id: i64,

    /// Canonical upstream page for the show
    pub url: Option<String>,

    /// Display name
    pub name: String,

    /// Upstream show type (e.g., Scripted, Reality, Animation)
    pub show_type: Option<String>,

    /// Primary language
    pub language: Option<String>,

    /// Airing status (e.g., Running, Ended, To Be Determined)
    pub status: Option<String>,

    /// Nominal episode runtime in minutes
    pub runtime: Option<i32>,

    /// Average episode runtime in minutes
    pub average_runtime: Option<i32>,

    /// First air date
    pub premiered: Option<Date>,

    /// Final air date
    pub ended: Option<Date>,

    /// Official website
    pub official_site: Option<String>,

    /// Local airing time
    pub schedule_time: Option<Time>,

    /// Airing weekdays, comma-joined (e.g., "Monday,Thursday")
    pub schedule_days: Option<String>,

    /// Average audience rating
    pub rating_average: Option<f64>,

    /// Upstream popularity weight
    pub weight: Option<i32>,

    /// Broadcast network (internal id)
    pub network_id: Option<i32>,

    /// Streaming outlet (internal id)
    pub web_channel_id: Option<i32>,

    /// TVRage identifier
    pub externals_tvrage: Option<i64>,

    /// TheTVDB identifier
    pub externals_thetvdb: Option<i64>,

    /// IMDb identifier (e.g., tt0944947)
    pub externals_imdb: Option<String>,

    /// Medium-sized poster URL
    pub image_medium: Option<String>,

    /// Original poster URL
    pub image_original: Option<String>,

    /// HTML summary as delivered by upstream
    pub summary: Option<String>,

    /// Upstream last-modified timestamp (epoch seconds)
    pub upstream_updated: Option<i64>,

    /// Timestamp of the last upsert
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::network::Entity",
        from = "Column::NetworkId",
        to = "super::network::Column::Id"
    )]
    Network,
    #[sea_orm(
        belongs_to = "super::web_channel::Entity",
        from = "Column::WebChannelId",
        to = "super::web_channel::Column::Id"
    )]
    WebChannel,
    #[sea_orm(has_many = "super::season::Entity")]
    Season,
    #[sea_orm(has_many = "super::episode::Entity")]
    Episode,
    #[sea_orm(has_many = "super::show_genre::Entity")]
    ShowGenre,
}

impl Related<super::network::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Network.def()
    }
}

impl Related<super::web_channel::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebChannel.def()
    }
}

impl Related<super::season::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Season.def()
    }
}

impl Related<super::episode::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Episode.def()
    }
}

impl Related<super::genre::Entity> for Entity {
    fn to() -> RelationDef {
        super::show_genre::Relation::Genre.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::show_genre::Relation::Show.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
