//! Season entity model
//!
//! Seasons belong to exactly one show and are keyed by `(show_id, external_id)`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "seasons")]
pub struct Model {
    /// Internal identifier assigned on first insert
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Upstream identifier
    pub external_id: i64,

    /// Owning show (internal id)
    pub show_id: i32,

    pub url: Option<String>,

    /// Season number within the show; used to resolve episodes
    pub number: Option<i32>,

    pub name: Option<String>,

    /// Number of episodes announced for the season
    pub episode_order: Option<i32>,

    pub premiere_date: Option<Date>,

    pub end_date: Option<Date>,

    /// Network that aired this season, when it differs per season
    pub network_id: Option<i32>,

    pub image_medium: Option<String>,

    pub image_original: Option<String>,

    pub summary: Option<String>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::show::Entity",
        from = "Column::ShowId",
        to = "super::show::Column::Id"
    )]
    Show,
    #[sea_orm(
        belongs_to = "super::network::Entity",
        from = "Column::NetworkId",
        to = "super::network::Column::Id"
    )]
    Network,
    #[sea_orm(has_many = "super::episode::Entity")]
    Episode,
}

impl Related<super::show::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Show.def()
    }
}

impl Related<super::episode::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Episode.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
