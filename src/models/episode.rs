//! Episode entity model
//!
//! This module contains the SeaORM entity model for the episodes table.
//! Episodes are keyed by `(show_id, external_id)`; `season_id` is absent only
//! for episodes that never named a season.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "episodes")]
pub struct Model {
    /// Internal identifier assigned on first insert
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Upstream identifier
    pub external_id: i64,

    /// Owning show (internal id)
    pub show_id: i32,

    /// Resolved season (internal id)
    pub season_id: Option<i32>,

    pub url: Option<String>,

    pub name: Option<String>,

    /// Season number as delivered by upstream
    pub season_number: Option<i32>,

    /// Episode number within the season; absent for specials
    pub number: Option<i32>,

    /// Upstream episode type (e.g., regular, significant_special)
    pub episode_type: Option<String>,

    /// Local air date
    pub airdate: Option<Date>,

    /// Local air time
    pub airtime: Option<Time>,

    /// Exact air instant
    pub airstamp: Option<DateTimeWithTimeZone>,

    /// Runtime in minutes
    pub runtime: Option<i32>,

    pub rating_average: Option<f64>,

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
        belongs_to = "super::season::Entity",
        from = "Column::SeasonId",
        to = "super::season::Column::Id"
    )]
    Season,
}

impl Related<super::show::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Show.def()
    }
}

impl Related<super::season::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Season.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
