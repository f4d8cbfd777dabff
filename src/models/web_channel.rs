//! WebChannel entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Streaming outlet (web channel) referenced by shows
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "web_channels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Upstream identifier (unique)
    pub external_id: i64,

    pub name: Option<String>,

    pub country_name: Option<String>,

    pub country_code: Option<String>,

    pub country_timezone: Option<String>,

    pub official_site: Option<String>,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::show::Entity")]
    Show,
}

impl Related<super::show::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Show.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
