//! Genre entity model. Genres are unique by name.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "genres")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::show_genre::Entity")]
    ShowGenre,
}

impl Related<super::show::Entity> for Entity {
    fn to() -> RelationDef {
        super::show_genre::Relation::Show.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::show_genre::Relation::Genre.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
