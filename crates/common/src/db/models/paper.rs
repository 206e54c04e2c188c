//! Paper entity

use crate::db::corpus::Paper;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(column_type = "Text", nullable)]
    pub filename: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    pub pub_year: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub summary: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub findings: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub hypothesis: Option<String>,

    /// Topic labels (`text[]`)
    pub entities: Option<Vec<String>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::chunk::Entity")]
    Chunks,
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Paper {
    fn from(model: Model) -> Self {
        Paper {
            id: model.id,
            filename: model.filename,
            title: model.title,
            pub_year: model.pub_year,
            summary: model.summary,
            findings: model.findings,
            hypothesis: model.hypothesis,
            entities: model.entities.unwrap_or_default(),
        }
    }
}
