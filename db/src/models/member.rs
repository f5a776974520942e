use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelTrait, Set};
use serde::Serialize;

/// Represents a member in the `members` table.
///
/// Registration and profile data live elsewhere; this row only anchors the
/// foreign keys of role assignments and attendance records.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "members")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub nickname: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::course_member::Entity")]
    CourseMemberships,
    #[sea_orm(has_many = "super::member_system_role::Entity")]
    SystemRoles,
}

impl Related<super::course_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CourseMemberships.def()
    }
}

impl Related<super::member_system_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SystemRoles.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub async fn create<C>(db: &C, nickname: &str) -> Result<Model, DbErr>
    where
        C: ConnectionTrait,
    {
        ActiveModel {
            nickname: Set(nickname.to_owned()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await
    }
}
