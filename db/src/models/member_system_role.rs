use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Organisation-wide roles granted to a member.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "member_system_roles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub member_id: i64,
    pub role: SystemRole,
    pub granted_at: DateTime<Utc>,
}

/// System-wide role. Backed by a `system_role_type` enum in the database.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
    Deserialize,
    Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "system_role_type")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SystemRole {
    #[sea_orm(string_value = "member")]
    Member,

    #[sea_orm(string_value = "operator")]
    Operator,

    #[sea_orm(string_value = "registrar")]
    Registrar,

    #[sea_orm(string_value = "auditor")]
    Auditor,

    #[sea_orm(string_value = "supervisor")]
    Supervisor,

    #[sea_orm(string_value = "admin")]
    Admin,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::member::Entity",
        from = "Column::MemberId",
        to = "super::member::Column::Id"
    )]
    Member,
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Member.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Grants `role` to the member. Granting a role the member already holds is a no-op.
    pub async fn grant<C>(db: &C, member_id: i64, role: SystemRole) -> Result<(), DbErr>
    where
        C: ConnectionTrait,
    {
        Entity::insert(ActiveModel {
            member_id: Set(member_id),
            role: Set(role),
            granted_at: Set(Utc::now()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([Column::MemberId, Column::Role])
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(db)
        .await?;
        Ok(())
    }

    pub async fn roles_for<C>(db: &C, member_id: i64) -> Result<Vec<SystemRole>, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find()
            .filter(Column::MemberId.eq(member_id))
            .all(db)
            .await?
            .into_iter()
            .map(|m| m.role)
            .collect())
    }
}
