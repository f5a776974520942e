use sea_orm::entity::prelude::*;
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Course-scoped role assignments, one row per (course, member).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "course_members")]
pub struct Model {
    /// Course ID (foreign key to `courses`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub course_id: i64,

    /// Member ID (foreign key to `members`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub member_id: i64,

    pub role: CourseRole,
}

/// Role of a member within a single course.
/// Backed by a `course_role_type` enum in the database.
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
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "course_role_type")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum CourseRole {
    #[sea_orm(string_value = "mentee")]
    Mentee,

    #[sea_orm(string_value = "mentor")]
    Mentor,

    #[sea_orm(string_value = "manager")]
    Manager,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::course::Entity",
        from = "Column::CourseId",
        to = "super::course::Column::Id"
    )]
    Course,

    #[sea_orm(
        belongs_to = "super::member::Entity",
        from = "Column::MemberId",
        to = "super::member::Column::Id"
    )]
    Member,
}

impl Related<super::course::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Course.def()
    }
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Member.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Assigns `role` to the member in the course, replacing any previous role.
    pub async fn assign<C>(
        db: &C,
        course_id: i64,
        member_id: i64,
        role: CourseRole,
    ) -> Result<(), DbErr>
    where
        C: ConnectionTrait,
    {
        Entity::insert(ActiveModel {
            course_id: Set(course_id),
            member_id: Set(member_id),
            role: Set(role),
        })
        .on_conflict(
            OnConflict::columns([Column::CourseId, Column::MemberId])
                .update_column(Column::Role)
                .to_owned(),
        )
        .exec(db)
        .await?;
        Ok(())
    }

    pub async fn find_role<C>(
        db: &C,
        member_id: i64,
        course_id: i64,
    ) -> Result<Option<CourseRole>, DbErr>
    where
        C: ConnectionTrait,
    {
        Ok(Entity::find()
            .filter(Column::CourseId.eq(course_id))
            .filter(Column::MemberId.eq(member_id))
            .one(db)
            .await?
            .map(|m| m.role))
    }

    /// Ids of every member holding a role in the course, ascending.
    pub async fn member_ids<C>(db: &C, course_id: i64) -> Result<Vec<i64>, DbErr>
    where
        C: ConnectionTrait,
    {
        Entity::find()
            .select_only()
            .column(Column::MemberId)
            .filter(Column::CourseId.eq(course_id))
            .order_by_asc(Column::MemberId)
            .into_tuple::<i64>()
            .all(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{course, member};
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_assign_replaces_previous_role() {
        let db = setup_test_db().await;
        let m = member::Model::create(&db, "mentor-to-be").await.unwrap();
        let c = course::Model::create(&db, "Rust Study").await.unwrap();

        Model::assign(&db, c.id, m.id, CourseRole::Mentee).await.unwrap();
        assert_eq!(
            Model::find_role(&db, m.id, c.id).await.unwrap(),
            Some(CourseRole::Mentee)
        );

        Model::assign(&db, c.id, m.id, CourseRole::Mentor).await.unwrap();
        assert_eq!(
            Model::find_role(&db, m.id, c.id).await.unwrap(),
            Some(CourseRole::Mentor)
        );
    }

    #[tokio::test]
    async fn test_find_role_absent_for_non_member() {
        let db = setup_test_db().await;
        let c = course::Model::create(&db, "Rust Study").await.unwrap();

        assert_eq!(Model::find_role(&db, 999, c.id).await.unwrap(), None);
        assert!(Model::member_ids(&db, c.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_member_ids_cover_every_role() {
        let db = setup_test_db().await;
        let c = course::Model::create(&db, "Rust Study").await.unwrap();
        let other = course::Model::create(&db, "Go Study").await.unwrap();
        let lead = member::Model::create(&db, "lead").await.unwrap();
        let learner = member::Model::create(&db, "learner").await.unwrap();

        Model::assign(&db, c.id, learner.id, CourseRole::Mentee).await.unwrap();
        Model::assign(&db, c.id, lead.id, CourseRole::Manager).await.unwrap();
        Model::assign(&db, other.id, lead.id, CourseRole::Mentor).await.unwrap();

        assert_eq!(
            Model::member_ids(&db, c.id).await.unwrap(),
            vec![lead.id, learner.id]
        );
        assert_eq!(Model::member_ids(&db, other.id).await.unwrap(), vec![lead.id]);
    }

    #[test]
    fn test_role_parses_case_insensitively() {
        assert_eq!("manager".parse::<CourseRole>().unwrap(), CourseRole::Manager);
        assert_eq!(CourseRole::Mentee.to_string(), "MENTEE");
    }
}
