use crate::authorization::{RoleDirectory, SessionScope};
use crate::error::AttendanceError;
use async_trait::async_trait;
use db::models::course_member::{self, CourseRole};
use db::models::member_system_role::{self, SystemRole};
use db::models::session;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::collections::HashSet;

/// Reads roles from `member_system_roles`, `course_members` and `sessions`.
#[derive(Clone)]
pub struct SeaOrmRoleDirectory {
    db: DatabaseConnection,
}

impl SeaOrmRoleDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RoleDirectory for SeaOrmRoleDirectory {
    async fn system_roles(&self, member_id: i64) -> Result<HashSet<SystemRole>, AttendanceError> {
        Ok(member_system_role::Model::roles_for(&self.db, member_id)
            .await?
            .into_iter()
            .collect())
    }

    async fn course_role(
        &self,
        member_id: i64,
        course_id: i64,
    ) -> Result<Option<CourseRole>, AttendanceError> {
        Ok(course_member::Model::find_role(&self.db, member_id, course_id).await?)
    }

    async fn session_scope(
        &self,
        session_id: i64,
    ) -> Result<Option<SessionScope>, AttendanceError> {
        Ok(session::Entity::find_by_id(session_id)
            .one(&self.db)
            .await?
            .map(|s| match s.course_id {
                Some(course_id) => SessionScope::Course(course_id),
                None => SessionScope::Standalone,
            }))
    }

    async fn course_sessions(&self, course_id: i64) -> Result<Vec<i64>, AttendanceError> {
        Ok(session::Model::ids_for_course(&self.db, course_id).await?)
    }

    async fn course_members(&self, course_id: i64) -> Result<Vec<i64>, AttendanceError> {
        Ok(course_member::Model::member_ids(&self.db, course_id).await?)
    }
}
