//! Two-tier authorization.
//!
//! System roles apply everywhere. Course roles apply to one course and,
//! through the session's course, to that course's sessions. Each tier is
//! evaluated on its own and the results combined here.
//!
//! A missing member, course or session resolves to `false`. Any error from
//! the role directory is returned to the caller unchanged.

use crate::attendance_event::{RequestGrant, RoleTier};
use crate::error::AttendanceError;
use crate::role_hierarchy::{highest_rank, RoleHierarchy};
use async_trait::async_trait;
use db::models::course_member::CourseRole;
use db::models::member_system_role::SystemRole;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where a session sits for authorization purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionScope {
    Course(i64),
    Standalone,
}

/// Read access to role assignments and session ownership.
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn system_roles(&self, member_id: i64) -> Result<HashSet<SystemRole>, AttendanceError>;

    async fn course_role(
        &self,
        member_id: i64,
        course_id: i64,
    ) -> Result<Option<CourseRole>, AttendanceError>;

    /// `None` when the session does not exist.
    async fn session_scope(&self, session_id: i64)
        -> Result<Option<SessionScope>, AttendanceError>;

    /// Sessions that belong to the course, in schedule order.
    async fn course_sessions(&self, course_id: i64) -> Result<Vec<i64>, AttendanceError>;

    /// Members holding any role in the course, ascending by id.
    async fn course_members(&self, course_id: i64) -> Result<Vec<i64>, AttendanceError>;
}

/// Role assignments held in memory. Used by tests and by embedders without
/// a database.
#[derive(Debug, Default)]
pub struct InMemoryRoleDirectory {
    system: RwLock<HashMap<i64, HashSet<SystemRole>>>,
    course: RwLock<HashMap<(i64, i64), CourseRole>>,
    sessions: RwLock<HashMap<i64, SessionScope>>,
}

impl InMemoryRoleDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn grant_system_role(&self, member_id: i64, role: SystemRole) {
        self.system
            .write()
            .await
            .entry(member_id)
            .or_default()
            .insert(role);
    }

    pub async fn revoke_system_role(&self, member_id: i64, role: SystemRole) {
        if let Some(roles) = self.system.write().await.get_mut(&member_id) {
            roles.remove(&role);
        }
    }

    /// Sets the member's role in the course, replacing any previous one.
    pub async fn assign_course_role(&self, member_id: i64, course_id: i64, role: CourseRole) {
        self.course
            .write()
            .await
            .insert((member_id, course_id), role);
    }

    pub async fn add_session(&self, session_id: i64, scope: SessionScope) {
        self.sessions.write().await.insert(session_id, scope);
    }
}

#[async_trait]
impl RoleDirectory for InMemoryRoleDirectory {
    async fn system_roles(&self, member_id: i64) -> Result<HashSet<SystemRole>, AttendanceError> {
        Ok(self
            .system
            .read()
            .await
            .get(&member_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn course_role(
        &self,
        member_id: i64,
        course_id: i64,
    ) -> Result<Option<CourseRole>, AttendanceError> {
        Ok(self.course.read().await.get(&(member_id, course_id)).copied())
    }

    async fn session_scope(
        &self,
        session_id: i64,
    ) -> Result<Option<SessionScope>, AttendanceError> {
        Ok(self.sessions.read().await.get(&session_id).copied())
    }

    async fn course_sessions(&self, course_id: i64) -> Result<Vec<i64>, AttendanceError> {
        let mut ids: Vec<i64> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, scope)| **scope == SessionScope::Course(course_id))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn course_members(&self, course_id: i64) -> Result<Vec<i64>, AttendanceError> {
        let mut ids: Vec<i64> = self
            .course
            .read()
            .await
            .keys()
            .filter(|(_, course)| *course == course_id)
            .map(|(member, _)| *member)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Outcome of asking whether a reviewer may decide on a correction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAuthority {
    /// Reviewer manages the session's course. Also covers their own requests.
    LeadManager,
    /// Reviewer holds SUPERVISOR or higher.
    SystemSupervisor,
    /// Reviewer strictly outranks the requester in the tier the request used.
    Outranks,
    /// Reviewer is the requester.
    SelfReview,
    Insufficient,
}

impl ReviewAuthority {
    pub fn is_allowed(self) -> bool {
        matches!(
            self,
            ReviewAuthority::LeadManager
                | ReviewAuthority::SystemSupervisor
                | ReviewAuthority::Outranks
        )
    }
}

#[derive(Clone)]
pub struct AuthorizationResolver {
    directory: Arc<dyn RoleDirectory>,
}

impl AuthorizationResolver {
    pub fn new(directory: Arc<dyn RoleDirectory>) -> Self {
        Self { directory }
    }

    async fn course_of(&self, session_id: i64) -> Result<Option<i64>, AttendanceError> {
        Ok(match self.directory.session_scope(session_id).await? {
            Some(SessionScope::Course(course_id)) => Some(course_id),
            _ => None,
        })
    }

    pub async fn has_system_role(
        &self,
        member_id: i64,
        role: SystemRole,
    ) -> Result<bool, AttendanceError> {
        Ok(self.directory.system_roles(member_id).await?.contains(&role))
    }

    pub async fn has_any_system_role(
        &self,
        member_id: i64,
        roles: &[SystemRole],
    ) -> Result<bool, AttendanceError> {
        if roles.is_empty() {
            return Ok(false);
        }
        let held = self.directory.system_roles(member_id).await?;
        Ok(roles.iter().any(|r| held.contains(r)))
    }

    pub async fn has_system_role_or_higher(
        &self,
        member_id: i64,
        minimum: SystemRole,
    ) -> Result<bool, AttendanceError> {
        Ok(self
            .directory
            .system_roles(member_id)
            .await?
            .into_iter()
            .any(|r| r.is_higher_or_equal(minimum)))
    }

    pub async fn has_course_role(
        &self,
        member_id: i64,
        course_id: i64,
        role: CourseRole,
    ) -> Result<bool, AttendanceError> {
        Ok(self.directory.course_role(member_id, course_id).await? == Some(role))
    }

    pub async fn has_any_course_role(
        &self,
        member_id: i64,
        course_id: i64,
        roles: &[CourseRole],
    ) -> Result<bool, AttendanceError> {
        Ok(self
            .directory
            .course_role(member_id, course_id)
            .await?
            .is_some_and(|held| roles.contains(&held)))
    }

    pub async fn has_course_role_or_higher(
        &self,
        member_id: i64,
        course_id: i64,
        minimum: CourseRole,
    ) -> Result<bool, AttendanceError> {
        Ok(self
            .directory
            .course_role(member_id, course_id)
            .await?
            .is_some_and(|r| r.is_higher_or_equal(minimum)))
    }

    pub async fn is_course_member(
        &self,
        member_id: i64,
        course_id: i64,
    ) -> Result<bool, AttendanceError> {
        Ok(self
            .directory
            .course_role(member_id, course_id)
            .await?
            .is_some())
    }

    /// Exact course role in the session's course. Standalone sessions have no
    /// course roles, so OPERATOR or higher stands in.
    pub async fn has_session_role(
        &self,
        member_id: i64,
        session_id: i64,
        role: CourseRole,
    ) -> Result<bool, AttendanceError> {
        match self.directory.session_scope(session_id).await? {
            Some(SessionScope::Course(course_id)) => {
                self.has_course_role(member_id, course_id, role).await
            }
            Some(SessionScope::Standalone) => {
                self.has_system_role_or_higher(member_id, SystemRole::Operator)
                    .await
            }
            None => Ok(false),
        }
    }

    pub async fn has_session_role_or_higher(
        &self,
        member_id: i64,
        session_id: i64,
        minimum: CourseRole,
    ) -> Result<bool, AttendanceError> {
        match self.directory.session_scope(session_id).await? {
            Some(SessionScope::Course(course_id)) => {
                self.has_course_role_or_higher(member_id, course_id, minimum)
                    .await
            }
            Some(SessionScope::Standalone) => {
                self.has_system_role_or_higher(member_id, SystemRole::Operator)
                    .await
            }
            None => Ok(false),
        }
    }

    /// Whether the member may attend the session at all.
    pub async fn is_session_member(
        &self,
        member_id: i64,
        session_id: i64,
    ) -> Result<bool, AttendanceError> {
        match self.directory.session_scope(session_id).await? {
            Some(SessionScope::Course(course_id)) => {
                self.is_course_member(member_id, course_id).await
            }
            Some(SessionScope::Standalone) => Ok(true),
            None => Ok(false),
        }
    }

    /// The standing through which `actor_id` may file a correction on an
    /// attendance in `session_id`, or `None` when they may not.
    ///
    /// MENTOR or higher in the session's course wins over any system role;
    /// otherwise OPERATOR or higher anywhere.
    pub async fn request_grant(
        &self,
        actor_id: i64,
        session_id: i64,
    ) -> Result<Option<RequestGrant>, AttendanceError> {
        if let Some(course_id) = self.course_of(session_id).await? {
            if let Some(role) = self.directory.course_role(actor_id, course_id).await? {
                if role.is_higher_or_equal(CourseRole::Mentor) {
                    return Ok(Some(RequestGrant {
                        tier: RoleTier::Course,
                        rank: role.rank(),
                    }));
                }
            }
        }

        let system_rank = highest_rank(self.directory.system_roles(actor_id).await?);
        Ok(system_rank
            .filter(|rank| *rank >= SystemRole::Operator.rank())
            .map(|rank| RequestGrant {
                tier: RoleTier::System,
                rank,
            }))
    }

    /// Decides whether `reviewer_id` may approve or reject a correction that
    /// `requester_id` filed on an attendance in `session_id` under `grant`.
    ///
    /// Checked in order: lead manager of the course, self-review, system
    /// supervisor, then strict rank over `grant` in its tier. The requester's
    /// current roles are not consulted.
    pub async fn review_authority(
        &self,
        reviewer_id: i64,
        requester_id: i64,
        grant: RequestGrant,
        session_id: i64,
    ) -> Result<ReviewAuthority, AttendanceError> {
        let reviewer_course_role = match self.course_of(session_id).await? {
            Some(course_id) => self.directory.course_role(reviewer_id, course_id).await?,
            None => None,
        };
        if reviewer_course_role == Some(CourseRole::Manager) {
            return Ok(ReviewAuthority::LeadManager);
        }

        if reviewer_id == requester_id {
            return Ok(ReviewAuthority::SelfReview);
        }

        let reviewer_system = self.directory.system_roles(reviewer_id).await?;
        if reviewer_system
            .iter()
            .any(|r| r.is_higher_or_equal(SystemRole::Supervisor))
        {
            return Ok(ReviewAuthority::SystemSupervisor);
        }

        let reviewer_rank = match grant.tier {
            RoleTier::Course => reviewer_course_role.map(CourseRole::rank),
            RoleTier::System => highest_rank(reviewer_system),
        };

        Ok(if reviewer_rank.is_some_and(|rank| rank > grant.rank) {
            ReviewAuthority::Outranks
        } else {
            ReviewAuthority::Insufficient
        })
    }
}
