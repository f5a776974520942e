use crate::attendance::{Attendance, CorrectionState};
use crate::attendance_event::{AttendanceEvent, AttendanceStatus};
use crate::authorization::{AuthorizationResolver, RoleDirectory};
use crate::clock::{Clock, SystemClock};
use crate::correction::CorrectionWorkflow;
use crate::error::AttendanceError;
use crate::event_store::EventStore;
use crate::repositories::{SeaOrmEventStore, SeaOrmRoleDirectory};
use log::{debug, info, warn};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use validator::Validate;

/// Identifies one attendance record.
#[derive(Debug, Clone, Copy, Validate)]
pub struct AttendanceKey {
    #[validate(range(min = 1, message = "session_id must be positive"))]
    pub session_id: i64,
    #[validate(range(min = 1, message = "member_id must be positive"))]
    pub member_id: i64,
}

impl AttendanceKey {
    pub fn new(session_id: i64, member_id: i64) -> Self {
        Self {
            session_id,
            member_id,
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct RequestCorrection {
    #[validate(range(min = 1, message = "session_id must be positive"))]
    pub session_id: i64,
    #[validate(range(min = 1, message = "member_id must be positive"))]
    pub member_id: i64,
    pub requested_status: AttendanceStatus,
    #[validate(length(max = 1000, message = "reason must be at most 1000 characters"))]
    pub reason: String,
}

#[derive(Debug, Clone, Validate)]
pub struct ApproveCorrection {
    #[validate(range(min = 1, message = "session_id must be positive"))]
    pub session_id: i64,
    #[validate(range(min = 1, message = "member_id must be positive"))]
    pub member_id: i64,
    /// Falls back to the request's reason when absent or blank.
    #[validate(length(max = 1000, message = "reason must be at most 1000 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Validate)]
pub struct RejectCorrection {
    #[validate(range(min = 1, message = "session_id must be positive"))]
    pub session_id: i64,
    #[validate(range(min = 1, message = "member_id must be positive"))]
    pub member_id: i64,
    #[validate(length(
        max = 1000,
        message = "rejection reason must be at most 1000 characters"
    ))]
    pub rejection_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub session_id: i64,
    pub status: AttendanceStatus,
}

/// Attendance of one member over a set of sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub member_id: i64,
    pub sessions: Vec<SessionStatus>,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub left_early: usize,
    /// Share of sessions attended in any form, 0.0 when no sessions were asked for.
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAttendanceStatistics {
    pub total_members: usize,
    pub total_sessions: usize,
    /// Mean of the members' attendance rates.
    pub average_attendance_rate: f64,
}

/// Attendance of every course member over every session of the course.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAttendanceSummary {
    pub course_id: i64,
    pub members: Vec<AttendanceSummary>,
    pub statistics: CourseAttendanceStatistics,
}

impl CourseAttendanceSummary {
    fn empty(course_id: i64) -> Self {
        Self {
            course_id,
            members: Vec::new(),
            statistics: CourseAttendanceStatistics {
                total_members: 0,
                total_sessions: 0,
                average_attendance_rate: 0.0,
            },
        }
    }
}

impl AttendanceSummary {
    fn from_statuses(member_id: i64, sessions: Vec<SessionStatus>) -> Self {
        let count = |wanted: AttendanceStatus| sessions.iter().filter(|s| s.status == wanted).count();
        let present = count(AttendanceStatus::Present);
        let absent = count(AttendanceStatus::Absent);
        let late = count(AttendanceStatus::Late);
        let left_early = count(AttendanceStatus::LeftEarly);
        let attendance_rate = if sessions.is_empty() {
            0.0
        } else {
            (present + late + left_early) as f64 / sessions.len() as f64
        };
        Self {
            member_id,
            sessions,
            present,
            absent,
            late,
            left_early,
            attendance_rate,
        }
    }
}

/// Entry point for attendance commands and queries.
///
/// Every mutating call names its actor explicitly and follows the same
/// steps: validate, load, apply a transition, append.
#[derive(Clone)]
pub struct AttendanceService {
    store: Arc<dyn EventStore>,
    directory: Arc<dyn RoleDirectory>,
    workflow: CorrectionWorkflow,
    clock: Arc<dyn Clock>,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn EventStore>,
        directory: Arc<dyn RoleDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let workflow = CorrectionWorkflow::new(
            AuthorizationResolver::new(directory.clone()),
            clock.clone(),
        );
        Self {
            store,
            directory,
            workflow,
            clock,
        }
    }

    /// Service over the sea-orm store and role directory with the system clock.
    pub fn with_database(db: DatabaseConnection) -> Self {
        Self::new(
            Arc::new(SeaOrmEventStore::new(db.clone())),
            Arc::new(SeaOrmRoleDirectory::new(db)),
            Arc::new(SystemClock),
        )
    }

    /// Opens the configured database (see `common::Config`) and wires the
    /// sea-orm adapters to it.
    pub async fn connect() -> Result<Self, AttendanceError> {
        Ok(Self::with_database(db::connect().await?))
    }

    pub fn resolver(&self) -> &AuthorizationResolver {
        self.workflow.resolver()
    }

    async fn load_existing(&self, session_id: i64, member_id: i64) -> Result<Attendance, AttendanceError> {
        self.store
            .find_by_session_and_member(session_id, member_id)
            .await?
            .ok_or(AttendanceError::AttendanceNotFound {
                session_id,
                member_id,
            })
    }

    async fn require_participant(&self, key: AttendanceKey) -> Result<(), AttendanceError> {
        if self
            .resolver()
            .is_session_member(key.member_id, key.session_id)
            .await?
        {
            Ok(())
        } else {
            warn!(
                "Member {} is not a participant of session {}",
                key.member_id, key.session_id
            );
            Err(AttendanceError::NotAuthorized(format!(
                "member {} is not a participant of session {}",
                key.member_id, key.session_id
            )))
        }
    }

    /// Checks the member in, creating the record on first check-in.
    pub async fn check_in(&self, key: AttendanceKey) -> Result<Attendance, AttendanceError> {
        key.validate()?;
        self.require_participant(key).await?;

        let mut attendance = self
            .store
            .find_by_session_and_member(key.session_id, key.member_id)
            .await?
            .unwrap_or_else(|| Attendance::new(key.session_id, key.member_id));
        attendance.check_in(self.clock.as_ref())?;

        let saved = self.store.append(attendance).await?;
        info!(
            "Member {} checked in to session {}",
            key.member_id, key.session_id
        );
        Ok(saved)
    }

    pub async fn check_out(&self, key: AttendanceKey) -> Result<Attendance, AttendanceError> {
        key.validate()?;
        self.require_participant(key).await?;

        let mut attendance = self.load_existing(key.session_id, key.member_id).await?;
        attendance.check_out(self.clock.as_ref())?;

        let saved = self.store.append(attendance).await?;
        info!(
            "Member {} checked out of session {}",
            key.member_id, key.session_id
        );
        Ok(saved)
    }

    pub async fn request_correction(
        &self,
        actor_id: i64,
        command: RequestCorrection,
    ) -> Result<Attendance, AttendanceError> {
        command.validate()?;
        let mut attendance = self
            .load_existing(command.session_id, command.member_id)
            .await?;
        self.workflow
            .request_correction(
                &mut attendance,
                actor_id,
                command.requested_status,
                &command.reason,
            )
            .await?;
        self.store.append(attendance).await
    }

    pub async fn approve_correction(
        &self,
        actor_id: i64,
        command: ApproveCorrection,
    ) -> Result<Attendance, AttendanceError> {
        command.validate()?;
        let mut attendance = self
            .load_existing(command.session_id, command.member_id)
            .await?;
        self.workflow
            .approve_correction(&mut attendance, actor_id, command.reason.as_deref())
            .await?;
        self.store.append(attendance).await
    }

    pub async fn reject_correction(
        &self,
        actor_id: i64,
        command: RejectCorrection,
    ) -> Result<Attendance, AttendanceError> {
        command.validate()?;
        let mut attendance = self
            .load_existing(command.session_id, command.member_id)
            .await?;
        self.workflow
            .reject_correction(&mut attendance, actor_id, &command.rejection_reason)
            .await?;
        self.store.append(attendance).await
    }

    /// Final status; ABSENT when the member never checked in.
    pub async fn status(&self, key: AttendanceKey) -> Result<AttendanceStatus, AttendanceError> {
        key.validate()?;
        Ok(self
            .store
            .find_by_session_and_member(key.session_id, key.member_id)
            .await?
            .map(|a| a.final_status())
            .unwrap_or(AttendanceStatus::Absent))
    }

    pub async fn correction_state(
        &self,
        key: AttendanceKey,
    ) -> Result<CorrectionState, AttendanceError> {
        key.validate()?;
        Ok(self
            .store
            .find_by_session_and_member(key.session_id, key.member_id)
            .await?
            .map(|a| a.correction_state())
            .unwrap_or(CorrectionState::Idle))
    }

    /// Full event log for audit; empty when no record exists.
    pub async fn history(&self, key: AttendanceKey) -> Result<Vec<AttendanceEvent>, AttendanceError> {
        key.validate()?;
        Ok(self
            .store
            .find_by_session_and_member(key.session_id, key.member_id)
            .await?
            .map(|a| a.events().to_vec())
            .unwrap_or_default())
    }

    /// Per-session status of `member_id` over `session_ids`. Sessions without
    /// a record count as ABSENT; repeated ids are counted once.
    pub async fn member_summary(
        &self,
        member_id: i64,
        session_ids: &[i64],
    ) -> Result<AttendanceSummary, AttendanceError> {
        if member_id < 1 {
            return Err(AttendanceError::Validation(
                "member_id must be positive".into(),
            ));
        }

        let mut seen = HashSet::new();
        let session_ids: Vec<i64> = session_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        self.summarize(member_id, &session_ids).await
    }

    /// Summaries of every member of the course over all of its sessions, with
    /// course-wide totals. A course without sessions or without members gives
    /// an empty result with zeroed statistics.
    pub async fn course_summary(
        &self,
        course_id: i64,
    ) -> Result<CourseAttendanceSummary, AttendanceError> {
        if course_id < 1 {
            return Err(AttendanceError::Validation(
                "course_id must be positive".into(),
            ));
        }

        let session_ids = self.directory.course_sessions(course_id).await?;
        if session_ids.is_empty() {
            debug!("Course {course_id} has no sessions");
            return Ok(CourseAttendanceSummary::empty(course_id));
        }
        let member_ids = self.directory.course_members(course_id).await?;
        if member_ids.is_empty() {
            debug!("Course {course_id} has no members");
            return Ok(CourseAttendanceSummary::empty(course_id));
        }

        let mut members = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            members.push(self.summarize(member_id, &session_ids).await?);
        }

        let average_attendance_rate =
            members.iter().map(|m| m.attendance_rate).sum::<f64>() / members.len() as f64;
        let statistics = CourseAttendanceStatistics {
            total_members: members.len(),
            total_sessions: session_ids.len(),
            average_attendance_rate,
        };
        Ok(CourseAttendanceSummary {
            course_id,
            members,
            statistics,
        })
    }

    async fn summarize(
        &self,
        member_id: i64,
        session_ids: &[i64],
    ) -> Result<AttendanceSummary, AttendanceError> {
        let records = self.store.find_by_member(member_id, session_ids).await?;
        let sessions = session_ids
            .iter()
            .map(|&session_id| SessionStatus {
                session_id,
                status: records
                    .iter()
                    .find(|a| a.session_id() == session_id)
                    .map(|a| a.final_status())
                    .unwrap_or(AttendanceStatus::Absent),
            })
            .collect();

        Ok(AttendanceSummary::from_statuses(member_id, sessions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{InMemoryRoleDirectory, SessionScope};
    use crate::clock::FixedClock;
    use crate::error::ErrorKind;
    use crate::event_store::InMemoryEventStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use db::models::course_member::CourseRole;
    use db::models::member_system_role::SystemRole;
    use db::DbErr;

    async fn service() -> AttendanceService {
        let dir = InMemoryRoleDirectory::new();
        dir.add_session(1, SessionScope::Course(100)).await;
        dir.add_session(2, SessionScope::Course(100)).await;
        dir.add_session(3, SessionScope::Standalone).await;
        dir.add_session(4, SessionScope::Course(300)).await;
        dir.assign_course_role(7, 100, CourseRole::Mentee).await;
        dir.assign_course_role(9, 100, CourseRole::Mentee).await;
        dir.assign_course_role(7, 200, CourseRole::Mentee).await;

        AttendanceService::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(dir),
            Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
            )),
        )
    }

    #[tokio::test]
    async fn test_invalid_ids_are_validation_errors() {
        let svc = service().await;
        let err = svc.check_in(AttendanceKey::new(0, 7)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Validation failed: session_id must be positive");
    }

    #[tokio::test]
    async fn test_non_participant_cannot_check_in() {
        let svc = service().await;
        let err = svc.check_in(AttendanceKey::new(1, 8)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        // anyone may attend a standalone session
        svc.check_in(AttendanceKey::new(3, 8)).await.unwrap();
    }

    struct OfflineDirectory;

    #[async_trait]
    impl RoleDirectory for OfflineDirectory {
        async fn system_roles(&self, _: i64) -> Result<HashSet<SystemRole>, AttendanceError> {
            Err(DbErr::Conn(sea_orm::RuntimeErr::Internal("offline".into())).into())
        }

        async fn course_role(
            &self,
            _: i64,
            _: i64,
        ) -> Result<Option<CourseRole>, AttendanceError> {
            Err(DbErr::Conn(sea_orm::RuntimeErr::Internal("offline".into())).into())
        }

        async fn session_scope(&self, _: i64) -> Result<Option<SessionScope>, AttendanceError> {
            Err(DbErr::Conn(sea_orm::RuntimeErr::Internal("offline".into())).into())
        }

        async fn course_sessions(&self, _: i64) -> Result<Vec<i64>, AttendanceError> {
            Err(DbErr::Conn(sea_orm::RuntimeErr::Internal("offline".into())).into())
        }

        async fn course_members(&self, _: i64) -> Result<Vec<i64>, AttendanceError> {
            Err(DbErr::Conn(sea_orm::RuntimeErr::Internal("offline".into())).into())
        }
    }

    #[tokio::test]
    async fn test_directory_outage_is_not_a_denial() {
        let svc = AttendanceService::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(OfflineDirectory),
            Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
            )),
        );

        let err = svc.check_in(AttendanceKey::new(1, 7)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(svc.history(AttendanceKey::new(1, 7)).await.unwrap().is_empty());

        let err = svc.course_summary(100).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[tokio::test]
    async fn test_check_out_without_record() {
        let svc = service().await;
        let err = svc.check_out(AttendanceKey::new(1, 7)).await.unwrap_err();
        assert!(matches!(
            err,
            AttendanceError::AttendanceNotFound {
                session_id: 1,
                member_id: 7
            }
        ));
    }

    #[tokio::test]
    async fn test_summary_counts_missing_sessions_as_absent() {
        let svc = service().await;
        svc.check_in(AttendanceKey::new(1, 7)).await.unwrap();

        let summary = svc.member_summary(7, &[1, 2, 1]).await.unwrap();
        assert_eq!(
            summary.sessions,
            vec![
                SessionStatus {
                    session_id: 1,
                    status: AttendanceStatus::Present
                },
                SessionStatus {
                    session_id: 2,
                    status: AttendanceStatus::Absent
                },
            ]
        );
        assert_eq!(summary.present, 1);
        assert_eq!(summary.absent, 1);
        assert!((summary.attendance_rate - 0.5).abs() < f64::EPSILON);

        let empty = svc.member_summary(7, &[]).await.unwrap();
        assert_eq!(empty.attendance_rate, 0.0);
    }

    #[tokio::test]
    async fn test_course_summary_covers_all_members_and_sessions() {
        let svc = service().await;
        svc.check_in(AttendanceKey::new(1, 7)).await.unwrap();
        svc.check_in(AttendanceKey::new(2, 7)).await.unwrap();
        svc.check_in(AttendanceKey::new(1, 9)).await.unwrap();

        let summary = svc.course_summary(100).await.unwrap();
        assert_eq!(summary.course_id, 100);
        let ids: Vec<i64> = summary.members.iter().map(|m| m.member_id).collect();
        assert_eq!(ids, vec![7, 9]);
        assert!((summary.members[0].attendance_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(summary.members[1].absent, 1);
        assert_eq!(summary.statistics.total_members, 2);
        assert_eq!(summary.statistics.total_sessions, 2);
        assert!((summary.statistics.average_attendance_rate - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_course_summary_empty_course() {
        let svc = service().await;

        // course 200 has a member but no sessions, course 300 the reverse
        let empty = CourseAttendanceStatistics {
            total_members: 0,
            total_sessions: 0,
            average_attendance_rate: 0.0,
        };
        for course_id in [200, 300] {
            let summary = svc.course_summary(course_id).await.unwrap();
            assert!(summary.members.is_empty());
            assert_eq!(summary.statistics, empty);
        }

        let err = svc.course_summary(0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_history_and_status_for_unknown_pair() {
        let svc = service().await;
        let key = AttendanceKey::new(2, 7);
        assert!(svc.history(key).await.unwrap().is_empty());
        assert_eq!(svc.status(key).await.unwrap(), AttendanceStatus::Absent);
        assert!(svc.correction_state(key).await.unwrap().is_idle());
    }
}
