use chrono::{Duration, TimeZone, Utc};
use db::models::{course, course_member, member, session};
use db::test_utils::setup_test_db;
use services::{
    ApproveCorrection, AttendanceError, AttendanceEvent, AttendanceKey, AttendanceService,
    AttendanceStatus, CorrectionState, CourseRole, FixedClock, InMemoryEventStore,
    InMemoryRoleDirectory, RejectCorrection, RequestCorrection, SessionScope, SystemRole,
};
use std::sync::Arc;

const COURSE: i64 = 100;
const SESSION: i64 = 1;
const STUDENT: i64 = 7;
const MENTOR: i64 = 11;
const MANAGER: i64 = 10;
const REGISTRAR: i64 = 20;
const ADMIN: i64 = 30;

struct Fixture {
    service: AttendanceService,
    clock: Arc<FixedClock>,
}

async fn fixture() -> Fixture {
    let dir = InMemoryRoleDirectory::new();
    dir.add_session(SESSION, SessionScope::Course(COURSE)).await;
    dir.assign_course_role(STUDENT, COURSE, CourseRole::Mentee).await;
    dir.assign_course_role(MENTOR, COURSE, CourseRole::Mentor).await;
    dir.assign_course_role(MANAGER, COURSE, CourseRole::Manager).await;
    dir.grant_system_role(REGISTRAR, SystemRole::Registrar).await;
    dir.grant_system_role(ADMIN, SystemRole::Admin).await;

    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
    ));
    let service = AttendanceService::new(
        Arc::new(InMemoryEventStore::new()),
        Arc::new(dir),
        clock.clone(),
    );
    Fixture { service, clock }
}

fn key() -> AttendanceKey {
    AttendanceKey::new(SESSION, STUDENT)
}

fn request(status: AttendanceStatus, reason: &str) -> RequestCorrection {
    RequestCorrection {
        session_id: SESSION,
        member_id: STUDENT,
        requested_status: status,
        reason: reason.into(),
    }
}

fn approve(reason: Option<&str>) -> ApproveCorrection {
    ApproveCorrection {
        session_id: SESSION,
        member_id: STUDENT,
        reason: reason.map(str::to_owned),
    }
}

fn reject(reason: &str) -> RejectCorrection {
    RejectCorrection {
        session_id: SESSION,
        member_id: STUDENT,
        rejection_reason: reason.into(),
    }
}

async fn attended(f: &Fixture) {
    f.service.check_in(key()).await.unwrap();
    f.clock.advance(Duration::minutes(90));
    f.service.check_out(key()).await.unwrap();
}

#[tokio::test]
async fn check_in_then_out_is_present() {
    let f = fixture().await;
    attended(&f).await;

    assert_eq!(f.service.status(key()).await.unwrap(), AttendanceStatus::Present);
    let history = f.service.history(key()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[1].occurred_at() - history[0].occurred_at(),
        Duration::minutes(90)
    );
}

#[tokio::test]
async fn never_checked_in_is_absent() {
    let f = fixture().await;
    assert_eq!(f.service.status(key()).await.unwrap(), AttendanceStatus::Absent);

    let err = f
        .service
        .request_correction(MENTOR, request(AttendanceStatus::Present, "was there"))
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::AttendanceNotFound { .. }));
}

#[tokio::test]
async fn mentor_request_approved_by_manager() {
    let f = fixture().await;
    attended(&f).await;

    f.service
        .request_correction(MENTOR, request(AttendanceStatus::Absent, "left mid-session"))
        .await
        .unwrap();
    assert!(matches!(
        f.service.correction_state(key()).await.unwrap(),
        CorrectionState::PendingCorrection(_)
    ));

    let saved = f
        .service
        .approve_correction(MANAGER, approve(None))
        .await
        .unwrap();

    match saved.events().last() {
        Some(AttendanceEvent::StatusCorrected {
            previous_status,
            new_status,
            ..
        }) => {
            assert_eq!(*previous_status, AttendanceStatus::Present);
            assert_eq!(*new_status, AttendanceStatus::Absent);
        }
        other => panic!("unexpected last event: {other:?}"),
    }
    assert!(f.service.correction_state(key()).await.unwrap().is_idle());
    assert_eq!(f.service.status(key()).await.unwrap(), AttendanceStatus::Absent);
}

#[tokio::test]
async fn mentor_cannot_approve_own_request() {
    let f = fixture().await;
    attended(&f).await;

    f.service
        .request_correction(MENTOR, request(AttendanceStatus::Late, "arrived at 9:20"))
        .await
        .unwrap();
    let err = f
        .service
        .approve_correction(MENTOR, approve(Some("confirmed")))
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::SelfApprovalNotAllowed));

    let history = f.service.history(key()).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(matches!(
        history.last(),
        Some(AttendanceEvent::CorrectionRequested { .. })
    ));
    assert_eq!(f.service.status(key()).await.unwrap(), AttendanceStatus::Present);
}

#[tokio::test]
async fn registrar_request_needs_higher_system_role() {
    let f = fixture().await;
    attended(&f).await;

    f.service
        .request_correction(REGISTRAR, request(AttendanceStatus::Late, "gate log"))
        .await
        .unwrap();

    // a mentor neither outranks a registrar nor manages the course
    let err = f
        .service
        .reject_correction(MENTOR, reject("looks fine"))
        .await
        .unwrap_err();
    assert!(matches!(err, AttendanceError::NotAuthorized(_)));

    f.service
        .reject_correction(ADMIN, reject("gate log was for another room"))
        .await
        .unwrap();
    assert_eq!(f.service.status(key()).await.unwrap(), AttendanceStatus::Present);

    // a new request is allowed once the previous one is resolved
    f.service
        .request_correction(MENTOR, request(AttendanceStatus::LeftEarly, "left at 10"))
        .await
        .unwrap();
    f.service
        .approve_correction(ADMIN, approve(Some("  ")))
        .await
        .unwrap();

    let history = f.service.history(key()).await.unwrap();
    match history.last() {
        Some(AttendanceEvent::StatusCorrected { reason, .. }) => assert_eq!(reason, "left at 10"),
        other => panic!("unexpected last event: {other:?}"),
    }
    let summary = f.service.member_summary(STUDENT, &[SESSION]).await.unwrap();
    assert_eq!(summary.left_early, 1);
    assert!((summary.attendance_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn concurrent_requests_admit_exactly_one() {
    let f = fixture().await;
    attended(&f).await;

    let first = f.service.clone();
    let second = f.service.clone();
    let (a, b) = tokio::join!(
        first.request_correction(MENTOR, request(AttendanceStatus::Late, "late")),
        second.request_correction(MANAGER, request(AttendanceStatus::Absent, "absent")),
    );

    let outcomes = [a, b];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(matches!(
                err,
                AttendanceError::CorrectionAlreadyPending
                    | AttendanceError::ConcurrencyConflict { .. }
            ));
        }
    }

    let requests = f
        .service
        .history(key())
        .await
        .unwrap()
        .into_iter()
        .filter(|e| matches!(e, AttendanceEvent::CorrectionRequested { .. }))
        .count();
    assert_eq!(requests, 1);
}

#[tokio::test]
async fn sqlite_backed_service_resolves_races_by_version() {
    let db = setup_test_db().await;
    let student = member::Model::create(&db, "student").await.unwrap();
    let mentor = member::Model::create(&db, "mentor").await.unwrap();
    let manager = member::Model::create(&db, "manager").await.unwrap();
    let c = course::Model::create(&db, "Networks").await.unwrap();
    let s = session::Model::create(&db, Some(c.id), "Lab 3", Utc::now())
        .await
        .unwrap();
    course_member::Model::assign(&db, c.id, student.id, CourseRole::Mentee)
        .await
        .unwrap();
    course_member::Model::assign(&db, c.id, mentor.id, CourseRole::Mentor)
        .await
        .unwrap();
    course_member::Model::assign(&db, c.id, manager.id, CourseRole::Manager)
        .await
        .unwrap();

    let service = AttendanceService::with_database(db);
    let key = AttendanceKey::new(s.id, student.id);
    service.check_in(key).await.unwrap();

    let make = |status, reason: &str| RequestCorrection {
        session_id: s.id,
        member_id: student.id,
        requested_status: status,
        reason: reason.into(),
    };
    let (a, b) = tokio::join!(
        service.request_correction(mentor.id, make(AttendanceStatus::Late, "late")),
        service.request_correction(manager.id, make(AttendanceStatus::Absent, "absent")),
    );
    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);

    service
        .approve_correction(
            manager.id,
            ApproveCorrection {
                session_id: s.id,
                member_id: student.id,
                reason: None,
            },
        )
        .await
        .unwrap();

    let status = service.status(key).await.unwrap();
    assert!(matches!(
        status,
        AttendanceStatus::Late | AttendanceStatus::Absent
    ));
    assert!(service.correction_state(key).await.unwrap().is_idle());
}

#[tokio::test]
async fn course_summary_over_sqlite() {
    let db = setup_test_db().await;
    let steady = member::Model::create(&db, "steady").await.unwrap();
    let patchy = member::Model::create(&db, "patchy").await.unwrap();
    let lead = member::Model::create(&db, "lead").await.unwrap();
    let c = course::Model::create(&db, "Compilers").await.unwrap();
    let empty = course::Model::create(&db, "Unscheduled").await.unwrap();
    let start = Utc::now();
    let week1 = session::Model::create(&db, Some(c.id), "Week 1", start)
        .await
        .unwrap();
    let week2 = session::Model::create(&db, Some(c.id), "Week 2", start + Duration::days(7))
        .await
        .unwrap();
    for (who, role) in [
        (steady.id, CourseRole::Mentee),
        (patchy.id, CourseRole::Mentee),
        (lead.id, CourseRole::Manager),
    ] {
        course_member::Model::assign(&db, c.id, who, role).await.unwrap();
    }
    course_member::Model::assign(&db, empty.id, steady.id, CourseRole::Mentee)
        .await
        .unwrap();

    let service = AttendanceService::with_database(db);
    for key in [
        AttendanceKey::new(week1.id, steady.id),
        AttendanceKey::new(week2.id, steady.id),
        AttendanceKey::new(week2.id, patchy.id),
    ] {
        service.check_in(key).await.unwrap();
    }

    let summary = service.course_summary(c.id).await.unwrap();
    let ids: Vec<i64> = summary.members.iter().map(|m| m.member_id).collect();
    assert_eq!(ids, vec![steady.id, patchy.id, lead.id]);
    let patchy_sessions: Vec<(i64, AttendanceStatus)> = summary.members[1]
        .sessions
        .iter()
        .map(|s| (s.session_id, s.status))
        .collect();
    assert_eq!(
        patchy_sessions,
        vec![
            (week1.id, AttendanceStatus::Absent),
            (week2.id, AttendanceStatus::Present)
        ]
    );
    assert_eq!(summary.statistics.total_members, 3);
    assert_eq!(summary.statistics.total_sessions, 2);
    assert!((summary.statistics.average_attendance_rate - 0.5).abs() < 1e-9);

    let none = service.course_summary(empty.id).await.unwrap();
    assert!(none.members.is_empty());
    assert_eq!(none.statistics.total_members, 0);
    assert_eq!(none.statistics.total_sessions, 0);
    assert_eq!(none.statistics.average_attendance_rate, 0.0);
}
