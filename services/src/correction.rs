use crate::attendance::{Attendance, CorrectionState, PendingCorrection};
use crate::attendance_event::{AttendanceEvent, AttendanceStatus};
use crate::authorization::{AuthorizationResolver, ReviewAuthority};
use crate::clock::Clock;
use crate::error::AttendanceError;
use log::{info, warn};
use std::sync::Arc;

/// Request / approve / reject transitions on an attendance record.
///
/// Every transition checks authority before touching the aggregate, so a
/// failed call leaves the log as it was. Persisting the result is the
/// caller's job.
#[derive(Clone)]
pub struct CorrectionWorkflow {
    resolver: AuthorizationResolver,
    clock: Arc<dyn Clock>,
}

impl CorrectionWorkflow {
    pub fn new(resolver: AuthorizationResolver, clock: Arc<dyn Clock>) -> Self {
        Self { resolver, clock }
    }

    pub fn resolver(&self) -> &AuthorizationResolver {
        &self.resolver
    }

    pub async fn request_correction(
        &self,
        attendance: &mut Attendance,
        actor_id: i64,
        requested_status: AttendanceStatus,
        reason: &str,
    ) -> Result<(), AttendanceError> {
        let session_id = attendance.session_id();
        let Some(grant) = self.resolver.request_grant(actor_id, session_id).await? else {
            warn!("Member {actor_id} may not request corrections in session {session_id}");
            return Err(AttendanceError::NotAuthorized(
                "MENTOR in the session's course or OPERATOR required to request a correction"
                    .into(),
            ));
        };

        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AttendanceError::Validation(
                "correction reason is required".into(),
            ));
        }

        if !attendance.correction_state().is_idle() {
            return Err(AttendanceError::CorrectionAlreadyPending);
        }

        let current_status = attendance.final_status();
        if current_status == requested_status {
            return Err(AttendanceError::SameStatus);
        }

        attendance.record(AttendanceEvent::CorrectionRequested {
            at: self.clock.now(),
            current_status,
            requested_status,
            reason: reason.to_owned(),
            requested_by: actor_id,
            grant,
        });
        info!(
            "Correction requested by {actor_id} for member {} in session {session_id}: {current_status} -> {requested_status}",
            attendance.member_id()
        );
        Ok(())
    }

    /// Applies the pending request. A blank `reason` reuses the request's.
    pub async fn approve_correction(
        &self,
        attendance: &mut Attendance,
        approver_id: i64,
        reason: Option<&str>,
    ) -> Result<(), AttendanceError> {
        let pending = match attendance.correction_state() {
            CorrectionState::PendingCorrection(pending) => pending,
            CorrectionState::Idle => return Err(AttendanceError::NoPendingCorrection),
        };

        self.check_review(attendance, approver_id, &pending).await?;

        let reason = match reason.map(str::trim) {
            Some(r) if !r.is_empty() => r.to_owned(),
            _ => pending.reason.clone(),
        };
        let previous_status = attendance.final_status();

        attendance.record(AttendanceEvent::StatusCorrected {
            at: self.clock.now(),
            previous_status,
            new_status: pending.requested_status,
            reason,
            corrected_by: approver_id,
        });
        info!(
            "Correction approved by {approver_id} for member {} in session {}: {previous_status} -> {}",
            attendance.member_id(),
            attendance.session_id(),
            pending.requested_status
        );
        Ok(())
    }

    pub async fn reject_correction(
        &self,
        attendance: &mut Attendance,
        rejecter_id: i64,
        rejection_reason: &str,
    ) -> Result<(), AttendanceError> {
        let pending = match attendance.correction_state() {
            CorrectionState::PendingCorrection(pending) => pending,
            CorrectionState::Idle => return Err(AttendanceError::NoPendingCorrection),
        };

        self.check_review(attendance, rejecter_id, &pending).await?;

        let rejection_reason = rejection_reason.trim();
        if rejection_reason.is_empty() {
            return Err(AttendanceError::Validation(
                "rejection reason is required".into(),
            ));
        }

        attendance.record(AttendanceEvent::CorrectionRejected {
            at: self.clock.now(),
            rejection_reason: rejection_reason.to_owned(),
            rejected_by: rejecter_id,
        });
        info!(
            "Correction rejected by {rejecter_id} for member {} in session {}",
            attendance.member_id(),
            attendance.session_id()
        );
        Ok(())
    }

    async fn check_review(
        &self,
        attendance: &Attendance,
        reviewer_id: i64,
        pending: &PendingCorrection,
    ) -> Result<(), AttendanceError> {
        let requester_id = pending.requested_by;
        let authority = self
            .resolver
            .review_authority(
                reviewer_id,
                requester_id,
                pending.grant,
                attendance.session_id(),
            )
            .await?;
        match authority {
            a if a.is_allowed() => Ok(()),
            ReviewAuthority::SelfReview => {
                warn!(
                    "Member {reviewer_id} tried to review their own correction in session {}",
                    attendance.session_id()
                );
                Err(AttendanceError::SelfApprovalNotAllowed)
            }
            _ => {
                warn!(
                    "Member {reviewer_id} lacks authority to review a correction by {requester_id} in session {}",
                    attendance.session_id()
                );
                Err(AttendanceError::NotAuthorized(
                    "reviewer must manage the course, be SUPERVISOR or higher, or outrank the requester"
                        .into(),
                ))
            }
        }
    }
}
