use crate::attendance::Attendance;
use crate::attendance_event::AttendanceEvent;
use crate::error::AttendanceError;
use crate::event_store::EventStore;
use async_trait::async_trait;
use chrono::Utc;
use db::models::{attendance, attendance_event};
use log::warn;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};

/// Event store over the `attendances` and `attendance_events` tables.
///
/// The header row carries the version; an append bumps it with a guarded
/// `UPDATE ... WHERE version = expected` in the same transaction that inserts
/// the event rows.
#[derive(Clone)]
pub struct SeaOrmEventStore {
    db: DatabaseConnection,
}

impl SeaOrmEventStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn load<C>(db: &C, header: attendance::Model) -> Result<Attendance, AttendanceError>
    where
        C: ConnectionTrait,
    {
        let rows = attendance_event::Model::find_for_attendance(db, header.id).await?;
        let events = rows
            .iter()
            .map(|row| serde_json::from_str::<AttendanceEvent>(&row.payload))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Attendance::rehydrate(
            header.id,
            header.session_id,
            header.member_id,
            header.version,
            events,
        ))
    }

    async fn stored_version(&self, session_id: i64, member_id: i64) -> Result<i64, AttendanceError> {
        Ok(
            attendance::Model::find_by_session_and_member(&self.db, session_id, member_id)
                .await?
                .map(|m| m.version)
                .unwrap_or(0),
        )
    }

    async fn conflict(&self, attendance: &Attendance) -> AttendanceError {
        let expected = attendance.version();
        let actual = match self
            .stored_version(attendance.session_id(), attendance.member_id())
            .await
        {
            Ok(v) => v,
            Err(e) => return e,
        };
        warn!(
            "Version conflict on attendance session={} member={}: expected {expected}, found {actual}",
            attendance.session_id(),
            attendance.member_id()
        );
        AttendanceError::ConcurrencyConflict { expected, actual }
    }
}

/// Position of an event in its log, as stored in `attendance_events.seq`.
fn event_seq(first_seq: usize, offset: usize) -> Result<i32, AttendanceError> {
    first_seq
        .checked_add(offset)
        .and_then(|seq| i32::try_from(seq).ok())
        .ok_or_else(|| AttendanceError::Validation("attendance log is too long".into()))
}

#[async_trait]
impl EventStore for SeaOrmEventStore {
    async fn find_by_session_and_member(
        &self,
        session_id: i64,
        member_id: i64,
    ) -> Result<Option<Attendance>, AttendanceError> {
        match attendance::Model::find_by_session_and_member(&self.db, session_id, member_id).await? {
            Some(header) => Ok(Some(Self::load(&self.db, header).await?)),
            None => Ok(None),
        }
    }

    async fn append(&self, attendance: Attendance) -> Result<Attendance, AttendanceError> {
        let expected = attendance.version();

        if attendance.uncommitted_events().is_empty() {
            let actual = self
                .stored_version(attendance.session_id(), attendance.member_id())
                .await?;
            if actual != expected {
                return Err(AttendanceError::ConcurrencyConflict { expected, actual });
            }
            return Ok(attendance);
        }

        let first_seq = attendance.persisted_len();
        let mut rows = Vec::with_capacity(attendance.uncommitted_events().len());
        for (offset, event) in attendance.uncommitted_events().iter().enumerate() {
            rows.push((
                event_seq(first_seq, offset)?,
                event.kind(),
                serde_json::to_string(event)?,
                event.occurred_at(),
            ));
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let attendance_id = match attendance.id() {
            None => {
                let inserted = attendance::ActiveModel {
                    session_id: Set(attendance.session_id()),
                    member_id: Set(attendance.member_id()),
                    version: Set(expected + 1),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&txn)
                .await;

                match inserted {
                    Ok(model) => model.id,
                    Err(err) => {
                        txn.rollback().await?;
                        return match err.sql_err() {
                            Some(SqlErr::UniqueConstraintViolation(_)) => {
                                Err(self.conflict(&attendance).await)
                            }
                            _ => Err(err.into()),
                        };
                    }
                }
            }
            Some(id) => {
                let updated = attendance::Entity::update_many()
                    .col_expr(attendance::Column::Version, Expr::value(expected + 1))
                    .col_expr(attendance::Column::UpdatedAt, Expr::value(now))
                    .filter(attendance::Column::Id.eq(id))
                    .filter(attendance::Column::Version.eq(expected))
                    .exec(&txn)
                    .await?;
                if updated.rows_affected != 1 {
                    txn.rollback().await?;
                    return Err(self.conflict(&attendance).await);
                }
                id
            }
        };

        let models = rows
            .into_iter()
            .map(|(seq, kind, payload, occurred_at)| attendance_event::ActiveModel {
                attendance_id: Set(attendance_id),
                seq: Set(seq),
                kind: Set(kind.to_owned()),
                payload: Set(payload),
                occurred_at: Set(occurred_at),
                ..Default::default()
            });
        attendance_event::Entity::insert_many(models)
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(attendance.mark_persisted(attendance_id))
    }

    async fn find_by_member(
        &self,
        member_id: i64,
        session_ids: &[i64],
    ) -> Result<Vec<Attendance>, AttendanceError> {
        let headers =
            attendance::Model::find_by_member_in_sessions(&self.db, member_id, session_ids).await?;
        let mut found = Vec::with_capacity(headers.len());
        for header in headers {
            found.push(Self::load(&self.db, header).await?);
        }
        Ok(found)
    }
}
