use std::task::{Context, Poll};

use chrono::Utc;
use tower::Service;
use uuid::Uuid;

use crate::{
    config::ClubConfig,
    domain::{
        Attendance, AttendanceStatus, Caller, Event, EventKind, Fine, FineKind, PointsEntry,
        RsvpStatus,
    },
    ports::{database::DatabasePort, member::MemberPort},
};

use super::{require_admin, CommandFuture, DomainLogic, Error};

pub struct RecordAttendanceRequest {
    pub caller: Caller,
    pub event_id: Uuid,
    pub member_id: Uuid,
    pub status: AttendanceStatus,
}

#[derive(Debug, PartialEq, Eq, serde::Serialize)]
pub struct RecordAttendanceResponse {
    pub attendance: Attendance,
    /// Fine triggered by this status
    pub fine: Option<Fine>,
    /// Attendance points credited by this status
    pub points: Option<PointsEntry>,
}

impl<D, M> Service<RecordAttendanceRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = RecordAttendanceResponse;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RecordAttendanceRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        let config = self.config.clone();
        Box::pin(async move {
            require_admin(&req.caller, "record attendance")?;

            let event = database.get_event(req.event_id).await?;
            let attendee = member.get_member(req.member_id).await?;
            let previous = database
                .get_attendance(event.event_id, attendee.member_id)
                .await?;
            let attendance = Attendance {
                event_id: event.event_id,
                member_id: attendee.member_id,
                status: req.status,
                recorded_by: req.caller.member_id,
                recorded_at: Utc::now(),
            };

            // Recording the same status again must not charge or credit twice
            if previous.map(|p| p.status) == Some(req.status) {
                let attendance = database.record_attendance(attendance, None, None).await?;
                tracing::debug!(
                    event_id = %event.event_id,
                    member_id = %attendee.member_id,
                    status = req.status.as_str(),
                    "attendance unchanged"
                );
                return Ok(RecordAttendanceResponse {
                    attendance,
                    fine: None,
                    points: None,
                });
            }

            let rsvp = if req.status == AttendanceStatus::Absent {
                database
                    .get_rsvp(event.event_id, attendee.member_id)
                    .await?
                    .map(|r| r.status)
            } else {
                None
            };
            let fine = attendance_fine(&event, attendee.member_id, req.status, rsvp, &config);
            let credited = req.status == AttendanceStatus::Present && event.kind == EventKind::Game;
            let points = credited.then(|| {
                PointsEntry::attendance(
                    attendee.member_id,
                    event.event_id,
                    config.attendance_points,
                )
            });

            // The status only sticks together with its fine and points
            let booked = fine.clone().map(|fine| {
                let entry = fine.cash_entry(req.caller.member_id);
                (fine, entry)
            });
            let attendance = database
                .record_attendance(attendance, booked, points.clone())
                .await
                .map_err(|err| {
                    tracing::warn!(
                        event_id = %event.event_id,
                        member_id = %attendee.member_id,
                        status = req.status.as_str(),
                        error = %err,
                        "failed to record attendance"
                    );
                    err
                })?;

            if let Some(fine) = &fine {
                tracing::info!(
                    event_id = %event.event_id,
                    member_id = %attendee.member_id,
                    kind = fine.kind.as_str(),
                    amount_cents = fine.amount_cents,
                    "fine recorded"
                );
            }
            tracing::info!(
                event_id = %event.event_id,
                member_id = %attendee.member_id,
                status = req.status.as_str(),
                "attendance recorded"
            );
            Ok(RecordAttendanceResponse {
                attendance,
                fine,
                points,
            })
        })
    }
}

/// Fine owed for an attendance status
///
/// Absence is only fined when the member had confirmed with a `GOING` RSVP.
fn attendance_fine(
    event: &Event,
    member_id: Uuid,
    status: AttendanceStatus,
    rsvp: Option<RsvpStatus>,
    config: &ClubConfig,
) -> Option<Fine> {
    let (kind, amount_cents) = match (status, rsvp) {
        (AttendanceStatus::Late, _) => (FineKind::Late, config.late_fee_cents),
        (AttendanceStatus::Absent, Some(RsvpStatus::Going)) => {
            (FineKind::ConfirmedNoShow, config.no_show_fee_cents)
        }
        _ => return None,
    };
    Some(Fine::new(member_id, Some(event.event_id), kind, amount_cents))
}

/// Charge a member for guests brought to an event
pub struct AddGuestRequest {
    pub caller: Caller,
    pub event_id: Uuid,
    pub member_id: Uuid,
    pub count: u32,
}

impl<D, M> Service<AddGuestRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Fine;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AddGuestRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        let config = self.config.clone();
        Box::pin(async move {
            require_admin(&req.caller, "add guests")?;
            if req.count == 0 {
                return Err(Error::Validation("guest count must be at least 1".into()));
            }

            let event = database.get_event(req.event_id).await?;
            let host = member.get_member(req.member_id).await?;

            let fine = Fine {
                note: Some(format!("{} guest(s)", req.count)),
                ..Fine::new(
                    host.member_id,
                    Some(event.event_id),
                    FineKind::Guest,
                    i64::from(req.count) * config.guest_fee_cents,
                )
            };
            let entry = fine.cash_entry(req.caller.member_id);
            let (fine, _) = database.record_fine(fine, entry).await?;

            tracing::info!(
                event_id = %event.event_id,
                member_id = %host.member_id,
                guests = req.count,
                amount_cents = fine.amount_cents,
                "guest fee recorded"
            );
            Ok(fine)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::{cash::CashBalanceRequest, testing, ErrorKind},
        domain::{CashCategory, Member, PointsReason},
        ports::{
            database::{self, CashFilter, FineFilter, MockDatabasePort, PointsFilter},
            member::MockMemberPort,
        },
    };
    use chrono::Duration;
    use mockall::predicate::*;
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tower::BoxError;

    #[fixture]
    fn admin() -> Caller {
        Caller::admin(Uuid::new_v4())
    }

    fn record(
        caller: Caller,
        event: &Event,
        member_id: Uuid,
        status: AttendanceStatus,
    ) -> RecordAttendanceRequest {
        RecordAttendanceRequest {
            caller,
            event_id: event.event_id,
            member_id,
            status,
        }
    }

    #[rstest]
    #[case(AttendanceStatus::Late, None, Some(FineKind::Late))]
    #[case(AttendanceStatus::Late, Some(RsvpStatus::Going), Some(FineKind::Late))]
    #[case(AttendanceStatus::Absent, Some(RsvpStatus::Going), Some(FineKind::ConfirmedNoShow))]
    #[case(AttendanceStatus::Absent, Some(RsvpStatus::NotGoing), None)]
    #[case(AttendanceStatus::Absent, None, None)]
    #[case(AttendanceStatus::Present, Some(RsvpStatus::Going), None)]
    #[case(AttendanceStatus::Excused, Some(RsvpStatus::Going), None)]
    fn test_attendance_fine(
        #[case] status: AttendanceStatus,
        #[case] rsvp: Option<RsvpStatus>,
        #[case] expected: Option<FineKind>,
    ) {
        let event = Event::new(EventKind::Game, Utc::now(), "Quadra");
        let fine = attendance_fine(&event, Uuid::new_v4(), status, rsvp, &ClubConfig::default());
        assert_that!(fine.map(|f| f.kind)).is_equal_to(expected);
    }

    #[rstest]
    #[tokio::test]
    async fn test_late_without_rsvp(admin: Caller) -> Result<(), BoxError> {
        // GIVEN a member with no RSVP for the event
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana"]).await;
        let event = testing::seed_game(&database).await;
        let domain = testing::domain(&database);
        let before = domain.execute(CashBalanceRequest).await?;

        // WHEN marking them late
        let res = domain
            .execute(record(admin, &event, members[0].member_id, AttendanceStatus::Late))
            .await?;

        // THEN exactly one late fine and one cash IN entry exist
        assert_that!(res.fine)
            .is_some()
            .matches(|f| f.kind == FineKind::Late && f.amount_cents == 500);
        assert_that!(res.points).is_none();

        let fines = database.list_fines(FineFilter::default()).await?;
        assert_that!(fines).has_length(1);
        let entries = database.list_cash_entries(CashFilter::default()).await?;
        assert_that!(entries).has_length(1);
        assert_that!(entries[0].category).is_equal_to(CashCategory::Fine);

        let after = domain.execute(CashBalanceRequest).await?;
        assert_that!(after - before).is_equal_to(500);

        Ok(())
    }

    #[rstest]
    #[case(Some(RsvpStatus::Going), 1)]
    #[case(Some(RsvpStatus::NotGoing), 0)]
    #[case(Some(RsvpStatus::Maybe), 0)]
    #[case(None, 0)]
    #[tokio::test]
    async fn test_absent_fines_only_broken_promises(
        admin: Caller,
        #[case] rsvp: Option<RsvpStatus>,
        #[case] expected_fines: usize,
    ) -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana"]).await;
        let event = testing::seed_game(&database).await;
        if let Some(status) = rsvp {
            testing::rsvp(&database, event.event_id, members[0].member_id, status).await;
        }
        let domain = testing::domain(&database);

        domain
            .execute(record(admin, &event, members[0].member_id, AttendanceStatus::Absent))
            .await?;

        let fines = database.list_fines(FineFilter::default()).await?;
        assert_that!(fines).has_length(expected_fines);
        assert_that!(fines
            .iter()
            .all(|f| f.kind == FineKind::ConfirmedNoShow && f.amount_cents == 1000))
        .is_true();
        assert_that!(database.list_cash_entries(CashFilter::default()).await?)
            .has_length(expected_fines);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_present_on_game_credits_points(admin: Caller) -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana"]).await;
        let game = testing::seed_game(&database).await;
        let meeting = Event::new(EventKind::Internal, Utc::now() + Duration::days(3), "Sede");
        let meeting = database.insert_event(meeting).await?;
        let domain = testing::domain(&database);

        let res = domain
            .execute(record(admin, &game, members[0].member_id, AttendanceStatus::Present))
            .await?;
        assert_that!(res.points)
            .is_some()
            .matches(|p| p.points == 1 && p.goals == 0 && p.reason == PointsReason::Attendance);

        let res = domain
            .execute(record(admin, &meeting, members[0].member_id, AttendanceStatus::Present))
            .await?;
        assert_that!(res.points).is_none();
        assert_that!(res.fine).is_none();

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_same_status_has_no_new_side_effects(admin: Caller) -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana"]).await;
        let event = testing::seed_game(&database).await;
        let domain = testing::domain(&database);
        let member_id = members[0].member_id;

        for status in [
            AttendanceStatus::Late,
            AttendanceStatus::Late,
            AttendanceStatus::Present,
            AttendanceStatus::Present,
        ] {
            domain.execute(record(admin, &event, member_id, status)).await?;
        }

        assert_that!(database.list_fines(FineFilter::default()).await?).has_length(1);
        let points = database
            .list_points(PointsFilter {
                member_id: Some(member_id),
                ..Default::default()
            })
            .await?;
        assert_that!(points).has_length(1);
        assert_that!(database.get_attendance(event.event_id, member_id).await?)
            .is_some()
            .matches(|a| a.status == AttendanceStatus::Present);

        Ok(())
    }

    #[rstest]
    #[case(AttendanceStatus::Late, true, false)]
    #[case(AttendanceStatus::Present, false, true)]
    #[tokio::test]
    async fn test_failed_write_can_be_retried(
        admin: Caller,
        #[case] status: AttendanceStatus,
        #[case] fined: bool,
        #[case] credited: bool,
    ) {
        // GIVEN a store whose first attendance write fails
        let event = Event::new(EventKind::Game, Utc::now(), "Quadra");
        let attendee = Member::new("Ana", "ana@patota.club");
        let mut member = MockMemberPort::new();
        let returned = attendee.clone();
        member
            .expect_get_member()
            .with(eq(attendee.member_id))
            .times(2)
            .returning(move |_| Ok(returned.clone()));
        let mut database = MockDatabasePort::new();
        let returned = event.clone();
        database
            .expect_get_event()
            .with(eq(event.event_id))
            .times(2)
            .returning(move |_| Ok(returned.clone()));
        // Nothing was stored by the failed write, so the retry still sees no attendance
        database
            .expect_get_attendance()
            .times(2)
            .returning(|_, _| Ok(None));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        database
            .expect_record_attendance()
            .withf(move |_, fine, points| fine.is_some() == fined && points.is_some() == credited)
            .times(2)
            .returning(move |attendance, _, _| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(database::Error::Adapter("connection reset".into()))
                } else {
                    Ok(attendance)
                }
            });
        let domain = DomainLogic::new(Arc::new(database), Arc::new(member), ClubConfig::default());
        let request = || record(admin, &event, attendee.member_id, status);

        // WHEN the first call fails
        let res = domain.execute(request()).await;
        assert_that!(res)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::Store);

        // THEN the retry still books the fine and the points
        let res = domain.execute(request()).await;
        assert_that!(res)
            .is_ok()
            .matches(|res| res.fine.is_some() == fined && res.points.is_some() == credited);
        assert_that!(calls.load(Ordering::SeqCst)).is_equal_to(2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_record_attendance_rejects_non_admin() -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana"]).await;
        let event = testing::seed_game(&database).await;
        let domain = testing::domain(&database);
        let caller = Caller::member(members[0].member_id);

        let res = domain
            .execute(record(caller, &event, members[0].member_id, AttendanceStatus::Present))
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::Forbidden);
        assert_that!(database.get_attendance(event.event_id, members[0].member_id).await?)
            .is_none();

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_add_guest(admin: Caller) -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana"]).await;
        let event = testing::seed_game(&database).await;
        let domain = testing::domain(&database);

        let fine = domain
            .execute(AddGuestRequest {
                caller: admin,
                event_id: event.event_id,
                member_id: members[0].member_id,
                count: 3,
            })
            .await?;

        assert_that!(fine.kind).is_equal_to(FineKind::Guest);
        assert_that!(fine.amount_cents).is_equal_to(1500);
        assert_that!(fine.note).is_equal_to(Some("3 guest(s)".to_string()));
        let entries = database.list_cash_entries(CashFilter::default()).await?;
        assert_that!(entries).has_length(1);
        assert_that!(entries[0].category).is_equal_to(CashCategory::Guest);

        let zero = domain
            .execute(AddGuestRequest {
                caller: admin,
                event_id: event.event_id,
                member_id: members[0].member_id,
                count: 0,
            })
            .await;
        assert_that!(zero)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::Validation);

        Ok(())
    }
}
