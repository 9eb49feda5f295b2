use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{ranking, MemberStats, Standing, YearMonth},
    ports::{
        database::{AttendanceFilter, DatabasePort, EventFilter, PointsFilter},
        member::MemberPort,
    },
};

use super::{CommandFuture, DomainLogic, Error};

/// Standings over the whole points ledger
pub struct RankingGeneralRequest;

/// Standings over the points credited during one month
pub struct RankingMonthlyRequest {
    pub month: YearMonth,
}

impl<D, M> Service<RankingGeneralRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Vec<Standing>;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: RankingGeneralRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        Box::pin(async move {
            let entries = database.list_points(PointsFilter::default()).await?;
            let members = member.list_members(false).await?;
            tracing::debug!(entries = entries.len(), "general ranking");
            Ok(ranking(&entries, &members))
        })
    }
}

impl<D, M> Service<RankingMonthlyRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Vec<Standing>;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RankingMonthlyRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        Box::pin(async move {
            let (from, to) = req.month.range();
            let entries = database
                .list_points(PointsFilter {
                    from: Some(from),
                    to: Some(to),
                    ..Default::default()
                })
                .await?;
            let members = member.list_members(false).await?;
            tracing::debug!(month = %req.month, entries = entries.len(), "monthly ranking");
            Ok(ranking(&entries, &members))
        })
    }
}

pub struct MemberStatsRequest {
    pub member_id: Uuid,
}

impl<D, M> Service<MemberStatsRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = MemberStats;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: MemberStatsRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        Box::pin(async move {
            let subject = member.get_member(req.member_id).await?;
            let points = database
                .list_points(PointsFilter {
                    member_id: Some(subject.member_id),
                    ..Default::default()
                })
                .await?;
            let attendance = database
                .list_attendance(AttendanceFilter {
                    member_id: Some(subject.member_id),
                    ..Default::default()
                })
                .await?;
            let events = database.list_events(EventFilter::default()).await?;

            Ok(MemberStats::build(&points, &events, &attendance))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::{
            attendance::RecordAttendanceRequest, score::RegisterScoreRequest,
            teams::GenerateTeamsRequest, testing, ErrorKind,
        },
        domain::{AttendanceStatus, Caller, PointsEntry, RsvpStatus},
    };
    use chrono::{Duration, Utc};
    use rstest::*;
    use speculoos::prelude::*;
    use tower::BoxError;

    #[rstest]
    #[tokio::test]
    async fn test_ranking_orders_and_breaks_ties() -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Caio", "Ana", "Bia"]).await;
        let event = testing::seed_game(&database).await;
        let (caio, ana, bia) = (&members[0], &members[1], &members[2]);
        database
            .insert_points(vec![
                PointsEntry::attendance(caio.member_id, event.event_id, 1),
                PointsEntry::attendance(ana.member_id, event.event_id, 1),
                PointsEntry::attendance(bia.member_id, event.event_id, 1),
                PointsEntry::attendance(bia.member_id, event.event_id, 1),
            ])
            .await?;
        let domain = testing::domain(&database);

        let standings = domain.execute(RankingGeneralRequest).await?;

        let names: Vec<&str> = standings.iter().map(|s| s.name.as_str()).collect();
        assert_that!(names).is_equal_to(vec!["Bia", "Ana", "Caio"]);
        assert_that!(standings[0].points).is_equal_to(2);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_monthly_ranking_uses_month_range() -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana", "Bia"]).await;
        let event = testing::seed_game(&database).await;
        let month = YearMonth::new(2024, 3).unwrap();
        let (start, end) = month.range();
        database
            .insert_points(vec![
                PointsEntry {
                    created_at: start,
                    ..PointsEntry::attendance(members[0].member_id, event.event_id, 1)
                },
                PointsEntry {
                    created_at: end - Duration::seconds(1),
                    ..PointsEntry::attendance(members[0].member_id, event.event_id, 1)
                },
                // First instant of April belongs to April
                PointsEntry {
                    created_at: end,
                    ..PointsEntry::attendance(members[1].member_id, event.event_id, 1)
                },
            ])
            .await?;
        let domain = testing::domain(&database);

        let march = domain.execute(RankingMonthlyRequest { month }).await?;
        let april = domain
            .execute(RankingMonthlyRequest {
                month: month.next(),
            })
            .await?;

        assert_that!(march).has_length(1);
        assert_that!(march[0].member_id).is_equal_to(members[0].member_id);
        assert_that!(march[0].points).is_equal_to(2);
        assert_that!(april).has_length(1);
        assert_that!(april[0].member_id).is_equal_to(members[1].member_id);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_member_stats() -> Result<(), BoxError> {
        let admin = Caller::admin(Uuid::new_v4());
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana", "Bia"]).await;
        let event = testing::seed_game(&database).await;
        for m in &members {
            testing::rsvp(&database, event.event_id, m.member_id, RsvpStatus::Going).await;
        }
        let domain = testing::domain(&database);
        let teams = domain
            .execute(GenerateTeamsRequest {
                caller: admin,
                event_id: event.event_id,
            })
            .await?;
        domain
            .execute(RegisterScoreRequest {
                caller: admin,
                event_id: event.event_id,
                black: 4,
                white: 2,
            })
            .await?;
        let winner = teams.black[0].member_id;
        domain
            .execute(RecordAttendanceRequest {
                caller: admin,
                event_id: event.event_id,
                member_id: winner,
                status: AttendanceStatus::Present,
            })
            .await?;

        let stats = domain.execute(MemberStatsRequest { member_id: winner }).await?;

        assert_that!(stats.total_points).is_equal_to(5);
        assert_that!(stats.total_goals).is_equal_to(4);
        assert_that!(stats.wins).is_equal_to(1);
        assert_that!(stats.games).is_equal_to(1);
        assert_that!(stats.present).is_equal_to(1);
        assert_that!(stats.win_rate).is_equal_to(100.0);

        let unknown = domain
            .execute(MemberStatsRequest {
                member_id: Uuid::new_v4(),
            })
            .await;
        assert_that!(unknown)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::NotFound);

        // Nothing was credited outside the current month
        let previous = YearMonth::of(Utc::now() - Duration::days(40));
        assert_that!(domain.execute(RankingMonthlyRequest { month: previous }).await?).is_empty();

        Ok(())
    }
}
