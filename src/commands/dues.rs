use std::{
    collections::HashSet,
    task::{Context, Poll},
};

use chrono::Utc;
use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{Caller, Due, Exemption, YearMonth},
    ports::{database::DatabasePort, member::MemberPort},
};

use super::{require_admin, CommandFuture, DomainLogic, Error};

/// Create the dues of every active member for one month
pub struct GenerateDuesRequest {
    pub caller: Caller,
    pub month: YearMonth,
}

#[derive(Debug, PartialEq, Eq, serde::Serialize)]
pub struct GenerateDuesResponse {
    pub month: YearMonth,
    /// Dues created by this call, zero when the month was generated already
    pub created: usize,
}

impl<D, M> Service<GenerateDuesRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = GenerateDuesResponse;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GenerateDuesRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        let config = self.config.clone();
        Box::pin(async move {
            require_admin(&req.caller, "generate dues")?;

            let members = member.list_members(true).await?;
            let exempt: HashSet<Uuid> = database
                .list_exemptions(req.month)
                .await?
                .into_iter()
                .map(|e| e.member_id)
                .collect();

            let dues = members
                .iter()
                .map(|m| {
                    Due::for_month(
                        m.member_id,
                        req.month,
                        config.monthly_fee_cents,
                        config.due_day,
                        exempt.contains(&m.member_id),
                    )
                })
                .collect();

            // The batch is all or nothing, a failure means nothing was generated
            let created = database.insert_dues(dues).await.map_err(|err| {
                tracing::warn!(month = %req.month, error = %err, "dues generation failed");
                err
            })?;

            tracing::info!(
                month = %req.month,
                active_members = members.len(),
                created = created.len(),
                "generated monthly dues"
            );
            Ok(GenerateDuesResponse {
                month: req.month,
                created: created.len(),
            })
        })
    }
}

/// Waive one member's due for one month
pub struct CreateExemptionRequest {
    pub caller: Caller,
    pub member_id: Uuid,
    pub month: YearMonth,
    pub reason: String,
}

#[derive(Debug, PartialEq, Eq, serde::Serialize)]
pub struct CreateExemptionResponse {
    pub exemption: Exemption,
    /// The due zeroed by the exemption, if it was generated already
    pub due: Option<Due>,
}

impl<D, M> Service<CreateExemptionRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = CreateExemptionResponse;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateExemptionRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        Box::pin(async move {
            require_admin(&req.caller, "create exemptions")?;

            let reason = req.reason.trim();
            if reason.is_empty() {
                return Err(Error::Validation("exemption reason must not be empty".into()));
            }
            let exempted = member.get_member(req.member_id).await?;

            let (exemption, due) = database
                .apply_exemption(Exemption {
                    exemption_id: Uuid::new_v4(),
                    member_id: exempted.member_id,
                    month: req.month,
                    reason: reason.to_string(),
                    approved_by: req.caller.member_id,
                    created_at: Utc::now(),
                })
                .await?;

            tracing::info!(
                member_id = %exemption.member_id,
                month = %exemption.month,
                due_updated = due.is_some(),
                "exemption created"
            );
            Ok(CreateExemptionResponse { exemption, due })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::{testing, ErrorKind},
        domain::{DueStatus, Member},
        ports::{
            database::{self, DueFilter, MockDatabasePort},
            member::MockMemberPort,
        },
    };
    use crate::config::ClubConfig;
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::BoxError;

    #[fixture]
    fn month() -> YearMonth {
        YearMonth::new(2024, 6).unwrap()
    }

    #[fixture]
    fn admin() -> Caller {
        Caller::admin(Uuid::new_v4())
    }

    #[rstest]
    #[tokio::test]
    async fn test_generate_is_idempotent(month: YearMonth, admin: Caller) -> Result<(), BoxError> {
        // GIVEN three members, one of them inactive
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana", "Bia", "Caio"]).await;
        database.set_member_active(members[2].member_id, false).await?;
        let domain = testing::domain(&database);

        // WHEN generating the same month twice
        let first = domain
            .execute(GenerateDuesRequest { caller: admin, month })
            .await?;
        let second = domain
            .execute(GenerateDuesRequest { caller: admin, month })
            .await?;

        // THEN only the first call creates rows, one per active member
        assert_that!(first.created).is_equal_to(2);
        assert_that!(second.created).is_equal_to(0);

        let dues = database
            .list_dues(DueFilter {
                month: Some(month),
                ..Default::default()
            })
            .await?;
        assert_that!(dues).has_length(2);
        assert_that!(dues.iter().all(|d| d.amount_cents == 3500
            && d.status == DueStatus::Pending
            && d.due_date == month.due_date(10)))
        .is_true();

        Ok(())
    }

    /// The exemption wins whichever of the two operations runs first
    #[rstest]
    #[case(true)]
    #[case(false)]
    #[tokio::test]
    async fn test_exemption_order_independent(
        month: YearMonth,
        admin: Caller,
        #[case] exempt_first: bool,
    ) -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana", "Bia"]).await;
        let domain = testing::domain(&database);
        let exemption = || CreateExemptionRequest {
            caller: admin,
            member_id: members[0].member_id,
            month,
            reason: "injured".to_string(),
        };
        let generate = || GenerateDuesRequest { caller: admin, month };

        if exempt_first {
            let res = domain.execute(exemption()).await?;
            assert_that!(res.due).is_none();
            domain.execute(generate()).await?;
        } else {
            domain.execute(generate()).await?;
            let res = domain.execute(exemption()).await?;
            assert_that!(res.due).is_some();
        }

        let dues = database
            .list_dues(DueFilter {
                month: Some(month),
                ..Default::default()
            })
            .await?;
        let exempted = dues
            .iter()
            .find(|d| d.member_id == members[0].member_id)
            .unwrap();
        let other = dues
            .iter()
            .find(|d| d.member_id == members[1].member_id)
            .unwrap();
        assert_that!(exempted.status).is_equal_to(DueStatus::Exempt);
        assert_that!(exempted.amount_cents).is_equal_to(0);
        assert_that!(other.status).is_equal_to(DueStatus::Pending);
        assert_that!(other.amount_cents).is_equal_to(3500);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_generate_surfaces_store_failure(month: YearMonth, admin: Caller) {
        // GIVEN a store that rejects the batch write
        let mut member = MockMemberPort::new();
        member
            .expect_list_members()
            .times(1)
            .returning(|_| Ok(vec![Member::new("Ana", "ana@patota.club")]));
        let mut database = MockDatabasePort::new();
        database
            .expect_list_exemptions()
            .times(1)
            .returning(|_| Ok(vec![]));
        database
            .expect_insert_dues()
            .times(1)
            .returning(|_| Err(database::Error::Adapter("disk full".into())));
        let domain = DomainLogic::new(Arc::new(database), Arc::new(member), ClubConfig::default());

        // WHEN generating dues
        let res = domain.execute(GenerateDuesRequest { caller: admin, month }).await;

        // THEN the error is reported instead of a partial count
        assert_that!(res)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::Store);
    }

    #[rstest]
    #[tokio::test]
    async fn test_generate_rejects_non_admin(month: YearMonth) {
        // Mocks without expectations panic if the command reaches the ports
        let domain = DomainLogic::new(
            Arc::new(MockDatabasePort::new()),
            Arc::new(MockMemberPort::new()),
            ClubConfig::default(),
        );
        let caller = Caller::member(Uuid::new_v4());

        let res = domain.execute(GenerateDuesRequest { caller, month }).await;

        assert_that!(res)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::Forbidden);
    }

    #[rstest]
    #[tokio::test]
    async fn test_exemption_validation(month: YearMonth, admin: Caller) {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana"]).await;
        let domain = testing::domain(&database);

        let blank = domain
            .execute(CreateExemptionRequest {
                caller: admin,
                member_id: members[0].member_id,
                month,
                reason: "   ".to_string(),
            })
            .await;
        assert_that!(blank)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::Validation);

        let unknown = domain
            .execute(CreateExemptionRequest {
                caller: admin,
                member_id: Uuid::new_v4(),
                month,
                reason: "travel".to_string(),
            })
            .await;
        assert_that!(unknown)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::NotFound);
    }
}
