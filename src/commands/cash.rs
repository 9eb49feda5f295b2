use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use tower::Service;

use crate::{
    domain::{cash_balance, Caller, CashCategory, CashDirection, CashEntry},
    ports::{
        database::{CashFilter, DatabasePort},
        member::MemberPort,
    },
};

use super::{require_admin, validate_amount, CommandFuture, DomainLogic, Error};

/// Book an expense
pub struct CashOutRequest {
    pub caller: Caller,
    pub category: String,
    pub amount_cents: i64,
    pub note: Option<String>,
}

impl<D, M> Service<CashOutRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = CashEntry;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CashOutRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "book expenses")?;
            validate_amount(req.amount_cents)?;
            let category = req.category.trim();
            if category.is_empty() {
                return Err(Error::Validation("cash category must not be empty".into()));
            }

            let entry = database
                .insert_cash_entry(CashEntry {
                    note: req.note,
                    ..CashEntry::new(
                        CashDirection::Out,
                        CashCategory::from(category),
                        req.amount_cents,
                        req.caller.member_id,
                    )
                })
                .await?;

            tracing::info!(
                entry_id = %entry.entry_id,
                category = entry.category.as_str(),
                amount_cents = entry.amount_cents,
                "cash out recorded"
            );
            Ok(entry)
        })
    }
}

/// Current cash balance in cents
pub struct CashBalanceRequest;

impl<D, M> Service<CashBalanceRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = i64;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: CashBalanceRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            let entries = database.list_cash_entries(CashFilter::default()).await?;
            let balance = cash_balance(&entries);
            tracing::debug!(entries = entries.len(), balance_cents = balance, "cash balance");
            Ok(balance)
        })
    }
}

/// Cash entries newest first, optionally bounded to `[from, to)`
#[derive(Default)]
pub struct CashLedgerRequest {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl<D, M> Service<CashLedgerRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Vec<CashEntry>;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CashLedgerRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            if let (Some(from), Some(to)) = (req.from, req.to) {
                if from > to {
                    return Err(Error::Validation(
                        format!("ledger range starts at {from} after it ends at {to}").into(),
                    ));
                }
            }
            let entries = database
                .list_cash_entries(CashFilter {
                    from: req.from,
                    to: req.to,
                })
                .await?;
            Ok(entries)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::{attendance::AddGuestRequest, testing, ErrorKind},
        domain::YearMonth,
    };
    use chrono::Duration;
    use rstest::*;
    use speculoos::prelude::*;
    use tower::BoxError;
    use uuid::Uuid;

    #[fixture]
    fn admin() -> Caller {
        Caller::admin(Uuid::new_v4())
    }

    /// Balance equals inflows minus outflows whatever the interleaving
    #[rstest]
    #[tokio::test]
    async fn test_balance_law(admin: Caller) -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let members = testing::seed_members(&database, &["Ana", "Bia"]).await;
        let event = testing::seed_game(&database).await;
        let domain = testing::domain(&database);

        domain
            .execute(AddGuestRequest {
                caller: admin,
                event_id: event.event_id,
                member_id: members[0].member_id,
                count: 2,
            })
            .await?;
        domain
            .execute(CashOutRequest {
                caller: admin,
                category: "FIELD_RENT".to_string(),
                amount_cents: 2500,
                note: Some("May rent".to_string()),
            })
            .await?;
        domain
            .execute(AddGuestRequest {
                caller: admin,
                event_id: event.event_id,
                member_id: members[1].member_id,
                count: 1,
            })
            .await?;
        domain
            .execute(CashOutRequest {
                caller: admin,
                category: "BALLS".to_string(),
                amount_cents: 800,
                note: None,
            })
            .await?;

        let ledger = domain.execute(CashLedgerRequest::default()).await?;
        let inflow: i64 = ledger
            .iter()
            .filter(|e| e.direction == CashDirection::In)
            .map(|e| e.amount_cents)
            .sum();
        let outflow: i64 = ledger
            .iter()
            .filter(|e| e.direction == CashDirection::Out)
            .map(|e| e.amount_cents)
            .sum();

        assert_that!(ledger).has_length(4);
        assert_that!(domain.execute(CashBalanceRequest).await?).is_equal_to(inflow - outflow);
        assert_that!(inflow - outflow).is_equal_to(1500 - 2500 + 500 - 800);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_ledger_range(admin: Caller) -> Result<(), BoxError> {
        let database = testing::MemoryDatabase::default();
        let domain = testing::domain(&database);
        let entry = domain
            .execute(CashOutRequest {
                caller: admin,
                category: "REFEREE".to_string(),
                amount_cents: 5000,
                note: None,
            })
            .await?;
        assert_that!(entry.category).is_equal_to(CashCategory::Other("REFEREE".to_string()));

        let (start, end) = YearMonth::of(entry.created_at).range();
        let inside = domain
            .execute(CashLedgerRequest {
                from: Some(start),
                to: Some(end),
            })
            .await?;
        let after = domain
            .execute(CashLedgerRequest {
                from: Some(end),
                to: None,
            })
            .await?;
        assert_that!(inside).has_length(1);
        assert_that!(after).is_empty();

        let res = domain
            .execute(CashLedgerRequest {
                from: Some(end),
                to: Some(end - Duration::days(1)),
            })
            .await;
        assert_that!(res)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::Validation);

        Ok(())
    }

    #[rstest]
    #[case("", 100)]
    #[case("RENT", 0)]
    #[case("RENT", -50)]
    #[tokio::test]
    async fn test_cash_out_validation(admin: Caller, #[case] category: &str, #[case] amount: i64) {
        let database = testing::MemoryDatabase::default();
        let domain = testing::domain(&database);

        let res = domain
            .execute(CashOutRequest {
                caller: admin,
                category: category.to_string(),
                amount_cents: amount,
                note: None,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| err.kind() == ErrorKind::Validation);
    }
}
