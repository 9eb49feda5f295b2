use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{Caller, MonthlyReport, Pendencies, YearMonth},
    ports::{
        database::{CashFilter, DatabasePort, DueFilter, EventFilter, FineFilter},
        member::MemberPort,
    },
};

use super::{require_admin, CommandFuture, DomainLogic, Error};

/// Open dues and fines of one member
pub struct MemberPendenciesRequest {
    pub caller: Caller,
    pub member_id: Uuid,
}

impl<D, M> Service<MemberPendenciesRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Pendencies;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: MemberPendenciesRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        Box::pin(async move {
            if !req.caller.can_act_for(req.member_id) {
                return Err(Error::Forbidden(
                    req.caller.member_id,
                    "see another member's pendencies",
                ));
            }

            let subject = member.get_member(req.member_id).await?;
            let dues = database
                .list_dues(DueFilter {
                    member_id: Some(subject.member_id),
                    ..Default::default()
                })
                .await?;
            let fines = database
                .list_fines(FineFilter {
                    member_id: Some(subject.member_id),
                    paid: Some(false),
                    ..Default::default()
                })
                .await?;

            let pendencies = Pendencies::collect(dues, fines);
            tracing::debug!(
                member_id = %subject.member_id,
                total_cents = pendencies.total_cents,
                "member pendencies"
            );
            Ok(pendencies)
        })
    }
}

pub struct MonthlyReportRequest {
    pub caller: Caller,
    pub month: YearMonth,
}

impl<D, M> Service<MonthlyReportRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = MonthlyReport;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: MonthlyReportRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "read monthly reports")?;

            let (from, to) = req.month.range();
            let dues = database
                .list_dues(DueFilter {
                    month: Some(req.month),
                    ..Default::default()
                })
                .await?;
            let cash = database
                .list_cash_entries(CashFilter {
                    from: Some(from),
                    to: Some(to),
                })
                .await?;
            let fines = database
                .list_fines(FineFilter {
                    created_after: Some(from),
                    created_before: Some(to),
                    ..Default::default()
                })
                .await?;
            let events = database
                .list_events(EventFilter {
                    starts_after: Some(from),
                    starts_before: Some(to),
                })
                .await?;

            Ok(MonthlyReport::build(req.month, &dues, &cash, &fines, &events))
        })
    }
}
