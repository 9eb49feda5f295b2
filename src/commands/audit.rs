use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{AuditEntry, Caller},
    ports::{database::DatabasePort, member::MemberPort},
};

use super::{require_admin, CommandFuture, DomainLogic, Error};

/// Most entries one audit log read returns
pub const MAX_AUDIT_ENTRIES: u32 = 500;

/// Note an admin action in the audit log
pub struct RecordAuditRequest {
    pub caller: Caller,
    pub action: String,
    pub member_id: Option<Uuid>,
    pub details: Option<String>,
}

impl<D, M> Service<RecordAuditRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = AuditEntry;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RecordAuditRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        Box::pin(async move {
            require_admin(&req.caller, "write the audit log")?;

            let action = req.action.trim();
            if action.is_empty() {
                return Err(Error::Validation("audit action must not be empty".into()));
            }
            let member_id = match req.member_id {
                Some(member_id) => Some(member.get_member(member_id).await?.member_id),
                None => None,
            };

            let entry = database
                .insert_audit_entry(AuditEntry {
                    member_id,
                    details: req.details.filter(|d| !d.trim().is_empty()),
                    ..AuditEntry::new(action, req.caller.member_id)
                })
                .await?;

            tracing::info!(
                entry_id = %entry.entry_id,
                action = %entry.action,
                "audit entry recorded"
            );
            Ok(entry)
        })
    }
}

/// Latest audit entries, newest first
pub struct AuditLogRequest {
    pub caller: Caller,
    pub limit: u32,
}

impl<D, M> Service<AuditLogRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Vec<AuditEntry>;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AuditLogRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "read the audit log")?;
            if req.limit == 0 {
                return Err(Error::Validation("audit log limit must be positive".into()));
            }

            let limit = req.limit.min(MAX_AUDIT_ENTRIES);
            Ok(database.list_audit_entries(limit).await?)
        })
    }
}
