use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{Caller, Member},
    ports::{database::DatabasePort, member::MemberPort},
};

use super::{require_admin, CommandFuture, DomainLogic, Error};

pub struct AddMemberRequest {
    pub caller: Caller,
    pub name: String,
    pub email: String,
}

impl<D, M> Service<AddMemberRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Member;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: AddMemberRequest) -> Self::Future {
        let member = self.member.clone();
        Box::pin(async move {
            require_admin(&req.caller, "add members")?;

            let name = req.name.trim();
            let email = req.email.trim();
            if name.is_empty() {
                return Err(Error::Validation("member name must not be empty".into()));
            }
            if !email.contains('@') {
                return Err(Error::Validation(format!("invalid email {email:?}").into()));
            }

            let added = member.insert_member(Member::new(name, email)).await?;
            tracing::info!(member_id = %added.member_id, "member added");
            Ok(added)
        })
    }
}

/// Activate or deactivate a member
///
/// Inactive members keep their history but get no dues and cannot be drawn.
pub struct SetMemberActiveRequest {
    pub caller: Caller,
    pub member_id: Uuid,
    pub active: bool,
}

impl<D, M> Service<SetMemberActiveRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Member;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SetMemberActiveRequest) -> Self::Future {
        let member = self.member.clone();
        Box::pin(async move {
            require_admin(&req.caller, "change member status")?;

            let updated = member.set_member_active(req.member_id, req.active).await?;
            tracing::info!(
                member_id = %updated.member_id,
                active = updated.active,
                "member status changed"
            );
            Ok(updated)
        })
    }
}

/// Club roster ordered by name
pub struct ListMembersRequest {
    pub caller: Caller,
    pub active_only: bool,
}

impl<D, M> Service<ListMembersRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Vec<Member>;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ListMembersRequest) -> Self::Future {
        let member = self.member.clone();
        Box::pin(async move {
            require_admin(&req.caller, "list members")?;
            Ok(member.list_members(req.active_only).await?)
        })
    }
}
