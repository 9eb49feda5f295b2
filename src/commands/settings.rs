use std::task::{Context, Poll};

use tower::Service;

use crate::{
    domain::Caller,
    ports::{database::DatabasePort, member::MemberPort},
};

use super::{require_admin, CommandFuture, DomainLogic, Error};

const PIX_KEY: &str = "pix_key";

/// PIX key members pay dues and fines to, if one was set
pub struct GetPixKeyRequest;

impl<D, M> Service<GetPixKeyRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Option<String>;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: GetPixKeyRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move { Ok(database.get_setting(PIX_KEY).await?) })
    }
}

pub struct SetPixKeyRequest {
    pub caller: Caller,
    pub pix_key: String,
}

impl<D, M> Service<SetPixKeyRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = String;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SetPixKeyRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "change the PIX key")?;

            let pix_key = req.pix_key.trim();
            if pix_key.is_empty() {
                return Err(Error::Validation("PIX key must not be empty".into()));
            }
            database.put_setting(PIX_KEY, pix_key).await?;

            tracing::info!(changed_by = %req.caller.member_id, "PIX key changed");
            Ok(pix_key.to_string())
        })
    }
}
