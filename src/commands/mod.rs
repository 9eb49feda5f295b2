use std::{borrow::Cow, future::Future, pin::Pin, sync::Arc};

use rand::{rngs::StdRng, SeedableRng};
use tower::{Service, ServiceExt};
use uuid::Uuid;

use crate::{
    config::ClubConfig,
    domain::Caller,
    ports::{database, member},
};

pub mod attendance;
pub mod audit;
pub mod cash;
pub mod dues;
pub mod events;
pub mod members;
pub mod payments;
pub mod ranking;
pub mod reports;
pub mod score;
pub mod settings;
pub mod teams;

#[cfg(test)]
pub(crate) mod testing;

/// Club operations over a ledger store and a member directory
///
/// Every operation is a request type with a [`tower::Service`] implementation on this struct.
pub struct DomainLogic<D, M> {
    database: Arc<D>,
    member: Arc<M>,
    config: Arc<ClubConfig>,
    seed: Option<u64>,
}

impl<D, M> DomainLogic<D, M> {
    pub fn new(database: Arc<D>, member: Arc<M>, config: ClubConfig) -> Self {
        Self {
            database,
            member,
            config: Arc::new(config),
            seed: None,
        }
    }

    /// Use a fixed seed for the team draw instead of system entropy
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn config(&self) -> &ClubConfig {
        &self.config
    }

    /// Run one request through its service
    pub async fn execute<R>(&self, req: R) -> Result<<Self as Service<R>>::Response, Error>
    where
        Self: Service<R, Error = Error>,
    {
        self.clone().oneshot(req).await
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl<D, M> Clone for DomainLogic<D, M> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            member: self.member.clone(),
            config: self.config.clone(),
            seed: self.seed,
        }
    }
}

/// Boxed future returned by every command
pub type CommandFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>>>>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("database port error: {0:?}")]
    Database(#[from] crate::ports::database::Error),
    #[error("member port error: {0:?}")]
    Member(#[from] crate::ports::member::Error),

    #[error("invalid input: {0}")]
    Validation(Cow<'static, str>),
    #[error("member {0} is not allowed to {1}")]
    Forbidden(Uuid, &'static str),
    #[error("{0}")]
    Conflict(Cow<'static, str>),

    #[error("teams already drawn for event {0}")]
    AlreadyDrawn(Uuid),
    #[error("at least 2 confirmed players are needed to draw teams, found {0}")]
    InsufficientPlayers(usize),
    #[error("teams have not been drawn for event {0}")]
    TeamsNotDrawn(Uuid),
    #[error("confirmations are closed for event {0}")]
    ConfirmationsClosed(Uuid),
}

/// Coarse category of an [`Error`], for callers that only need to know how to react
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Forbidden,
    Conflict,
    Store,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Forbidden(..) => ErrorKind::Forbidden,
            Error::Conflict(_)
            | Error::AlreadyDrawn(_)
            | Error::TeamsNotDrawn(_)
            | Error::ConfirmationsClosed(_)
            | Error::InsufficientPlayers(_) => ErrorKind::Conflict,
            Error::Database(err) => match err {
                database::Error::NotFound { .. } => ErrorKind::NotFound,
                database::Error::Conflict(_) | database::Error::AlreadyDrawn(_) => {
                    ErrorKind::Conflict
                }
                database::Error::Adapter(_) => ErrorKind::Store,
            },
            Error::Member(err) => match err {
                member::Error::MemberDoesNotExist(_) => ErrorKind::NotFound,
                member::Error::EmailTaken(_) => ErrorKind::Conflict,
                member::Error::Adapter(_) => ErrorKind::Store,
            },
        }
    }
}

/// Reject callers without the admin role
fn require_admin(caller: &Caller, action: &'static str) -> Result<(), Error> {
    if caller.is_admin() {
        Ok(())
    } else {
        tracing::warn!(member_id = %caller.member_id, action, "rejected non-admin caller");
        Err(Error::Forbidden(caller.member_id, action))
    }
}

fn validate_amount(amount_cents: i64) -> Result<(), Error> {
    if amount_cents <= 0 {
        return Err(Error::Validation(
            format!("amount must be positive, got {amount_cents} cents").into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use speculoos::prelude::*;

    #[rstest]
    #[case(Error::Validation("bad".into()), ErrorKind::Validation)]
    #[case(Error::Forbidden(Uuid::nil(), "draw teams"), ErrorKind::Forbidden)]
    #[case(Error::AlreadyDrawn(Uuid::nil()), ErrorKind::Conflict)]
    #[case(Error::InsufficientPlayers(1), ErrorKind::Conflict)]
    #[case(Error::TeamsNotDrawn(Uuid::nil()), ErrorKind::Conflict)]
    #[case(
        Error::Database(database::Error::NotFound { entity: "event", id: Uuid::nil() }),
        ErrorKind::NotFound
    )]
    #[case(Error::Member(member::Error::MemberDoesNotExist(Uuid::nil())), ErrorKind::NotFound)]
    #[case(Error::Member(member::Error::EmailTaken("a@b".into())), ErrorKind::Conflict)]
    #[case(
        Error::Database(database::Error::Adapter("connection reset".into())),
        ErrorKind::Store
    )]
    fn test_error_kind(#[case] error: Error, #[case] expected: ErrorKind) {
        assert_that!(error.kind()).is_equal_to(expected);
    }

    #[test]
    fn test_require_admin() {
        let member_id = Uuid::new_v4();

        assert_that!(require_admin(&Caller::admin(member_id), "test")).is_ok();
        assert_that!(require_admin(&Caller::member(member_id), "test"))
            .is_err()
            .matches(|err| matches!(err, Error::Forbidden(id, "test") if *id == member_id));
    }

    #[rstest]
    #[case(0)]
    #[case(-100)]
    fn test_validate_amount_rejects_non_positive(#[case] amount: i64) {
        assert_that!(validate_amount(amount))
            .is_err()
            .matches(|err| err.kind() == ErrorKind::Validation);
    }
}
