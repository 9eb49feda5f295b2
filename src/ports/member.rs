use uuid::Uuid;

use crate::domain::Member;

/// Member directory
#[mockall::automock]
#[async_trait::async_trait]
pub trait MemberPort {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, Error>;
    async fn list_members(&self, active_only: bool) -> Result<Vec<Member>, Error>;
    async fn insert_member(&self, member: Member) -> Result<Member, Error>;
    async fn set_member_active(&self, member_id: Uuid, active: bool) -> Result<Member, Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Domain-level error when a member does not exist
    #[error("member {0} does not exist")]
    MemberDoesNotExist(Uuid),

    /// Another member already uses this email
    #[error("email {0} is already taken")]
    EmailTaken(String),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
