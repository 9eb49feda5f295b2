//! Fixtures shared by the command tests

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use super::DomainLogic;
pub(crate) use crate::adapters::database::memory::MemoryDatabase;
use crate::{
    config::ClubConfig,
    domain::{Event, EventKind, Member, Rsvp, RsvpStatus},
    ports::{database::DatabasePort, member::MemberPort},
};

pub(crate) type MemoryLogic = DomainLogic<MemoryDatabase, MemoryDatabase>;

/// Domain logic over `database` for both ports, default config and a fixed seed
pub(crate) fn domain(database: &MemoryDatabase) -> MemoryLogic {
    DomainLogic::new(
        Arc::new(database.clone()),
        Arc::new(database.clone()),
        ClubConfig::default(),
    )
    .with_seed(7)
}

pub(crate) async fn seed_members(database: &MemoryDatabase, names: &[&str]) -> Vec<Member> {
    let mut members = Vec::with_capacity(names.len());
    for name in names {
        let member = Member::new(*name, format!("{}@patota.club", name.to_lowercase()));
        members.push(database.insert_member(member).await.unwrap());
    }
    members
}

pub(crate) async fn seed_game(database: &MemoryDatabase) -> Event {
    let event = Event::new(EventKind::Game, Utc::now() + Duration::days(2), "Quadra Central");
    database.insert_event(event).await.unwrap()
}

pub(crate) async fn rsvp(
    database: &MemoryDatabase,
    event_id: Uuid,
    member_id: Uuid,
    status: RsvpStatus,
) {
    database
        .upsert_rsvp(Rsvp {
            event_id,
            member_id,
            status,
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
}
