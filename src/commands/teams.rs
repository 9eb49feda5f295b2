use std::{
    collections::HashMap,
    task::{Context, Poll},
};

use chrono::Utc;
use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{shuffle_teams, Caller, DrawnTeams, Event, PlayerRef, RsvpStatus},
    ports::{
        database::{self, DatabasePort},
        member::MemberPort,
    },
};

use super::{require_admin, CommandFuture, DomainLogic, Error};

/// Draw two random squads from the members that confirmed presence
pub struct GenerateTeamsRequest {
    pub caller: Caller,
    pub event_id: Uuid,
}

impl<D, M> Service<GenerateTeamsRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = DrawnTeams;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: GenerateTeamsRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        let mut rng = self.rng();
        Box::pin(async move {
            require_admin(&req.caller, "draw teams")?;

            let event = database.get_event(req.event_id).await?;
            if event.is_drawn() {
                return Err(Error::AlreadyDrawn(event.event_id));
            }

            let names: HashMap<Uuid, String> = member
                .list_members(true)
                .await?
                .into_iter()
                .map(|m| (m.member_id, m.name))
                .collect();
            let mut players: Vec<PlayerRef> = database
                .list_rsvps(event.event_id)
                .await?
                .into_iter()
                .filter(|r| r.status == RsvpStatus::Going)
                .filter_map(|r| {
                    names.get(&r.member_id).map(|name| PlayerRef {
                        member_id: r.member_id,
                        name: name.clone(),
                    })
                })
                .collect();
            if players.len() < 2 {
                return Err(Error::InsufficientPlayers(players.len()));
            }

            // Same input order for the same RSVPs, so a seeded draw is reproducible
            players.sort_by_key(|p| p.member_id);
            let (black, white) = shuffle_teams(players, &mut rng);
            let teams = DrawnTeams {
                black,
                white,
                drawn_at: Utc::now(),
                drawn_by: req.caller.member_id,
            };

            let event = database
                .draw_teams(event.event_id, teams)
                .await
                .map_err(|err| match err {
                    database::Error::AlreadyDrawn(event_id) => Error::AlreadyDrawn(event_id),
                    err => err.into(),
                })?;
            let teams = event.teams.ok_or(Error::TeamsNotDrawn(event.event_id))?;

            tracing::info!(
                event_id = %event.event_id,
                black = teams.black.len(),
                white = teams.white.len(),
                "teams drawn"
            );
            Ok(teams)
        })
    }
}

/// Undo a draw and reopen confirmations
///
/// The score and any points already credited are left alone, see
/// [`ClearScoreRequest`](super::score::ClearScoreRequest).
pub struct ResetTeamsRequest {
    pub caller: Caller,
    pub event_id: Uuid,
}

impl<D, M> Service<ResetTeamsRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Event;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ResetTeamsRequest) -> Self::Future {
        let database = self.database.clone();
        let reopen_window = self.config.reopen_window;
        Box::pin(async move {
            require_admin(&req.caller, "reset teams")?;

            let reopen_until = Utc::now()
                .checked_add_signed(reopen_window)
                .ok_or(Error::Validation("reopen window is out of range".into()))?;

            let mut event = database.get_event(req.event_id).await?;
            event.teams = None;
            event.rsvp_deadline = Some(reopen_until);
            let event = database.update_event(event).await?;

            tracing::info!(
                event_id = %event.event_id,
                rsvp_deadline = ?event.rsvp_deadline,
                "teams reset, confirmations reopened"
            );
            Ok(event)
        })
    }
}
