use std::{
    collections::HashSet,
    task::{Context, Poll},
};

use chrono::{DateTime, Utc};
use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{
        is_confirmation_open, Caller, Event, EventDetails, EventKind, Member, NamedScore, Roster,
        Rsvp, RsvpStatus,
    },
    ports::{
        database::{AttendanceFilter, DatabasePort, EventFilter},
        member::MemberPort,
    },
};

use super::{require_admin, CommandFuture, DomainLogic, Error};

pub struct CreateEventRequest {
    pub caller: Caller,
    pub kind: EventKind,
    pub starts_at: DateTime<Utc>,
    pub location: String,
    pub rsvp_deadline: Option<DateTime<Utc>>,
}

impl<D, M> Service<CreateEventRequest> for DomainLogic<D, M>
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

    fn call(&mut self, req: CreateEventRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "create events")?;

            let location = req.location.trim();
            validate_schedule(location, req.starts_at, req.rsvp_deadline)?;

            let event = database
                .insert_event(Event {
                    rsvp_deadline: req.rsvp_deadline,
                    ..Event::new(req.kind, req.starts_at, location)
                })
                .await?;

            tracing::info!(
                event_id = %event.event_id,
                kind = event.kind.as_str(),
                starts_at = %event.starts_at,
                "event created"
            );
            Ok(event)
        })
    }
}

/// Change when or where an event happens
///
/// Fields left as `None` keep their current value.
pub struct UpdateEventRequest {
    pub caller: Caller,
    pub event_id: Uuid,
    pub starts_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub rsvp_deadline: Option<DateTime<Utc>>,
}

impl<D, M> Service<UpdateEventRequest> for DomainLogic<D, M>
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

    fn call(&mut self, req: UpdateEventRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "update events")?;
            if req.starts_at.is_none() && req.location.is_none() && req.rsvp_deadline.is_none() {
                return Err(Error::Validation("nothing to update".into()));
            }

            let mut event = database.get_event(req.event_id).await?;
            if let Some(starts_at) = req.starts_at {
                event.starts_at = starts_at;
            }
            if let Some(location) = req.location {
                event.location = location.trim().to_string();
            }
            if let Some(deadline) = req.rsvp_deadline {
                event.rsvp_deadline = Some(deadline);
            }
            validate_schedule(&event.location, event.starts_at, event.rsvp_deadline)?;

            let event = database.update_event(event).await?;
            tracing::info!(
                event_id = %event.event_id,
                starts_at = %event.starts_at,
                "event updated"
            );
            Ok(event)
        })
    }
}

/// Remove an event with its RSVPs and attendance
///
/// Events that already booked fines or points are kept, the store reports a conflict.
pub struct DeleteEventRequest {
    pub caller: Caller,
    pub event_id: Uuid,
}

impl<D, M> Service<DeleteEventRequest> for DomainLogic<D, M>
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

    fn call(&mut self, req: DeleteEventRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "delete events")?;

            let event = database.delete_event(req.event_id).await?;
            tracing::info!(event_id = %event.event_id, "event deleted");
            Ok(event)
        })
    }
}

/// Events, either the upcoming ones soonest first or all of them newest first
pub struct ListEventsRequest {
    pub upcoming: bool,
}

impl<D, M> Service<ListEventsRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Vec<Event>;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ListEventsRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            if req.upcoming {
                let filter = EventFilter {
                    starts_after: Some(Utc::now()),
                    ..Default::default()
                };
                return Ok(database.list_events(filter).await?);
            }

            let mut events = database.list_events(EventFilter::default()).await?;
            events.reverse();
            Ok(events)
        })
    }
}

/// The soonest event that has not started yet
pub struct NextEventRequest;

impl<D, M> Service<NextEventRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Option<Event>;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: NextEventRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            let upcoming = database
                .list_events(EventFilter {
                    starts_after: Some(Utc::now()),
                    ..Default::default()
                })
                .await?;
            Ok(upcoming.into_iter().next())
        })
    }
}

/// Event with every member's RSVP and attendance, for admins
pub struct EventDetailsRequest {
    pub caller: Caller,
    pub event_id: Uuid,
}

impl<D, M> Service<EventDetailsRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = EventDetails;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EventDetailsRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        Box::pin(async move {
            require_admin(&req.caller, "read event details")?;

            let event = database.get_event(req.event_id).await?;
            let rsvps = database.list_rsvps(event.event_id).await?;
            let attendance = database
                .list_attendance(AttendanceFilter {
                    event_id: Some(event.event_id),
                    ..Default::default()
                })
                .await?;
            // Inactive members still show up on the events they took part in
            let members = member.list_members(false).await?;

            Ok(EventDetails::collect(event, members, rsvps, attendance))
        })
    }
}

/// RSVP to an event
///
/// Members answer for themselves, admins may answer for anyone.
pub struct ConfirmPresenceRequest {
    pub caller: Caller,
    pub event_id: Uuid,
    pub member_id: Uuid,
    pub status: RsvpStatus,
}

impl<D, M> Service<ConfirmPresenceRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Rsvp;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ConfirmPresenceRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        Box::pin(async move {
            if !req.caller.can_act_for(req.member_id) {
                tracing::warn!(
                    caller = %req.caller.member_id,
                    member_id = %req.member_id,
                    "rejected RSVP on behalf of another member"
                );
                return Err(Error::Forbidden(
                    req.caller.member_id,
                    "confirm presence for another member",
                ));
            }

            let event = database.get_event(req.event_id).await?;
            let now = Utc::now();
            if !is_confirmation_open(&event, now) {
                return Err(Error::ConfirmationsClosed(event.event_id));
            }
            let attendee = member.get_member(req.member_id).await?;

            let rsvp = database
                .upsert_rsvp(Rsvp {
                    event_id: event.event_id,
                    member_id: attendee.member_id,
                    status: req.status,
                    updated_at: now,
                })
                .await?;

            tracing::info!(
                event_id = %rsvp.event_id,
                member_id = %rsvp.member_id,
                status = rsvp.status.as_str(),
                "presence confirmed"
            );
            Ok(rsvp)
        })
    }
}

/// Free-form score for an event played without a team draw
pub struct SetNamedScoreRequest {
    pub caller: Caller,
    pub event_id: Uuid,
    pub score: NamedScore,
}

impl<D, M> Service<SetNamedScoreRequest> for DomainLogic<D, M>
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

    fn call(&mut self, req: SetNamedScoreRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "set scores")?;

            let score = NamedScore {
                team_a_name: req.score.team_a_name.trim().to_string(),
                team_b_name: req.score.team_b_name.trim().to_string(),
                ..req.score
            };
            if score.team_a_name.is_empty() || score.team_b_name.is_empty() {
                return Err(Error::Validation("team names must not be empty".into()));
            }

            let mut event = database.get_event(req.event_id).await?;
            if event.is_drawn() {
                return Err(Error::Conflict(
                    format!(
                        "teams are drawn for event {}, register the team score instead",
                        event.event_id
                    )
                    .into(),
                ));
            }
            event.named_score = Some(score);
            let event = database.update_event(event).await?;

            tracing::info!(event_id = %event.event_id, "named score set");
            Ok(event)
        })
    }
}

/// Active members that have not answered the RSVP yet
pub struct PendingRsvpsRequest {
    pub caller: Caller,
    pub event_id: Uuid,
}

impl<D, M> Service<PendingRsvpsRequest> for DomainLogic<D, M>
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

    fn call(&mut self, req: PendingRsvpsRequest) -> Self::Future {
        let database = self.database.clone();
        let member = self.member.clone();
        Box::pin(async move {
            require_admin(&req.caller, "list pending RSVPs")?;

            let event = database.get_event(req.event_id).await?;
            let answered: HashSet<Uuid> = database
                .list_rsvps(event.event_id)
                .await?
                .into_iter()
                .map(|r| r.member_id)
                .collect();
            let pending: Vec<Member> = member
                .list_members(true)
                .await?
                .into_iter()
                .filter(|m| !answered.contains(&m.member_id))
                .collect();

            tracing::debug!(event_id = %event.event_id, pending = pending.len(), "pending RSVPs");
            Ok(pending)
        })
    }
}

/// Shareable text roster of a drawn event
pub struct TeamRosterRequest {
    pub event_id: Uuid,
}

impl<D, M> Service<TeamRosterRequest> for DomainLogic<D, M>
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

    fn call(&mut self, req: TeamRosterRequest) -> Self::Future {
        let database = self.database.clone();
        let offset = self.config.utc_offset();
        Box::pin(async move {
            let event = database.get_event(req.event_id).await?;
            let teams = event
                .teams
                .as_ref()
                .ok_or(Error::TeamsNotDrawn(event.event_id))?;

            Ok(Roster {
                event: &event,
                teams,
                offset,
            }
            .to_string())
        })
    }
}

fn validate_schedule(
    location: &str,
    starts_at: DateTime<Utc>,
    rsvp_deadline: Option<DateTime<Utc>>,
) -> Result<(), Error> {
    if location.is_empty() {
        return Err(Error::Validation("event location must not be empty".into()));
    }
    if matches!(rsvp_deadline, Some(deadline) if deadline > starts_at) {
        return Err(Error::Validation(
            "RSVP deadline must not be after the event starts".into(),
        ));
    }
    Ok(())
}
