use std::task::{Context, Poll};

use tower::Service;
use uuid::Uuid;

use crate::{
    domain::{Caller, DrawnTeams, Event, Outcome, PointsEntry, TeamScore, TeamSide},
    ports::{database::DatabasePort, member::MemberPort},
};

use super::{require_admin, CommandFuture, DomainLogic, Error};

/// Final score of a drawn game
///
/// Scores are taken as signed integers so negative input is reported instead of wrapping.
pub struct RegisterScoreRequest {
    pub caller: Caller,
    pub event_id: Uuid,
    pub black: i64,
    pub white: i64,
}

/// Replace the score of a drawn game and its team credits
pub struct EditScoreRequest {
    pub caller: Caller,
    pub event_id: Uuid,
    pub black: i64,
    pub white: i64,
}

/// Drop the score of a game together with its team credits
///
/// Works whether or not teams are drawn, so a score left behind by a reset can be cleared.
pub struct ClearScoreRequest {
    pub caller: Caller,
    pub event_id: Uuid,
}

impl<D, M> Service<RegisterScoreRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Outcome;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RegisterScoreRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "register scores")?;
            let score = final_score(req.black, req.white)?;

            let mut event = database.get_event(req.event_id).await?;
            let teams = event
                .teams
                .clone()
                .ok_or(Error::TeamsNotDrawn(event.event_id))?;
            if event.score.finalized {
                return Err(Error::Conflict(
                    format!(
                        "score of event {} is final already, edit it instead",
                        event.event_id
                    )
                    .into(),
                ));
            }

            event.score = score;
            let entries = team_credits(event.event_id, &teams, score);
            let event = database.record_score(event, entries, false).await?;

            tracing::info!(
                event_id = %event.event_id,
                black = score.black,
                white = score.white,
                "score registered"
            );
            Ok(Outcome::from_score(score.black, score.white))
        })
    }
}

impl<D, M> Service<EditScoreRequest> for DomainLogic<D, M>
where
    D: DatabasePort + 'static,
    M: MemberPort + 'static,
{
    type Response = Outcome;
    type Error = Error;
    type Future = CommandFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: EditScoreRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "edit scores")?;
            let score = final_score(req.black, req.white)?;

            let mut event = database.get_event(req.event_id).await?;
            let teams = event
                .teams
                .clone()
                .ok_or(Error::TeamsNotDrawn(event.event_id))?;
            let previous = event.score;

            // Old team credits go away in the same unit of work as the new ones come in
            event.score = score;
            let entries = team_credits(event.event_id, &teams, score);
            let event = database
                .record_score(event, entries, true)
                .await
                .map_err(|err| {
                    tracing::warn!(event_id = %req.event_id, error = %err, "score edit failed");
                    err
                })?;

            tracing::info!(
                event_id = %event.event_id,
                old_black = previous.black,
                old_white = previous.white,
                black = score.black,
                white = score.white,
                "score edited"
            );
            Ok(Outcome::from_score(score.black, score.white))
        })
    }
}

impl<D, M> Service<ClearScoreRequest> for DomainLogic<D, M>
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

    fn call(&mut self, req: ClearScoreRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            require_admin(&req.caller, "clear scores")?;

            let mut event = database.get_event(req.event_id).await?;
            let previous = event.score;
            event.score = TeamScore::default();
            let event = database.record_score(event, Vec::new(), true).await?;

            tracing::info!(
                event_id = %event.event_id,
                old_black = previous.black,
                old_white = previous.white,
                "score cleared"
            );
            Ok(event)
        })
    }
}

fn final_score(black: i64, white: i64) -> Result<TeamScore, Error> {
    let goals = |value: i64| {
        u32::try_from(value).map_err(|_| {
            Error::Validation(format!("score must be a non-negative number, got {value}").into())
        })
    };
    Ok(TeamScore {
        black: goals(black)?,
        white: goals(white)?,
        finalized: true,
    })
}

/// One `TEAM_GOALS` entry per drawn player, carrying their team's tally
fn team_credits(event_id: Uuid, teams: &DrawnTeams, score: TeamScore) -> Vec<PointsEntry> {
    [TeamSide::Black, TeamSide::White]
        .into_iter()
        .flat_map(move |side| {
            teams.side(side).iter().map(move |player| {
                PointsEntry::team_goals(player.member_id, event_id, side, score.get(side))
            })
        })
        .collect()
}
