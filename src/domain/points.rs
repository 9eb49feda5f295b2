use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Attendance, AttendanceStatus, Event, Member, Outcome, TeamSide};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointsReason {
    /// Showing up to a game
    Attendance,
    /// Share of the team's goals after a drawn game
    TeamGoals,
}

impl PointsReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointsReason::Attendance => "ATTENDANCE",
            PointsReason::TeamGoals => "TEAM_GOALS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ATTENDANCE" => Some(PointsReason::Attendance),
            "TEAM_GOALS" => Some(PointsReason::TeamGoals),
            _ => None,
        }
    }
}

/// Line of the points ledger
///
/// Entries are never updated. Corrections delete the event's entries and insert new ones.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsEntry {
    pub entry_id: Uuid,
    pub member_id: Uuid,
    pub event_id: Uuid,
    pub points: i64,
    pub goals: i64,
    pub team: Option<TeamSide>,
    pub reason: PointsReason,
    pub created_at: DateTime<Utc>,
}

impl PointsEntry {
    pub fn attendance(member_id: Uuid, event_id: Uuid, points: i64) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            member_id,
            event_id,
            points,
            goals: 0,
            team: None,
            reason: PointsReason::Attendance,
            created_at: Utc::now(),
        }
    }

    /// Team credit: every player gets the team's full goal tally as both points and goals
    pub fn team_goals(member_id: Uuid, event_id: Uuid, team: TeamSide, goals: u32) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            member_id,
            event_id,
            points: goals.into(),
            goals: goals.into(),
            team: Some(team),
            reason: PointsReason::TeamGoals,
            created_at: Utc::now(),
        }
    }
}

/// Position of one member in the ranking
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub member_id: Uuid,
    pub name: String,
    pub points: i64,
    pub goals: i64,
}

/// Fold the points ledger into standings
///
/// Sorted by points, then goals, both descending, then by name and member id so equal totals
/// always come out in the same order. Members missing from `members` are listed under their id.
pub fn ranking<'a>(
    entries: impl IntoIterator<Item = &'a PointsEntry>,
    members: &[Member],
) -> Vec<Standing> {
    let names: HashMap<Uuid, &str> = members
        .iter()
        .map(|m| (m.member_id, m.name.as_str()))
        .collect();

    let mut totals: HashMap<Uuid, Standing> = HashMap::new();
    for entry in entries {
        let standing = totals.entry(entry.member_id).or_insert_with(|| Standing {
            member_id: entry.member_id,
            name: names
                .get(&entry.member_id)
                .map(|name| name.to_string())
                .unwrap_or_else(|| entry.member_id.to_string()),
            points: 0,
            goals: 0,
        });
        standing.points += entry.points;
        standing.goals += entry.goals;
    }

    let mut standings: Vec<Standing> = totals.into_values().collect();
    standings.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.goals.cmp(&a.goals))
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.member_id.cmp(&b.member_id))
    });
    standings
}

/// Personal statistics of one member
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MemberStats {
    pub total_points: i64,
    pub total_goals: i64,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub games: u32,
    pub present: u32,
    pub absent: u32,
    pub late: u32,
    /// Percentage of recorded attendances marked present
    pub attendance_rate: f64,
    pub goals_per_game: f64,
    /// Percentage of games won
    pub win_rate: f64,
}

impl MemberStats {
    /// Compute stats from the member's points entries and attendance
    ///
    /// Wins, losses and draws come from `TEAM_GOALS` entries whose event has a finalized score.
    pub fn build(points: &[PointsEntry], events: &[Event], attendance: &[Attendance]) -> Self {
        let events: HashMap<Uuid, &Event> = events.iter().map(|e| (e.event_id, e)).collect();
        let mut stats = MemberStats {
            total_points: points.iter().map(|p| p.points).sum(),
            total_goals: points.iter().map(|p| p.goals).sum(),
            ..Default::default()
        };

        for entry in points {
            let (Some(team), Some(event)) = (entry.team, events.get(&entry.event_id)) else {
                continue;
            };
            if !event.score.finalized {
                continue;
            }
            match Outcome::from_score(event.score.black, event.score.white) {
                Outcome::Winner(winner) if winner == team => stats.wins += 1,
                Outcome::Winner(_) => stats.losses += 1,
                Outcome::Draw => stats.draws += 1,
            }
        }
        stats.games = stats.wins + stats.losses + stats.draws;

        for record in attendance {
            match record.status {
                AttendanceStatus::Present => stats.present += 1,
                AttendanceStatus::Absent => stats.absent += 1,
                AttendanceStatus::Late => stats.late += 1,
                AttendanceStatus::Excused => {}
            }
        }

        if !attendance.is_empty() {
            stats.attendance_rate = f64::from(stats.present) * 100.0 / attendance.len() as f64;
        }
        if stats.games > 0 {
            stats.goals_per_game = stats.total_goals as f64 / f64::from(stats.games);
            stats.win_rate = f64::from(stats.wins) * 100.0 / f64::from(stats.games);
        }

        stats
    }
}
