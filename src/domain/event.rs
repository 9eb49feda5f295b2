use std::{collections::HashMap, fmt};

use chrono::{DateTime, FixedOffset, Utc};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Member;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Pickup game, the only kind that earns attendance points
    Game,
    /// Club meeting or any other non-game gathering
    Internal,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Game => "GAME",
            EventKind::Internal => "INTERNAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GAME" => Some(EventKind::Game),
            "INTERNAL" => Some(EventKind::Internal),
            _ => None,
        }
    }
}

/// One of the two squads of a drawn game
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamSide {
    Black,
    White,
}

impl TeamSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamSide::Black => "BLACK",
            TeamSide::White => "WHITE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "BLACK" => Some(TeamSide::Black),
            "WHITE" => Some(TeamSide::White),
            _ => None,
        }
    }
}

/// Result of a drawn game
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Winner(TeamSide),
    Draw,
}

impl Outcome {
    pub fn from_score(black: u32, white: u32) -> Self {
        match black.cmp(&white) {
            std::cmp::Ordering::Greater => Outcome::Winner(TeamSide::Black),
            std::cmp::Ordering::Less => Outcome::Winner(TeamSide::White),
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }
}

/// A member as listed on a drawn team
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub member_id: Uuid,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawnTeams {
    pub black: Vec<PlayerRef>,
    pub white: Vec<PlayerRef>,
    pub drawn_at: DateTime<Utc>,
    /// Admin who triggered the draw
    pub drawn_by: Uuid,
}

impl DrawnTeams {
    pub fn side(&self, side: TeamSide) -> &[PlayerRef] {
        match side {
            TeamSide::Black => &self.black,
            TeamSide::White => &self.white,
        }
    }

    pub fn len(&self) -> usize {
        self.black.len() + self.white.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Score of a drawn game
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamScore {
    pub black: u32,
    pub white: u32,
    pub finalized: bool,
}

impl TeamScore {
    pub fn get(&self, side: TeamSide) -> u32 {
        match side {
            TeamSide::Black => self.black,
            TeamSide::White => self.white,
        }
    }
}

/// Free-form score for games played without a draw, e.g. against another club
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedScore {
    pub team_a_name: String,
    pub team_a_score: u32,
    pub team_b_name: String,
    pub team_b_score: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub kind: EventKind,
    pub starts_at: DateTime<Utc>,
    pub location: String,
    /// RSVPs are accepted until this instant. `None` keeps them open until the draw.
    pub rsvp_deadline: Option<DateTime<Utc>>,
    /// Squads of the last draw
    ///
    /// `Some` means the event is drawn, which closes confirmations regardless of the deadline.
    pub teams: Option<DrawnTeams>,
    pub score: TeamScore,
    pub named_score: Option<NamedScore>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, starts_at: DateTime<Utc>, location: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            starts_at,
            location: location.into(),
            rsvp_deadline: None,
            teams: None,
            score: TeamScore::default(),
            named_score: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_drawn(&self) -> bool {
        self.teams.is_some()
    }
}

/// Whether members can still RSVP for the event at `now`
pub fn is_confirmation_open(event: &Event, now: DateTime<Utc>) -> bool {
    if event.is_drawn() {
        return false;
    }
    match event.rsvp_deadline {
        None => true,
        Some(deadline) => now < deadline,
    }
}

/// Shuffle the players uniformly and split them at `ceil(n / 2)`
///
/// The first half plays Black and the second half White, so Black gets the extra player on odd
/// counts. There is no skill balancing.
pub fn shuffle_teams<R: Rng + ?Sized>(
    mut players: Vec<PlayerRef>,
    rng: &mut R,
) -> (Vec<PlayerRef>, Vec<PlayerRef>) {
    players.shuffle(rng);
    let middle = players.len().div_ceil(2);
    let white = players.split_off(middle);
    (players, white)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RsvpStatus {
    Going,
    NotGoing,
    Maybe,
}

impl RsvpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RsvpStatus::Going => "GOING",
            RsvpStatus::NotGoing => "NOT_GOING",
            RsvpStatus::Maybe => "MAYBE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GOING" => Some(RsvpStatus::Going),
            "NOT_GOING" => Some(RsvpStatus::NotGoing),
            "MAYBE" => Some(RsvpStatus::Maybe),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rsvp {
    pub event_id: Uuid,
    pub member_id: Uuid,
    pub status: RsvpStatus,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Late => "LATE",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Excused => "EXCUSED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PRESENT" => Some(AttendanceStatus::Present),
            "LATE" => Some(AttendanceStatus::Late),
            "ABSENT" => Some(AttendanceStatus::Absent),
            "EXCUSED" => Some(AttendanceStatus::Excused),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendance {
    pub event_id: Uuid,
    pub member_id: Uuid,
    pub status: AttendanceStatus,
    pub recorded_by: Uuid,
    pub recorded_at: DateTime<Utc>,
}

/// A member's answer and attendance at one event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub member_id: Uuid,
    pub name: String,
    pub email: String,
    pub rsvp: Option<RsvpStatus>,
    pub attendance: Option<AttendanceStatus>,
}

/// Event with everyone that answered or was marked, ordered by name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    pub event: Event,
    pub participants: Vec<Participant>,
}

impl EventDetails {
    /// Joins RSVPs and attendance of `event` with member names
    ///
    /// Rows of members missing from `members` are dropped.
    pub fn collect(
        event: Event,
        members: Vec<Member>,
        rsvps: Vec<Rsvp>,
        attendance: Vec<Attendance>,
    ) -> Self {
        let members: HashMap<Uuid, Member> =
            members.into_iter().map(|m| (m.member_id, m)).collect();
        let mut by_member: HashMap<Uuid, Participant> = HashMap::new();

        for rsvp in rsvps.iter().filter(|r| r.event_id == event.event_id) {
            if let Some(participant) = participant(&mut by_member, &members, rsvp.member_id) {
                participant.rsvp = Some(rsvp.status);
            }
        }
        for marked in attendance.iter().filter(|a| a.event_id == event.event_id) {
            if let Some(participant) = participant(&mut by_member, &members, marked.member_id) {
                participant.attendance = Some(marked.status);
            }
        }

        let mut participants: Vec<Participant> = by_member.into_values().collect();
        participants.sort_by(|a, b| a.name.cmp(&b.name).then(a.member_id.cmp(&b.member_id)));
        Self {
            event,
            participants,
        }
    }
}

fn participant<'a>(
    by_member: &'a mut HashMap<Uuid, Participant>,
    members: &HashMap<Uuid, Member>,
    member_id: Uuid,
) -> Option<&'a mut Participant> {
    let member = members.get(&member_id)?;
    Some(by_member.entry(member_id).or_insert_with(|| Participant {
        member_id,
        name: member.name.clone(),
        email: member.email.clone(),
        rsvp: None,
        attendance: None,
    }))
}

/// Plain-text roster of a drawn game, ready to paste into a group chat
///
/// Dates are rendered in the club's local offset.
pub struct Roster<'a> {
    pub event: &'a Event,
    pub teams: &'a DrawnTeams,
    pub offset: FixedOffset,
}

impl fmt::Display for Roster<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.event.starts_at.with_timezone(&self.offset);

        writeln!(f, "TEAMS FOR THE GAME")?;
        writeln!(f)?;
        writeln!(f, "{}", local.format("%A, %d %B"))?;
        writeln!(f, "{}", local.format("%H:%M"))?;
        writeln!(f, "{}", self.event.location)?;

        let sides = [
            ("TEAM BLACK:", &self.teams.black),
            ("TEAM WHITE:", &self.teams.white),
        ];
        for (title, players) in sides {
            writeln!(f)?;
            writeln!(f, "{title}")?;
            for (i, player) in players.iter().enumerate() {
                writeln!(f, "{}. {}", i + 1, player.name)?;
            }
        }

        writeln!(f)?;
        write!(f, "Total: {} players", self.teams.len())
    }
}
