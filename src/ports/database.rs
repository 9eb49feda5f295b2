use std::borrow::Cow;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Attendance, AuditEntry, CashEntry, Due, DueStatus, DrawnTeams, Event, Exemption, Fine,
    Payment, PaymentStatus, PointsEntry, PointsReason, Rsvp, YearMonth,
};

/// Ledger store for everything except the member directory
///
/// Methods that touch more than one table are atomic: an adapter either applies every step or
/// none of them.
#[mockall::automock]
#[async_trait::async_trait]
pub trait DatabasePort {
    async fn insert_event(&self, event: Event) -> Result<Event, Error>;
    async fn get_event(&self, event_id: Uuid) -> Result<Event, Error>;
    async fn update_event(&self, event: Event) -> Result<Event, Error>;
    async fn list_events(&self, filter: EventFilter) -> Result<Vec<Event>, Error>;

    /// Remove an event together with its RSVPs and attendance
    ///
    /// Returns [`Error::Conflict`] and removes nothing when fines or points entries reference
    /// the event.
    async fn delete_event(&self, event_id: Uuid) -> Result<Event, Error>;

    /// Store the drawn teams if the event is not drawn yet
    ///
    /// Returns [`Error::AlreadyDrawn`] without touching the event otherwise. The check and the
    /// write happen together, so two admins drawing at once cannot both succeed.
    async fn draw_teams(&self, event_id: Uuid, teams: DrawnTeams) -> Result<Event, Error>;

    /// Persist the score on `event` and append `entries`
    ///
    /// With `replace_existing`, the event's `TEAM_GOALS` entries are deleted first, in the same
    /// unit of work.
    async fn record_score(
        &self,
        event: Event,
        entries: Vec<PointsEntry>,
        replace_existing: bool,
    ) -> Result<Event, Error>;

    /// Insert or replace the RSVP for its (event, member) key
    async fn upsert_rsvp(&self, rsvp: Rsvp) -> Result<Rsvp, Error>;
    async fn get_rsvp(&self, event_id: Uuid, member_id: Uuid) -> Result<Option<Rsvp>, Error>;
    async fn list_rsvps(&self, event_id: Uuid) -> Result<Vec<Rsvp>, Error>;

    /// Insert or replace the attendance for its (event, member) key along with its side effects
    ///
    /// The fine, its cash entry and the points entry are written in the same unit of work as the
    /// attendance row. On failure the previous attendance stays in place.
    async fn record_attendance(
        &self,
        attendance: Attendance,
        fine: Option<(Fine, CashEntry)>,
        points: Option<PointsEntry>,
    ) -> Result<Attendance, Error>;
    async fn get_attendance(
        &self,
        event_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<Attendance>, Error>;
    async fn list_attendance(&self, filter: AttendanceFilter) -> Result<Vec<Attendance>, Error>;

    /// Insert the dues whose (member, month) key is still free
    ///
    /// Returns only the rows actually created. Either the whole batch is applied or nothing is.
    /// A due whose member holds an exemption for that month is stored zeroed and `EXEMPT`, checked
    /// in the same unit of work.
    async fn insert_dues(&self, dues: Vec<Due>) -> Result<Vec<Due>, Error>;
    async fn get_due(&self, due_id: Uuid) -> Result<Due, Error>;
    async fn list_dues(&self, filter: DueFilter) -> Result<Vec<Due>, Error>;

    /// Insert the exemption and zero the matching due if one exists
    async fn apply_exemption(
        &self,
        exemption: Exemption,
    ) -> Result<(Exemption, Option<Due>), Error>;
    async fn list_exemptions(&self, month: YearMonth) -> Result<Vec<Exemption>, Error>;

    /// Insert a fine together with its cash entry
    async fn record_fine(&self, fine: Fine, entry: CashEntry) -> Result<(Fine, CashEntry), Error>;
    async fn get_fine(&self, fine_id: Uuid) -> Result<Fine, Error>;
    async fn list_fines(&self, filter: FineFilter) -> Result<Vec<Fine>, Error>;

    async fn insert_payment(&self, payment: Payment) -> Result<Payment, Error>;
    async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, Error>;
    async fn list_payments(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>, Error>;

    /// Mark a pending payment confirmed, settle its due or fine and book `entry`
    ///
    /// Returns [`Error::Conflict`] if the payment is not pending anymore.
    async fn confirm_payment(
        &self,
        payment_id: Uuid,
        confirmed_by: Uuid,
        entry: CashEntry,
    ) -> Result<Payment, Error>;

    async fn insert_cash_entry(&self, entry: CashEntry) -> Result<CashEntry, Error>;
    /// Cash entries, newest first
    async fn list_cash_entries(&self, filter: CashFilter) -> Result<Vec<CashEntry>, Error>;

    async fn insert_points(&self, entries: Vec<PointsEntry>) -> Result<Vec<PointsEntry>, Error>;
    async fn list_points(&self, filter: PointsFilter) -> Result<Vec<PointsEntry>, Error>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>, Error>;
    async fn put_setting(&self, key: &str, value: &str) -> Result<(), Error>;

    async fn insert_audit_entry(&self, entry: AuditEntry) -> Result<AuditEntry, Error>;
    /// Audit entries, newest first
    async fn list_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, Error>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub starts_after: Option<DateTime<Utc>>,
    pub starts_before: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub event_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DueFilter {
    pub member_id: Option<Uuid>,
    pub month: Option<YearMonth>,
    pub status: Option<DueStatus>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FineFilter {
    pub member_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub paid: Option<bool>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// Time bounds are inclusive on `from` and exclusive on `to`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CashFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Time bounds are inclusive on `from` and exclusive on `to`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointsFilter {
    pub member_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub reason: Option<PointsReason>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Referenced row does not exist
    #[error("{entity} {id} does not exist")]
    NotFound { entity: &'static str, id: Uuid },

    /// Write rejected by a uniqueness or state check
    #[error("conflict: {0}")]
    Conflict(Cow<'static, str>),

    /// Teams were drawn already for this event
    #[error("teams already drawn for event {0}")]
    AlreadyDrawn(Uuid),

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
