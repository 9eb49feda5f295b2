use crate::{
    domain::{
        Attendance, AuditEntry, CashEntry, DrawnTeams, Due, DueStatus, Event, Exemption, Fine,
        Member, Payment, PaymentStatus, PaymentTarget, PointsEntry, PointsReason, Rsvp, YearMonth,
    },
    ports::{
        database::{
            AttendanceFilter, CashFilter, DatabasePort, DueFilter, Error, EventFilter, FineFilter,
            PointsFilter,
        },
        member::{self, MemberPort},
    },
};
use chrono::Utc;
use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};
use uuid::Uuid;

/// In-process store backing both ports
///
/// Every port method holds the lock for its whole duration, which makes the multi-step methods
/// atomic.
#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Debug, Default)]
struct Tables {
    members: HashMap<Uuid, Member>,
    events: HashMap<Uuid, Event>,
    rsvps: HashMap<(Uuid, Uuid), Rsvp>,
    attendance: HashMap<(Uuid, Uuid), Attendance>,
    dues: Vec<Due>,
    exemptions: Vec<Exemption>,
    fines: Vec<Fine>,
    payments: Vec<Payment>,
    cash: Vec<CashEntry>,
    points: Vec<PointsEntry>,
    settings: HashMap<String, String>,
    audit: Vec<AuditEntry>,
}

fn not_found(entity: &'static str, id: Uuid) -> Error {
    Error::NotFound { entity, id }
}

#[async_trait::async_trait]
impl DatabasePort for MemoryDatabase {
    async fn insert_event(&self, event: Event) -> Result<Event, Error> {
        let mut tables = self.tables.lock()?;
        match tables.events.entry(event.event_id) {
            Entry::Occupied(_) => Err(Error::Conflict(
                format!("event {} already exists", event.event_id).into(),
            )),
            Entry::Vacant(entry) => Ok(entry.insert(event).clone()),
        }
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Event, Error> {
        self.tables
            .lock()?
            .events
            .get(&event_id)
            .cloned()
            .ok_or_else(|| not_found("event", event_id))
    }

    async fn update_event(&self, event: Event) -> Result<Event, Error> {
        let mut tables = self.tables.lock()?;
        let stored = tables
            .events
            .get_mut(&event.event_id)
            .ok_or_else(|| not_found("event", event.event_id))?;
        *stored = event;
        Ok(stored.clone())
    }

    async fn list_events(&self, filter: EventFilter) -> Result<Vec<Event>, Error> {
        let mut events: Vec<Event> = self
            .tables
            .lock()?
            .events
            .values()
            .filter(|e| filter.starts_after.map_or(true, |after| e.starts_at >= after))
            .filter(|e| filter.starts_before.map_or(true, |before| e.starts_at < before))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.starts_at);
        Ok(events)
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<Event, Error> {
        let mut tables = self.tables.lock()?;
        if !tables.events.contains_key(&event_id) {
            return Err(not_found("event", event_id));
        }
        let referenced = tables.fines.iter().any(|f| f.event_id == Some(event_id))
            || tables.points.iter().any(|p| p.event_id == event_id);
        if referenced {
            return Err(Error::Conflict(
                format!("event {event_id} has fines or points booked against it").into(),
            ));
        }

        tables.rsvps.retain(|(event, _), _| *event != event_id);
        tables.attendance.retain(|(event, _), _| *event != event_id);
        tables
            .events
            .remove(&event_id)
            .ok_or_else(|| not_found("event", event_id))
    }

    async fn draw_teams(&self, event_id: Uuid, teams: DrawnTeams) -> Result<Event, Error> {
        let mut tables = self.tables.lock()?;
        let event = tables
            .events
            .get_mut(&event_id)
            .ok_or_else(|| not_found("event", event_id))?;
        if event.is_drawn() {
            return Err(Error::AlreadyDrawn(event_id));
        }
        event.teams = Some(teams);
        Ok(event.clone())
    }

    async fn record_score(
        &self,
        event: Event,
        entries: Vec<PointsEntry>,
        replace_existing: bool,
    ) -> Result<Event, Error> {
        let mut tables = self.tables.lock()?;
        if !tables.events.contains_key(&event.event_id) {
            return Err(not_found("event", event.event_id));
        }
        if replace_existing {
            tables.points.retain(|p| {
                !(p.event_id == event.event_id && p.reason == PointsReason::TeamGoals)
            });
        }
        tables.points.extend(entries);
        tables.events.insert(event.event_id, event.clone());
        Ok(event)
    }

    async fn upsert_rsvp(&self, rsvp: Rsvp) -> Result<Rsvp, Error> {
        let mut tables = self.tables.lock()?;
        let stored = match tables.rsvps.entry((rsvp.event_id, rsvp.member_id)) {
            Entry::Occupied(mut entry) => {
                // Last write wins, an older write never overrides a newer one
                if rsvp.updated_at >= entry.get().updated_at {
                    entry.insert(rsvp);
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(rsvp).clone(),
        };
        Ok(stored)
    }

    async fn get_rsvp(&self, event_id: Uuid, member_id: Uuid) -> Result<Option<Rsvp>, Error> {
        Ok(self.tables.lock()?.rsvps.get(&(event_id, member_id)).cloned())
    }

    async fn list_rsvps(&self, event_id: Uuid) -> Result<Vec<Rsvp>, Error> {
        let mut rsvps: Vec<Rsvp> = self
            .tables
            .lock()?
            .rsvps
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        rsvps.sort_by_key(|r| r.updated_at);
        Ok(rsvps)
    }

    async fn record_attendance(
        &self,
        attendance: Attendance,
        fine: Option<(Fine, CashEntry)>,
        points: Option<PointsEntry>,
    ) -> Result<Attendance, Error> {
        let mut tables = self.tables.lock()?;
        if let Some((fine, entry)) = fine {
            tables.fines.push(fine);
            tables.cash.push(entry);
        }
        tables.points.extend(points);
        tables
            .attendance
            .insert((attendance.event_id, attendance.member_id), attendance.clone());
        Ok(attendance)
    }

    async fn get_attendance(
        &self,
        event_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<Attendance>, Error> {
        Ok(self
            .tables
            .lock()?
            .attendance
            .get(&(event_id, member_id))
            .cloned())
    }

    async fn list_attendance(&self, filter: AttendanceFilter) -> Result<Vec<Attendance>, Error> {
        let mut records: Vec<Attendance> = self
            .tables
            .lock()?
            .attendance
            .values()
            .filter(|a| filter.event_id.map_or(true, |id| a.event_id == id))
            .filter(|a| filter.member_id.map_or(true, |id| a.member_id == id))
            .cloned()
            .collect();
        records.sort_by_key(|a| a.recorded_at);
        Ok(records)
    }

    async fn insert_dues(&self, dues: Vec<Due>) -> Result<Vec<Due>, Error> {
        let mut tables = self.tables.lock()?;
        let mut taken: HashSet<(Uuid, YearMonth)> =
            tables.dues.iter().map(|d| (d.member_id, d.month)).collect();
        let exempt: HashSet<(Uuid, YearMonth)> = tables
            .exemptions
            .iter()
            .map(|e| (e.member_id, e.month))
            .collect();

        let created: Vec<Due> = dues
            .into_iter()
            .filter(|due| taken.insert((due.member_id, due.month)))
            .map(|mut due| {
                if exempt.contains(&(due.member_id, due.month)) {
                    due.exempt();
                }
                due
            })
            .collect();
        tables.dues.extend(created.iter().cloned());
        Ok(created)
    }

    async fn get_due(&self, due_id: Uuid) -> Result<Due, Error> {
        self.tables
            .lock()?
            .dues
            .iter()
            .find(|d| d.due_id == due_id)
            .cloned()
            .ok_or_else(|| not_found("due", due_id))
    }

    async fn list_dues(&self, filter: DueFilter) -> Result<Vec<Due>, Error> {
        let mut dues: Vec<Due> = self
            .tables
            .lock()?
            .dues
            .iter()
            .filter(|d| filter.member_id.map_or(true, |id| d.member_id == id))
            .filter(|d| filter.month.map_or(true, |month| d.month == month))
            .filter(|d| filter.status.map_or(true, |status| d.status == status))
            .cloned()
            .collect();
        dues.sort_by(|a, b| b.month.cmp(&a.month));
        Ok(dues)
    }

    async fn apply_exemption(
        &self,
        exemption: Exemption,
    ) -> Result<(Exemption, Option<Due>), Error> {
        let mut tables = self.tables.lock()?;
        let exists = tables
            .exemptions
            .iter()
            .any(|e| e.member_id == exemption.member_id && e.month == exemption.month);
        if exists {
            return Err(Error::Conflict(
                format!(
                    "member {} already has an exemption for {}",
                    exemption.member_id, exemption.month
                )
                .into(),
            ));
        }

        let due = tables
            .dues
            .iter_mut()
            .find(|d| d.member_id == exemption.member_id && d.month == exemption.month)
            .map(|due| {
                due.exempt();
                due.clone()
            });
        tables.exemptions.push(exemption.clone());
        Ok((exemption, due))
    }

    async fn list_exemptions(&self, month: YearMonth) -> Result<Vec<Exemption>, Error> {
        Ok(self
            .tables
            .lock()?
            .exemptions
            .iter()
            .filter(|e| e.month == month)
            .cloned()
            .collect())
    }

    async fn record_fine(&self, fine: Fine, entry: CashEntry) -> Result<(Fine, CashEntry), Error> {
        let mut tables = self.tables.lock()?;
        tables.fines.push(fine.clone());
        tables.cash.push(entry.clone());
        Ok((fine, entry))
    }

    async fn get_fine(&self, fine_id: Uuid) -> Result<Fine, Error> {
        self.tables
            .lock()?
            .fines
            .iter()
            .find(|f| f.fine_id == fine_id)
            .cloned()
            .ok_or_else(|| not_found("fine", fine_id))
    }

    async fn list_fines(&self, filter: FineFilter) -> Result<Vec<Fine>, Error> {
        let mut fines: Vec<Fine> = self
            .tables
            .lock()?
            .fines
            .iter()
            .rev()
            .filter(|f| filter.member_id.map_or(true, |id| f.member_id == id))
            .filter(|f| filter.event_id.map_or(true, |id| f.event_id == Some(id)))
            .filter(|f| filter.paid.map_or(true, |paid| f.paid == paid))
            .filter(|f| filter.created_after.map_or(true, |after| f.created_at >= after))
            .filter(|f| filter.created_before.map_or(true, |before| f.created_at < before))
            .cloned()
            .collect();
        fines.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(fines)
    }

    async fn insert_payment(&self, payment: Payment) -> Result<Payment, Error> {
        self.tables.lock()?.payments.push(payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, Error> {
        self.tables
            .lock()?
            .payments
            .iter()
            .find(|p| p.payment_id == payment_id)
            .cloned()
            .ok_or_else(|| not_found("payment", payment_id))
    }

    async fn list_payments(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>, Error> {
        let mut payments: Vec<Payment> = self
            .tables
            .lock()?
            .payments
            .iter()
            .filter(|p| status.map_or(true, |status| p.status == status))
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn confirm_payment(
        &self,
        payment_id: Uuid,
        confirmed_by: Uuid,
        entry: CashEntry,
    ) -> Result<Payment, Error> {
        let mut guard = self.tables.lock()?;
        let tables = &mut *guard;

        let payment = tables
            .payments
            .iter_mut()
            .find(|p| p.payment_id == payment_id)
            .ok_or_else(|| not_found("payment", payment_id))?;
        if payment.status != PaymentStatus::Pending {
            return Err(Error::Conflict(
                format!("payment {payment_id} is already confirmed").into(),
            ));
        }

        // Settle the target before touching the payment so a missing target changes nothing
        match payment.target {
            PaymentTarget::Due(due_id) => {
                let due = tables
                    .dues
                    .iter_mut()
                    .find(|d| d.due_id == due_id)
                    .ok_or_else(|| not_found("due", due_id))?;
                due.status = DueStatus::Paid;
            }
            PaymentTarget::Fine(fine_id) => {
                let fine = tables
                    .fines
                    .iter_mut()
                    .find(|f| f.fine_id == fine_id)
                    .ok_or_else(|| not_found("fine", fine_id))?;
                fine.paid = true;
            }
        }

        payment.status = PaymentStatus::Confirmed;
        payment.confirmed_by = Some(confirmed_by);
        payment.confirmed_at = Some(Utc::now());
        let payment = payment.clone();
        tables.cash.push(entry);
        Ok(payment)
    }

    async fn insert_cash_entry(&self, entry: CashEntry) -> Result<CashEntry, Error> {
        self.tables.lock()?.cash.push(entry.clone());
        Ok(entry)
    }

    async fn list_cash_entries(&self, filter: CashFilter) -> Result<Vec<CashEntry>, Error> {
        let mut entries: Vec<CashEntry> = self
            .tables
            .lock()?
            .cash
            .iter()
            .rev()
            .filter(|e| filter.from.map_or(true, |from| e.created_at >= from))
            .filter(|e| filter.to.map_or(true, |to| e.created_at < to))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn insert_points(&self, entries: Vec<PointsEntry>) -> Result<Vec<PointsEntry>, Error> {
        self.tables.lock()?.points.extend(entries.iter().cloned());
        Ok(entries)
    }

    async fn list_points(&self, filter: PointsFilter) -> Result<Vec<PointsEntry>, Error> {
        Ok(self
            .tables
            .lock()?
            .points
            .iter()
            .filter(|p| filter.member_id.map_or(true, |id| p.member_id == id))
            .filter(|p| filter.event_id.map_or(true, |id| p.event_id == id))
            .filter(|p| filter.reason.map_or(true, |reason| p.reason == reason))
            .filter(|p| filter.from.map_or(true, |from| p.created_at >= from))
            .filter(|p| filter.to.map_or(true, |to| p.created_at < to))
            .cloned()
            .collect())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.tables.lock()?.settings.get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        self.tables
            .lock()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn insert_audit_entry(&self, entry: AuditEntry) -> Result<AuditEntry, Error> {
        self.tables.lock()?.audit.push(entry.clone());
        Ok(entry)
    }

    async fn list_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, Error> {
        let tables = self.tables.lock()?;
        let mut entries: Vec<AuditEntry> = tables.audit.iter().rev().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

#[async_trait::async_trait]
impl MemberPort for MemoryDatabase {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, member::Error> {
        self.tables
            .lock()?
            .members
            .get(&member_id)
            .cloned()
            .ok_or(member::Error::MemberDoesNotExist(member_id))
    }

    async fn list_members(&self, active_only: bool) -> Result<Vec<Member>, member::Error> {
        let mut members: Vec<Member> = self
            .tables
            .lock()?
            .members
            .values()
            .filter(|m| !active_only || m.active)
            .cloned()
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    async fn insert_member(&self, member: Member) -> Result<Member, member::Error> {
        let mut tables = self.tables.lock()?;
        if tables
            .members
            .values()
            .any(|m| m.email.eq_ignore_ascii_case(&member.email))
        {
            return Err(member::Error::EmailTaken(member.email));
        }
        tables.members.insert(member.member_id, member.clone());
        Ok(member)
    }

    async fn set_member_active(
        &self,
        member_id: Uuid,
        active: bool,
    ) -> Result<Member, member::Error> {
        let mut tables = self.tables.lock()?;
        let member = tables
            .members
            .get_mut(&member_id)
            .ok_or(member::Error::MemberDoesNotExist(member_id))?;
        member.active = active;
        Ok(member.clone())
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

/// We need to create a custom `From` implementation here for an error that's specific to this
/// adapter.
impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}

impl<T> From<PoisonError<T>> for member::Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}
