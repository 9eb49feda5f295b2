use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions},
    FromRow, QueryBuilder, Sqlite,
};
use uuid::Uuid;

use crate::{
    domain::{
        Attendance, AttendanceStatus, AuditEntry, CashCategory, CashDirection, CashEntry,
        DrawnTeams, Due, DueStatus, Event, EventKind, Exemption, Fine, FineKind, Member, Payment,
        PaymentStatus, PaymentTarget, PointsEntry, PointsReason, Rsvp, RsvpStatus, TeamScore,
        TeamSide, YearMonth,
    },
    ports::{
        database::{
            AttendanceFilter, CashFilter, DatabasePort, DueFilter, Error, EventFilter, FineFilter,
            PointsFilter,
        },
        member::{self, MemberPort},
    },
};

const SCHEMA: &str = include_str!("schema.sql");

const EVENT_COLUMNS: &str = "event_id, kind, starts_at, location, rsvp_deadline, teams_json, \
    score_black, score_white, score_finalized, named_score_json, created_at";
const DUE_COLUMNS: &str = "due_id, member_id, month, amount_cents, status, due_date, created_at";
const FINE_COLUMNS: &str =
    "fine_id, member_id, event_id, kind, amount_cents, paid, note, created_at";
const PAYMENT_COLUMNS: &str = "payment_id, member_id, due_id, fine_id, amount_cents, status, \
    proof_url, created_at, confirmed_by, confirmed_at";
const CASH_COLUMNS: &str =
    "entry_id, direction, category, amount_cents, reference, note, posted_by, created_at";
const POINTS_COLUMNS: &str =
    "entry_id, member_id, event_id, points, goals, team, reason, created_at";
const AUDIT_COLUMNS: &str = "entry_id, action, member_id, details, recorded_by, created_at";

/// SQLite-backed store for both ports
///
/// Multi-step port methods run inside a single SQL transaction.
#[derive(Clone, Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (or create) the database at `url` and install the schema
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let database = Self { pool };
        database.install_schema().await?;
        Ok(database)
    }

    /// Fresh in-memory database
    ///
    /// The pool keeps a single connection alive forever, since every new SQLite memory
    /// connection would start out empty.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let database = Self { pool };
        database.install_schema().await?;
        Ok(database)
    }

    pub async fn install_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

/// Row that cannot be mapped back onto the domain model
#[derive(Debug, thiserror::Error)]
#[error("corrupt {table} row: {detail}")]
pub struct CorruptRow {
    table: &'static str,
    detail: String,
}

fn corrupt(table: &'static str, detail: impl Into<String>) -> Error {
    Error::Adapter(Box::new(CorruptRow {
        table,
        detail: detail.into(),
    }))
}

fn parse_column<T>(
    table: &'static str,
    value: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, Error> {
    parse(value).ok_or_else(|| corrupt(table, format!("unexpected value {value:?}")))
}

fn parse_month(table: &'static str, value: &str) -> Result<YearMonth, Error> {
    value
        .parse()
        .map_err(|err: crate::domain::YearMonthError| corrupt(table, err.to_string()))
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if unique {
            Self::Conflict(err.to_string().into())
        } else {
            Self::Adapter(Box::new(err))
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Adapter(Box::new(err))
    }
}

impl From<sqlx::Error> for member::Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Adapter(Box::new(err))
    }
}

#[derive(FromRow)]
struct MemberRow {
    member_id: Uuid,
    name: String,
    email: String,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            member_id: row.member_id,
            name: row.name,
            email: row.email,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct EventRow {
    event_id: Uuid,
    kind: String,
    starts_at: DateTime<Utc>,
    location: String,
    rsvp_deadline: Option<DateTime<Utc>>,
    teams_json: Option<String>,
    score_black: i64,
    score_white: i64,
    score_finalized: bool,
    named_score_json: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let teams = row
            .teams_json
            .as_deref()
            .map(serde_json::from_str::<DrawnTeams>)
            .transpose()?;
        let named_score = row
            .named_score_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let score = |value: i64| {
            u32::try_from(value).map_err(|_| corrupt("events", format!("negative score {value}")))
        };

        Ok(Event {
            event_id: row.event_id,
            kind: parse_column("events", &row.kind, EventKind::parse)?,
            starts_at: row.starts_at,
            location: row.location,
            rsvp_deadline: row.rsvp_deadline,
            teams,
            score: TeamScore {
                black: score(row.score_black)?,
                white: score(row.score_white)?,
                finalized: row.score_finalized,
            },
            named_score,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct RsvpRow {
    event_id: Uuid,
    member_id: Uuid,
    status: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RsvpRow> for Rsvp {
    type Error = Error;

    fn try_from(row: RsvpRow) -> Result<Self, Self::Error> {
        Ok(Rsvp {
            event_id: row.event_id,
            member_id: row.member_id,
            status: parse_column("rsvps", &row.status, RsvpStatus::parse)?,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AttendanceRow {
    event_id: Uuid,
    member_id: Uuid,
    status: String,
    recorded_by: Uuid,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<AttendanceRow> for Attendance {
    type Error = Error;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(Attendance {
            event_id: row.event_id,
            member_id: row.member_id,
            status: parse_column("attendance", &row.status, AttendanceStatus::parse)?,
            recorded_by: row.recorded_by,
            recorded_at: row.recorded_at,
        })
    }
}

#[derive(FromRow)]
struct DueRow {
    due_id: Uuid,
    member_id: Uuid,
    month: String,
    amount_cents: i64,
    status: String,
    due_date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl TryFrom<DueRow> for Due {
    type Error = Error;

    fn try_from(row: DueRow) -> Result<Self, Self::Error> {
        Ok(Due {
            due_id: row.due_id,
            member_id: row.member_id,
            month: parse_month("dues", &row.month)?,
            amount_cents: row.amount_cents,
            status: parse_column("dues", &row.status, DueStatus::parse)?,
            due_date: row.due_date,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ExemptionRow {
    exemption_id: Uuid,
    member_id: Uuid,
    month: String,
    reason: String,
    approved_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExemptionRow> for Exemption {
    type Error = Error;

    fn try_from(row: ExemptionRow) -> Result<Self, Self::Error> {
        Ok(Exemption {
            exemption_id: row.exemption_id,
            member_id: row.member_id,
            month: parse_month("exemptions", &row.month)?,
            reason: row.reason,
            approved_by: row.approved_by,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct FineRow {
    fine_id: Uuid,
    member_id: Uuid,
    event_id: Option<Uuid>,
    kind: String,
    amount_cents: i64,
    paid: bool,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<FineRow> for Fine {
    type Error = Error;

    fn try_from(row: FineRow) -> Result<Self, Self::Error> {
        Ok(Fine {
            fine_id: row.fine_id,
            member_id: row.member_id,
            event_id: row.event_id,
            kind: parse_column("fines", &row.kind, FineKind::parse)?,
            amount_cents: row.amount_cents,
            paid: row.paid,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    member_id: Uuid,
    due_id: Option<Uuid>,
    fine_id: Option<Uuid>,
    amount_cents: i64,
    status: String,
    proof_url: Option<String>,
    created_at: DateTime<Utc>,
    confirmed_by: Option<Uuid>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = Error;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let target = match (row.due_id, row.fine_id) {
            (Some(due_id), None) => PaymentTarget::Due(due_id),
            (None, Some(fine_id)) => PaymentTarget::Fine(fine_id),
            _ => {
                return Err(corrupt(
                    "payments",
                    format!("payment {} must reference one due or one fine", row.payment_id),
                ))
            }
        };
        Ok(Payment {
            payment_id: row.payment_id,
            member_id: row.member_id,
            target,
            amount_cents: row.amount_cents,
            status: parse_column("payments", &row.status, PaymentStatus::parse)?,
            proof_url: row.proof_url,
            created_at: row.created_at,
            confirmed_by: row.confirmed_by,
            confirmed_at: row.confirmed_at,
        })
    }
}

#[derive(FromRow)]
struct CashRow {
    entry_id: Uuid,
    direction: String,
    category: String,
    amount_cents: i64,
    reference: Option<String>,
    note: Option<String>,
    posted_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<CashRow> for CashEntry {
    type Error = Error;

    fn try_from(row: CashRow) -> Result<Self, Self::Error> {
        Ok(CashEntry {
            entry_id: row.entry_id,
            direction: parse_column("cash_entries", &row.direction, CashDirection::parse)?,
            category: CashCategory::from(row.category.as_str()),
            amount_cents: row.amount_cents,
            reference: row.reference,
            note: row.note,
            posted_by: row.posted_by,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct PointsRow {
    entry_id: Uuid,
    member_id: Uuid,
    event_id: Uuid,
    points: i64,
    goals: i64,
    team: Option<String>,
    reason: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PointsRow> for PointsEntry {
    type Error = Error;

    fn try_from(row: PointsRow) -> Result<Self, Self::Error> {
        let team = row
            .team
            .as_deref()
            .map(|team| parse_column("points_entries", team, TeamSide::parse))
            .transpose()?;
        Ok(PointsEntry {
            entry_id: row.entry_id,
            member_id: row.member_id,
            event_id: row.event_id,
            points: row.points,
            goals: row.goals,
            team,
            reason: parse_column("points_entries", &row.reason, PointsReason::parse)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AuditRow {
    entry_id: Uuid,
    action: String,
    member_id: Option<Uuid>,
    details: Option<String>,
    recorded_by: Uuid,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditEntry {
    fn from(row: AuditRow) -> Self {
        AuditEntry {
            entry_id: row.entry_id,
            action: row.action,
            member_id: row.member_id,
            details: row.details,
            recorded_by: row.recorded_by,
            created_at: row.created_at,
        }
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, Error>
where
    T: TryFrom<R, Error = Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

async fn write_event(conn: &mut SqliteConnection, event: &Event) -> Result<u64, Error> {
    let teams_json = event.teams.as_ref().map(serde_json::to_string).transpose()?;
    let named_score_json = event
        .named_score
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let res = sqlx::query(
        r#"UPDATE events SET
            kind = ?,
            starts_at = ?,
            location = ?,
            rsvp_deadline = ?,
            drawn = ?,
            teams_json = ?,
            score_black = ?,
            score_white = ?,
            score_finalized = ?,
            named_score_json = ?
        WHERE event_id = ?"#,
    )
    .bind(event.kind.as_str())
    .bind(event.starts_at)
    .bind(event.location.as_str())
    .bind(event.rsvp_deadline)
    .bind(event.is_drawn())
    .bind(teams_json)
    .bind(i64::from(event.score.black))
    .bind(i64::from(event.score.white))
    .bind(event.score.finalized)
    .bind(named_score_json)
    .bind(event.event_id)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected())
}

async fn insert_cash(conn: &mut SqliteConnection, entry: &CashEntry) -> Result<(), Error> {
    sqlx::query(
        r#"INSERT INTO cash_entries (
            entry_id, direction, category, amount_cents, reference, note, posted_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(entry.entry_id)
    .bind(entry.direction.as_str())
    .bind(entry.category.as_str())
    .bind(entry.amount_cents)
    .bind(entry.reference.as_deref())
    .bind(entry.note.as_deref())
    .bind(entry.posted_by)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_fine(conn: &mut SqliteConnection, fine: &Fine) -> Result<(), Error> {
    sqlx::query(
        r#"INSERT INTO fines (
            fine_id, member_id, event_id, kind, amount_cents, paid, note, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(fine.fine_id)
    .bind(fine.member_id)
    .bind(fine.event_id)
    .bind(fine.kind.as_str())
    .bind(fine.amount_cents)
    .bind(fine.paid)
    .bind(fine.note.as_deref())
    .bind(fine.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_points_entry(
    conn: &mut SqliteConnection,
    entry: &PointsEntry,
) -> Result<(), Error> {
    sqlx::query(
        r#"INSERT INTO points_entries (
            entry_id, member_id, event_id, points, goals, team, reason, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(entry.entry_id)
    .bind(entry.member_id)
    .bind(entry.event_id)
    .bind(entry.points)
    .bind(entry.goals)
    .bind(entry.team.map(|team| team.as_str()))
    .bind(entry.reason.as_str())
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_event(conn: &mut SqliteConnection, event_id: Uuid) -> Result<Event, Error> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = ?");
    sqlx::query_as::<_, EventRow>(&sql)
        .bind(event_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(Error::NotFound {
            entity: "event",
            id: event_id,
        })?
        .try_into()
}

async fn fetch_due(conn: &mut SqliteConnection, due_id: Uuid) -> Result<Due, Error> {
    let sql = format!("SELECT {DUE_COLUMNS} FROM dues WHERE due_id = ?");
    sqlx::query_as::<_, DueRow>(&sql)
        .bind(due_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(Error::NotFound {
            entity: "due",
            id: due_id,
        })?
        .try_into()
}

async fn fetch_payment(conn: &mut SqliteConnection, payment_id: Uuid) -> Result<Payment, Error> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = ?");
    sqlx::query_as::<_, PaymentRow>(&sql)
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(Error::NotFound {
            entity: "payment",
            id: payment_id,
        })?
        .try_into()
}

#[async_trait::async_trait]
impl DatabasePort for SqliteDatabase {
    async fn insert_event(&self, event: Event) -> Result<Event, Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"INSERT INTO events (event_id, kind, starts_at, location, created_at)
            VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(event.event_id)
        .bind(event.kind.as_str())
        .bind(event.starts_at)
        .bind(event.location.as_str())
        .bind(event.created_at)
        .execute(&mut *conn)
        .await?;
        // The remaining columns go through the regular update path
        write_event(&mut conn, &event).await?;
        fetch_event(&mut conn, event.event_id).await
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Event, Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_event(&mut conn, event_id).await
    }

    async fn update_event(&self, event: Event) -> Result<Event, Error> {
        let mut conn = self.pool.acquire().await?;
        if write_event(&mut conn, &event).await? == 0 {
            return Err(Error::NotFound {
                entity: "event",
                id: event.event_id,
            });
        }
        fetch_event(&mut conn, event.event_id).await
    }

    async fn list_events(&self, filter: EventFilter) -> Result<Vec<Event>, Error> {
        let mut qry =
            QueryBuilder::<Sqlite>::new(format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1"));
        if let Some(after) = filter.starts_after {
            qry.push(" AND starts_at >= ").push_bind(after);
        }
        if let Some(before) = filter.starts_before {
            qry.push(" AND starts_at < ").push_bind(before);
        }
        qry.push(" ORDER BY starts_at ASC");

        let rows: Vec<EventRow> = qry.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<Event, Error> {
        let mut tx = self.pool.begin().await?;
        let event = fetch_event(&mut tx, event_id).await?;

        let (referenced,): (bool,) = sqlx::query_as(
            r#"SELECT EXISTS (SELECT 1 FROM fines WHERE event_id = ?)
                OR EXISTS (SELECT 1 FROM points_entries WHERE event_id = ?)"#,
        )
        .bind(event_id)
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;
        if referenced {
            return Err(Error::Conflict(
                format!("event {event_id} has fines or points booked against it").into(),
            ));
        }

        for table in ["rsvps", "attendance", "events"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE event_id = ?"))
                .bind(event_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(event)
    }

    async fn draw_teams(&self, event_id: Uuid, teams: DrawnTeams) -> Result<Event, Error> {
        let teams_json = serde_json::to_string(&teams)?;
        let mut conn = self.pool.acquire().await?;
        let res = sqlx::query(
            "UPDATE events SET drawn = 1, teams_json = ? WHERE event_id = ? AND drawn = 0",
        )
        .bind(teams_json)
        .bind(event_id)
        .execute(&mut *conn)
        .await?;

        if res.rows_affected() == 0 {
            // Either the event is missing or somebody drew first
            fetch_event(&mut conn, event_id).await?;
            return Err(Error::AlreadyDrawn(event_id));
        }
        fetch_event(&mut conn, event_id).await
    }

    async fn record_score(
        &self,
        event: Event,
        entries: Vec<PointsEntry>,
        replace_existing: bool,
    ) -> Result<Event, Error> {
        let mut tx = self.pool.begin().await?;
        if replace_existing {
            sqlx::query("DELETE FROM points_entries WHERE event_id = ? AND reason = ?")
                .bind(event.event_id)
                .bind(PointsReason::TeamGoals.as_str())
                .execute(&mut *tx)
                .await?;
        }
        if write_event(&mut tx, &event).await? == 0 {
            return Err(Error::NotFound {
                entity: "event",
                id: event.event_id,
            });
        }
        for entry in &entries {
            insert_points_entry(&mut tx, entry).await?;
        }
        let event = fetch_event(&mut tx, event.event_id).await?;
        tx.commit().await?;
        Ok(event)
    }

    async fn upsert_rsvp(&self, rsvp: Rsvp) -> Result<Rsvp, Error> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"INSERT INTO rsvps (event_id, member_id, status, updated_at) VALUES (?, ?, ?, ?)
            ON CONFLICT (event_id, member_id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at >= rsvps.updated_at"#,
        )
        .bind(rsvp.event_id)
        .bind(rsvp.member_id)
        .bind(rsvp.status.as_str())
        .bind(rsvp.updated_at)
        .execute(&mut *conn)
        .await?;

        let row: RsvpRow = sqlx::query_as(
            r#"SELECT event_id, member_id, status, updated_at
            FROM rsvps WHERE event_id = ? AND member_id = ?"#,
        )
        .bind(rsvp.event_id)
        .bind(rsvp.member_id)
        .fetch_one(&mut *conn)
        .await?;
        row.try_into()
    }

    async fn get_rsvp(&self, event_id: Uuid, member_id: Uuid) -> Result<Option<Rsvp>, Error> {
        let row: Option<RsvpRow> = sqlx::query_as(
            r#"SELECT event_id, member_id, status, updated_at
            FROM rsvps WHERE event_id = ? AND member_id = ?"#,
        )
        .bind(event_id)
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Rsvp::try_from).transpose()
    }

    async fn list_rsvps(&self, event_id: Uuid) -> Result<Vec<Rsvp>, Error> {
        let rows: Vec<RsvpRow> = sqlx::query_as(
            r#"SELECT event_id, member_id, status, updated_at
            FROM rsvps WHERE event_id = ? ORDER BY updated_at ASC"#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn record_attendance(
        &self,
        attendance: Attendance,
        fine: Option<(Fine, CashEntry)>,
        points: Option<PointsEntry>,
    ) -> Result<Attendance, Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO attendance (event_id, member_id, status, recorded_by, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (event_id, member_id) DO UPDATE SET
                status = excluded.status,
                recorded_by = excluded.recorded_by,
                recorded_at = excluded.recorded_at"#,
        )
        .bind(attendance.event_id)
        .bind(attendance.member_id)
        .bind(attendance.status.as_str())
        .bind(attendance.recorded_by)
        .bind(attendance.recorded_at)
        .execute(&mut *tx)
        .await?;
        if let Some((fine, entry)) = &fine {
            insert_fine(&mut tx, fine).await?;
            insert_cash(&mut tx, entry).await?;
        }
        if let Some(entry) = &points {
            insert_points_entry(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(attendance)
    }

    async fn get_attendance(
        &self,
        event_id: Uuid,
        member_id: Uuid,
    ) -> Result<Option<Attendance>, Error> {
        let row: Option<AttendanceRow> = sqlx::query_as(
            r#"SELECT event_id, member_id, status, recorded_by, recorded_at
            FROM attendance WHERE event_id = ? AND member_id = ?"#,
        )
        .bind(event_id)
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attendance::try_from).transpose()
    }

    async fn list_attendance(&self, filter: AttendanceFilter) -> Result<Vec<Attendance>, Error> {
        let mut qry = QueryBuilder::<Sqlite>::new(
            "SELECT event_id, member_id, status, recorded_by, recorded_at FROM attendance WHERE 1",
        );
        if let Some(event_id) = filter.event_id {
            qry.push(" AND event_id = ").push_bind(event_id);
        }
        if let Some(member_id) = filter.member_id {
            qry.push(" AND member_id = ").push_bind(member_id);
        }
        qry.push(" ORDER BY recorded_at ASC");

        let rows: Vec<AttendanceRow> = qry.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn insert_dues(&self, dues: Vec<Due>) -> Result<Vec<Due>, Error> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(dues.len());
        for mut due in dues {
            let (exempt,): (bool,) = sqlx::query_as(
                "SELECT EXISTS (SELECT 1 FROM exemptions WHERE member_id = ? AND month = ?)",
            )
            .bind(due.member_id)
            .bind(due.month.to_string())
            .fetch_one(&mut *tx)
            .await?;
            if exempt {
                due.exempt();
            }

            let res = sqlx::query(
                r#"INSERT INTO dues (
                    due_id, member_id, month, amount_cents, status, due_date, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (member_id, month) DO NOTHING"#,
            )
            .bind(due.due_id)
            .bind(due.member_id)
            .bind(due.month.to_string())
            .bind(due.amount_cents)
            .bind(due.status.as_str())
            .bind(due.due_date)
            .bind(due.created_at)
            .execute(&mut *tx)
            .await?;
            if res.rows_affected() == 1 {
                created.push(due);
            }
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn get_due(&self, due_id: Uuid) -> Result<Due, Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_due(&mut conn, due_id).await
    }

    async fn list_dues(&self, filter: DueFilter) -> Result<Vec<Due>, Error> {
        let mut qry =
            QueryBuilder::<Sqlite>::new(format!("SELECT {DUE_COLUMNS} FROM dues WHERE 1"));
        if let Some(member_id) = filter.member_id {
            qry.push(" AND member_id = ").push_bind(member_id);
        }
        if let Some(month) = filter.month {
            qry.push(" AND month = ").push_bind(month.to_string());
        }
        if let Some(status) = filter.status {
            qry.push(" AND status = ").push_bind(status.as_str());
        }
        qry.push(" ORDER BY month DESC");

        let rows: Vec<DueRow> = qry.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn apply_exemption(
        &self,
        exemption: Exemption,
    ) -> Result<(Exemption, Option<Due>), Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"INSERT INTO exemptions (
                exemption_id, member_id, month, reason, approved_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(exemption.exemption_id)
        .bind(exemption.member_id)
        .bind(exemption.month.to_string())
        .bind(exemption.reason.as_str())
        .bind(exemption.approved_by)
        .bind(exemption.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE dues SET status = ?, amount_cents = 0 WHERE member_id = ? AND month = ?",
        )
        .bind(DueStatus::Exempt.as_str())
        .bind(exemption.member_id)
        .bind(exemption.month.to_string())
        .execute(&mut *tx)
        .await?;

        let sql = format!("SELECT {DUE_COLUMNS} FROM dues WHERE member_id = ? AND month = ?");
        let row: Option<DueRow> = sqlx::query_as(&sql)
            .bind(exemption.member_id)
            .bind(exemption.month.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let due = row.map(Due::try_from).transpose()?;

        tx.commit().await?;
        Ok((exemption, due))
    }

    async fn list_exemptions(&self, month: YearMonth) -> Result<Vec<Exemption>, Error> {
        let rows: Vec<ExemptionRow> = sqlx::query_as(
            r#"SELECT exemption_id, member_id, month, reason, approved_by, created_at
            FROM exemptions WHERE month = ?"#,
        )
        .bind(month.to_string())
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn record_fine(&self, fine: Fine, entry: CashEntry) -> Result<(Fine, CashEntry), Error> {
        let mut tx = self.pool.begin().await?;
        insert_fine(&mut tx, &fine).await?;
        insert_cash(&mut tx, &entry).await?;
        tx.commit().await?;
        Ok((fine, entry))
    }

    async fn get_fine(&self, fine_id: Uuid) -> Result<Fine, Error> {
        let sql = format!("SELECT {FINE_COLUMNS} FROM fines WHERE fine_id = ?");
        sqlx::query_as::<_, FineRow>(&sql)
            .bind(fine_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound {
                entity: "fine",
                id: fine_id,
            })?
            .try_into()
    }

    async fn list_fines(&self, filter: FineFilter) -> Result<Vec<Fine>, Error> {
        let mut qry =
            QueryBuilder::<Sqlite>::new(format!("SELECT {FINE_COLUMNS} FROM fines WHERE 1"));
        if let Some(member_id) = filter.member_id {
            qry.push(" AND member_id = ").push_bind(member_id);
        }
        if let Some(event_id) = filter.event_id {
            qry.push(" AND event_id = ").push_bind(event_id);
        }
        if let Some(paid) = filter.paid {
            qry.push(" AND paid = ").push_bind(paid);
        }
        if let Some(after) = filter.created_after {
            qry.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(before) = filter.created_before {
            qry.push(" AND created_at < ").push_bind(before);
        }
        qry.push(" ORDER BY created_at DESC, rowid DESC");

        let rows: Vec<FineRow> = qry.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn insert_payment(&self, payment: Payment) -> Result<Payment, Error> {
        let (due_id, fine_id) = match payment.target {
            PaymentTarget::Due(due_id) => (Some(due_id), None),
            PaymentTarget::Fine(fine_id) => (None, Some(fine_id)),
        };
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"INSERT INTO payments (
                payment_id, member_id, due_id, fine_id, amount_cents, status, proof_url,
                created_at, confirmed_by, confirmed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(payment.payment_id)
        .bind(payment.member_id)
        .bind(due_id)
        .bind(fine_id)
        .bind(payment.amount_cents)
        .bind(payment.status.as_str())
        .bind(payment.proof_url.as_deref())
        .bind(payment.created_at)
        .bind(payment.confirmed_by)
        .bind(payment.confirmed_at)
        .execute(&mut *conn)
        .await?;
        fetch_payment(&mut conn, payment.payment_id).await
    }

    async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, Error> {
        let mut conn = self.pool.acquire().await?;
        fetch_payment(&mut conn, payment_id).await
    }

    async fn list_payments(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>, Error> {
        let mut qry =
            QueryBuilder::<Sqlite>::new(format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE 1"));
        if let Some(status) = status {
            qry.push(" AND status = ").push_bind(status.as_str());
        }
        qry.push(" ORDER BY created_at ASC");

        let rows: Vec<PaymentRow> = qry.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn confirm_payment(
        &self,
        payment_id: Uuid,
        confirmed_by: Uuid,
        entry: CashEntry,
    ) -> Result<Payment, Error> {
        let mut tx = self.pool.begin().await?;
        let payment = fetch_payment(&mut tx, payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(Error::Conflict(
                format!("payment {payment_id} is already confirmed").into(),
            ));
        }

        let (sql, target_id, entity) = match payment.target {
            PaymentTarget::Due(due_id) => {
                ("UPDATE dues SET status = 'PAID' WHERE due_id = ?", due_id, "due")
            }
            PaymentTarget::Fine(fine_id) => {
                ("UPDATE fines SET paid = 1 WHERE fine_id = ?", fine_id, "fine")
            }
        };
        let res = sqlx::query(sql).bind(target_id).execute(&mut *tx).await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound {
                entity,
                id: target_id,
            });
        }

        sqlx::query(
            r#"UPDATE payments SET status = ?, confirmed_by = ?, confirmed_at = ?
            WHERE payment_id = ?"#,
        )
        .bind(PaymentStatus::Confirmed.as_str())
        .bind(confirmed_by)
        .bind(Utc::now())
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;
        insert_cash(&mut tx, &entry).await?;

        let payment = fetch_payment(&mut tx, payment_id).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn insert_cash_entry(&self, entry: CashEntry) -> Result<CashEntry, Error> {
        let mut conn = self.pool.acquire().await?;
        insert_cash(&mut conn, &entry).await?;
        Ok(entry)
    }

    async fn list_cash_entries(&self, filter: CashFilter) -> Result<Vec<CashEntry>, Error> {
        let mut qry =
            QueryBuilder::<Sqlite>::new(format!("SELECT {CASH_COLUMNS} FROM cash_entries WHERE 1"));
        if let Some(from) = filter.from {
            qry.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qry.push(" AND created_at < ").push_bind(to);
        }
        qry.push(" ORDER BY created_at DESC, rowid DESC");

        let rows: Vec<CashRow> = qry.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn insert_points(&self, entries: Vec<PointsEntry>) -> Result<Vec<PointsEntry>, Error> {
        let mut tx = self.pool.begin().await?;
        for entry in &entries {
            insert_points_entry(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(entries)
    }

    async fn list_points(&self, filter: PointsFilter) -> Result<Vec<PointsEntry>, Error> {
        let mut qry = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {POINTS_COLUMNS} FROM points_entries WHERE 1"
        ));
        if let Some(member_id) = filter.member_id {
            qry.push(" AND member_id = ").push_bind(member_id);
        }
        if let Some(event_id) = filter.event_id {
            qry.push(" AND event_id = ").push_bind(event_id);
        }
        if let Some(reason) = filter.reason {
            qry.push(" AND reason = ").push_bind(reason.as_str());
        }
        if let Some(from) = filter.from {
            qry.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            qry.push(" AND created_at < ").push_bind(to);
        }
        qry.push(" ORDER BY rowid ASC");

        let rows: Vec<PointsRow> = qry.build_query_as().fetch_all(&self.pool).await?;
        convert_all(rows)
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        sqlx::query(
            r#"INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_audit_entry(&self, entry: AuditEntry) -> Result<AuditEntry, Error> {
        sqlx::query(
            r#"INSERT INTO audit_entries (
                entry_id, action, member_id, details, recorded_by, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.entry_id)
        .bind(entry.action.as_str())
        .bind(entry.member_id)
        .bind(entry.details.as_deref())
        .bind(entry.recorded_by)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(entry)
    }

    async fn list_audit_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, Error> {
        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_entries ORDER BY created_at DESC, rowid DESC LIMIT ?"
        );
        let rows: Vec<AuditRow> = sqlx::query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}

#[async_trait::async_trait]
impl MemberPort for SqliteDatabase {
    async fn get_member(&self, member_id: Uuid) -> Result<Member, member::Error> {
        let row: Option<MemberRow> = sqlx::query_as(
            "SELECT member_id, name, email, active, created_at FROM members WHERE member_id = ?",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Member::from)
            .ok_or(member::Error::MemberDoesNotExist(member_id))
    }

    async fn list_members(&self, active_only: bool) -> Result<Vec<Member>, member::Error> {
        let mut qry = QueryBuilder::<Sqlite>::new(
            "SELECT member_id, name, email, active, created_at FROM members WHERE 1",
        );
        if active_only {
            qry.push(" AND active = 1");
        }
        qry.push(" ORDER BY name ASC");

        let rows: Vec<MemberRow> = qry.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Member::from).collect())
    }

    async fn insert_member(&self, member: Member) -> Result<Member, member::Error> {
        let res = sqlx::query(
            r#"INSERT INTO members (member_id, name, email, active, created_at)
            VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(member.member_id)
        .bind(member.name.as_str())
        .bind(member.email.as_str())
        .bind(member.active)
        .bind(member.created_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => self.get_member(member.member_id).await,
            Err(err)
                if err
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false) =>
            {
                Err(member::Error::EmailTaken(member.email))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn set_member_active(
        &self,
        member_id: Uuid,
        active: bool,
    ) -> Result<Member, member::Error> {
        let res = sqlx::query("UPDATE members SET active = ? WHERE member_id = ?")
            .bind(active)
            .bind(member_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(member::Error::MemberDoesNotExist(member_id));
        }
        self.get_member(member_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NamedScore, PlayerRef};
    use chrono::Duration;
    use rstest::*;
    use speculoos::prelude::*;

    async fn database_with_member() -> (SqliteDatabase, Member) {
        let database = SqliteDatabase::in_memory().await.unwrap();
        let member = database
            .insert_member(Member::new("Ana", "ana@patota.club"))
            .await
            .unwrap();
        (database, member)
    }

    #[fixture]
    fn month() -> YearMonth {
        YearMonth::new(2024, 5).unwrap()
    }

    #[tokio::test]
    async fn test_member_insert_and_email_conflict() {
        let (database, ana) = database_with_member().await;

        assert_that!(database.get_member(ana.member_id).await)
            .is_ok()
            .matches(|m| m.name == "Ana" && m.active);

        let res = database
            .insert_member(Member::new("Other Ana", "ANA@patota.club"))
            .await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, member::Error::EmailTaken(_)));
    }

    #[tokio::test]
    async fn test_event_roundtrip_with_teams_and_named_score() {
        let (database, ana) = database_with_member().await;
        let mut event = Event::new(EventKind::Game, Utc::now() + Duration::days(1), "Quadra");
        event.rsvp_deadline = Some(Utc::now() + Duration::hours(20));
        let event = database.insert_event(event).await.unwrap();

        let teams = DrawnTeams {
            black: vec![PlayerRef {
                member_id: ana.member_id,
                name: ana.name.clone(),
            }],
            white: vec![],
            drawn_at: Utc::now(),
            drawn_by: ana.member_id,
        };
        let drawn = database.draw_teams(event.event_id, teams.clone()).await.unwrap();
        assert_that!(drawn.teams).is_equal_to(Some(teams.clone()));

        let res = database.draw_teams(event.event_id, teams).await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::AlreadyDrawn(_)));

        let mut updated = drawn.clone();
        updated.named_score = Some(NamedScore {
            team_a_name: "Patota".to_string(),
            team_a_score: 4,
            team_b_name: "Visitors".to_string(),
            team_b_score: 2,
        });
        let updated = database.update_event(updated).await.unwrap();
        assert_that!(database.get_event(event.event_id).await)
            .is_ok()
            .is_equal_to(updated);
    }

    #[tokio::test]
    async fn test_draw_teams_missing_event() {
        let database = SqliteDatabase::in_memory().await.unwrap();
        let res = database
            .draw_teams(
                Uuid::new_v4(),
                DrawnTeams {
                    black: vec![],
                    white: vec![],
                    drawn_at: Utc::now(),
                    drawn_by: Uuid::new_v4(),
                },
            )
            .await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::NotFound { entity: "event", .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn test_insert_dues_is_idempotent(month: YearMonth) {
        let (database, ana) = database_with_member().await;

        let first = database
            .insert_dues(vec![Due::for_month(ana.member_id, month, 3500, 10, false)])
            .await;
        assert_that!(first).is_ok().has_length(1);

        let second = database
            .insert_dues(vec![Due::for_month(ana.member_id, month, 3500, 10, false)])
            .await;
        assert_that!(second).is_ok().is_empty();

        let dues = database
            .list_dues(DueFilter {
                member_id: Some(ana.member_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_that!(dues).has_length(1);
        assert_that!(dues[0].month).is_equal_to(month);
    }

    #[rstest]
    #[tokio::test]
    async fn test_apply_exemption_zeroes_existing_due(month: YearMonth) {
        let (database, ana) = database_with_member().await;
        database
            .insert_dues(vec![Due::for_month(ana.member_id, month, 3500, 10, false)])
            .await
            .unwrap();
        let exemption = Exemption {
            exemption_id: Uuid::new_v4(),
            member_id: ana.member_id,
            month,
            reason: "injury".to_string(),
            approved_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };

        let res = database.apply_exemption(exemption.clone()).await;
        assert_that!(res).is_ok().matches(|(_, due)| {
            matches!(due, Some(due) if due.status == DueStatus::Exempt && due.amount_cents == 0)
        });

        // Same (member, month) again is a conflict
        let res = database
            .apply_exemption(Exemption {
                exemption_id: Uuid::new_v4(),
                ..exemption
            })
            .await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::Conflict(_)));
        assert_that!(database.list_exemptions(month).await)
            .is_ok()
            .has_length(1);
    }

    #[tokio::test]
    async fn test_record_fine_rolls_back_without_cash_entry() {
        let (database, ana) = database_with_member().await;
        let fine = Fine::new(ana.member_id, None, FineKind::Late, 500);
        let entry = fine.cash_entry(ana.member_id);
        database.record_fine(fine, entry.clone()).await.unwrap();

        // Reusing the cash entry id makes the second insert fail after the fine went in
        let second = Fine::new(ana.member_id, None, FineKind::Late, 500);
        let res = database.record_fine(second.clone(), entry).await;
        assert_that!(res).is_err();

        assert_that!(database.get_fine(second.fine_id).await)
            .is_err()
            .matches(|err| matches!(err, Error::NotFound { .. }));
        assert_that!(database.list_fines(FineFilter::default()).await)
            .is_ok()
            .has_length(1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_confirm_payment_for_due(month: YearMonth) {
        let (database, ana) = database_with_member().await;
        let due = database
            .insert_dues(vec![Due::for_month(ana.member_id, month, 3500, 10, false)])
            .await
            .unwrap()
            .remove(0);
        let payment = database
            .insert_payment(Payment {
                payment_id: Uuid::new_v4(),
                member_id: ana.member_id,
                target: PaymentTarget::Due(due.due_id),
                amount_cents: 3500,
                status: PaymentStatus::Pending,
                proof_url: Some("https://files.example/proof.png".to_string()),
                created_at: Utc::now(),
                confirmed_by: None,
                confirmed_at: None,
            })
            .await
            .unwrap();
        let admin = Uuid::new_v4();

        let res = database
            .confirm_payment(payment.payment_id, admin, payment.cash_entry(admin))
            .await;
        assert_that!(res)
            .is_ok()
            .matches(|p| p.status == PaymentStatus::Confirmed && p.confirmed_at.is_some());
        assert_that!(database.get_due(due.due_id).await)
            .is_ok()
            .matches(|d| d.status == DueStatus::Paid);

        let entries = database.list_cash_entries(CashFilter::default()).await.unwrap();
        assert_that!(entries).has_length(1);
        assert_that!(entries[0].category).is_equal_to(CashCategory::Dues);
        assert_that!(database.list_payments(Some(PaymentStatus::Pending)).await)
            .is_ok()
            .is_empty();
    }

    #[tokio::test]
    async fn test_record_score_replaces_team_goals() {
        let (database, ana) = database_with_member().await;
        let mut event = database
            .insert_event(Event::new(EventKind::Game, Utc::now(), "Quadra"))
            .await
            .unwrap();
        database
            .insert_points(vec![PointsEntry::attendance(ana.member_id, event.event_id, 1)])
            .await
            .unwrap();

        event.score = TeamScore {
            black: 3,
            white: 1,
            finalized: true,
        };
        database
            .record_score(
                event.clone(),
                vec![PointsEntry::team_goals(ana.member_id, event.event_id, TeamSide::Black, 3)],
                false,
            )
            .await
            .unwrap();

        event.score.black = 2;
        let stored = database
            .record_score(
                event.clone(),
                vec![PointsEntry::team_goals(ana.member_id, event.event_id, TeamSide::Black, 2)],
                true,
            )
            .await
            .unwrap();
        assert_that!(stored.score.black).is_equal_to(2);

        let points = database
            .list_points(PointsFilter {
                member_id: Some(ana.member_id),
                ..Default::default()
            })
            .await
            .unwrap();
        let total: i64 = points.iter().map(|p| p.points).sum();
        assert_that!(total).is_equal_to(3);
        assert_that!(points).has_length(2);
    }

    #[tokio::test]
    async fn test_rsvp_upsert_and_attendance() {
        let (database, ana) = database_with_member().await;
        let event = database
            .insert_event(Event::new(EventKind::Game, Utc::now(), "Quadra"))
            .await
            .unwrap();
        let now = Utc::now();

        database
            .upsert_rsvp(Rsvp {
                event_id: event.event_id,
                member_id: ana.member_id,
                status: RsvpStatus::Going,
                updated_at: now,
            })
            .await
            .unwrap();
        let stale = database
            .upsert_rsvp(Rsvp {
                event_id: event.event_id,
                member_id: ana.member_id,
                status: RsvpStatus::NotGoing,
                updated_at: now - Duration::minutes(1),
            })
            .await;
        assert_that!(stale)
            .is_ok()
            .matches(|r| r.status == RsvpStatus::Going);

        for status in [AttendanceStatus::Late, AttendanceStatus::Present] {
            database
                .record_attendance(
                    Attendance {
                        event_id: event.event_id,
                        member_id: ana.member_id,
                        status,
                        recorded_by: ana.member_id,
                        recorded_at: Utc::now(),
                    },
                    None,
                    None,
                )
                .await
                .unwrap();
        }
        assert_that!(database.get_attendance(event.event_id, ana.member_id).await)
            .is_ok()
            .matches(|a| matches!(a, Some(a) if a.status == AttendanceStatus::Present));
        assert_that!(
            database
                .list_attendance(AttendanceFilter {
                    member_id: Some(ana.member_id),
                    ..Default::default()
                })
                .await
        )
        .is_ok()
        .has_length(1);
    }

    #[tokio::test]
    async fn test_record_attendance_is_all_or_nothing() {
        let (database, ana) = database_with_member().await;
        let event = database
            .insert_event(Event::new(EventKind::Game, Utc::now(), "Quadra"))
            .await
            .unwrap();
        let attendance = |status| Attendance {
            event_id: event.event_id,
            member_id: ana.member_id,
            status,
            recorded_by: ana.member_id,
            recorded_at: Utc::now(),
        };
        let fine = Fine::new(ana.member_id, Some(event.event_id), FineKind::Late, 500);
        let entry = fine.cash_entry(ana.member_id);
        database
            .record_attendance(
                attendance(AttendanceStatus::Absent),
                Some((fine.clone(), entry.clone())),
                None,
            )
            .await
            .unwrap();

        // Reusing the fine id fails after the attendance row was written
        let res = database
            .record_attendance(
                attendance(AttendanceStatus::Late),
                Some((fine, entry)),
                Some(PointsEntry::attendance(ana.member_id, event.event_id, 1)),
            )
            .await;
        assert_that!(res).is_err();

        assert_that!(database.get_attendance(event.event_id, ana.member_id).await)
            .is_ok()
            .matches(|a| matches!(a, Some(a) if a.status == AttendanceStatus::Absent));
        assert_that!(database.list_fines(FineFilter::default()).await)
            .is_ok()
            .has_length(1);
        assert_that!(database.list_points(PointsFilter::default()).await)
            .is_ok()
            .is_empty();
    }

    #[rstest]
    #[tokio::test]
    async fn test_insert_dues_honours_exemptions(month: YearMonth) {
        let (database, ana) = database_with_member().await;
        database
            .apply_exemption(Exemption {
                exemption_id: Uuid::new_v4(),
                member_id: ana.member_id,
                month,
                reason: "injury".to_string(),
                approved_by: Uuid::new_v4(),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        // The caller did not know about the exemption
        let res = database
            .insert_dues(vec![Due::for_month(ana.member_id, month, 3500, 10, false)])
            .await;

        assert_that!(res).is_ok().matches(|created| {
            created.len() == 1
                && created[0].status == DueStatus::Exempt
                && created[0].amount_cents == 0
        });
    }

    #[tokio::test]
    async fn test_delete_event() {
        let (database, ana) = database_with_member().await;
        let event = database
            .insert_event(Event::new(EventKind::Internal, Utc::now(), "Sede"))
            .await
            .unwrap();
        database
            .upsert_rsvp(Rsvp {
                event_id: event.event_id,
                member_id: ana.member_id,
                status: RsvpStatus::Going,
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        let booked = database
            .insert_event(Event::new(EventKind::Game, Utc::now(), "Quadra"))
            .await
            .unwrap();
        database
            .insert_points(vec![PointsEntry::attendance(ana.member_id, booked.event_id, 1)])
            .await
            .unwrap();

        assert_that!(database.delete_event(event.event_id).await)
            .is_ok()
            .matches(|e| e.event_id == event.event_id);
        assert_that!(database.list_rsvps(event.event_id).await)
            .is_ok()
            .is_empty();
        assert_that!(database.get_event(event.event_id).await)
            .is_err()
            .matches(|err| matches!(err, Error::NotFound { .. }));

        assert_that!(database.delete_event(booked.event_id).await)
            .is_err()
            .matches(|err| matches!(err, Error::Conflict(_)));
        assert_that!(database.get_event(booked.event_id).await).is_ok();
    }

    #[tokio::test]
    async fn test_settings_and_audit_entries() {
        let (database, ana) = database_with_member().await;

        assert_that!(database.get_setting("pix_key").await)
            .is_ok()
            .is_none();
        database.put_setting("pix_key", "club@pix").await.unwrap();
        database.put_setting("pix_key", "caixa@pix").await.unwrap();
        assert_that!(database.get_setting("pix_key").await)
            .is_ok()
            .is_equal_to(Some("caixa@pix".to_string()));

        let now = Utc::now();
        for (action, minutes) in [("first", 10), ("second", 5), ("third", 0)] {
            database
                .insert_audit_entry(AuditEntry {
                    member_id: Some(ana.member_id),
                    created_at: now - Duration::minutes(minutes),
                    ..AuditEntry::new(action, ana.member_id)
                })
                .await
                .unwrap();
        }
        let entries = database.list_audit_entries(2).await.unwrap();
        let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_that!(actions).is_equal_to(vec!["third", "second"]);
    }
}
