//! Admin command line over the club operations
//!
//! Every subcommand runs one request through [`DomainLogic`] on behalf of the operator, who acts
//! with the admin role. Records are printed as JSON, summaries as plain text.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    commands::{
        attendance::{AddGuestRequest, RecordAttendanceRequest},
        audit::{AuditLogRequest, RecordAuditRequest},
        cash::{CashBalanceRequest, CashLedgerRequest, CashOutRequest},
        dues::{CreateExemptionRequest, GenerateDuesRequest},
        events::{
            ConfirmPresenceRequest, CreateEventRequest, DeleteEventRequest, EventDetailsRequest,
            ListEventsRequest, NextEventRequest, PendingRsvpsRequest, SetNamedScoreRequest,
            TeamRosterRequest, UpdateEventRequest,
        },
        members::{AddMemberRequest, ListMembersRequest, SetMemberActiveRequest},
        payments::{ConfirmPaymentRequest, CreatePaymentRequest, PendingPaymentsRequest},
        ranking::{MemberStatsRequest, RankingGeneralRequest, RankingMonthlyRequest},
        reports::{MemberPendenciesRequest, MonthlyReportRequest},
        score::{ClearScoreRequest, EditScoreRequest, RegisterScoreRequest},
        settings::{GetPixKeyRequest, SetPixKeyRequest},
        teams::{GenerateTeamsRequest, ResetTeamsRequest},
        DomainLogic,
    },
    domain::{
        format_cents, AttendanceStatus, Caller, EventKind, NamedScore, Outcome, PaymentTarget,
        RsvpStatus, Standing, YearMonth,
    },
    ports::{database::DatabasePort, member::MemberPort},
};

#[derive(Parser, Debug)]
#[command(name = "patota", version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Member id of the admin running the command
    #[arg(long, env = "PATOTA_OPERATOR")]
    pub operator: Uuid,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn init() -> Self {
        Self::parse()
    }

    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        let operator = Caller::admin(self.operator);
        match self.command {
            Command::Member(cmd) => cmd.run(domain, operator).await,
            Command::Event(cmd) => cmd.run(domain, operator).await,
            Command::Teams(cmd) => cmd.run(domain, operator).await,
            Command::Score(cmd) => cmd.run(domain, operator).await,
            Command::Attendance(cmd) => cmd.run(domain, operator).await,
            Command::Dues(cmd) => cmd.run(domain, operator).await,
            Command::Payment(cmd) => cmd.run(domain, operator).await,
            Command::Cash(cmd) => cmd.run(domain, operator).await,
            Command::Ranking(cmd) => cmd.run(domain).await,
            Command::Report(cmd) => cmd.run(domain, operator).await,
            Command::Audit(cmd) => cmd.run(domain, operator).await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add, list and (de)activate members
    #[command(subcommand)]
    Member(MemberCommand),
    /// Create events and manage confirmations
    #[command(subcommand)]
    Event(EventCommand),
    /// Draw or reset the teams of a game
    #[command(subcommand)]
    Teams(TeamsCommand),
    /// Register or correct a game score
    #[command(subcommand)]
    Score(ScoreCommand),
    /// Record attendance and guests
    #[command(subcommand)]
    Attendance(AttendanceCommand),
    /// Generate monthly dues and exemptions
    #[command(subcommand)]
    Dues(DuesCommand),
    /// File and confirm payments
    #[command(subcommand)]
    Payment(PaymentCommand),
    /// Expenses, balance and ledger
    #[command(subcommand)]
    Cash(CashCommand),
    /// Standings and member statistics
    #[command(subcommand)]
    Ranking(RankingCommand),
    /// Pendencies and monthly reports
    #[command(subcommand)]
    Report(ReportCommand),
    /// Admin audit log
    #[command(subcommand)]
    Audit(AuditCommand),
}

#[derive(Subcommand, Debug)]
pub enum MemberCommand {
    /// Add a member
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
    },
    /// Reactivate a member
    Activate {
        #[arg(long)]
        id: Uuid,
    },
    /// Deactivate a member
    Deactivate {
        #[arg(long)]
        id: Uuid,
    },
    /// Members ordered by name
    List {
        /// Include inactive members
        #[arg(long)]
        all: bool,
    },
}

impl MemberCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        let member = match self {
            MemberCommand::Add { name, email } => {
                domain
                    .execute(AddMemberRequest {
                        caller,
                        name,
                        email,
                    })
                    .await?
            }
            MemberCommand::Activate { id } => {
                domain
                    .execute(SetMemberActiveRequest {
                        caller,
                        member_id: id,
                        active: true,
                    })
                    .await?
            }
            MemberCommand::Deactivate { id } => {
                domain
                    .execute(SetMemberActiveRequest {
                        caller,
                        member_id: id,
                        active: false,
                    })
                    .await?
            }
            MemberCommand::List { all } => {
                let members = domain
                    .execute(ListMembersRequest {
                        caller,
                        active_only: !all,
                    })
                    .await?;
                for member in members {
                    let status = if member.active { "" } else { "\tinactive" };
                    println!("{}\t{}\t{}{status}", member.member_id, member.name, member.email);
                }
                return Ok(());
            }
        };
        print_json(&member)
    }
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Create a game or internal event
    Create {
        #[arg(long, value_parser = event_kind, default_value = "GAME")]
        kind: EventKind,
        /// Start time, RFC 3339
        #[arg(long)]
        starts_at: DateTime<Utc>,
        #[arg(long)]
        location: String,
        /// Confirmations close at this time, RFC 3339
        #[arg(long)]
        rsvp_deadline: Option<DateTime<Utc>>,
    },
    /// Change the time, place or deadline of an event
    Update {
        #[arg(long)]
        event: Uuid,
        /// New start time, RFC 3339
        #[arg(long)]
        starts_at: Option<DateTime<Utc>>,
        #[arg(long)]
        location: Option<String>,
        /// New confirmation deadline, RFC 3339
        #[arg(long)]
        rsvp_deadline: Option<DateTime<Utc>>,
    },
    /// Delete an event that booked no fines or points
    Delete {
        #[arg(long)]
        event: Uuid,
    },
    /// All events newest first, or the upcoming ones soonest first
    List {
        #[arg(long)]
        upcoming: bool,
    },
    /// The soonest upcoming event
    Next,
    /// RSVPs and attendance of every member at an event
    Details {
        #[arg(long)]
        event: Uuid,
    },
    /// Confirm presence on behalf of a member
    Rsvp {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        member: Uuid,
        #[arg(long, value_parser = rsvp_status)]
        status: RsvpStatus,
    },
    /// Active members that have not answered yet
    Pending {
        #[arg(long)]
        event: Uuid,
    },
    /// Record a free-form score for an event without drawn teams
    NamedScore {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        team_a: String,
        #[arg(long)]
        score_a: u32,
        #[arg(long)]
        team_b: String,
        #[arg(long)]
        score_b: u32,
    },
    /// Print the shareable roster of a drawn game
    Roster {
        #[arg(long)]
        event: Uuid,
    },
}

impl EventCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        match self {
            EventCommand::Create {
                kind,
                starts_at,
                location,
                rsvp_deadline,
            } => {
                let event = domain
                    .execute(CreateEventRequest {
                        caller,
                        kind,
                        starts_at,
                        location,
                        rsvp_deadline,
                    })
                    .await?;
                print_json(&event)
            }
            EventCommand::Update {
                event,
                starts_at,
                location,
                rsvp_deadline,
            } => {
                let event = domain
                    .execute(UpdateEventRequest {
                        caller,
                        event_id: event,
                        starts_at,
                        location,
                        rsvp_deadline,
                    })
                    .await?;
                print_json(&event)
            }
            EventCommand::Delete { event } => {
                let event = domain
                    .execute(DeleteEventRequest {
                        caller,
                        event_id: event,
                    })
                    .await?;
                println!("Deleted event {}", event.event_id);
                Ok(())
            }
            EventCommand::List { upcoming } => {
                let events = domain.execute(ListEventsRequest { upcoming }).await?;
                let offset = domain.config().utc_offset();
                println!("{} events.", events.len());
                for event in events {
                    println!(
                        "{}\t{}\t{}\t{}",
                        event.event_id,
                        event.starts_at.with_timezone(&offset).format("%Y-%m-%d %H:%M"),
                        event.kind.as_str(),
                        event.location
                    );
                }
                Ok(())
            }
            EventCommand::Next => match domain.execute(NextEventRequest).await? {
                Some(event) => print_json(&event),
                None => {
                    println!("No upcoming events");
                    Ok(())
                }
            },
            EventCommand::Details { event } => {
                let details = domain
                    .execute(EventDetailsRequest {
                        caller,
                        event_id: event,
                    })
                    .await?;
                print_json(&details)
            }
            EventCommand::Rsvp {
                event,
                member,
                status,
            } => {
                let rsvp = domain
                    .execute(ConfirmPresenceRequest {
                        caller,
                        event_id: event,
                        member_id: member,
                        status,
                    })
                    .await?;
                print_json(&rsvp)
            }
            EventCommand::Pending { event } => {
                let members = domain
                    .execute(PendingRsvpsRequest {
                        caller,
                        event_id: event,
                    })
                    .await?;
                println!("{} members without an answer.", members.len());
                for member in members {
                    println!("{}\t{}", member.member_id, member.name);
                }
                Ok(())
            }
            EventCommand::NamedScore {
                event,
                team_a,
                score_a,
                team_b,
                score_b,
            } => {
                let event = domain
                    .execute(SetNamedScoreRequest {
                        caller,
                        event_id: event,
                        score: NamedScore {
                            team_a_name: team_a,
                            team_a_score: score_a,
                            team_b_name: team_b,
                            team_b_score: score_b,
                        },
                    })
                    .await?;
                print_json(&event)
            }
            EventCommand::Roster { event } => {
                let roster = domain.execute(TeamRosterRequest { event_id: event }).await?;
                println!("{roster}");
                Ok(())
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum TeamsCommand {
    /// Split the confirmed players into Black and White
    Draw {
        #[arg(long)]
        event: Uuid,
    },
    /// Clear the teams and reopen confirmations
    Reset {
        #[arg(long)]
        event: Uuid,
    },
}

impl TeamsCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        match self {
            TeamsCommand::Draw { event } => {
                domain
                    .execute(GenerateTeamsRequest {
                        caller,
                        event_id: event,
                    })
                    .await?;
                let roster = domain.execute(TeamRosterRequest { event_id: event }).await?;
                println!("{roster}");
            }
            TeamsCommand::Reset { event } => {
                let event = domain
                    .execute(ResetTeamsRequest {
                        caller,
                        event_id: event,
                    })
                    .await?;
                match event.rsvp_deadline {
                    Some(deadline) => println!(
                        "Teams cleared, confirmations open until {}",
                        deadline.with_timezone(&domain.config().utc_offset())
                    ),
                    None => println!("Teams cleared"),
                }
            }
        }
        Ok(())
    }
}

#[derive(Subcommand, Debug)]
pub enum ScoreCommand {
    /// Register the final score of a drawn game
    Register {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        black: u32,
        #[arg(long)]
        white: u32,
    },
    /// Replace a registered score
    Edit {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        black: u32,
        #[arg(long)]
        white: u32,
    },
    /// Drop the score and its team credits, drawn or not
    Clear {
        #[arg(long)]
        event: Uuid,
    },
}

impl ScoreCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        let outcome = match self {
            ScoreCommand::Register {
                event,
                black,
                white,
            } => {
                domain
                    .execute(RegisterScoreRequest {
                        caller,
                        event_id: event,
                        black: black.into(),
                        white: white.into(),
                    })
                    .await?
            }
            ScoreCommand::Edit {
                event,
                black,
                white,
            } => {
                domain
                    .execute(EditScoreRequest {
                        caller,
                        event_id: event,
                        black: black.into(),
                        white: white.into(),
                    })
                    .await?
            }
            ScoreCommand::Clear { event } => {
                domain
                    .execute(ClearScoreRequest {
                        caller,
                        event_id: event,
                    })
                    .await?;
                println!("Score cleared");
                return Ok(());
            }
        };
        match outcome {
            Outcome::Winner(side) => println!("{} wins", side.as_str()),
            Outcome::Draw => println!("Draw"),
        }
        Ok(())
    }
}

#[derive(Subcommand, Debug)]
pub enum AttendanceCommand {
    /// Record whether a member showed up
    Record {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        member: Uuid,
        #[arg(long, value_parser = attendance_status)]
        status: AttendanceStatus,
    },
    /// Charge a member for the guests they brought
    Guest {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        member: Uuid,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

impl AttendanceCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        match self {
            AttendanceCommand::Record {
                event,
                member,
                status,
            } => {
                let recorded = domain
                    .execute(RecordAttendanceRequest {
                        caller,
                        event_id: event,
                        member_id: member,
                        status,
                    })
                    .await?;
                print_json(&recorded)
            }
            AttendanceCommand::Guest {
                event,
                member,
                count,
            } => {
                let fine = domain
                    .execute(AddGuestRequest {
                        caller,
                        event_id: event,
                        member_id: member,
                        count,
                    })
                    .await?;
                print_json(&fine)
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum DuesCommand {
    /// Create the dues of every active member for a month
    Generate {
        /// Billing month, YYYY-MM
        #[arg(long)]
        month: YearMonth,
    },
    /// Exempt a member from one month of dues
    Exempt {
        #[arg(long)]
        member: Uuid,
        #[arg(long)]
        month: YearMonth,
        #[arg(long)]
        reason: String,
    },
}

impl DuesCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        match self {
            DuesCommand::Generate { month } => {
                let res = domain.execute(GenerateDuesRequest { caller, month }).await?;
                println!("{} dues created for {}", res.created, res.month);
                Ok(())
            }
            DuesCommand::Exempt {
                member,
                month,
                reason,
            } => {
                let res = domain
                    .execute(CreateExemptionRequest {
                        caller,
                        member_id: member,
                        month,
                        reason,
                    })
                    .await?;
                print_json(&res)
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum PaymentCommand {
    /// File a payment for a due or a fine
    Create(CreatePayment),
    /// Confirm a pending payment and book it
    Confirm {
        #[arg(long)]
        id: Uuid,
    },
    /// Payments awaiting confirmation, oldest first
    Pending,
    /// Show the PIX key members pay to
    PixKey,
    /// Change the PIX key members pay to
    SetPixKey {
        #[arg(long)]
        key: String,
    },
}

#[derive(Args, Debug)]
pub struct CreatePayment {
    #[arg(long)]
    pub member: Uuid,
    #[command(flatten)]
    pub target: PaymentTargetArgs,
    #[arg(long)]
    pub amount_cents: i64,
    #[arg(long)]
    pub proof_url: Option<String>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct PaymentTargetArgs {
    /// Due being paid
    #[arg(long)]
    pub due: Option<Uuid>,
    /// Fine being paid
    #[arg(long)]
    pub fine: Option<Uuid>,
}

impl PaymentTargetArgs {
    fn target(&self) -> Result<PaymentTarget> {
        match (self.due, self.fine) {
            (Some(due), None) => Ok(PaymentTarget::Due(due)),
            (None, Some(fine)) => Ok(PaymentTarget::Fine(fine)),
            _ => Err(anyhow!("pass exactly one of --due or --fine")),
        }
    }
}

impl PaymentCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        match self {
            PaymentCommand::Create(cmd) => {
                let payment = domain
                    .execute(CreatePaymentRequest {
                        caller,
                        member_id: cmd.member,
                        target: cmd.target.target()?,
                        amount_cents: cmd.amount_cents,
                        proof_url: cmd.proof_url,
                    })
                    .await?;
                print_json(&payment)
            }
            PaymentCommand::Confirm { id } => {
                let payment = domain
                    .execute(ConfirmPaymentRequest {
                        caller,
                        payment_id: id,
                    })
                    .await?;
                print_json(&payment)
            }
            PaymentCommand::Pending => {
                let payments = domain.execute(PendingPaymentsRequest { caller }).await?;
                print_json(&payments)
            }
            PaymentCommand::PixKey => {
                match domain.execute(GetPixKeyRequest).await? {
                    Some(key) => println!("{key}"),
                    None => println!("No PIX key set"),
                }
                Ok(())
            }
            PaymentCommand::SetPixKey { key } => {
                let key = domain
                    .execute(SetPixKeyRequest {
                        caller,
                        pix_key: key,
                    })
                    .await?;
                println!("PIX key set to {key}");
                Ok(())
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum CashCommand {
    /// Book an expense
    Out {
        #[arg(long)]
        category: String,
        #[arg(long)]
        amount_cents: i64,
        #[arg(long)]
        note: Option<String>,
    },
    /// Current balance
    Balance,
    /// Ledger entries, newest first
    Ledger {
        /// Only entries booked in this month, YYYY-MM
        #[arg(long)]
        month: Option<YearMonth>,
    },
}

impl CashCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        match self {
            CashCommand::Out {
                category,
                amount_cents,
                note,
            } => {
                let entry = domain
                    .execute(CashOutRequest {
                        caller,
                        category,
                        amount_cents,
                        note,
                    })
                    .await?;
                print_json(&entry)
            }
            CashCommand::Balance => {
                let balance = domain.execute(CashBalanceRequest).await?;
                println!("{}", format_cents(balance));
                Ok(())
            }
            CashCommand::Ledger { month } => {
                let (from, to) = match month {
                    Some(month) => {
                        let (from, to) = month.range();
                        (Some(from), Some(to))
                    }
                    None => (None, None),
                };
                let entries = domain.execute(CashLedgerRequest { from, to }).await?;
                println!("{} entries.", entries.len());
                for entry in entries {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        entry.created_at.format("%Y-%m-%d %H:%M"),
                        entry.direction.as_str(),
                        entry.category.as_str(),
                        format_cents(entry.amount_cents),
                        entry.note.as_deref().unwrap_or("")
                    );
                }
                Ok(())
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum RankingCommand {
    /// All-time standings
    General,
    /// Standings for one month
    Monthly {
        /// YYYY-MM
        #[arg(long)]
        month: YearMonth,
    },
    /// Personal statistics of a member
    Stats {
        #[arg(long)]
        member: Uuid,
    },
}

impl RankingCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        match self {
            RankingCommand::General => {
                print_standings(&domain.execute(RankingGeneralRequest).await?);
                Ok(())
            }
            RankingCommand::Monthly { month } => {
                print_standings(&domain.execute(RankingMonthlyRequest { month }).await?);
                Ok(())
            }
            RankingCommand::Stats { member } => {
                let stats = domain
                    .execute(MemberStatsRequest { member_id: member })
                    .await?;
                print_json(&stats)
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Open dues and fines of a member
    Pendencies {
        #[arg(long)]
        member: Uuid,
    },
    /// Dues, cash, fines and events of one month
    Monthly {
        /// YYYY-MM
        #[arg(long)]
        month: YearMonth,
    },
}

impl ReportCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        match self {
            ReportCommand::Pendencies { member } => {
                let pendencies = domain
                    .execute(MemberPendenciesRequest {
                        caller,
                        member_id: member,
                    })
                    .await?;
                print_json(&pendencies)
            }
            ReportCommand::Monthly { month } => {
                let report = domain.execute(MonthlyReportRequest { caller, month }).await?;
                print_json(&report)
            }
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum AuditCommand {
    /// Note an admin action
    Add {
        #[arg(long)]
        action: String,
        /// Member the action concerns
        #[arg(long)]
        member: Option<Uuid>,
        #[arg(long)]
        details: Option<String>,
    },
    /// Latest entries, newest first
    List {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

impl AuditCommand {
    pub async fn run<D, M>(self, domain: &DomainLogic<D, M>, caller: Caller) -> Result<()>
    where
        D: DatabasePort + 'static,
        M: MemberPort + 'static,
    {
        match self {
            AuditCommand::Add {
                action,
                member,
                details,
            } => {
                let entry = domain
                    .execute(RecordAuditRequest {
                        caller,
                        action,
                        member_id: member,
                        details,
                    })
                    .await?;
                print_json(&entry)
            }
            AuditCommand::List { limit } => {
                let entries = domain.execute(AuditLogRequest { caller, limit }).await?;
                print_json(&entries)
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_standings(standings: &[Standing]) {
    for (position, standing) in standings.iter().enumerate() {
        println!(
            "{:>3}. {:<24} {:>4} pts {:>4} goals",
            position + 1,
            standing.name,
            standing.points,
            standing.goals
        );
    }
}

/// Accepts `not-going` as well as `NOT_GOING`
fn normalize(value: &str) -> String {
    value.trim().to_uppercase().replace('-', "_")
}

fn event_kind(value: &str) -> Result<EventKind, String> {
    EventKind::parse(&normalize(value)).ok_or_else(|| format!("unknown event kind {value:?}"))
}

fn rsvp_status(value: &str) -> Result<RsvpStatus, String> {
    RsvpStatus::parse(&normalize(value)).ok_or_else(|| format!("unknown RSVP status {value:?}"))
}

fn attendance_status(value: &str) -> Result<AttendanceStatus, String> {
    AttendanceStatus::parse(&normalize(value))
        .ok_or_else(|| format!("unknown attendance status {value:?}"))
}
