use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Event, EventKind, YearMonth};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DueStatus {
    Pending,
    Paid,
    Exempt,
}

impl DueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DueStatus::Pending => "PENDING",
            DueStatus::Paid => "PAID",
            DueStatus::Exempt => "EXEMPT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(DueStatus::Pending),
            "PAID" => Some(DueStatus::Paid),
            "EXEMPT" => Some(DueStatus::Exempt),
            _ => None,
        }
    }
}

/// Monthly membership charge, unique per (member, month)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Due {
    pub due_id: Uuid,
    pub member_id: Uuid,
    pub month: YearMonth,
    pub amount_cents: i64,
    pub status: DueStatus,
    pub due_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Due {
    /// Charge for `month`, zeroed and exempt if the member has an exemption for it
    pub fn for_month(
        member_id: Uuid,
        month: YearMonth,
        fee_cents: i64,
        due_day: u32,
        exempt: bool,
    ) -> Self {
        let (amount_cents, status) = if exempt {
            (0, DueStatus::Exempt)
        } else {
            (fee_cents, DueStatus::Pending)
        };
        Self {
            due_id: Uuid::new_v4(),
            member_id,
            month,
            amount_cents,
            status,
            due_date: month.due_date(due_day),
            created_at: Utc::now(),
        }
    }

    pub fn exempt(&mut self) {
        self.amount_cents = 0;
        self.status = DueStatus::Exempt;
    }
}

/// Waiver of one member's due for one month
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemption {
    pub exemption_id: Uuid,
    pub member_id: Uuid,
    pub month: YearMonth,
    pub reason: String,
    pub approved_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FineKind {
    Late,
    ConfirmedNoShow,
    Guest,
}

impl FineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineKind::Late => "LATE",
            FineKind::ConfirmedNoShow => "CONFIRMED_NO_SHOW",
            FineKind::Guest => "GUEST",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "LATE" => Some(FineKind::Late),
            "CONFIRMED_NO_SHOW" => Some(FineKind::ConfirmedNoShow),
            "GUEST" => Some(FineKind::Guest),
            _ => None,
        }
    }

    /// Cash ledger category the fine is booked under
    pub fn cash_category(&self) -> CashCategory {
        match self {
            FineKind::Late | FineKind::ConfirmedNoShow => CashCategory::Fine,
            FineKind::Guest => CashCategory::Guest,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fine {
    pub fine_id: Uuid,
    pub member_id: Uuid,
    pub event_id: Option<Uuid>,
    pub kind: FineKind,
    pub amount_cents: i64,
    pub paid: bool,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Fine {
    pub fn new(member_id: Uuid, event_id: Option<Uuid>, kind: FineKind, amount_cents: i64) -> Self {
        Self {
            fine_id: Uuid::new_v4(),
            member_id,
            event_id,
            kind,
            amount_cents,
            paid: false,
            note: None,
            created_at: Utc::now(),
        }
    }

    /// Cash `IN` entry booking this fine
    pub fn cash_entry(&self, posted_by: Uuid) -> CashEntry {
        CashEntry {
            reference: Some(format!("fine:{}", self.fine_id)),
            note: self.note.clone(),
            ..CashEntry::new(
                CashDirection::In,
                self.kind.cash_category(),
                self.amount_cents,
                posted_by,
            )
        }
    }
}

/// What a payment settles
///
/// A payment always settles exactly one due or one fine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentTarget {
    Due(Uuid),
    Fine(Uuid),
}

impl PaymentTarget {
    pub fn cash_category(&self) -> CashCategory {
        match self {
            PaymentTarget::Due(_) => CashCategory::Dues,
            PaymentTarget::Fine(_) => CashCategory::Fine,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Confirmed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Confirmed => "CONFIRMED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PaymentStatus::Pending),
            "CONFIRMED" => Some(PaymentStatus::Confirmed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: Uuid,
    pub member_id: Uuid,
    pub target: PaymentTarget,
    pub amount_cents: i64,
    pub status: PaymentStatus,
    /// Reference returned by the file storage collaborator for the uploaded proof
    pub proof_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_by: Option<Uuid>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// Cash `IN` entry booking this payment once confirmed
    pub fn cash_entry(&self, posted_by: Uuid) -> CashEntry {
        CashEntry {
            reference: Some(format!("payment:{}", self.payment_id)),
            ..CashEntry::new(
                CashDirection::In,
                self.target.cash_category(),
                self.amount_cents,
                posted_by,
            )
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CashDirection {
    In,
    Out,
}

impl CashDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashDirection::In => "IN",
            CashDirection::Out => "OUT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IN" => Some(CashDirection::In),
            "OUT" => Some(CashDirection::Out),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CashCategory {
    Dues,
    Fine,
    Guest,
    /// Free-form category, used for expenses
    Other(String),
}

impl CashCategory {
    pub fn as_str(&self) -> &str {
        match self {
            CashCategory::Dues => "DUES",
            CashCategory::Fine => "FINE",
            CashCategory::Guest => "GUEST",
            CashCategory::Other(name) => name.as_str(),
        }
    }
}

impl From<&str> for CashCategory {
    fn from(value: &str) -> Self {
        match value {
            "DUES" => CashCategory::Dues,
            "FINE" => CashCategory::Fine,
            "GUEST" => CashCategory::Guest,
            other => CashCategory::Other(other.to_string()),
        }
    }
}

/// Append-only cash ledger line
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashEntry {
    pub entry_id: Uuid,
    pub direction: CashDirection,
    pub category: CashCategory,
    pub amount_cents: i64,
    /// Origin of the entry, e.g. `fine:<id>` or `payment:<id>`
    pub reference: Option<String>,
    pub note: Option<String>,
    pub posted_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl CashEntry {
    pub fn new(
        direction: CashDirection,
        category: CashCategory,
        amount_cents: i64,
        posted_by: Uuid,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            direction,
            category,
            amount_cents,
            reference: None,
            note: None,
            posted_by,
            created_at: Utc::now(),
        }
    }

    /// Amount with the sign of its direction
    pub fn signed_amount(&self) -> i64 {
        match self.direction {
            CashDirection::In => self.amount_cents,
            CashDirection::Out => -self.amount_cents,
        }
    }
}

/// Cash balance: sum of `IN` entries minus sum of `OUT` entries
pub fn cash_balance<'a>(entries: impl IntoIterator<Item = &'a CashEntry>) -> i64 {
    entries.into_iter().map(CashEntry::signed_amount).sum()
}

/// Open charges of one member
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Pendencies {
    pub dues: Vec<Due>,
    pub fines: Vec<Fine>,
    pub total_cents: i64,
}

impl Pendencies {
    /// Keep pending dues and unpaid fines, and total them
    pub fn collect(dues: Vec<Due>, fines: Vec<Fine>) -> Self {
        let dues: Vec<Due> = dues
            .into_iter()
            .filter(|due| due.status == DueStatus::Pending)
            .collect();
        let fines: Vec<Fine> = fines.into_iter().filter(|fine| !fine.paid).collect();
        let total_cents = dues.iter().map(|d| d.amount_cents).sum::<i64>()
            + fines.iter().map(|f| f.amount_cents).sum::<i64>();
        Self {
            dues,
            fines,
            total_cents,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DuesSummary {
    pub total: usize,
    pub paid: usize,
    pub pending: usize,
    pub exempt: usize,
    pub amount_cents: i64,
    pub paid_cents: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CashSummary {
    pub in_cents: i64,
    pub out_cents: i64,
    pub net_cents: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FinesSummary {
    pub total: usize,
    pub amount_cents: i64,
    pub late: usize,
    pub no_show: usize,
    pub guest: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EventsSummary {
    pub total: usize,
    pub games: usize,
    pub internal: usize,
}

/// Admin overview of one month
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlyReport {
    pub month: YearMonth,
    pub dues: DuesSummary,
    pub cash: CashSummary,
    pub fines: FinesSummary,
    pub events: EventsSummary,
}

impl MonthlyReport {
    /// Summarize rows already scoped to `month`
    ///
    /// Dues are matched by billing month, everything else by timestamp. Rows outside the month
    /// are ignored.
    pub fn build(
        month: YearMonth,
        dues: &[Due],
        cash: &[CashEntry],
        fines: &[Fine],
        events: &[Event],
    ) -> Self {
        let mut report = MonthlyReport {
            month,
            dues: DuesSummary::default(),
            cash: CashSummary::default(),
            fines: FinesSummary::default(),
            events: EventsSummary::default(),
        };

        for due in dues.iter().filter(|d| d.month == month) {
            report.dues.total += 1;
            report.dues.amount_cents += due.amount_cents;
            match due.status {
                DueStatus::Paid => {
                    report.dues.paid += 1;
                    report.dues.paid_cents += due.amount_cents;
                }
                DueStatus::Pending => report.dues.pending += 1,
                DueStatus::Exempt => report.dues.exempt += 1,
            }
        }

        for entry in cash.iter().filter(|e| month.contains(e.created_at)) {
            match entry.direction {
                CashDirection::In => report.cash.in_cents += entry.amount_cents,
                CashDirection::Out => report.cash.out_cents += entry.amount_cents,
            }
        }
        report.cash.net_cents = report.cash.in_cents - report.cash.out_cents;

        for fine in fines.iter().filter(|f| month.contains(f.created_at)) {
            report.fines.total += 1;
            report.fines.amount_cents += fine.amount_cents;
            match fine.kind {
                FineKind::Late => report.fines.late += 1,
                FineKind::ConfirmedNoShow => report.fines.no_show += 1,
                FineKind::Guest => report.fines.guest += 1,
            }
        }

        for event in events.iter().filter(|e| month.contains(e.starts_at)) {
            report.events.total += 1;
            match event.kind {
                EventKind::Game => report.events.games += 1,
                EventKind::Internal => report.events.internal += 1,
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use speculoos::prelude::*;

    fn entry(direction: CashDirection, amount_cents: i64) -> CashEntry {
        CashEntry::new(direction, CashCategory::Fine, amount_cents, Uuid::new_v4())
    }

    #[fixture]
    fn month() -> YearMonth {
        YearMonth::new(2024, 5).unwrap()
    }

    #[test]
    fn test_cash_balance() {
        let entries = vec![
            entry(CashDirection::In, 3500),
            entry(CashDirection::In, 500),
            entry(CashDirection::Out, 1200),
        ];

        assert_that!(cash_balance(&entries)).is_equal_to(2800);
        assert_that!(cash_balance(&[])).is_equal_to(0);
    }

    #[rstest]
    fn test_due_for_month(month: YearMonth) {
        let member_id = Uuid::new_v4();

        let due = Due::for_month(member_id, month, 3500, 10, false);
        assert_that!(due.status).is_equal_to(DueStatus::Pending);
        assert_that!(due.amount_cents).is_equal_to(3500);
        assert_that!(due.due_date).is_equal_to(NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());

        let due = Due::for_month(member_id, month, 3500, 10, true);
        assert_that!(due.status).is_equal_to(DueStatus::Exempt);
        assert_that!(due.amount_cents).is_equal_to(0);
    }

    #[rstest]
    #[case(FineKind::Late, CashCategory::Fine)]
    #[case(FineKind::ConfirmedNoShow, CashCategory::Fine)]
    #[case(FineKind::Guest, CashCategory::Guest)]
    fn test_fine_cash_entry(#[case] kind: FineKind, #[case] category: CashCategory) {
        let admin = Uuid::new_v4();
        let fine = Fine::new(Uuid::new_v4(), None, kind, 500);

        let entry = fine.cash_entry(admin);

        assert_that!(entry.direction).is_equal_to(CashDirection::In);
        assert_that!(entry.category).is_equal_to(category);
        assert_that!(entry.amount_cents).is_equal_to(500);
        assert_that!(entry.posted_by).is_equal_to(admin);
        assert_that!(entry.reference).is_equal_to(Some(format!("fine:{}", fine.fine_id)));
    }

    #[rstest]
    #[case("DUES", CashCategory::Dues)]
    #[case("GUEST", CashCategory::Guest)]
    #[case("field rental", CashCategory::Other("field rental".to_string()))]
    fn test_cash_category_from_str(#[case] input: &str, #[case] expected: CashCategory) {
        let category = CashCategory::from(input);
        assert_that!(category.as_str()).is_equal_to(input);
        assert_that!(category).is_equal_to(expected);
    }

    #[rstest]
    fn test_pendencies(month: YearMonth) {
        let member_id = Uuid::new_v4();
        let pending = Due::for_month(member_id, month, 3500, 10, false);
        let mut paid = Due::for_month(member_id, month.next(), 3500, 10, false);
        paid.status = DueStatus::Paid;
        let exempt = Due::for_month(member_id, month.next().next(), 3500, 10, true);
        let open_fine = Fine::new(member_id, None, FineKind::Late, 500);
        let mut paid_fine = Fine::new(member_id, None, FineKind::Guest, 1000);
        paid_fine.paid = true;

        let pendencies = Pendencies::collect(
            vec![pending.clone(), paid, exempt],
            vec![open_fine.clone(), paid_fine],
        );

        assert_that!(pendencies.dues).is_equal_to(vec![pending]);
        assert_that!(pendencies.fines).is_equal_to(vec![open_fine]);
        assert_that!(pendencies.total_cents).is_equal_to(4000);
    }

    #[rstest]
    fn test_monthly_report(month: YearMonth) {
        let (start, _) = month.range();
        let member_id = Uuid::new_v4();

        let mut paid = Due::for_month(member_id, month, 3500, 10, false);
        paid.status = DueStatus::Paid;
        let dues = vec![
            paid,
            Due::for_month(Uuid::new_v4(), month, 3500, 10, false),
            Due::for_month(Uuid::new_v4(), month, 3500, 10, true),
            Due::for_month(Uuid::new_v4(), month.next(), 3500, 10, false),
        ];

        let mut cash = vec![entry(CashDirection::In, 3500), entry(CashDirection::Out, 1000)];
        let mut outside = entry(CashDirection::In, 99_900);
        outside.created_at = start - chrono::Duration::days(1);
        cash.push(outside);
        for e in cash.iter_mut().take(2) {
            e.created_at = start;
        }

        let mut fines = vec![
            Fine::new(member_id, None, FineKind::Late, 500),
            Fine::new(member_id, None, FineKind::ConfirmedNoShow, 1000),
        ];
        for f in fines.iter_mut() {
            f.created_at = start;
        }

        let events = vec![
            Event::new(EventKind::Game, start, "Quadra"),
            Event::new(EventKind::Internal, start, "Bar"),
            Event::new(EventKind::Game, month.range().1, "Quadra"),
        ];

        let report = MonthlyReport::build(month, &dues, &cash, &fines, &events);

        assert_that!(report.dues).is_equal_to(DuesSummary {
            total: 3,
            paid: 1,
            pending: 1,
            exempt: 1,
            amount_cents: 7000,
            paid_cents: 3500,
        });
        assert_that!(report.cash).is_equal_to(CashSummary {
            in_cents: 3500,
            out_cents: 1000,
            net_cents: 2500,
        });
        assert_that!(report.fines).is_equal_to(FinesSummary {
            total: 2,
            amount_cents: 1500,
            late: 1,
            no_show: 1,
            guest: 0,
        });
        assert_that!(report.events).is_equal_to(EventsSummary {
            total: 2,
            games: 1,
            internal: 1,
        });
    }
}
