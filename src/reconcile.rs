use crate::schema::{
    Course, EnrollmentStatus, PaymentLedgerEntry, PaymentStage, Student,
};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One named-stage cell of a breakdown row: the first ledger entry that
/// matched the stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageCell {
    pub amount: f64,
    pub mode: String,
    pub date: Option<NaiveDate>,
}

/// The catch-all bucket: everything past the first match per named stage,
/// plus free-text stages. Amounts summed, dates concatenated for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtherCell {
    pub amount: f64,
    pub dates: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentBreakdownRow {
    /// 1-based position in the filtered, sorted view.
    pub seq: usize,
    pub student_id: String,
    pub full_name: String,
    pub course_name: Option<String>,
    pub status: EnrollmentStatus,
    pub total_fee: f64,
    pub advance: Option<StageCell>,
    pub second: Option<StageCell>,
    pub third: Option<StageCell>,
    #[serde(rename = "final")]
    pub final_stage: Option<StageCell>,
    pub other: Option<OtherCell>,
    pub total_paid: f64,
    /// total_fee - total_paid. Negative when a student overpaid; surfaced,
    /// never rejected.
    pub balance: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    PaymentDate,
    Status,
}

/// Row filters for the breakdown. All conditions restrict which students
/// appear; none of them changes the per-stage columns of a surviving row.
#[derive(Debug, Clone, Default)]
pub struct BreakdownFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub month: Option<u32>,
    pub year: Option<i32>,
    /// Keep only students with at least one entry in this stage.
    pub stage: Option<PaymentStage>,
    pub status: Option<EnrollmentStatus>,
    pub student_id: Option<String>,
    pub sort: SortKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BreakdownTotals {
    pub total_fee: f64,
    pub advance: f64,
    pub second: f64,
    pub third: f64,
    #[serde(rename = "final")]
    pub final_stage: f64,
    pub other: f64,
    pub total_paid: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownReport {
    pub rows: Vec<StudentBreakdownRow>,
    /// Recomputed over the filtered set on every call.
    pub totals: BreakdownTotals,
}

impl BreakdownReport {
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str(
            "Seq,Student ID,Name,Course,Status,Total Fee,Advance,Second,Third,Final,Other,Paid,Balance\n",
        );

        for row in &self.rows {
            let stage = |cell: &Option<StageCell>| {
                cell.as_ref().map(|c| format!("{:.2}", c.amount)).unwrap_or_default()
            };
            output.push_str(&format!(
                "{},{},{},{},{},{:.2},{},{},{},{},{},{:.2},{:.2}\n",
                row.seq,
                row.student_id,
                row.full_name,
                row.course_name.as_deref().unwrap_or(""),
                row.status,
                row.total_fee,
                stage(&row.advance),
                stage(&row.second),
                stage(&row.third),
                stage(&row.final_stage),
                row.other
                    .as_ref()
                    .map(|o| format!("{:.2}", o.amount))
                    .unwrap_or_default(),
                row.total_paid,
                row.balance,
            ));
        }

        output.push_str(&format!(
            "Totals,,,,,{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}\n",
            self.totals.total_fee,
            self.totals.advance,
            self.totals.second,
            self.totals.third,
            self.totals.final_stage,
            self.totals.other,
            self.totals.total_paid,
            self.totals.balance,
        ));
        output
    }
}

fn entry_matches_date_filter(entry: &PaymentLedgerEntry, filter: &BreakdownFilter) -> bool {
    let date = match entry.payment_date {
        Some(date) => date,
        None => return false,
    };
    if let Some(from) = filter.date_from {
        if date < from {
            return false;
        }
    }
    if let Some(to) = filter.date_to {
        if date > to {
            return false;
        }
    }
    if let Some(month) = filter.month {
        if date.month() != month {
            return false;
        }
    }
    if let Some(year) = filter.year {
        if date.year() != year {
            return false;
        }
    }
    true
}

fn has_date_conditions(filter: &BreakdownFilter) -> bool {
    filter.date_from.is_some()
        || filter.date_to.is_some()
        || filter.month.is_some()
        || filter.year.is_some()
}

/// Pure read-side aggregation of the payment ledger into one row per
/// student with per-stage cells, paid total, and outstanding balance.
/// Safe to recompute on every filter change.
pub fn breakdown(
    students: &[Student],
    ledger: &[PaymentLedgerEntry],
    courses: &[Course],
    filter: &BreakdownFilter,
) -> BreakdownReport {
    let mut by_student: HashMap<&str, Vec<&PaymentLedgerEntry>> = HashMap::new();
    for entry in ledger {
        by_student.entry(entry.student_id.as_str()).or_default().push(entry);
    }

    let mut keyed: Vec<(Option<NaiveDate>, StudentBreakdownRow)> = Vec::new();

    for student in students {
        if let Some(wanted) = &filter.student_id {
            if &student.student_id != wanted {
                continue;
            }
        }
        if let Some(status) = filter.status {
            if student.status != status {
                continue;
            }
        }

        let entries = by_student
            .get(student.student_id.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        if let Some(stage) = filter.stage {
            if !entries.iter().any(|e| PaymentStage::parse(&e.stage) == stage) {
                continue;
            }
        }
        if has_date_conditions(filter)
            && !entries.iter().any(|e| entry_matches_date_filter(e, filter))
        {
            continue;
        }

        // First entry per named stage; every other entry lands in Other.
        let mut advance = None;
        let mut second = None;
        let mut third = None;
        let mut final_stage = None;
        let mut other_amount = 0.0;
        let mut other_dates: Vec<String> = Vec::new();
        let mut total_paid = 0.0;

        for entry in entries {
            total_paid += entry.amount;
            let cell = StageCell {
                amount: entry.amount,
                mode: entry.payment_mode.clone(),
                date: entry.payment_date,
            };
            let slot = match PaymentStage::parse(&entry.stage) {
                PaymentStage::Advance => Some(&mut advance),
                PaymentStage::Second => Some(&mut second),
                PaymentStage::Third => Some(&mut third),
                PaymentStage::Final => Some(&mut final_stage),
                PaymentStage::Other => None,
            };
            match slot {
                Some(slot) if slot.is_none() => *slot = Some(cell),
                _ => {
                    other_amount += entry.amount;
                    if let Some(date) = entry.payment_date {
                        other_dates.push(date.format("%d/%m/%Y").to_string());
                    }
                }
            }
        }

        let other = if other_amount != 0.0 || !other_dates.is_empty() {
            Some(OtherCell {
                amount: other_amount,
                dates: other_dates.join(", "),
            })
        } else {
            None
        };

        let course_name = student
            .course_id
            .and_then(|id| courses.iter().find(|c| c.id == id))
            .map(|c| c.name.clone());

        let earliest = entries.iter().filter_map(|e| e.payment_date).min();

        keyed.push((
            earliest,
            StudentBreakdownRow {
                seq: 0,
                student_id: student.student_id.clone(),
                full_name: student.full_name.clone(),
                course_name,
                status: student.status,
                total_fee: student.total_fee,
                advance,
                second,
                third,
                final_stage,
                other,
                total_paid,
                balance: student.total_fee - total_paid,
            },
        ));
    }

    match filter.sort {
        SortKey::PaymentDate => {
            keyed.sort_by(|a, b| match (a.0, b.0) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.student_id.cmp(&b.1.student_id)),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => a.1.student_id.cmp(&b.1.student_id),
            });
        }
        SortKey::Status => {
            keyed.sort_by(|a, b| {
                a.1.status
                    .label()
                    .cmp(b.1.status.label())
                    .then_with(|| a.1.student_id.cmp(&b.1.student_id))
            });
        }
    }

    let mut totals = BreakdownTotals::default();
    let rows: Vec<StudentBreakdownRow> = keyed
        .into_iter()
        .enumerate()
        .map(|(i, (_, mut row))| {
            row.seq = i + 1;
            totals.total_fee += row.total_fee;
            totals.advance += row.advance.as_ref().map(|c| c.amount).unwrap_or(0.0);
            totals.second += row.second.as_ref().map(|c| c.amount).unwrap_or(0.0);
            totals.third += row.third.as_ref().map(|c| c.amount).unwrap_or(0.0);
            totals.final_stage += row.final_stage.as_ref().map(|c| c.amount).unwrap_or(0.0);
            totals.other += row.other.as_ref().map(|c| c.amount).unwrap_or(0.0);
            totals.total_paid += row.total_paid;
            totals.balance += row.balance;
            row
        })
        .collect();

    BreakdownReport { rows, totals }
}
