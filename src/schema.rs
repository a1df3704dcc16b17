use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EnrollmentStatus {
    #[serde(rename = "Attend sessions")]
    AttendsSessions,

    #[serde(rename = "On break")]
    OnBreak,

    #[serde(rename = "Completed")]
    Completed,

    #[serde(rename = "Dropped out")]
    DroppedOut,

    #[serde(rename = "Not attending")]
    NotAttending,
}

impl EnrollmentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AttendsSessions => "Attend sessions",
            Self::OnBreak => "On break",
            Self::Completed => "Completed",
            Self::DroppedOut => "Dropped out",
            Self::NotAttending => "Not attending",
        }
    }

    /// Case-insensitive parse of the display form. Unrecognized text is a
    /// staging-time field error; the commit pipeline falls back to the
    /// default instead.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "attend sessions" | "attends sessions" => Some(Self::AttendsSessions),
            "on break" => Some(Self::OnBreak),
            "completed" => Some(Self::Completed),
            "dropped out" | "dropped" => Some(Self::DroppedOut),
            "not attending" => Some(Self::NotAttending),
            _ => None,
        }
    }
}

impl Default for EnrollmentStatus {
    fn default() -> Self {
        Self::AttendsSessions
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum PaymentStage {
    Advance,
    Second,
    Third,
    Final,
    Other,
}

impl PaymentStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Advance => "Advance",
            Self::Second => "Second",
            Self::Third => "Third",
            Self::Final => "Final",
            Self::Other => "Other",
        }
    }

    /// Ledger rows tolerate free-text stages; anything unrecognized lands
    /// in the Other bucket.
    pub fn parse(text: &str) -> Self {
        match text.trim().to_lowercase().as_str() {
            "advance" | "1st" | "first" => Self::Advance,
            "second" | "2nd" => Self::Second,
            "third" | "3rd" => Self::Third,
            "final" | "last" => Self::Final,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for PaymentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentMode {
    #[serde(rename = "Cash")]
    Cash,

    #[serde(rename = "Bank transfer")]
    BankTransfer,

    #[serde(rename = "Card")]
    Card,

    #[serde(rename = "Mobile banking")]
    MobileBanking,
}

impl PaymentMode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cash => "Cash",
            Self::BankTransfer => "Bank transfer",
            Self::Card => "Card",
            Self::MobileBanking => "Mobile banking",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "cash" => Some(Self::Cash),
            "bank transfer" | "bank" | "transfer" => Some(Self::BankTransfer),
            "card" | "credit card" | "debit card" => Some(Self::Card),
            "mobile banking" | "mobile" => Some(Self::MobileBanking),
            _ => None,
        }
    }
}

impl Default for PaymentMode {
    fn default() -> Self {
        Self::Cash
    }
}

impl std::fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One row exactly as the spreadsheet codec hands it over: every cell an
/// optional string, numbers and dates still in their on-disk form. This is
/// the column contract the import template must keep matching, so the
/// schema is documented field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawRow {
    #[schemars(description = "Student full name. Required.")]
    pub full_name: Option<String>,

    #[schemars(description = "Student email address, unique across all students. Required.")]
    pub email: Option<String>,

    #[schemars(description = "Contact phone number. Required.")]
    pub phone: Option<String>,

    #[schemars(description = "Country of residence.")]
    pub country: Option<String>,

    #[schemars(description = "Passport or national ID number.")]
    pub passport_no: Option<String>,

    #[schemars(description = "Postal address.")]
    pub address: Option<String>,

    #[schemars(
        description = "Course name, matched case-insensitively against the course list. Leave blank if undecided."
    )]
    pub course_name: Option<String>,

    #[schemars(description = "Batch number within the course.")]
    pub batch_no: Option<String>,

    #[schemars(
        description = "Enrollment date. Accepts day/month/year text (e.g. 15/01/2026) or a spreadsheet serial number. Required."
    )]
    pub join_date: Option<String>,

    #[schemars(description = "First class date, same formats as join_date.")]
    pub class_start_date: Option<String>,

    #[schemars(
        description = "Lifecycle status: Attend sessions, On break, Completed, Dropped out, Not attending. Defaults to Attend sessions."
    )]
    pub status: Option<String>,

    #[schemars(description = "Total course fee agreed with the student.")]
    pub total_fee: Option<String>,

    #[schemars(
        description = "Full name of the referrer, if any. A referral record is matched or created automatically."
    )]
    pub referred_by: Option<String>,

    #[schemars(description = "Advance payment amount.")]
    pub advance_amount: Option<String>,

    #[schemars(description = "Advance payment mode: Cash, Bank transfer, Card, Mobile banking.")]
    pub advance_mode: Option<String>,

    #[schemars(description = "Advance payment date.")]
    pub advance_date: Option<String>,

    #[schemars(description = "Second installment amount.")]
    pub second_amount: Option<String>,

    #[schemars(description = "Second installment mode.")]
    pub second_mode: Option<String>,

    #[schemars(description = "Second installment date.")]
    pub second_date: Option<String>,

    #[schemars(description = "Third installment amount.")]
    pub third_amount: Option<String>,

    #[schemars(description = "Third installment mode.")]
    pub third_mode: Option<String>,

    #[schemars(description = "Third installment date.")]
    pub third_date: Option<String>,

    #[schemars(description = "Final installment amount.")]
    pub final_amount: Option<String>,

    #[schemars(description = "Final installment mode.")]
    pub final_mode: Option<String>,

    #[schemars(description = "Final installment date.")]
    pub final_date: Option<String>,

    #[schemars(description = "Commission amount owed to the referrer for this enrollment.")]
    pub referral_fee: Option<String>,
}

impl RawRow {
    /// Header row of the import template, in column order. The codec's
    /// template writer and parser must both follow this list.
    pub fn template_columns() -> &'static [&'static str] {
        &[
            "full_name",
            "email",
            "phone",
            "country",
            "passport_no",
            "address",
            "course_name",
            "batch_no",
            "join_date",
            "class_start_date",
            "status",
            "total_fee",
            "referred_by",
            "advance_amount",
            "advance_mode",
            "advance_date",
            "second_amount",
            "second_mode",
            "second_date",
            "third_amount",
            "third_mode",
            "third_date",
            "final_amount",
            "final_mode",
            "final_date",
            "referral_fee",
        ]
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RawRow)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }

    pub fn set(&mut self, field: RowField, value: Option<String>) {
        let slot = match field {
            RowField::FullName => &mut self.full_name,
            RowField::Email => &mut self.email,
            RowField::Phone => &mut self.phone,
            RowField::Country => &mut self.country,
            RowField::PassportNo => &mut self.passport_no,
            RowField::Address => &mut self.address,
            RowField::CourseName => &mut self.course_name,
            RowField::BatchNo => &mut self.batch_no,
            RowField::JoinDate => &mut self.join_date,
            RowField::ClassStartDate => &mut self.class_start_date,
            RowField::Status => &mut self.status,
            RowField::TotalFee => &mut self.total_fee,
            RowField::ReferredBy => &mut self.referred_by,
            RowField::AdvanceAmount => &mut self.advance_amount,
            RowField::AdvanceMode => &mut self.advance_mode,
            RowField::AdvanceDate => &mut self.advance_date,
            RowField::SecondAmount => &mut self.second_amount,
            RowField::SecondMode => &mut self.second_mode,
            RowField::SecondDate => &mut self.second_date,
            RowField::ThirdAmount => &mut self.third_amount,
            RowField::ThirdMode => &mut self.third_mode,
            RowField::ThirdDate => &mut self.third_date,
            RowField::FinalAmount => &mut self.final_amount,
            RowField::FinalMode => &mut self.final_mode,
            RowField::FinalDate => &mut self.final_date,
            RowField::ReferralFee => &mut self.referral_fee,
        };
        *slot = value.filter(|v| !v.trim().is_empty());
    }
}

/// Editable columns of a staged row, used by operator edits and to tag
/// field errors back to the cell they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowField {
    FullName,
    Email,
    Phone,
    Country,
    PassportNo,
    Address,
    CourseName,
    BatchNo,
    JoinDate,
    ClassStartDate,
    Status,
    TotalFee,
    ReferredBy,
    AdvanceAmount,
    AdvanceMode,
    AdvanceDate,
    SecondAmount,
    SecondMode,
    SecondDate,
    ThirdAmount,
    ThirdMode,
    ThirdDate,
    FinalAmount,
    FinalMode,
    FinalDate,
    ReferralFee,
}

impl RowField {
    pub fn column_name(&self) -> &'static str {
        match self {
            Self::FullName => "full_name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Country => "country",
            Self::PassportNo => "passport_no",
            Self::Address => "address",
            Self::CourseName => "course_name",
            Self::BatchNo => "batch_no",
            Self::JoinDate => "join_date",
            Self::ClassStartDate => "class_start_date",
            Self::Status => "status",
            Self::TotalFee => "total_fee",
            Self::ReferredBy => "referred_by",
            Self::AdvanceAmount => "advance_amount",
            Self::AdvanceMode => "advance_mode",
            Self::AdvanceDate => "advance_date",
            Self::SecondAmount => "second_amount",
            Self::SecondMode => "second_mode",
            Self::SecondDate => "second_date",
            Self::ThirdAmount => "third_amount",
            Self::ThirdMode => "third_mode",
            Self::ThirdDate => "third_date",
            Self::FinalAmount => "final_amount",
            Self::FinalMode => "final_mode",
            Self::FinalDate => "final_date",
            Self::ReferralFee => "referral_fee",
        }
    }
}

impl std::fmt::Display for RowField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column_name())
    }
}

/// A staging-time validation problem tied to one cell. Recoverable: the
/// operator fixes the cell and the row is re-validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: RowField,
    pub message: String,
}

impl FieldError {
    pub fn new(field: RowField, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// One payment observed on an import row, already typed. Only stages with a
/// non-zero amount survive normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagePayment {
    pub stage: PaymentStage,
    pub amount: f64,
    pub mode: Option<PaymentMode>,
    pub date: Option<NaiveDate>,
}

/// The validated, typed form of one import row. Produced by the normalizer,
/// re-derived on every staging edit, consumed by the commit pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentRow {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub country: Option<String>,
    pub passport_no: Option<String>,
    pub address: Option<String>,
    pub course_name: Option<String>,
    pub batch_no: Option<String>,
    pub join_date: Option<NaiveDate>,
    pub class_start_date: Option<NaiveDate>,
    /// None when the source cell was blank or unrecognized; the commit
    /// pipeline substitutes the default status.
    pub status: Option<EnrollmentStatus>,
    pub total_fee: f64,
    pub referred_by: Option<String>,
    pub payments: Vec<StagePayment>,
    pub referral_fee: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Student {
    pub student_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub address: Option<String>,
    pub country: Option<String>,
    pub passport_no: Option<String>,
    pub course_id: Option<i64>,
    pub batch_no: Option<String>,
    pub join_date: NaiveDate,
    pub class_start_date: Option<NaiveDate>,
    pub status: EnrollmentStatus,
    pub total_fee: f64,
    pub advance_payment: f64,
    pub referral_id: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Referral {
    pub id: i64,
    pub code: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    pub notes: Option<String>,
}

/// Referral fields minus the storage-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewReferral {
    pub code: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentLedgerEntry {
    /// Assigned by storage on insert; 0 until then.
    pub id: i64,
    pub student_id: String,
    /// Canonical stage label, but free text is tolerated at rest; the
    /// reconciliation engine re-parses it.
    pub stage: String,
    pub amount: f64,
    pub payment_mode: String,
    pub payment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferralPaymentEntry {
    pub id: i64,
    pub referral_id: i64,
    pub student_id: String,
    pub amount: f64,
    pub payment_date: Option<NaiveDate>,
    pub method: String,
    pub notes: Option<String>,
}

/// Which of a row's sub-writes landed before it failed. A row can be
/// partially committed (student written, ledger insert failed); that state
/// must be visible to the operator, not smoothed over.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowWrites {
    pub student: bool,
    pub ledger: bool,
    pub referral_payment: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based position within the batch, matching what the operator saw.
    pub row_number: usize,
    pub full_name: String,
    pub email: String,
    pub message: String,
    pub writes: RowWrites,
    /// The original payload, attached so the operator can fix and re-import.
    pub row: EnrollmentRow,
}

/// The commit pipeline's report: every input row lands in exactly one of
/// success, skipped, or errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub success: usize,
    pub skipped: usize,
    pub referrals_created: usize,
    pub errors: Vec<RowError>,
}

impl ImportOutcome {
    pub fn total_rows(&self) -> usize {
        self.success + self.skipped + self.errors.len()
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str("# Import Report\n\n");
        output.push_str(&format!("- **Imported:** {}\n", self.success));
        output.push_str(&format!("- **Skipped (duplicate):** {}\n", self.skipped));
        output.push_str(&format!("- **Failed:** {}\n", self.errors.len()));
        output.push_str(&format!(
            "- **Referrals auto-created:** {}\n\n",
            self.referrals_created
        ));

        if !self.errors.is_empty() {
            output.push_str("## Failed rows\n\n");
            output.push_str("| Row | Name | Email | Error | Student written |\n");
            output.push_str("|-----|------|-------|-------|----------------|\n");
            for error in &self.errors {
                output.push_str(&format!(
                    "| {} | {} | {} | {} | {} |\n",
                    error.row_number,
                    error.full_name,
                    error.email,
                    error.message,
                    if error.writes.student { "yes" } else { "no" }
                ));
            }
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_round_trip() {
        for status in [
            EnrollmentStatus::AttendsSessions,
            EnrollmentStatus::OnBreak,
            EnrollmentStatus::Completed,
            EnrollmentStatus::DroppedOut,
            EnrollmentStatus::NotAttending,
        ] {
            assert_eq!(EnrollmentStatus::parse(status.label()), Some(status));
            assert_eq!(
                EnrollmentStatus::parse(&status.label().to_uppercase()),
                Some(status)
            );
        }
        assert_eq!(EnrollmentStatus::parse("graduated"), None);
    }

    #[test]
    fn test_stage_parse_tolerates_free_text() {
        assert_eq!(PaymentStage::parse("advance"), PaymentStage::Advance);
        assert_eq!(PaymentStage::parse("2nd"), PaymentStage::Second);
        assert_eq!(PaymentStage::parse("FINAL"), PaymentStage::Final);
        assert_eq!(PaymentStage::parse("late fee"), PaymentStage::Other);
    }

    #[test]
    fn test_mode_parse_unknown_is_none() {
        assert_eq!(PaymentMode::parse("bank transfer"), Some(PaymentMode::BankTransfer));
        assert_eq!(PaymentMode::parse("barter"), None);
    }

    #[test]
    fn test_template_schema_covers_columns() {
        let schema_json = RawRow::schema_as_json().unwrap();
        for column in RawRow::template_columns() {
            assert!(
                schema_json.contains(column),
                "schema missing column {}",
                column
            );
        }
    }

    #[test]
    fn test_raw_row_set_blank_clears_cell() {
        let mut raw = RawRow {
            email: Some("old@example.com".to_string()),
            ..RawRow::default()
        };
        raw.set(RowField::Email, Some("  ".to_string()));
        assert_eq!(raw.email, None);

        raw.set(RowField::Email, Some("new@example.com".to_string()));
        assert_eq!(raw.email.as_deref(), Some("new@example.com"));
    }

    #[test]
    fn test_outcome_markdown_report() {
        let outcome = ImportOutcome {
            success: 2,
            skipped: 1,
            referrals_created: 1,
            errors: vec![],
        };
        let report = outcome.to_markdown();
        assert!(report.contains("**Imported:** 2"));
        assert!(report.contains("**Skipped (duplicate):** 1"));
        assert_eq!(outcome.total_rows(), 3);
    }
}
