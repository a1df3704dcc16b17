use crate::schema::{
    Course, NewReferral, PaymentLedgerEntry, Referral, ReferralPaymentEntry, Student,
};
use thiserror::Error;

/// Typed failure from the storage boundary. `Duplicate` is the uniqueness
/// violation the commit pipeline downgrades to a skip; `Timeout` is a
/// per-call deadline expiry, treated as a row-level failure.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage call timed out")]
    Timeout,

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

/// The storage contract the import and reconciliation cores run against.
/// Calls are blocking; implementations are expected to enforce their own
/// per-call deadline and surface expiry as `StoreError::Timeout`.
pub trait EnrollmentStore {
    fn student_exists_by_email(&self, email: &str) -> Result<bool, StoreError>;
    fn find_referral_by_name(&self, name: &str) -> Result<Option<Referral>, StoreError>;
    /// All known codes starting with the prefix, across students and
    /// referrals. Used by sequential code allocation.
    fn list_codes_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
    fn insert_student(&mut self, student: Student) -> Result<(), StoreError>;
    fn insert_referral(&mut self, referral: NewReferral) -> Result<Referral, StoreError>;
    fn insert_ledger_entries(&mut self, entries: Vec<PaymentLedgerEntry>)
        -> Result<(), StoreError>;
    fn insert_referral_payment(&mut self, payment: ReferralPaymentEntry)
        -> Result<(), StoreError>;
    fn list_students(&self) -> Result<Vec<Student>, StoreError>;
    fn list_ledger_entries(&self) -> Result<Vec<PaymentLedgerEntry>, StoreError>;
    fn list_courses(&self) -> Result<Vec<Course>, StoreError>;
}

/// In-memory store: id counters, email uniqueness, no persistence. Backs
/// the test suite and callers prototyping without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    students: Vec<Student>,
    referrals: Vec<Referral>,
    ledger: Vec<PaymentLedgerEntry>,
    referral_payments: Vec<ReferralPaymentEntry>,
    courses: Vec<Course>,
    next_referral_id: i64,
    next_ledger_id: i64,
    next_payment_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_courses(courses: Vec<Course>) -> Self {
        Self {
            courses,
            ..Self::default()
        }
    }

    pub fn referral_payments(&self) -> &[ReferralPaymentEntry] {
        &self.referral_payments
    }

    pub fn referrals(&self) -> &[Referral] {
        &self.referrals
    }
}

impl EnrollmentStore for MemoryStore {
    fn student_exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let needle = email.trim().to_lowercase();
        Ok(self
            .students
            .iter()
            .any(|s| s.email.to_lowercase() == needle))
    }

    fn find_referral_by_name(&self, name: &str) -> Result<Option<Referral>, StoreError> {
        let needle = name.trim().to_lowercase();
        Ok(self
            .referrals
            .iter()
            .find(|r| r.full_name.to_lowercase() == needle)
            .cloned())
    }

    fn list_codes_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut codes: Vec<String> = self
            .students
            .iter()
            .map(|s| s.student_id.clone())
            .chain(self.referrals.iter().map(|r| r.code.clone()))
            .filter(|code| code.starts_with(prefix))
            .collect();
        codes.sort();
        Ok(codes)
    }

    fn insert_student(&mut self, student: Student) -> Result<(), StoreError> {
        if self.student_exists_by_email(&student.email)? {
            return Err(StoreError::Duplicate(student.email));
        }
        if self.students.iter().any(|s| s.student_id == student.student_id) {
            return Err(StoreError::Duplicate(student.student_id));
        }
        self.students.push(student);
        Ok(())
    }

    fn insert_referral(&mut self, referral: NewReferral) -> Result<Referral, StoreError> {
        if self.referrals.iter().any(|r| r.code == referral.code) {
            return Err(StoreError::Duplicate(referral.code));
        }
        self.next_referral_id += 1;
        let created = Referral {
            id: self.next_referral_id,
            code: referral.code,
            full_name: referral.full_name,
            phone: referral.phone,
            email: referral.email,
            bank_name: referral.bank_name,
            bank_account: referral.bank_account,
            notes: referral.notes,
        };
        self.referrals.push(created.clone());
        Ok(created)
    }

    fn insert_ledger_entries(
        &mut self,
        entries: Vec<PaymentLedgerEntry>,
    ) -> Result<(), StoreError> {
        for mut entry in entries {
            self.next_ledger_id += 1;
            entry.id = self.next_ledger_id;
            self.ledger.push(entry);
        }
        Ok(())
    }

    fn insert_referral_payment(
        &mut self,
        mut payment: ReferralPaymentEntry,
    ) -> Result<(), StoreError> {
        self.next_payment_id += 1;
        payment.id = self.next_payment_id;
        self.referral_payments.push(payment);
        Ok(())
    }

    fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        Ok(self.students.clone())
    }

    fn list_ledger_entries(&self) -> Result<Vec<PaymentLedgerEntry>, StoreError> {
        Ok(self.ledger.clone())
    }

    fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
        Ok(self.courses.clone())
    }
}
