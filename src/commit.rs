use crate::error::{ImportError, Result};
use crate::identity::{next_student_code, resolve_referral};
use crate::normalize::find_course;
use crate::schema::{
    Course, EnrollmentRow, ImportOutcome, PaymentLedgerEntry, PaymentMode, PaymentStage,
    ReferralPaymentEntry, RowError, RowWrites, Student,
};
use crate::store::EnrollmentStore;
use chrono::Datelike;
use log::{debug, info, warn};

/// Note attached to referral payouts recorded by the import.
const IMPORT_PAYMENT_NOTE: &str = "Recorded during bulk import";

enum RowResult {
    Imported,
    /// Email already present, either found up front or raced on write.
    Skipped,
    Failed { message: String, writes: RowWrites },
}

struct ProcessedRow {
    result: RowResult,
    referral_created: bool,
}

/// Writes a batch of enrollment rows to storage, one row at a time. Rows
/// are strictly sequential: the non-atomic code allocator depends on no
/// other writer running between the code scan and the student insert.
/// One row's failure never aborts the batch; every input row lands in the
/// outcome exactly once, as success, skipped, or an error record.
pub struct CommitPipeline<'a, S: EnrollmentStore> {
    store: &'a mut S,
    courses: Vec<Course>,
}

impl<'a, S: EnrollmentStore> CommitPipeline<'a, S> {
    pub fn new(store: &'a mut S) -> Result<Self> {
        let courses = store.list_courses()?;
        Ok(Self { store, courses })
    }

    pub fn commit(&mut self, rows: Vec<EnrollmentRow>) -> ImportOutcome {
        info!("committing enrollment batch of {} row(s)", rows.len());

        let mut outcome = ImportOutcome::default();
        for (index, row) in rows.into_iter().enumerate() {
            let processed = self.process_row(&row);
            if processed.referral_created {
                outcome.referrals_created += 1;
            }
            match processed.result {
                RowResult::Imported => {
                    debug!("row {}: imported {}", index + 1, row.email);
                    outcome.success += 1;
                }
                RowResult::Skipped => {
                    debug!("row {}: duplicate email {}, skipped", index + 1, row.email);
                    outcome.skipped += 1;
                }
                RowResult::Failed { message, writes } => {
                    warn!("row {}: {}", index + 1, message);
                    outcome.errors.push(RowError {
                        row_number: index + 1,
                        full_name: row.full_name.clone(),
                        email: row.email.clone(),
                        message,
                        writes,
                        row,
                    });
                }
            }
        }

        info!(
            "batch done: {} imported, {} skipped, {} failed, {} referral(s) created",
            outcome.success,
            outcome.skipped,
            outcome.errors.len(),
            outcome.referrals_created
        );
        outcome
    }

    fn process_row(&mut self, row: &EnrollmentRow) -> ProcessedRow {
        let mut writes = RowWrites::default();

        // Rows can arrive here still failing normalization; the batch must
        // survive them, so the checks repeat as row-level failures.
        for (value, what) in [
            (&row.full_name, "full name"),
            (&row.email, "email"),
            (&row.phone, "phone"),
        ] {
            if value.trim().is_empty() {
                return ProcessedRow {
                    result: RowResult::Failed {
                        message: ImportError::MissingField(what.to_string()).to_string(),
                        writes,
                    },
                    referral_created: false,
                };
            }
        }
        let join_date = match row.join_date {
            Some(date) => date,
            None => {
                return ProcessedRow {
                    result: RowResult::Failed {
                        message: ImportError::MissingField("join date".to_string()).to_string(),
                        writes,
                    },
                    referral_created: false,
                }
            }
        };

        match self.store.student_exists_by_email(&row.email) {
            Ok(true) => {
                return ProcessedRow {
                    result: RowResult::Skipped,
                    referral_created: false,
                }
            }
            Ok(false) => {}
            Err(e) => {
                return ProcessedRow {
                    result: RowResult::Failed {
                        message: format!("duplicate check failed: {}", e),
                        writes,
                    },
                    referral_created: false,
                }
            }
        }

        let course_id = match &row.course_name {
            Some(name) => match find_course(&self.courses, name) {
                Some(course) => Some(course.id),
                None => {
                    return ProcessedRow {
                        result: RowResult::Failed {
                            message: ImportError::CourseNotFound(name.clone()).to_string(),
                            writes,
                        },
                        referral_created: false,
                    }
                }
            },
            None => None,
        };

        // Referral failures are soft: the student is still written without
        // a referral link, and the row surfaces as an error record.
        let referred_by = row.referred_by.as_deref().unwrap_or("");
        let (referral, referral_error) = match resolve_referral(self.store, referred_by) {
            Ok(resolved) => (resolved, None),
            Err(e) => (None, Some(format!("referral resolution failed: {}", e))),
        };
        let referral_created = referral.map(|r| r.created).unwrap_or(false);

        let student_id = next_student_code(self.store, join_date.year());

        let advance_payment = row
            .payments
            .iter()
            .find(|p| p.stage == PaymentStage::Advance)
            .map(|p| p.amount)
            .unwrap_or(0.0);

        let student = Student {
            student_id: student_id.clone(),
            full_name: row.full_name.clone(),
            email: row.email.clone(),
            phone: row.phone.clone(),
            address: row.address.clone(),
            country: row.country.clone(),
            passport_no: row.passport_no.clone(),
            course_id,
            batch_no: row.batch_no.clone(),
            join_date,
            class_start_date: row.class_start_date,
            // Staging reports an unknown status as a field error; here it is
            // coerced to the default instead. Deliberate asymmetry.
            status: row.status.unwrap_or_default(),
            total_fee: row.total_fee,
            advance_payment,
            referral_id: referral.map(|r| r.id),
            notes: None,
        };

        if let Err(e) = self.store.insert_student(student) {
            if e.is_duplicate() {
                // Lost a race against another writer; same as found-up-front.
                return ProcessedRow {
                    result: RowResult::Skipped,
                    referral_created,
                };
            }
            return ProcessedRow {
                result: RowResult::Failed {
                    message: format!("student write failed: {}", e),
                    writes,
                },
                referral_created,
            };
        }
        writes.student = true;

        let entries: Vec<PaymentLedgerEntry> = row
            .payments
            .iter()
            .map(|p| PaymentLedgerEntry {
                id: 0,
                student_id: student_id.clone(),
                stage: p.stage.label().to_string(),
                amount: p.amount,
                payment_mode: p.mode.unwrap_or_default().label().to_string(),
                payment_date: p.date,
            })
            .collect();
        if !entries.is_empty() {
            if let Err(e) = self.store.insert_ledger_entries(entries) {
                return ProcessedRow {
                    result: RowResult::Failed {
                        message: format!("student created but ledger write failed: {}", e),
                        writes,
                    },
                    referral_created,
                };
            }
            writes.ledger = true;
        }

        if let Some(resolved) = referral {
            if let Some(fee) = row.referral_fee.filter(|f| *f > 0.0) {
                let payment = ReferralPaymentEntry {
                    id: 0,
                    referral_id: resolved.id,
                    student_id: student_id.clone(),
                    amount: fee,
                    payment_date: Some(join_date),
                    method: PaymentMode::default().label().to_string(),
                    notes: Some(IMPORT_PAYMENT_NOTE.to_string()),
                };
                if let Err(e) = self.store.insert_referral_payment(payment) {
                    return ProcessedRow {
                        result: RowResult::Failed {
                            message: format!(
                                "student created but referral payment write failed: {}",
                                e
                            ),
                            writes,
                        },
                        referral_created,
                    };
                }
                writes.referral_payment = true;
            }
        }

        if let Some(message) = referral_error {
            return ProcessedRow {
                result: RowResult::Failed {
                    message: format!("student created without referral link: {}", message),
                    writes,
                },
                referral_created,
            };
        }

        ProcessedRow {
            result: RowResult::Imported,
            referral_created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnrollmentStatus, NewReferral, Referral, StagePayment};
    use crate::store::{MemoryStore, StoreError};
    use chrono::NaiveDate;
    // The store trait returns plain results, not the crate alias.
    use std::result::Result;

    fn courses() -> Vec<Course> {
        vec![Course {
            id: 1,
            name: "Data Engineering".to_string(),
            fee: 1200.0,
        }]
    }

    fn row(email: &str) -> EnrollmentRow {
        EnrollmentRow {
            full_name: "Amina Rahman".to_string(),
            email: email.to_string(),
            phone: "+880171234567".to_string(),
            country: None,
            passport_no: None,
            address: None,
            course_name: Some("Data Engineering".to_string()),
            batch_no: Some("B-12".to_string()),
            join_date: NaiveDate::from_ymd_opt(2026, 1, 15),
            class_start_date: None,
            status: None,
            total_fee: 1200.0,
            referred_by: None,
            payments: vec![StagePayment {
                stage: PaymentStage::Advance,
                amount: 500.0,
                mode: None,
                date: NaiveDate::from_ymd_opt(2026, 1, 15),
            }],
            referral_fee: None,
        }
    }

    #[test]
    fn test_three_rows_one_duplicate() {
        let mut store = MemoryStore::with_courses(courses());
        let mut pipeline = CommitPipeline::new(&mut store).unwrap();
        pipeline.commit(vec![row("existing@example.com")]);

        let mut pipeline = CommitPipeline::new(&mut store).unwrap();
        let outcome = pipeline.commit(vec![
            row("a@example.com"),
            row("existing@example.com"),
            row("b@example.com"),
        ]);

        assert_eq!(outcome.success, 2);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.total_rows(), 3);
    }

    #[test]
    fn test_rerun_skips_every_row() {
        let mut store = MemoryStore::with_courses(courses());
        let batch = vec![row("a@example.com"), row("b@example.com")];

        let first = CommitPipeline::new(&mut store).unwrap().commit(batch.clone());
        assert_eq!(first.success, 2);

        let second = CommitPipeline::new(&mut store).unwrap().commit(batch);
        assert_eq!(second.success, 0);
        assert_eq!(second.skipped, 2);
        assert!(second.errors.is_empty());
    }

    #[test]
    fn test_unknown_course_fails_row_without_aborting_batch() {
        let mut store = MemoryStore::with_courses(courses());
        let mut bad = row("bad@example.com");
        bad.course_name = Some("Alchemy".to_string());

        let outcome = CommitPipeline::new(&mut store)
            .unwrap()
            .commit(vec![bad, row("good@example.com")]);

        assert_eq!(outcome.success, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row_number, 1);
        assert!(outcome.errors[0].message.contains("Course not found"));
        assert_eq!(outcome.errors[0].writes, RowWrites::default());
    }

    #[test]
    fn test_missing_join_date_fails_row() {
        let mut store = MemoryStore::with_courses(courses());
        let mut bad = row("bad@example.com");
        bad.join_date = None;

        let outcome = CommitPipeline::new(&mut store).unwrap().commit(vec![bad]);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].message.contains("join date"));
    }

    #[test]
    fn test_referral_created_once_and_linked() {
        let mut store = MemoryStore::with_courses(courses());
        let mut first = row("a@example.com");
        first.referred_by = Some("Jane Referrer".to_string());
        let mut second = row("b@example.com");
        second.referred_by = Some("JANE referrer".to_string());

        let outcome = CommitPipeline::new(&mut store)
            .unwrap()
            .commit(vec![first, second]);

        assert_eq!(outcome.success, 2);
        assert_eq!(outcome.referrals_created, 1);
        assert_eq!(store.referrals().len(), 1);

        let referral_id = store.referrals()[0].id;
        let students = store.list_students().unwrap();
        assert!(students.iter().all(|s| s.referral_id == Some(referral_id)));
    }

    #[test]
    fn test_ledger_entries_written_with_coerced_mode() {
        let mut store = MemoryStore::with_courses(courses());
        let mut r = row("a@example.com");
        r.payments.push(StagePayment {
            stage: PaymentStage::Second,
            amount: 300.0,
            mode: Some(PaymentMode::Card),
            date: NaiveDate::from_ymd_opt(2026, 2, 15),
        });

        CommitPipeline::new(&mut store).unwrap().commit(vec![r]);

        let ledger = store.list_ledger_entries().unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger[0].stage, "Advance");
        assert_eq!(ledger[0].payment_mode, "Cash");
        assert_eq!(ledger[1].stage, "Second");
        assert_eq!(ledger[1].payment_mode, "Card");
    }

    #[test]
    fn test_referral_fee_records_payout() {
        let mut store = MemoryStore::with_courses(courses());
        let mut r = row("a@example.com");
        r.referred_by = Some("Jane Referrer".to_string());
        r.referral_fee = Some(100.0);

        let outcome = CommitPipeline::new(&mut store).unwrap().commit(vec![r]);
        assert_eq!(outcome.success, 1);

        let payments = store.referral_payments();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].amount, 100.0);
        assert_eq!(payments[0].notes.as_deref(), Some(IMPORT_PAYMENT_NOTE));
    }

    #[test]
    fn test_unset_status_coerced_to_default() {
        let mut store = MemoryStore::with_courses(courses());
        CommitPipeline::new(&mut store)
            .unwrap()
            .commit(vec![row("a@example.com")]);

        let students = store.list_students().unwrap();
        assert_eq!(students[0].status, EnrollmentStatus::AttendsSessions);
    }

    #[test]
    fn test_student_codes_sequential_within_batch() {
        let mut store = MemoryStore::with_courses(courses());
        let outcome = CommitPipeline::new(&mut store).unwrap().commit(vec![
            row("a@example.com"),
            row("b@example.com"),
            row("c@example.com"),
        ]);
        assert_eq!(outcome.success, 3);

        let mut ids: Vec<String> = store
            .list_students()
            .unwrap()
            .iter()
            .map(|s| s.student_id.clone())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["ATZ-2026-001", "ATZ-2026-002", "ATZ-2026-003"]);
    }

    /// Store that fails selected calls, for partial-write visibility tests.
    struct FlakyStore {
        inner: MemoryStore,
        fail_referral_lookup: bool,
        fail_ledger: bool,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                fail_referral_lookup: false,
                fail_ledger: false,
            }
        }
    }

    impl EnrollmentStore for FlakyStore {
        fn student_exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
            self.inner.student_exists_by_email(email)
        }
        fn find_referral_by_name(&self, name: &str) -> Result<Option<Referral>, StoreError> {
            if self.fail_referral_lookup {
                return Err(StoreError::Timeout);
            }
            self.inner.find_referral_by_name(name)
        }
        fn list_codes_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list_codes_by_prefix(prefix)
        }
        fn insert_student(&mut self, student: Student) -> Result<(), StoreError> {
            self.inner.insert_student(student)
        }
        fn insert_referral(&mut self, referral: NewReferral) -> Result<Referral, StoreError> {
            self.inner.insert_referral(referral)
        }
        fn insert_ledger_entries(
            &mut self,
            entries: Vec<PaymentLedgerEntry>,
        ) -> Result<(), StoreError> {
            if self.fail_ledger {
                return Err(StoreError::Backend("disk full".to_string()));
            }
            self.inner.insert_ledger_entries(entries)
        }
        fn insert_referral_payment(
            &mut self,
            payment: ReferralPaymentEntry,
        ) -> Result<(), StoreError> {
            self.inner.insert_referral_payment(payment)
        }
        fn list_students(&self) -> Result<Vec<Student>, StoreError> {
            self.inner.list_students()
        }
        fn list_ledger_entries(&self) -> Result<Vec<PaymentLedgerEntry>, StoreError> {
            self.inner.list_ledger_entries()
        }
        fn list_courses(&self) -> Result<Vec<Course>, StoreError> {
            self.inner.list_courses()
        }
    }

    #[test]
    fn test_referral_failure_is_soft() {
        let mut store = FlakyStore::new(MemoryStore::with_courses(courses()));
        store.fail_referral_lookup = true;

        let mut r = row("a@example.com");
        r.referred_by = Some("Jane Referrer".to_string());

        let outcome = CommitPipeline::new(&mut store).unwrap().commit(vec![r]);

        // The row is reported as an error, but the student exists without a
        // referral link.
        assert_eq!(outcome.success, 0);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].writes.student);
        assert!(outcome.errors[0]
            .message
            .contains("student created without referral link"));

        let students = store.inner.list_students().unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].referral_id, None);
    }

    #[test]
    fn test_partial_write_is_visible() {
        let mut store = FlakyStore::new(MemoryStore::with_courses(courses()));
        store.fail_ledger = true;

        let outcome = CommitPipeline::new(&mut store)
            .unwrap()
            .commit(vec![row("a@example.com")]);

        assert_eq!(outcome.errors.len(), 1);
        let error = &outcome.errors[0];
        assert!(error.writes.student);
        assert!(!error.writes.ledger);
        assert!(error.message.contains("ledger write failed"));

        // Student survives; the ledger entry does not. Accepted behavior,
        // reported rather than rolled back.
        assert_eq!(store.inner.list_students().unwrap().len(), 1);
        assert!(store.inner.list_ledger_entries().unwrap().is_empty());
    }

    #[test]
    fn test_every_row_accounted_for() {
        let mut store = MemoryStore::with_courses(courses());
        let mut unknown_course = row("c@example.com");
        unknown_course.course_name = Some("Alchemy".to_string());
        let mut no_date = row("d@example.com");
        no_date.join_date = None;

        let outcome = CommitPipeline::new(&mut store).unwrap().commit(vec![
            row("a@example.com"),
            row("b@example.com"),
            unknown_course,
            no_date,
        ]);

        assert_eq!(
            outcome.success + outcome.skipped + outcome.errors.len(),
            4
        );
    }
}
