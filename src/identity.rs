use crate::schema::NewReferral;
use crate::store::{EnrollmentStore, StoreError};
use chrono::Utc;
use log::{debug, warn};

pub const STUDENT_CODE_TAG: &str = "ATZ";
pub const REFERRAL_CODE_PREFIX: &str = "REF-";

const CODE_WIDTH: usize = 3;

/// Note attached to referrals the import creates on the fly, so they can be
/// told apart from manually entered ones.
pub const AUTO_CREATED_NOTE: &str = "Auto-created during bulk import";

pub fn student_code_prefix(year: i32) -> String {
    format!("{}-{}-", STUDENT_CODE_TAG, year)
}

fn numeric_suffix(code: &str) -> Option<u32> {
    code.rsplit('-').next()?.parse().ok()
}

/// Read-max-then-increment over the codes already in the scope. Not atomic:
/// correctness relies on the commit pipeline running rows sequentially
/// within one process. Concurrent writers need a storage-side sequence.
fn next_in_scope<S: EnrollmentStore>(store: &S, prefix: &str) -> Result<String, StoreError> {
    let codes = store.list_codes_by_prefix(prefix)?;
    let max = codes.iter().filter_map(|c| numeric_suffix(c)).max().unwrap_or(0);
    Ok(format!("{}{:0width$}", prefix, max + 1, width = CODE_WIDTH))
}

fn fallback_code(prefix: &str) -> String {
    // Timestamp suffix keeps the row importable when the code scan fails;
    // uniqueness is still enforced by storage on write.
    format!("{}{}", prefix, Utc::now().timestamp())
}

/// Next year-scoped student code, e.g. `ATZ-2026-007`. Allocation failure
/// is recovered with a timestamp suffix and logged, never surfaced.
pub fn next_student_code<S: EnrollmentStore>(store: &S, year: i32) -> String {
    let prefix = student_code_prefix(year);
    match next_in_scope(store, &prefix) {
        Ok(code) => code,
        Err(e) => {
            warn!("student code allocation failed ({}), using timestamp fallback", e);
            fallback_code(&prefix)
        }
    }
}

/// Next referral code, e.g. `REF-012`. Same fallback policy as student codes.
pub fn next_referral_code<S: EnrollmentStore>(store: &S) -> String {
    match next_in_scope(store, REFERRAL_CODE_PREFIX) {
        Ok(code) => code,
        Err(e) => {
            warn!("referral code allocation failed ({}), using timestamp fallback", e);
            fallback_code(REFERRAL_CODE_PREFIX)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedReferral {
    pub id: i64,
    /// True when no existing referral matched and one was created.
    pub created: bool,
}

/// Finds the referral for a referrer name, creating one when the
/// case-insensitive lookup misses. A blank name means a direct enrollment
/// and resolves to `None` without touching storage.
pub fn resolve_referral<S: EnrollmentStore>(
    store: &mut S,
    name: &str,
) -> Result<Option<ResolvedReferral>, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if let Some(existing) = store.find_referral_by_name(trimmed)? {
        return Ok(Some(ResolvedReferral {
            id: existing.id,
            created: false,
        }));
    }

    let code = next_referral_code(store);
    let created = store.insert_referral(NewReferral {
        code,
        full_name: trimmed.to_string(),
        phone: None,
        email: None,
        bank_name: None,
        bank_account: None,
        notes: Some(AUTO_CREATED_NOTE.to_string()),
    })?;
    debug!("created referral {} ({})", created.code, created.full_name);

    Ok(Some(ResolvedReferral {
        id: created.id,
        created: true,
    }))
}
