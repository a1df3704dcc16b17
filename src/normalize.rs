use crate::schema::{
    Course, EnrollmentRow, EnrollmentStatus, FieldError, PaymentMode, PaymentStage, RawRow,
    RowField, StagePayment,
};
use crate::utils::{is_valid_email, parse_amount, parse_flexible_date};
use chrono::NaiveDate;

/// Case-insensitive course lookup by name. Shared with the commit pipeline,
/// which re-resolves at write time.
pub fn find_course<'a>(courses: &'a [Course], name: &str) -> Option<&'a Course> {
    let needle = name.trim().to_lowercase();
    courses.iter().find(|c| c.name.to_lowercase() == needle)
}

fn cell(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required_text(
    value: &Option<String>,
    field: RowField,
    errors: &mut Vec<FieldError>,
) -> String {
    match cell(value) {
        Some(text) => text.to_string(),
        None => {
            errors.push(FieldError::new(field, "required"));
            String::new()
        }
    }
}

fn optional_date(
    value: &Option<String>,
    field: RowField,
    errors: &mut Vec<FieldError>,
) -> Option<NaiveDate> {
    let text = cell(value)?;
    let parsed = parse_flexible_date(text);
    if parsed.is_none() {
        errors.push(FieldError::new(
            field,
            format!("unparseable date '{}': expected DD/MM/YYYY or a serial number", text),
        ));
    }
    parsed
}

fn stage_payment(
    raw_amount: &Option<String>,
    raw_mode: &Option<String>,
    raw_date: &Option<String>,
    stage: PaymentStage,
    amount_field: RowField,
    date_field: RowField,
    errors: &mut Vec<FieldError>,
) -> Option<StagePayment> {
    let amount_text = cell(raw_amount)?;
    let amount = match parse_amount(amount_text) {
        Some(amount) => amount,
        None => {
            errors.push(FieldError::new(
                amount_field,
                format!("unparseable amount '{}'", amount_text),
            ));
            return None;
        }
    };

    if amount == 0.0 {
        return None;
    }

    // Unrecognized modes are left unset here and coerced to the default at
    // commit time, matching the write-side tolerance.
    let mode = cell(raw_mode).and_then(PaymentMode::parse);
    let date = optional_date(raw_date, date_field, errors);

    Some(StagePayment {
        stage,
        amount,
        mode,
        date,
    })
}

/// Validates and types one raw row. Always returns a row, even on errors:
/// staging keeps the partial result so the operator can fix cells in place.
pub fn normalize(raw: &RawRow, courses: &[Course]) -> (EnrollmentRow, Vec<FieldError>) {
    let mut errors = Vec::new();

    let full_name = required_text(&raw.full_name, RowField::FullName, &mut errors);
    let phone = required_text(&raw.phone, RowField::Phone, &mut errors);

    let email = required_text(&raw.email, RowField::Email, &mut errors);
    if !email.is_empty() && !is_valid_email(&email) {
        errors.push(FieldError::new(
            RowField::Email,
            format!("'{}' is not a valid email address", email),
        ));
    }

    let join_date = match cell(&raw.join_date) {
        Some(_) => optional_date(&raw.join_date, RowField::JoinDate, &mut errors),
        None => {
            errors.push(FieldError::new(RowField::JoinDate, "required"));
            None
        }
    };
    let class_start_date = optional_date(&raw.class_start_date, RowField::ClassStartDate, &mut errors);

    let course_name = cell(&raw.course_name).map(str::to_string);
    if let Some(name) = &course_name {
        if find_course(courses, name).is_none() {
            errors.push(FieldError::new(
                RowField::CourseName,
                format!("course not found: {}", name),
            ));
        }
    }

    let status = match cell(&raw.status) {
        Some(text) => {
            let parsed = EnrollmentStatus::parse(text);
            if parsed.is_none() {
                errors.push(FieldError::new(
                    RowField::Status,
                    format!("unknown status '{}'", text),
                ));
            }
            parsed
        }
        None => None,
    };

    let total_fee = match cell(&raw.total_fee) {
        Some(text) => match parse_amount(text) {
            Some(fee) if fee >= 0.0 => fee,
            Some(_) => {
                errors.push(FieldError::new(RowField::TotalFee, "must not be negative"));
                0.0
            }
            None => {
                errors.push(FieldError::new(
                    RowField::TotalFee,
                    format!("unparseable amount '{}'", text),
                ));
                0.0
            }
        },
        None => 0.0,
    };

    let mut payments = Vec::new();
    let groups = [
        (
            &raw.advance_amount,
            &raw.advance_mode,
            &raw.advance_date,
            PaymentStage::Advance,
            RowField::AdvanceAmount,
            RowField::AdvanceDate,
        ),
        (
            &raw.second_amount,
            &raw.second_mode,
            &raw.second_date,
            PaymentStage::Second,
            RowField::SecondAmount,
            RowField::SecondDate,
        ),
        (
            &raw.third_amount,
            &raw.third_mode,
            &raw.third_date,
            PaymentStage::Third,
            RowField::ThirdAmount,
            RowField::ThirdDate,
        ),
        (
            &raw.final_amount,
            &raw.final_mode,
            &raw.final_date,
            PaymentStage::Final,
            RowField::FinalAmount,
            RowField::FinalDate,
        ),
    ];
    for (amount, mode, date, stage, amount_field, date_field) in groups {
        if let Some(payment) =
            stage_payment(amount, mode, date, stage, amount_field, date_field, &mut errors)
        {
            payments.push(payment);
        }
    }

    let referral_fee = match cell(&raw.referral_fee) {
        Some(text) => {
            let parsed = parse_amount(text);
            if parsed.is_none() {
                errors.push(FieldError::new(
                    RowField::ReferralFee,
                    format!("unparseable amount '{}'", text),
                ));
            }
            parsed
        }
        None => None,
    };

    let row = EnrollmentRow {
        full_name,
        email,
        phone,
        country: cell(&raw.country).map(str::to_string),
        passport_no: cell(&raw.passport_no).map(str::to_string),
        address: cell(&raw.address).map(str::to_string),
        course_name,
        batch_no: cell(&raw.batch_no).map(str::to_string),
        join_date,
        class_start_date,
        status,
        total_fee,
        referred_by: cell(&raw.referred_by).map(str::to_string),
        payments,
        referral_fee,
    };

    (row, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn courses() -> Vec<Course> {
        vec![
            Course {
                id: 1,
                name: "Data Engineering".to_string(),
                fee: 1200.0,
            },
            Course {
                id: 2,
                name: "Cloud Fundamentals".to_string(),
                fee: 800.0,
            },
        ]
    }

    fn valid_raw() -> RawRow {
        RawRow {
            full_name: Some("Amina Rahman".to_string()),
            email: Some("amina@example.com".to_string()),
            phone: Some("+880171234567".to_string()),
            course_name: Some("data engineering".to_string()),
            join_date: Some("15/01/2026".to_string()),
            total_fee: Some("1,200".to_string()),
            advance_amount: Some("500".to_string()),
            advance_mode: Some("bank transfer".to_string()),
            advance_date: Some("15/01/2026".to_string()),
            ..RawRow::default()
        }
    }

    #[test]
    fn test_valid_row_normalizes_cleanly() {
        let (row, errors) = normalize(&valid_raw(), &courses());
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        assert_eq!(row.full_name, "Amina Rahman");
        assert_eq!(row.total_fee, 1200.0);
        assert_eq!(
            row.join_date,
            Some(NaiveDate::from_ymd_opt(2026, 1, 15).unwrap())
        );
        assert_eq!(row.payments.len(), 1);
        assert_eq!(row.payments[0].stage, PaymentStage::Advance);
        assert_eq!(row.payments[0].mode, Some(PaymentMode::BankTransfer));
    }

    #[test]
    fn test_missing_required_fields() {
        let raw = RawRow {
            course_name: Some("Data Engineering".to_string()),
            ..RawRow::default()
        };
        let (_, errors) = normalize(&raw, &courses());
        let fields: Vec<RowField> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&RowField::FullName));
        assert!(fields.contains(&RowField::Email));
        assert!(fields.contains(&RowField::Phone));
        assert!(fields.contains(&RowField::JoinDate));
    }

    #[test]
    fn test_bad_email_shape() {
        let mut raw = valid_raw();
        raw.email = Some("not-an-email".to_string());
        let (_, errors) = normalize(&raw, &courses());
        assert!(errors.iter().any(|e| e.field == RowField::Email));
    }

    #[test]
    fn test_unknown_course_is_flagged_not_dropped() {
        let mut raw = valid_raw();
        raw.course_name = Some("Underwater Basket Weaving".to_string());
        let (row, errors) = normalize(&raw, &courses());
        assert!(errors
            .iter()
            .any(|e| e.field == RowField::CourseName && e.message.contains("course not found")));
        // The operator's text is kept so they can correct it in place.
        assert_eq!(row.course_name.as_deref(), Some("Underwater Basket Weaving"));
    }

    #[test]
    fn test_unknown_status_is_error_and_unset() {
        let mut raw = valid_raw();
        raw.status = Some("graduated".to_string());
        let (row, errors) = normalize(&raw, &courses());
        assert!(errors.iter().any(|e| e.field == RowField::Status));
        assert_eq!(row.status, None);
    }

    #[test]
    fn test_unparseable_join_date_never_defaults_to_now() {
        let mut raw = valid_raw();
        raw.join_date = Some("sometime soon".to_string());
        let (row, errors) = normalize(&raw, &courses());
        assert!(errors.iter().any(|e| e.field == RowField::JoinDate));
        assert_eq!(row.join_date, None);
    }

    #[test]
    fn test_serial_join_date() {
        let mut raw = valid_raw();
        raw.join_date = Some("45292".to_string());
        let (row, errors) = normalize(&raw, &courses());
        assert!(errors.is_empty());
        assert_eq!(
            row.join_date,
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
    }

    #[test]
    fn test_zero_amount_stage_is_dropped() {
        let mut raw = valid_raw();
        raw.second_amount = Some("0".to_string());
        let (row, errors) = normalize(&raw, &courses());
        assert!(errors.is_empty());
        assert_eq!(row.payments.len(), 1);
    }

    #[test]
    fn test_unrecognized_mode_is_lenient() {
        let mut raw = valid_raw();
        raw.advance_mode = Some("goats".to_string());
        let (row, errors) = normalize(&raw, &courses());
        assert!(errors.is_empty());
        assert_eq!(row.payments[0].mode, None);
    }
}
