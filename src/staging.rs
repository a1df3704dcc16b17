use crate::error::{ImportError, Result};
use crate::normalize::normalize;
use crate::schema::{Course, EnrollmentRow, FieldError, RawRow, RowField};
use log::debug;
use serde::{Deserialize, Serialize};

/// One batch row under review: the raw cells the operator edits, the typed
/// row derived from them, and the current field errors.
#[derive(Debug, Clone)]
pub struct StagedRow {
    raw: RawRow,
    row: EnrollmentRow,
    errors: Vec<FieldError>,
}

impl StagedRow {
    pub fn raw(&self) -> &RawRow {
        &self.raw
    }

    pub fn row(&self) -> &EnrollmentRow {
        &self.row
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn is_ready(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Aggregate readiness of the staged batch. The caller's UI gates commit on
/// `error_count == 0`; the commit pipeline itself never assumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub total: usize,
    pub error_count: usize,
    pub ready_count: usize,
}

/// The in-memory review session for one parsed batch. Single editor, no
/// background work; every edit re-derives the typed row from the raw cells,
/// so validation state can never drift from the data.
pub struct StagingSession {
    rows: Vec<StagedRow>,
    courses: Vec<Course>,
}

impl StagingSession {
    pub fn new(raw_rows: Vec<RawRow>, courses: Vec<Course>) -> Self {
        let rows = raw_rows
            .into_iter()
            .map(|raw| {
                let (row, errors) = normalize(&raw, &courses);
                StagedRow { raw, row, errors }
            })
            .collect();
        Self { rows, courses }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[StagedRow] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&StagedRow> {
        self.rows.get(index)
    }

    /// Applies one cell edit and re-validates that row. A blank value
    /// clears the cell. Returns the row's field errors after the edit.
    pub fn edit(
        &mut self,
        index: usize,
        field: RowField,
        value: Option<String>,
    ) -> Result<&[FieldError]> {
        let len = self.rows.len();
        let staged = self
            .rows
            .get_mut(index)
            .ok_or(ImportError::RowOutOfRange { index, len })?;

        staged.raw.set(field, value);
        let (row, errors) = normalize(&staged.raw, &self.courses);
        debug!(
            "staging edit row {} field {}: {} error(s)",
            index,
            field,
            errors.len()
        );
        staged.row = row;
        staged.errors = errors;
        Ok(&self.rows[index].errors)
    }

    /// Re-runs validation for one row against current reference data
    /// without changing any cell.
    pub fn revalidate(&mut self, index: usize) -> Result<&[FieldError]> {
        let len = self.rows.len();
        let staged = self
            .rows
            .get_mut(index)
            .ok_or(ImportError::RowOutOfRange { index, len })?;

        let (row, errors) = normalize(&staged.raw, &self.courses);
        staged.row = row;
        staged.errors = errors;
        Ok(&self.rows[index].errors)
    }

    pub fn readiness(&self) -> Readiness {
        let total = self.rows.len();
        let error_count = self.rows.iter().filter(|r| !r.is_ready()).count();
        Readiness {
            total,
            error_count,
            ready_count: total - error_count,
        }
    }

    /// Hands the typed rows to the commit pipeline, consuming the session.
    /// Rows still carrying field errors are included; downstream checks
    /// fail them individually rather than blocking the batch.
    pub fn into_rows(self) -> Vec<EnrollmentRow> {
        self.rows.into_iter().map(|staged| staged.row).collect()
    }
}
