//! Read-only collaborators that feed the assembler: ERP revenue rows, the
//! Simples Nacional tax-table dictionary and payroll history.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::activity::SegmentKey;
use crate::declaration::Period;

/// One ERP fact: a revenue base amount booked against a tax-table segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueRow {
    pub establishment_id: String,
    pub taxpayer_id: String,
    pub segment: SegmentKey,
    pub base_amount: f64,
    pub reference_date: NaiveDate,
    #[serde(default)]
    pub qualifiers: Vec<TaxQualifier>,
}

impl RevenueRow {
    /// Rows that carry actual revenue: a real segment and a positive amount.
    pub fn has_movement(&self) -> bool {
        !self.segment.is_placeholder() && self.base_amount > 0.0
    }
}

/// Per-tax qualifier attached to a revenue line (`qualificacoesTributarias`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxQualifier {
    #[serde(rename = "codigoTributo")]
    pub tax_code: u32,
    #[serde(rename = "id")]
    pub qualification_id: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{source_name} unavailable: {message}")]
    Unavailable {
        source_name: &'static str,
        message: String,
    },
    #[error("{source_name} returned malformed data: {message}")]
    Malformed {
        source_name: &'static str,
        message: String,
    },
}

pub trait RevenueSource: Send + Sync {
    fn revenue_rows(&self, taxpayer_id: &str, period: Period)
        -> Result<Vec<RevenueRow>, SourceError>;
}

pub trait TaxTableSource: Send + Sync {
    /// Latest description of `segment` whose effective date is on or before `as_of`.
    fn effective_description(
        &self,
        segment: SegmentKey,
        as_of: NaiveDate,
    ) -> Result<Option<String>, SourceError>;
}

pub trait PayrollSource: Send + Sync {
    fn payroll_total(&self, taxpayer_id: &str, period: Period) -> Result<Option<f64>, SourceError>;
}

/// Payroll source for taxpayers without payroll integration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPayroll;

impl PayrollSource for NoPayroll {
    fn payroll_total(&self, _taxpayer_id: &str, _period: Period) -> Result<Option<f64>, SourceError> {
        Ok(None)
    }
}
