use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::{
    round_cents, ActivityAggregate, Declaration, DeclarationBody, DeclarationType, Establishment,
    PayrollEntry, Period, RevenueEntry,
};
use crate::activity::{ActivityCode, ActivityResolver, SegmentKey};
use crate::sources::{PayrollSource, RevenueRow, SourceError};

/// Payroll history length required when the fator r applies.
pub const PAYROLL_MONTHS: usize = 12;

const HEAD_OFFICE_SUFFIX: &str = "0001";

#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("no revenue rows to declare")]
    EmptyInput,
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// A revenue row left out of the totals because its segment has no activity id.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedSegment {
    pub establishment_id: String,
    pub segment: SegmentKey,
    pub reference_date: NaiveDate,
    pub amount: f64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDeclaration {
    pub declaration: Declaration,
    pub unresolved: Vec<UnresolvedSegment>,
}

impl AssembledDeclaration {
    pub fn unresolved_amount(&self) -> f64 {
        round_cents(self.unresolved.iter().map(|row| row.amount).sum())
    }
}

/// Builds declarations from one taxpayer's revenue rows for one period.
pub struct DeclarationAssembler {
    resolver: Arc<ActivityResolver>,
    payroll: Arc<dyn PayrollSource>,
    transmit: bool,
}

impl DeclarationAssembler {
    pub fn new(
        resolver: Arc<ActivityResolver>,
        payroll: Arc<dyn PayrollSource>,
        transmit: bool,
    ) -> Self {
        Self {
            resolver,
            payroll,
            transmit,
        }
    }

    pub fn build(
        &self,
        rows: &[RevenueRow],
        declaration_type: DeclarationType,
    ) -> Result<AssembledDeclaration, AssemblyError> {
        let first = rows.first().ok_or(AssemblyError::EmptyInput)?;
        let period = Period::from_date(first.reference_date);
        let head_office = rows
            .iter()
            .find(|row| row.taxpayer_id.ends_with(HEAD_OFFICE_SUFFIX))
            .unwrap_or(first)
            .taxpayer_id
            .clone();

        let movement: Vec<&RevenueRow> = rows.iter().filter(|row| row.has_movement()).collect();
        if movement.is_empty() {
            debug!(%head_office, %period, "no movement in period");
            return Ok(AssembledDeclaration {
                declaration: self.declaration(
                    head_office,
                    period,
                    DeclarationBody {
                        declaration_type,
                        domestic_revenue: 0.0,
                        export_revenue: 0.0,
                        payroll: None,
                        establishments: bare_establishments(rows),
                    },
                ),
                unresolved: Vec::new(),
            });
        }

        let mut groups: Vec<(&str, Establishment)> = Vec::new();
        let mut unresolved = Vec::new();
        let mut domestic = 0.0;
        let mut export = 0.0;
        let mut needs_payroll = false;

        for row in movement {
            if row.segment.annex == 5 {
                needs_payroll = true;
            }

            let resolution = self
                .resolver
                .resolve_segment(row.segment, row.reference_date)?;
            let Some(code) = resolution.code() else {
                warn!(
                    establishment = %row.establishment_id,
                    segment = %row.segment,
                    amount = row.base_amount,
                    "revenue row excluded: segment has no activity id"
                );
                unresolved.push(UnresolvedSegment {
                    establishment_id: row.establishment_id.clone(),
                    segment: row.segment,
                    reference_date: row.reference_date,
                    amount: row.base_amount,
                    description: resolution.description,
                });
                continue;
            };

            if row.segment.annex == 3 && code.is_fator_r() {
                needs_payroll = true;
            }
            if code.is_export() {
                export += row.base_amount;
            } else {
                domestic += row.base_amount;
            }

            add_to_group(&mut groups, row, code);
        }

        let payroll = if needs_payroll {
            self.payroll_history(&head_office, period)?
        } else {
            None
        };

        let establishments = groups
            .into_iter()
            .map(|(_, mut establishment)| {
                for activity in &mut establishment.activities {
                    activity.amount = round_cents(activity.amount);
                }
                establishment
            })
            .collect();

        Ok(AssembledDeclaration {
            declaration: self.declaration(
                head_office,
                period,
                DeclarationBody {
                    declaration_type,
                    domestic_revenue: round_cents(domestic),
                    export_revenue: round_cents(export),
                    payroll,
                    establishments,
                },
            ),
            unresolved,
        })
    }

    fn declaration(&self, taxpayer_id: String, period: Period, body: DeclarationBody) -> Declaration {
        Declaration {
            taxpayer_id,
            period,
            transmit: self.transmit,
            compare: false,
            body,
        }
    }

    /// The 12 periods before `period`, or `None` when every month is zero.
    fn payroll_history(
        &self,
        taxpayer_id: &str,
        period: Period,
    ) -> Result<Option<Vec<PayrollEntry>>, SourceError> {
        let mut entries = Vec::with_capacity(PAYROLL_MONTHS);
        for previous in period.preceding(PAYROLL_MONTHS) {
            let total = self.payroll.payroll_total(taxpayer_id, previous)?;
            entries.push(PayrollEntry {
                pa: previous,
                valor: round_cents(total.unwrap_or(0.0)),
            });
        }

        if entries.iter().any(|entry| entry.valor != 0.0) {
            Ok(Some(entries))
        } else {
            debug!(%taxpayer_id, %period, "payroll history is all zero, omitting");
            Ok(None)
        }
    }
}

fn add_to_group<'a>(groups: &mut Vec<(&'a str, Establishment)>, row: &'a RevenueRow, code: ActivityCode) {
    let index = match groups
        .iter()
        .position(|(id, _)| *id == row.establishment_id)
    {
        Some(index) => index,
        None => {
            groups.push((
                row.establishment_id.as_str(),
                Establishment {
                    taxpayer_id: row.taxpayer_id.clone(),
                    activities: Vec::new(),
                },
            ));
            groups.len() - 1
        }
    };
    let establishment = &mut groups[index].1;

    let entry = RevenueEntry {
        amount: round_cents(row.base_amount),
        qualifiers: row.qualifiers.clone(),
    };
    match establishment
        .activities
        .iter_mut()
        .find(|activity| activity.activity == code)
    {
        Some(activity) => {
            activity.amount += row.base_amount;
            activity.entries.push(entry);
        }
        None => establishment.activities.push(ActivityAggregate {
            activity: code,
            amount: row.base_amount,
            entries: vec![entry],
        }),
    }
}

fn bare_establishments(rows: &[RevenueRow]) -> Vec<Establishment> {
    let mut seen: Vec<&str> = Vec::new();
    let mut establishments = Vec::new();
    for row in rows {
        if seen.contains(&row.establishment_id.as_str()) {
            continue;
        }
        seen.push(row.establishment_id.as_str());
        establishments.push(Establishment {
            taxpayer_id: row.taxpayer_id.clone(),
            activities: Vec::new(),
        });
    }
    establishments
}
