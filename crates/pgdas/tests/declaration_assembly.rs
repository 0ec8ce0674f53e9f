//! Assembling PGDAS-D declarations from ERP revenue rows.

mod common {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;
    use pgdas::activity::{ActivityResolver, SegmentKey};
    use pgdas::declaration::{DeclarationAssembler, Period};
    use pgdas::sources::{PayrollSource, RevenueRow, SourceError, TaxTableSource};

    #[derive(Default)]
    pub(super) struct StaticTaxTable {
        descriptions: HashMap<SegmentKey, String>,
    }

    impl StaticTaxTable {
        pub(super) fn with(mut self, segment: SegmentKey, description: &str) -> Self {
            self.descriptions.insert(segment, description.to_string());
            self
        }
    }

    impl TaxTableSource for StaticTaxTable {
        fn effective_description(
            &self,
            segment: SegmentKey,
            _as_of: NaiveDate,
        ) -> Result<Option<String>, SourceError> {
            Ok(self.descriptions.get(&segment).cloned())
        }
    }

    /// Payroll by period; records which taxpayer ids were asked for.
    #[derive(Default)]
    pub(super) struct FakePayroll {
        totals: HashMap<Period, f64>,
        asked_for: Mutex<Vec<String>>,
    }

    impl FakePayroll {
        pub(super) fn with(mut self, period: Period, total: f64) -> Self {
            self.totals.insert(period, total);
            self
        }

        pub(super) fn asked_for(&self) -> Vec<String> {
            self.asked_for.lock().expect("payroll mutex poisoned").clone()
        }
    }

    impl PayrollSource for FakePayroll {
        fn payroll_total(
            &self,
            taxpayer_id: &str,
            period: Period,
        ) -> Result<Option<f64>, SourceError> {
            self.asked_for
                .lock()
                .expect("payroll mutex poisoned")
                .push(taxpayer_id.to_string());
            Ok(self.totals.get(&period).copied())
        }
    }

    pub(super) fn assembler(
        tables: StaticTaxTable,
        payroll: Arc<FakePayroll>,
    ) -> DeclarationAssembler {
        let resolver = Arc::new(ActivityResolver::new(Arc::new(tables)));
        DeclarationAssembler::new(resolver, payroll, false)
    }

    pub(super) fn row(
        establishment_id: &str,
        taxpayer_id: &str,
        segment: SegmentKey,
        base_amount: f64,
    ) -> RevenueRow {
        RevenueRow {
            establishment_id: establishment_id.to_string(),
            taxpayer_id: taxpayer_id.to_string(),
            segment,
            base_amount,
            reference_date: NaiveDate::from_ymd_opt(2025, 5, 31).expect("valid date"),
            qualifiers: Vec::new(),
        }
    }

    pub(super) fn period(year: i32, month: u32) -> Period {
        Period::new(year, month).expect("valid period")
    }
}

use std::sync::Arc;

use common::{assembler, period, row, FakePayroll, StaticTaxTable};
use pgdas::activity::SegmentKey;
use pgdas::declaration::{ActivityAggregate, AssemblyError, DeclarationType};
use pgdas::sources::TaxQualifier;

const HEAD_OFFICE: &str = "11222333000001";
const BRANCH: &str = "11222333000262";

const REVENDA: SegmentKey = SegmentKey::new(1, 1, 1);
const REVENDA_EXTERIOR: SegmentKey = SegmentKey::new(1, 1, 3);
const SERVICO_RETIDO: SegmentKey = SegmentKey::new(3, 2, 4);
const SERVICO_EXPORTACAO: SegmentKey = SegmentKey::new(3, 9, 1);
const DESCONHECIDO: SegmentKey = SegmentKey::new(42, 1, 1);

fn tax_table() -> StaticTaxTable {
    StaticTaxTable::default()
        .with(REVENDA, "Revenda de mercadorias")
        .with(REVENDA_EXTERIOR, "Revenda de mercadorias para o exterior")
        .with(
            SERVICO_RETIDO,
            "Sujeitos ao fator “r”, com retenção/substituição tributária de ISS",
        )
        .with(SERVICO_EXPORTACAO, "Prestação de serviços para o exterior")
}

fn codes(activities: &[ActivityAggregate]) -> Vec<u8> {
    activities
        .iter()
        .map(|activity| activity.activity.get())
        .collect()
}

#[test]
fn groups_rows_by_activity_and_totals_domestic_revenue() {
    let assembler = assembler(tax_table(), Arc::new(FakePayroll::default()));
    let rows = vec![
        row("10", HEAD_OFFICE, REVENDA, 100.10),
        row("10", HEAD_OFFICE, REVENDA, 50.20),
        row("10", HEAD_OFFICE, SERVICO_RETIDO, 200.0),
    ];

    let assembled = assembler
        .build(&rows, DeclarationType::Original)
        .expect("assembles");
    let declaration = assembled.declaration;

    assert!(assembled.unresolved.is_empty());
    assert_eq!(declaration.taxpayer_id, HEAD_OFFICE);
    assert_eq!(declaration.period, period(2025, 5));
    assert!(!declaration.transmit);
    assert_eq!(declaration.body.domestic_revenue, 350.30);
    assert_eq!(declaration.body.export_revenue, 0.0);

    assert_eq!(declaration.body.establishments.len(), 1);
    let activities = &declaration.body.establishments[0].activities;
    assert_eq!(codes(activities), vec![1, 12]);
    assert_eq!(activities[0].amount, 150.30);
    assert_eq!(activities[0].entries.len(), 2);
    assert_eq!(activities[1].amount, 200.0);
}

#[test]
fn export_activities_feed_the_external_total() {
    let assembler = assembler(tax_table(), Arc::new(FakePayroll::default()));
    let rows = vec![
        row("10", HEAD_OFFICE, REVENDA, 80.0),
        row("10", HEAD_OFFICE, REVENDA_EXTERIOR, 20.0),
        row("10", HEAD_OFFICE, SERVICO_EXPORTACAO, 300.0),
    ];

    let declaration = assembler
        .build(&rows, DeclarationType::Original)
        .expect("assembles")
        .declaration;
    assert_eq!(declaration.total_revenue(), 400.0);
    let body = declaration.body;

    // id 3 is a domestic line even though it mentions the exterior
    assert_eq!(codes(&body.establishments[0].activities), vec![1, 3, 29]);
    assert_eq!(body.domestic_revenue, 100.0);
    assert_eq!(body.export_revenue, 300.0);
}

#[test]
fn period_without_movement_declares_bare_establishments() {
    let payroll = Arc::new(FakePayroll::default());
    let assembler = assembler(tax_table(), payroll.clone());
    let rows = vec![
        row("10", HEAD_OFFICE, SegmentKey::new(0, 0, 0), 0.0),
        row("20", BRANCH, SERVICO_RETIDO, 0.0),
    ];

    let assembled = assembler
        .build(&rows, DeclarationType::Amended)
        .expect("assembles");
    let body = &assembled.declaration.body;

    assert_eq!(body.declaration_type, DeclarationType::Amended);
    assert_eq!(body.domestic_revenue, 0.0);
    assert_eq!(body.export_revenue, 0.0);
    assert!(body.payroll.is_none());
    assert!(payroll.asked_for().is_empty());
    let ids: Vec<&str> = body
        .establishments
        .iter()
        .map(|establishment| establishment.taxpayer_id.as_str())
        .collect();
    assert_eq!(ids, vec![HEAD_OFFICE, BRANCH]);
    assert!(body
        .establishments
        .iter()
        .all(|establishment| establishment.activities.is_empty()));

    let wire = assembled.declaration.to_wire().expect("serializes");
    assert_eq!(wire["declaracao"]["tipoDeclaracao"], 2);
    assert_eq!(wire["declaracao"]["receitaPaCompetenciaInterno"], 0.0);
    assert!(wire["declaracao"].get("folhasSalario").is_none());
    assert!(wire["declaracao"]["estabelecimentos"][0].get("atividades").is_none());
}

#[test]
fn fator_r_activity_attaches_twelve_months_of_payroll() {
    let payroll = Arc::new(
        FakePayroll::default()
            .with(period(2025, 4), 12_000.0)
            .with(period(2024, 6), 9_500.5),
    );
    let assembler = assembler(tax_table(), payroll.clone());
    let rows = vec![
        row("20", BRANCH, SERVICO_RETIDO, 500.0),
        row("10", HEAD_OFFICE, REVENDA, 100.0),
    ];

    let body = assembler
        .build(&rows, DeclarationType::Original)
        .expect("assembles")
        .declaration
        .body;

    let history = body.payroll.expect("payroll attached");
    assert_eq!(history.len(), 12);
    assert_eq!(history[0].pa, period(2025, 4));
    assert_eq!(history[0].valor, 12_000.0);
    assert_eq!(history[1].valor, 0.0);
    assert_eq!(history[10].pa, period(2024, 6));
    assert_eq!(history[10].valor, 9_500.5);
    assert_eq!(history[11].pa, period(2024, 5));

    let asked = payroll.asked_for();
    assert_eq!(asked.len(), 12);
    assert!(asked.iter().all(|taxpayer| taxpayer == HEAD_OFFICE));
}

#[test]
fn payroll_is_omitted_when_every_month_is_zero() {
    let payroll = Arc::new(FakePayroll::default());
    let assembler = assembler(tax_table(), payroll.clone());
    let rows = vec![row("10", HEAD_OFFICE, SERVICO_RETIDO, 500.0)];

    let body = assembler
        .build(&rows, DeclarationType::Original)
        .expect("assembles")
        .declaration
        .body;

    assert_eq!(payroll.asked_for().len(), 12);
    assert!(body.payroll.is_none());
}

#[test]
fn activities_without_fator_r_skip_payroll() {
    let payroll = Arc::new(FakePayroll::default().with(period(2025, 4), 1_000.0));
    let assembler = assembler(tax_table(), payroll.clone());
    let rows = vec![row("10", HEAD_OFFICE, REVENDA, 100.0)];

    let body = assembler
        .build(&rows, DeclarationType::Original)
        .expect("assembles")
        .declaration
        .body;

    assert!(body.payroll.is_none());
    assert!(payroll.asked_for().is_empty());
}

#[test]
fn first_row_is_declarant_when_no_head_office_is_present() {
    let assembler = assembler(tax_table(), Arc::new(FakePayroll::default()));
    let other_branch = "11222333000343";
    let rows = vec![
        row("30", other_branch, REVENDA, 10.0),
        row("20", BRANCH, REVENDA, 20.0),
    ];

    let declaration = assembler
        .build(&rows, DeclarationType::Original)
        .expect("assembles")
        .declaration;

    assert_eq!(declaration.taxpayer_id, other_branch);
    assert_eq!(declaration.body.establishments.len(), 2);
}

#[test]
fn unresolved_segments_are_reported_and_left_out() {
    let assembler = assembler(tax_table(), Arc::new(FakePayroll::default()));
    let rows = vec![
        row("10", HEAD_OFFICE, REVENDA, 100.0),
        row("10", HEAD_OFFICE, DESCONHECIDO, 45.55),
    ];

    let assembled = assembler
        .build(&rows, DeclarationType::Original)
        .expect("assembles");

    assert_eq!(assembled.declaration.body.domestic_revenue, 100.0);
    assert_eq!(assembled.unresolved.len(), 1);
    assert_eq!(assembled.unresolved[0].segment, DESCONHECIDO);
    assert_eq!(assembled.unresolved[0].establishment_id, "10");
    assert!(assembled.unresolved[0].description.is_none());
    assert_eq!(assembled.unresolved_amount(), 45.55);
}

#[test]
fn empty_input_is_an_error() {
    let assembler = assembler(tax_table(), Arc::new(FakePayroll::default()));
    let err = assembler
        .build(&[], DeclarationType::Original)
        .expect_err("nothing to declare");
    assert!(matches!(err, AssemblyError::EmptyInput));
}

#[test]
fn wire_output_keeps_qualifiers_and_drops_empty_members() {
    let assembler = assembler(tax_table(), Arc::new(FakePayroll::default()));
    let mut qualified = row("10", HEAD_OFFICE, REVENDA, 100.0);
    qualified.qualifiers = vec![TaxQualifier {
        tax_code: 1001,
        qualification_id: 3,
    }];

    let wire = assembler
        .build(&[qualified], DeclarationType::Original)
        .expect("assembles")
        .declaration
        .to_wire()
        .expect("serializes");

    let activity = &wire["declaracao"]["estabelecimentos"][0]["atividades"][0];
    assert_eq!(activity["idAtividade"], 1);
    assert_eq!(
        activity["receitasAtividade"][0]["qualificacoesTributarias"][0]["codigoTributo"],
        1001
    );
    assert!(wire["declaracao"].get("folhasSalario").is_none());
}
