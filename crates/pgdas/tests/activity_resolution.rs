//! Resolution of tax-table segments to activity ids through the public
//! resolver, backed by an in-memory tax table that counts lookups.

mod common {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::NaiveDate;
    use pgdas::activity::SegmentKey;
    use pgdas::sources::{SourceError, TaxTableSource};

    #[derive(Default)]
    pub(super) struct CountingTaxTable {
        descriptions: HashMap<SegmentKey, String>,
        lookups: Mutex<Vec<(SegmentKey, NaiveDate)>>,
    }

    impl CountingTaxTable {
        pub(super) fn with(mut self, segment: SegmentKey, description: &str) -> Self {
            self.descriptions.insert(segment, description.to_string());
            self
        }

        pub(super) fn lookups(&self) -> Vec<(SegmentKey, NaiveDate)> {
            self.lookups.lock().expect("lookup mutex poisoned").clone()
        }
    }

    impl TaxTableSource for CountingTaxTable {
        fn effective_description(
            &self,
            segment: SegmentKey,
            as_of: NaiveDate,
        ) -> Result<Option<String>, SourceError> {
            self.lookups
                .lock()
                .expect("lookup mutex poisoned")
                .push((segment, as_of));
            Ok(self.descriptions.get(&segment).cloned())
        }
    }

    pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }
}

use std::sync::Arc;

use common::{date, CountingTaxTable};
use pgdas::activity::{
    classify_description, ActivityCode, ActivityResolver, ResolutionOutcome, SegmentKey,
    FUZZY_THRESHOLD,
};

const SERVICO_FATOR_R: SegmentKey = SegmentKey::new(3, 2, 4);

fn resolver(tables: &Arc<CountingTaxTable>) -> ActivityResolver {
    ActivityResolver::new(tables.clone())
}

#[test]
fn repeated_resolution_hits_the_cache() {
    let tables = Arc::new(
        CountingTaxTable::default().with(
            SERVICO_FATOR_R,
            "Sujeitos ao fator “r”, com retenção/substituição tributária de ISS",
        ),
    );
    let resolver = resolver(&tables);

    let first = resolver.resolve(3, 2, 4, date(2025, 5, 17)).expect("lookup");
    let again = resolver.resolve(3, 2, 4, date(2025, 5, 30)).expect("lookup");
    assert_eq!(first.map(ActivityCode::get), Some(12));
    assert_eq!(first, again);
    assert_eq!(tables.lookups(), vec![(SERVICO_FATOR_R, date(2025, 5, 1))]);

    resolver.resolve(3, 2, 4, date(2025, 6, 2)).expect("lookup");
    assert_eq!(tables.lookups().len(), 2, "a new month is a new cache key");
    assert_eq!(resolver.cached_entries(), 2);
}

#[test]
fn unresolved_segments_are_cached_too() {
    let tables = Arc::new(CountingTaxTable::default());
    let resolver = resolver(&tables);

    assert_eq!(resolver.resolve(9, 9, 9, date(2025, 5, 1)).expect("lookup"), None);
    assert_eq!(resolver.resolve(9, 9, 9, date(2025, 5, 28)).expect("lookup"), None);
    assert_eq!(tables.lookups().len(), 1);

    let resolution = resolver
        .resolve_segment(SegmentKey::new(9, 9, 9), date(2025, 5, 2))
        .expect("lookup");
    assert_eq!(resolution.outcome, ResolutionOutcome::MissingDescription);
}

#[test]
fn annex_one_exterior_always_maps_to_export_resale() {
    for description in [
        "Revenda de mercadorias para o exterior",
        "Revenda de mercadorias com substituição tributária para o exterior",
        "Tabela 1 - Receitas decorrentes da revenda sem ST para o exterior",
    ] {
        assert_eq!(
            classify_description(1, description).code().map(ActivityCode::get),
            Some(3),
            "{description}"
        );
    }
}

#[test]
fn rules_take_precedence_over_similarity() {
    let outcome = classify_description(1, "Revenda de mercadorias sem substituição tributária");
    assert_eq!(outcome, ResolutionOutcome::Rule(ActivityCode::new(1).expect("valid id")));
}

#[test]
fn low_similarity_outside_rule_annexes_is_unresolved() {
    let outcome = classify_description(42, "xyz");
    match outcome {
        ResolutionOutcome::BelowThreshold { score, .. } => assert!(score < FUZZY_THRESHOLD),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn resolution_is_deterministic_across_resolvers() {
    let tables = Arc::new(CountingTaxTable::default().with(
        SegmentKey::new(4, 1, 1),
        "Construção de imóveis e obras de engenharia em geral, com retenção",
    ));

    let left = resolver(&tables).resolve(4, 1, 1, date(2025, 5, 1)).expect("lookup");
    let right = resolver(&tables).resolve(4, 1, 1, date(2025, 5, 1)).expect("lookup");
    assert_eq!(left, right);
    assert_eq!(left.map(ActivityCode::get), Some(18));
}
