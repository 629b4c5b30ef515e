mod common;

use std::collections::BTreeSet;
use rand::Rng;
use segstore::core::types::DocId;
use segstore::index::numeric_index::NumericIndex;
use segstore::search::options::{RetrievalMethod, RetrievalOptions};

const METHODS: [RetrievalMethod; 5] = [
    RetrievalMethod::Default,
    RetrievalMethod::GreaterThan,
    RetrievalMethod::GreaterThanOrEqual,
    RetrievalMethod::LessThan,
    RetrievalMethod::LessThanOrEqual,
];

fn brute_force(values: &[(DocId, f64)], method: RetrievalMethod, search: f64) -> BTreeSet<DocId> {
    values
        .iter()
        .filter(|(_, v)| match method {
            RetrievalMethod::GreaterThan => *v > search,
            RetrievalMethod::GreaterThanOrEqual => *v >= search,
            RetrievalMethod::LessThan => *v < search,
            RetrievalMethod::LessThanOrEqual => *v <= search,
            _ => *v == search,
        })
        .map(|(id, _)| *id)
        .collect()
}

#[test]
fn test_ranges_match_brute_force() {
    let (_dir, context) = common::context();
    let index = NumericIndex::open(&context, "Person", "Age").unwrap();
    let mut rng = rand::thread_rng();

    // Few distinct values so most nodes carry several postings
    let values: Vec<(DocId, f64)> = (0..300u128)
        .map(|n| (DocId::from_u128(n + 1), rng.gen_range(-40..40) as f64 / 2.0))
        .collect();
    for (id, value) in &values {
        index.add(*id, *value).unwrap();
    }

    for _ in 0..40 {
        let search = rng.gen_range(-45..45) as f64 / 2.0;
        for method in METHODS {
            let found = index.retrieve(search, &RetrievalOptions::new(method)).unwrap();
            let unique: BTreeSet<DocId> = found.iter().copied().collect();
            assert_eq!(unique.len(), found.len(), "duplicates for {:?} {}", method, search);
            assert_eq!(unique, brute_force(&values, method, search), "{:?} {}", method, search);
        }
    }
}

#[test]
fn test_deletes_match_brute_force_after_reopen() {
    let (_dir, context) = common::context();
    let mut rng = rand::thread_rng();
    let mut values: Vec<(DocId, f64)> = (0..120u128)
        .map(|n| (DocId::from_u128(rng.r#gen::<u64>() as u128 + n), rng.gen_range(0..25) as f64))
        .collect();
    {
        let index = NumericIndex::open(&context, "Person", "Age").unwrap();
        for (id, value) in &values {
            index.add(*id, *value).unwrap();
        }
        index.close().unwrap();
    }

    let index = NumericIndex::open(&context, "Person", "Age").unwrap();
    let removed: Vec<(DocId, f64)> = values.drain(..60).collect();
    for (id, value) in &removed {
        index.delete(*id, *value).unwrap();
    }

    assert_eq!(index.count().unwrap(), values.len() as u64);
    for search in [0.0, 7.0, 12.5, 24.0] {
        for method in METHODS {
            let found: BTreeSet<DocId> = index
                .retrieve(search, &RetrievalOptions::new(method))
                .unwrap()
                .into_iter()
                .collect();
            assert_eq!(found, brute_force(&values, method, search));
        }
    }

    let all: BTreeSet<DocId> = index.all().unwrap().into_iter().collect();
    assert_eq!(all, values.iter().map(|(id, _)| *id).collect());
}

#[test]
fn test_sorted_input_is_not_rebalanced() {
    let (_dir, context) = common::context();
    let index = NumericIndex::open(&context, "Person", "Age").unwrap();
    for n in 0..200u128 {
        index.add(DocId::from_u128(n + 1), n as f64).unwrap();
    }

    assert_eq!(index.depth().unwrap(), 200);
    let top = index
        .retrieve(190.0, &RetrievalOptions::new(RetrievalMethod::GreaterThanOrEqual))
        .unwrap();
    assert_eq!(top, (191..=200u128).map(DocId::from_u128).collect::<Vec<_>>());
}
