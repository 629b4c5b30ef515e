mod common;

use segstore::core::types::{DocId, Token};
use segstore::index::ReverseIndex;
use segstore::index::term_index::TermIndex;
use segstore::search::options::{RetrievalMethod, RetrievalOptions};
use segstore::storage::layout::IndexFileKind;

fn id(n: u128) -> DocId {
    DocId::from_u128(n)
}

fn sorted(mut ids: Vec<DocId>) -> Vec<DocId> {
    ids.sort();
    ids
}

/// helena and helge separated by `gap` other tokens, in both orders
fn index_names(index: &TermIndex) {
    index.add(id(1), &Token::sequence("helena helge")).unwrap();
    index.add(id(2), &Token::sequence("helena anna helge")).unwrap();
    index.add(id(3), &Token::sequence("helena anna maria helge")).unwrap();
    index.add(id(4), &Token::sequence("helge helena")).unwrap();
    index.add(id(5), &Token::sequence("helge anna helena")).unwrap();
    index.add(id(6), &Token::sequence("helena schmidt")).unwrap();
}

#[test]
fn test_phrase_window_is_ordered() {
    let (_dir, context) = common::context();
    let index = TermIndex::open(&context, "Person", "Name", None).unwrap();
    index_names(&index);

    let query = Token::sequence("helena helge");
    let phrase = |distance| sorted(index.retrieve(&query, &RetrievalOptions::phrase(distance)).unwrap());

    assert_eq!(phrase(0), vec![id(1)]);
    assert_eq!(phrase(1), vec![id(1), id(2)]);
    assert_eq!(phrase(2), vec![id(1), id(2), id(3)]);
}

#[test]
fn test_proximity_window_ignores_order() {
    let (_dir, context) = common::context();
    let index = TermIndex::open(&context, "Person", "Name", None).unwrap();
    index_names(&index);

    let query = Token::sequence("helena helge");
    let proximity = |distance| sorted(index.retrieve(&query, &RetrievalOptions::proximity(distance)).unwrap());

    assert_eq!(proximity(0), vec![id(1), id(4)]);
    assert_eq!(proximity(1), vec![id(1), id(2), id(4), id(5)]);
    assert_eq!(proximity(2), vec![id(1), id(2), id(3), id(4), id(5)]);
}

#[test]
fn test_conjunction_without_positions() {
    let (_dir, context) = common::context();
    let index = TermIndex::open(&context, "Person", "Name", None).unwrap();
    index_names(&index);

    let both = index
        .retrieve(&Token::sequence("helge helena"), &RetrievalOptions::new(RetrievalMethod::Default))
        .unwrap();
    assert_eq!(sorted(both), vec![id(1), id(2), id(3), id(4), id(5)]);

    let anna = index.retrieve(&Token::sequence("anna"), &RetrievalOptions::default()).unwrap();
    assert_eq!(sorted(anna), vec![id(2), id(3), id(5)]);
}

#[test]
fn test_removing_one_document_leaves_the_others() {
    let (_dir, context) = common::context();
    let index = TermIndex::open(&context, "Person", "Name", None).unwrap();
    index_names(&index);

    index.delete(id(2), &Token::sequence("helena anna helge")).unwrap();

    let helena = index.retrieve(&Token::sequence("helena"), &RetrievalOptions::default()).unwrap();
    assert_eq!(sorted(helena), vec![id(1), id(3), id(4), id(5), id(6)]);
    assert_eq!(index.positions("helge", id(3)).unwrap(), vec![3]);
    assert_eq!(index.frequency("anna").unwrap(), 2);
}

#[test]
fn test_postings_survive_reopen() {
    let (_dir, context) = common::context();
    {
        let index = TermIndex::open(&context, "Person", "Name", Some("de")).unwrap();
        index_names(&index);
        index.close().unwrap();
    }

    let index = TermIndex::open(&context, "Person", "Name", Some("de")).unwrap();
    assert_eq!(index.count().unwrap(), 16);
    assert_eq!(index.terms().unwrap(), vec!["anna", "helena", "helge", "maria", "schmidt"]);
    assert_eq!(
        sorted(index.retrieve(&Token::sequence("helena helge"), &RetrievalOptions::phrase(0)).unwrap()),
        vec![id(1)]
    );

    // Reuses freed segments after reopening
    index.delete(id(6), &Token::sequence("helena schmidt")).unwrap();
    let before = index.stats().unwrap().next_free;
    index.add(id(7), &Token::sequence("schmidt")).unwrap();
    assert_eq!(index.stats().unwrap().next_free, before);
}

#[test]
fn test_through_the_shared_trait() {
    let (_dir, context) = common::context();
    let index = TermIndex::open(&context, "Person", "Name", None).unwrap();
    let reverse: &dyn ReverseIndex<Value = [Token]> = &index;

    reverse.add(id(1), &Token::sequence("old name")).unwrap();
    reverse
        .update(id(1), &Token::sequence("old name"), &Token::sequence("new name"))
        .unwrap();

    assert!(reverse.retrieve(&Token::sequence("old"), &RetrievalOptions::default()).unwrap().is_empty());
    assert_eq!(reverse.all().unwrap(), vec![id(1)]);
    reverse.clear().unwrap();
    assert_eq!(reverse.count().unwrap(), 0);
}

#[test]
fn test_purge_after_reopen_uses_recorded_terms() {
    let (_dir, context) = common::context();
    {
        let index = TermIndex::open(&context, "Person", "Name", None).unwrap();
        index_names(&index);
        index.close().unwrap();
    }
    assert!(context.index_path("Person", "Name", None, IndexFileKind::ForwardIndex).exists());

    let index = TermIndex::open(&context, "Person", "Name", None).unwrap();
    assert_eq!(index.document_terms(id(3)).unwrap(), vec!["anna", "helena", "helge", "maria"]);

    let count = index.count().unwrap();
    assert_eq!(index.purge(id(6)).unwrap(), 2);
    assert_eq!(index.count().unwrap(), count - 2);
    assert_eq!(index.all().unwrap(), (1..=5).map(id).collect::<Vec<_>>());
    assert_eq!(index.terms().unwrap(), vec!["anna", "helena", "helge", "maria"]);
    assert_eq!(index.frequency("schmidt").unwrap(), 0);
}
