use crate::core::error::Result;
use crate::core::types::{DocId, Token};

/// Positions of one query token inside one document
pub trait PositionSource {
    /// Offsets of query token `index` in document `id`; `None` if the term is absent there
    fn positions(&self, index: usize, id: DocId) -> Result<Option<Vec<u32>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ordered,    // Phrase
    Unordered,  // Proximity
}

/// Whether `candidate` may follow the occurrence at `anchor`, where `delta`
/// is the token offset between the two terms in the query
pub fn within_window(order: Order, anchor: u32, delta: i64, distance: u32, candidate: u32) -> bool {
    let anchor = anchor as i64;
    let candidate = candidate as i64;
    let distance = distance as i64;

    match order {
        Order::Ordered => {
            let expected = anchor + delta;
            candidate >= expected && candidate <= expected + distance
        }
        Order::Unordered => candidate != anchor && (candidate - anchor).abs() <= delta.abs() + distance,
    }
}

/// Whether the tokens after `from` can be chained from `position` of token `from`
pub fn chain_matches<S: PositionSource>(
    source: &S,
    tokens: &[Token],
    id: DocId,
    from: usize,
    position: u32,
    order: Order,
    distance: u32,
) -> Result<bool> {
    let next = from + 1;
    if next >= tokens.len() {
        return Ok(true);
    }

    let delta = tokens[next].position as i64 - tokens[from].position as i64;
    // Positions are fetched again for every candidate, nothing is memoized
    let Some(candidates) = source.positions(next, id)? else {
        return Ok(false);
    };

    for candidate in candidates {
        if within_window(order, position, delta, distance, candidate)
            && chain_matches(source, tokens, id, next, candidate, order, distance)?
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether any occurrence of the first token starts a complete chain
pub fn document_matches<S: PositionSource>(
    source: &S,
    tokens: &[Token],
    id: DocId,
    first_positions: &[u32],
    order: Order,
    distance: u32,
) -> Result<bool> {
    for &position in first_positions {
        if chain_matches(source, tokens, id, 0, position, order, distance)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Single document, term positions keyed by query token index
    struct Fixed(HashMap<usize, Vec<u32>>);

    impl PositionSource for Fixed {
        fn positions(&self, index: usize, _id: DocId) -> Result<Option<Vec<u32>>> {
            Ok(self.0.get(&index).cloned())
        }
    }

    fn matches(text: &str, query: &str, order: Order, distance: u32) -> bool {
        let words: Vec<&str> = text.split_whitespace().collect();
        let tokens = Token::sequence(query);
        let mut positions = HashMap::new();
        for (i, token) in tokens.iter().enumerate() {
            let found: Vec<u32> = words
                .iter()
                .enumerate()
                .filter(|(_, w)| **w == token.value)
                .map(|(p, _)| p as u32)
                .collect();
            if !found.is_empty() {
                positions.insert(i, found);
            }
        }

        let source = Fixed(positions);
        let first = source.0.get(&0).cloned().unwrap_or_default();
        document_matches(&source, &tokens, DocId::default(), &first, order, distance).unwrap()
    }

    #[test]
    fn test_exact_phrase_needs_adjacency() {
        assert!(matches("anna helena helge mueller", "helena helge", Order::Ordered, 0));
        assert!(!matches("helena anna helge", "helena helge", Order::Ordered, 0));
        assert!(!matches("helge helena", "helena helge", Order::Ordered, 0));
    }

    #[test]
    fn test_phrase_window_counts_skipped_tokens() {
        let text = "helena a b helge";
        assert!(matches(text, "helena helge", Order::Ordered, 2));
        assert!(matches(text, "helena helge", Order::Ordered, 3));
        assert!(!matches(text, "helena helge", Order::Ordered, 1));
    }

    #[test]
    fn test_proximity_ignores_order() {
        assert!(matches("helge helena", "helena helge", Order::Unordered, 0));
        assert!(matches("helge x helena", "helena helge", Order::Unordered, 1));
        assert!(!matches("helge x y helena", "helena helge", Order::Unordered, 1));
    }

    #[test]
    fn test_three_token_chain() {
        assert!(matches("a helena helge mueller", "helena helge mueller", Order::Ordered, 0));
        assert!(!matches("helena helge x mueller", "helena helge mueller", Order::Ordered, 0));
        assert!(matches("helena helge x mueller", "helena helge mueller", Order::Ordered, 1));
    }

    #[test]
    fn test_window_arithmetic() {
        assert!(within_window(Order::Ordered, 4, 1, 0, 5));
        assert!(!within_window(Order::Ordered, 4, 1, 0, 3));
        assert!(within_window(Order::Unordered, 4, 1, 0, 3));
        assert!(!within_window(Order::Unordered, 4, 1, 5, 4));
    }
}
