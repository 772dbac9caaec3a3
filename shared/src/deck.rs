//! Card deck construction based on a finite projective plane.
//!
//! A deck of order `n` holds `n² + n + 1` cards with `n + 1` symbols each and
//! uses `n² + n + 1` distinct symbols. When `n` is prime, every pair of
//! distinct cards shares exactly one symbol, which is the property the whole
//! game relies on: a player's top card always matches the target card on
//! exactly one symbol.

use serde::{Deserialize, Serialize};

/// Symbol identifier printed on a card.
pub type Symbol = u32;

/// A single card: an ordered set of symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Card(pub Vec<Symbol>);

impl Card {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self(symbols)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.0
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.0.contains(&symbol)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Symbol>> for Card {
    fn from(symbols: Vec<Symbol>) -> Self {
        Self(symbols)
    }
}

/// Number of cards (and distinct symbols) in a deck of the given order.
pub fn deck_size(order: u32) -> usize {
    let n = order as usize;
    n * n + n + 1
}

/// Generates the full deck for the given order.
///
/// `order` must be prime for the one-shared-symbol guarantee to hold. This is
/// not checked: composite orders produce a deck of the right size whose cards
/// may share zero or several symbols.
pub fn generate_deck(order: u32) -> Vec<Card> {
    let n = order;
    let mut deck = Vec::with_capacity(deck_size(order));

    // Base card: the point at infinity plus the first n symbols.
    deck.push(Card((0..=n).collect()));

    // One line per block of n fresh symbols, all sharing symbol 0.
    for j in 0..n {
        let mut card = Vec::with_capacity(n as usize + 1);
        card.push(0);
        card.extend((0..n).map(|k| (n + 1) + n * j + k));
        deck.push(Card(card));
    }

    // Grid lines with slope i and intercept j.
    for i in 0..n {
        for j in 0..n {
            let mut card = Vec::with_capacity(n as usize + 1);
            card.push(i + 1);
            card.extend((0..n).map(|k| (n + 1) + n * k + ((i * k + j) % n)));
            deck.push(Card(card));
        }
    }

    deck
}

/// Returns the first symbol present on both cards, if any.
pub fn common_symbol(a: &Card, b: &Card) -> Option<Symbol> {
    a.0.iter().copied().find(|symbol| b.contains(*symbol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const PRIME_ORDERS: [u32; 5] = [2, 3, 5, 7, 11];

    fn count_matches(a: &Card, b: &Card) -> usize {
        a.symbols().iter().filter(|s| b.contains(**s)).count()
    }

    #[test]
    fn test_deck_size() {
        for order in PRIME_ORDERS {
            let deck = generate_deck(order);
            assert_eq!(deck.len(), deck_size(order));
        }
        assert_eq!(deck_size(7), 57);
    }

    #[test]
    fn test_every_card_has_order_plus_one_symbols() {
        for order in PRIME_ORDERS {
            for card in generate_deck(order) {
                assert_eq!(card.len(), order as usize + 1);
                let unique: HashSet<_> = card.symbols().iter().collect();
                assert_eq!(unique.len(), card.len(), "repeated symbol in {:?}", card);
            }
        }
    }

    #[test]
    fn test_every_pair_shares_exactly_one_symbol() {
        for order in PRIME_ORDERS {
            let deck = generate_deck(order);
            for i in 0..deck.len() {
                for j in (i + 1)..deck.len() {
                    assert_eq!(
                        count_matches(&deck[i], &deck[j]),
                        1,
                        "order {}: cards {} {:?} and {} {:?}",
                        order,
                        i,
                        deck[i],
                        j,
                        deck[j]
                    );
                }
            }
        }
    }

    #[test]
    fn test_distinct_symbol_count_matches_card_count() {
        for order in PRIME_ORDERS {
            let symbols: HashSet<Symbol> = generate_deck(order)
                .iter()
                .flat_map(|card| card.symbols().iter().copied())
                .collect();
            assert_eq!(symbols.len(), deck_size(order));
            assert_eq!(symbols.iter().max().copied(), Some(deck_size(order) as u32 - 1));
        }
    }

    #[test]
    fn test_base_card_layout() {
        let deck = generate_deck(3);
        assert_eq!(deck[0], Card(vec![0, 1, 2, 3]));
        assert_eq!(deck[1], Card(vec![0, 4, 5, 6]));
        assert_eq!(deck[4], Card(vec![1, 4, 7, 10]));
    }

    #[test]
    fn test_common_symbol() {
        let deck = generate_deck(5);
        assert_eq!(common_symbol(&deck[0], &deck[1]), Some(0));

        let a = Card::new(vec![1, 2, 3]);
        let b = Card::new(vec![4, 5, 6]);
        assert_eq!(common_symbol(&a, &b), None);
    }

    #[test]
    fn test_card_serializes_as_plain_array() {
        let card = Card::new(vec![0, 8, 9]);
        assert_eq!(serde_json::to_string(&card).unwrap(), "[0,8,9]");
    }
}
