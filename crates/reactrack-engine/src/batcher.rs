//! Fragment batching.
//!
//! One left-to-right pass. Cards accumulate until a non-card fragment (or
//! the end of input) flushes them as a single carousel; every other
//! fragment becomes its own unit. Relative order is never changed. An
//! unsupported fragment also ends a card run; its unit is skipped at
//! delivery.

use reactrack_core::fragment::{BatchUnit, Card, Carousel, Fragment};

pub fn batch(fragments: impl IntoIterator<Item = Fragment>) -> Vec<BatchUnit> {
    let mut units = Vec::new();
    let mut cards: Vec<Card> = Vec::new();

    for fragment in fragments {
        match fragment {
            Fragment::Card(card) => cards.push(card),
            other => {
                flush(&mut cards, &mut units);
                units.push(BatchUnit::single(other));
            }
        }
    }
    flush(&mut cards, &mut units);
    units
}

fn flush(cards: &mut Vec<Card>, units: &mut Vec<BatchUnit>) {
    if let Some(carousel) = Carousel::new(std::mem::take(cards)) {
        units.push(BatchUnit::Carousel { carousel });
    }
}
