//! The two contract parties and a two-slot container indexed by them.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// One side of a two-party contract.
///
/// The `First` party's keys come first in the funding script and its inputs
/// occupy the leading indices of the funding transaction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    First,
    Second,
}

impl Party {
    /// Both parties, in script order.
    pub const ALL: [Party; 2] = [Party::First, Party::Second];

    /// The other side of the contract.
    pub const fn counterparty(self) -> Party {
        match self {
            Party::First => Party::Second,
            Party::Second => Party::First,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::First => f.write_str("first"),
            Party::Second => f.write_str("second"),
        }
    }
}

/// A value for each party.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PartyPair<T> {
    pub first: T,
    pub second: T,
}

impl<T> PartyPair<T> {
    pub fn new(first: T, second: T) -> Self {
        Self { first, second }
    }

    pub fn get(&self, party: Party) -> &T {
        match party {
            Party::First => &self.first,
            Party::Second => &self.second,
        }
    }

    pub fn get_mut(&mut self, party: Party) -> &mut T {
        match party {
            Party::First => &mut self.first,
            Party::Second => &mut self.second,
        }
    }
}

impl<T> Index<Party> for PartyPair<T> {
    type Output = T;

    fn index(&self, party: Party) -> &T {
        self.get(party)
    }
}

impl<T> IndexMut<Party> for PartyPair<T> {
    fn index_mut(&mut self, party: Party) -> &mut T {
        self.get_mut(party)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterparty_is_an_involution() {
        for party in Party::ALL {
            assert_ne!(party, party.counterparty());
            assert_eq!(party, party.counterparty().counterparty());
        }
    }

    #[test]
    fn test_pair_indexing() {
        let mut pair = PartyPair::new(1u64, 2u64);
        assert_eq!(pair[Party::First], 1);
        assert_eq!(pair[Party::Second], 2);

        pair[Party::Second] += 40;
        assert_eq!(pair, PartyPair::new(1, 42));
        assert_eq!(Party::Second.to_string(), "second");
    }
}
