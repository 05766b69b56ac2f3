use bytes::Bytes;
use hashbrown::HashMap;
use ordered_float::NotNan;
use std::collections::BTreeSet;
use std::ops::Bound;

/// The outcome of inserting a member.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Insertion {
    /// The member was not present before.
    Added,

    /// The member existed; its score was replaced.
    Updated,
}

/// Members with scores, ordered by score ascending and then by member
/// bytes ascending. A member map answers point lookups; a `BTreeSet`
/// over `(score, member)` keeps the ordering.
#[derive(Clone, Debug, Default)]
pub struct SortedSet {
    scores: HashMap<Bytes, NotNan<f64>>,
    index: BTreeSet<(NotNan<f64>, Bytes)>,
}

impl SortedSet {
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        self.scores.contains_key(member)
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        self.scores.get(member).map(|score| **score)
    }

    pub fn insert(&mut self, member: Bytes, score: NotNan<f64>) -> Insertion {
        match self.scores.insert(member.clone(), score) {
            Some(previous) => {
                self.index.remove(&(previous, member.clone()));
                self.index.insert((score, member));
                Insertion::Updated
            }
            None => {
                self.index.insert((score, member));
                Insertion::Added
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        let Some((member, score)) = self.scores.remove_entry(member) else {
            return false;
        };
        self.index.remove(&(score, member));
        true
    }

    /// Zero-based position in ascending order.
    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let score = *self.scores.get(member)?;
        self.index
            .iter()
            .position(|(s, m)| *s == score && m == member)
    }

    /// Members in ascending order with their scores.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Bytes, f64)> {
        self.index.iter().map(|(score, member)| (member, **score))
    }

    /// Members with `min <= score <= max`, ascending.
    pub fn range_by_score(&self, min: f64, max: f64) -> impl Iterator<Item = (&Bytes, f64)> {
        let lower = NotNan::new(min).ok();
        self.index
            .range((
                lower.map_or(Bound::Unbounded, |min| {
                    Bound::Included((min, Bytes::new()))
                }),
                Bound::Unbounded,
            ))
            .take_while(move |(score, _)| **score <= max)
            .map(|(score, member)| (member, **score))
    }
}
