//! Ordered, duplicate-free collection of recipient addresses

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use serde::Serialize;

use super::RecipientAddress;

/// How many domains [`RecipientSet::domain_statistics`] ranks
const TOP_DOMAINS: usize = 5;

/// An ordered sequence of unique recipient addresses.
///
/// Insertion order is preserved and the first occurrence of an address wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RecipientSet {
    addresses: Vec<RecipientAddress>,

    #[serde(skip)]
    seen: HashSet<RecipientAddress>,
}

/// Per-domain breakdown of a recipient set
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DomainStatistics {
    /// Number of distinct domains
    pub unique_domains: usize,

    /// The most common domains with their address counts, most common first
    pub top_domains: Vec<(String, usize)>,
}

impl RecipientSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an address unless it is already present.
    ///
    /// Returns `true` if the address was added.
    pub fn insert(&mut self, address: RecipientAddress) -> bool {
        if !self.seen.insert(address.clone()) {
            return false;
        }

        self.addresses.push(address);

        true
    }

    /// Append every address from `other` that is not already present.
    ///
    /// Returns the number of addresses added.
    pub fn merge(&mut self, other: impl IntoIterator<Item = RecipientAddress>) -> usize {
        let mut added = 0;

        for address in other {
            if self.insert(address) {
                added += 1;
            }
        }

        added
    }

    /// Remove the address at `index`, keeping the order of the rest
    pub fn remove(&mut self, index: usize) -> Option<RecipientAddress> {
        if index >= self.addresses.len() {
            return None;
        }

        let removed = self.addresses.remove(index);
        self.seen.remove(&removed);

        Some(removed)
    }

    /// Remove every address
    pub fn clear(&mut self) {
        self.addresses.clear();
        self.seen.clear();
    }

    /// Whether the set contains `address`
    pub fn contains(&self, address: &RecipientAddress) -> bool {
        self.seen.contains(address)
    }

    /// Number of addresses
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, RecipientAddress> {
        self.addresses.iter()
    }

    /// The addresses as a slice, in insertion order
    pub fn as_slice(&self) -> &[RecipientAddress] {
        &self.addresses
    }

    /// Count addresses per domain.
    pub fn domain_statistics(&self) -> DomainStatistics {
        let mut counts: HashMap<&str, usize> = HashMap::new();

        for address in &self.addresses {
            *counts.entry(address.domain()).or_default() += 1;
        }

        let unique_domains = counts.len();

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(domain, count)| (domain.to_string(), count))
            .collect();

        // ties broken alphabetically so the ranking is stable
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(TOP_DOMAINS);

        DomainStatistics {
            unique_domains,
            top_domains: ranked,
        }
    }
}

impl FromIterator<RecipientAddress> for RecipientSet {
    fn from_iter<I: IntoIterator<Item = RecipientAddress>>(iter: I) -> Self {
        let mut set = Self::new();
        set.merge(iter);
        set
    }
}

impl IntoIterator for RecipientSet {
    type Item = RecipientAddress;
    type IntoIter = std::vec::IntoIter<RecipientAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.addresses.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecipientSet {
    type Item = &'a RecipientAddress;
    type IntoIter = std::slice::Iter<'a, RecipientAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.addresses.iter()
    }
}

/// One address per line
impl fmt::Display for RecipientSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for address in &self.addresses {
            writeln!(f, "{address}")?;
        }

        Ok(())
    }
}
