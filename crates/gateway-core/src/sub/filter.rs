//! Log filter criteria for `logs` subscriptions.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Deserializer};

/// Address allow-list and positional topic disjunctions.
///
/// Matching is positional: `topics[i]` is a set, and a log matches
/// when every position either holds an empty set (wildcard) or
/// contains the log's topic at that position. A filter position past
/// the log's topic list never matches. Clients may write a single
/// value or an array at each position; `null` reads as the wildcard.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    #[serde(default, deserialize_with = "one_or_many_addresses")]
    pub address: Vec<Address>,
    #[serde(default, deserialize_with = "topic_positions")]
    pub topics: Vec<Vec<B256>>,
}

impl LogFilter {
    #[must_use]
    pub fn matches(&self, address: Address, topics: &[B256]) -> bool {
        if !self.address.is_empty() && !self.address.contains(&address) {
            return false;
        }

        for (position, set) in self.topics.iter().enumerate() {
            let Some(topic) = topics.get(position) else {
                return false;
            };
            if set.is_empty() {
                continue;
            }
            if !set.contains(topic) {
                return false;
            }
        }
        true
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

fn one_or_many_addresses<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Address>, D::Error> {
    let raw: Option<OneOrMany<Address>> = Option::deserialize(deserializer)?;
    Ok(raw.map(OneOrMany::into_vec).unwrap_or_default())
}

fn topic_positions<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Vec<B256>>, D::Error> {
    let raw: Option<Vec<Option<OneOrMany<B256>>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|position| position.map(OneOrMany::into_vec).unwrap_or_default())
        .collect())
}
