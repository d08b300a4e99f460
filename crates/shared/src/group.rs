//! Date-bucketed message grouping.
//!
//! A [`MessageGroup`] maps `year -> month -> day -> [Message]`. Buckets are
//! keyed by strings derived from each message's `created_at` (UTC). Within a
//! day, messages keep insertion order; nothing is re-sorted.
//!
//! Every level sits behind an `Arc`, so [`MessageGroup::insert`] returns a new
//! group that shares all untouched buckets with the original and never writes
//! through to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};

use crate::models::Message;

type Days = BTreeMap<String, Arc<Vec<Message>>>;
type Months = BTreeMap<String, Arc<Days>>;

/// How the month component of a bucket key is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MonthKey {
    /// `00`..`11`, taken straight from the zero-based month index.
    #[default]
    ZeroBased,
    /// `01`..`12`
    OneBased,
}

impl MonthKey {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "zero" | "0" | "zero-based" => Some(MonthKey::ZeroBased),
            "one" | "1" | "one-based" => Some(MonthKey::OneBased),
            _ => None,
        }
    }
}

/// The `(year, month, day)` address of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl BucketKey {
    pub fn for_timestamp(ts: &DateTime<Utc>, month_key: MonthKey) -> Self {
        let month = match month_key {
            MonthKey::ZeroBased => ts.month0(),
            MonthKey::OneBased => ts.month(),
        };
        Self {
            year: format!("{:04}", ts.year()),
            month: format!("{:02}", month),
            day: format!("{:02}", ts.day()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageGroup {
    years: BTreeMap<String, Arc<Months>>,
}

impl MessageGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new group with `message` appended to the end of its day bucket.
    /// `self` is left untouched.
    #[must_use]
    pub fn insert(&self, message: Message, month_key: MonthKey) -> MessageGroup {
        let key = BucketKey::for_timestamp(&message.created_at, month_key);

        let mut years = self.years.clone();
        let months = Arc::make_mut(years.entry(key.year).or_default());
        let days = Arc::make_mut(months.entry(key.month).or_default());
        Arc::make_mut(days.entry(key.day).or_default()).push(message);

        MessageGroup { years }
    }

    /// Messages stored under one bucket, in insertion order.
    pub fn bucket(&self, key: &BucketKey) -> &[Message] {
        self.day(&key.year, &key.month, &key.day)
    }

    pub fn day(&self, year: &str, month: &str, day: &str) -> &[Message] {
        self.years
            .get(year)
            .and_then(|months| months.get(month))
            .and_then(|days| days.get(day))
            .map(|messages| messages.as_slice())
            .unwrap_or(&[])
    }

    /// All non-empty buckets in key order.
    pub fn buckets(&self) -> impl Iterator<Item = (BucketKey, &[Message])> + '_ {
        self.years.iter().flat_map(|(year, months)| {
            months.iter().flat_map(move |(month, days)| {
                days.iter().map(move |(day, messages)| {
                    (
                        BucketKey {
                            year: year.clone(),
                            month: month.clone(),
                            day: day.clone(),
                        },
                        messages.as_slice(),
                    )
                })
            })
        })
    }

    /// Messages in bucket order, then insertion order within each day.
    pub fn iter(&self) -> impl Iterator<Item = &Message> + '_ {
        self.years
            .values()
            .flat_map(|months| months.values())
            .flat_map(|days| days.values())
            .flat_map(|messages| messages.iter())
    }

    pub fn flatten(&self) -> Vec<Message> {
        self.iter().cloned().collect()
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.iter().any(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }
}
