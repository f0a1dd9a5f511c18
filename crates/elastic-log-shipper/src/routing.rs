// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Index routing by item timestamp.
//!
//! A sharding policy turns an item into an ordered list of name segments that
//! are appended to the base index name:
//!
//! ```text
//! Daily,  2016-01-02T03:04:05Z  ->  logs-2016-01-02
//! Hourly, 2016-01-02T03:04:05Z  ->  logs-2016-01-02-03
//! Weekly, 2016-03-05 (Saturday) ->  logs-2016-02-28
//! ```
//!
//! Routing is a pure function of its inputs and does no I/O.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Timelike};

use crate::item::LogItem;

/// Separator between the base name and each segment.
pub const SEGMENT_SEPARATOR: &str = "-";

/// Caller supplied segment function for [`ShardingPolicy::Custom`].
pub type CustomShardFn = Arc<dyn Fn(&LogItem) -> Vec<String> + Send + Sync>;

/// How items are spread over time-partitioned indices.
#[derive(Clone, Default)]
pub enum ShardingPolicy {
    /// Every item goes to the base index.
    #[default]
    None,
    Monthly,
    /// Dated by the Sunday starting the item's week.
    Weekly,
    Daily,
    Hourly,
    EveryMinute,
    /// Segments computed by the caller from the whole item.
    Custom(CustomShardFn),
}

impl ShardingPolicy {
    /// Whether items may land in indices other than the base one.
    #[must_use]
    pub fn is_sharded(&self) -> bool {
        !matches!(self, ShardingPolicy::None)
    }

    /// Name segments for `item`, in order, without separators.
    #[must_use]
    pub fn segments(&self, item: &LogItem) -> Vec<String> {
        let ts = item.timestamp;
        let date = ts.date_naive();
        match self {
            ShardingPolicy::None => Vec::new(),
            ShardingPolicy::Monthly => vec![year(date), two(date.month())],
            ShardingPolicy::Weekly => {
                let sunday = round_to_sunday(date);
                vec![year(sunday), two(sunday.month()), two(sunday.day())]
            }
            ShardingPolicy::Daily => vec![year(date), two(date.month()), two(date.day())],
            ShardingPolicy::Hourly => vec![
                year(date),
                two(date.month()),
                two(date.day()),
                two(ts.hour()),
            ],
            ShardingPolicy::EveryMinute => vec![
                year(date),
                two(date.month()),
                two(date.day()),
                two(ts.hour()),
                two(ts.minute()),
            ],
            ShardingPolicy::Custom(segments_fn) => segments_fn(item),
        }
    }
}

impl fmt::Debug for ShardingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardingPolicy::None => write!(f, "None"),
            ShardingPolicy::Monthly => write!(f, "Monthly"),
            ShardingPolicy::Weekly => write!(f, "Weekly"),
            ShardingPolicy::Daily => write!(f, "Daily"),
            ShardingPolicy::Hourly => write!(f, "Hourly"),
            ShardingPolicy::EveryMinute => write!(f, "EveryMinute"),
            ShardingPolicy::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl FromStr for ShardingPolicy {
    type Err = String;

    /// Parses every variant except `Custom`, which has no textual form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(ShardingPolicy::None),
            "monthly" => Ok(ShardingPolicy::Monthly),
            "weekly" => Ok(ShardingPolicy::Weekly),
            "daily" => Ok(ShardingPolicy::Daily),
            "hourly" => Ok(ShardingPolicy::Hourly),
            "every-minute" | "every_minute" | "minutely" => Ok(ShardingPolicy::EveryMinute),
            other => Err(format!("unknown sharding policy '{other}'")),
        }
    }
}

/// Index an item should be written to under `policy`.
#[must_use]
pub fn route(base_index: &str, policy: &ShardingPolicy, item: &LogItem) -> String {
    let segments = policy.segments(item);
    if segments.is_empty() {
        return base_index.to_string();
    }
    let mut name = String::with_capacity(base_index.len() + segments.len() * 3 + 2);
    name.push_str(base_index);
    for segment in segments {
        name.push_str(SEGMENT_SEPARATOR);
        name.push_str(&segment);
    }
    name
}

/// Template pattern covering every index `route` can produce for `base_index`.
#[must_use]
pub fn template_pattern(base_index: &str) -> String {
    format!("{base_index}{SEGMENT_SEPARATOR}*")
}

/// Rounds `date` back to the Sunday that ends the previous ISO week, or
/// returns it unchanged when it already is a Sunday.
///
/// ISO weeks run Monday (1) to Sunday (7), so going back `weekday` days from
/// any Monday..Saturday lands on the previous week's Sunday. This also covers
/// dates in ISO week 1, whose previous Sunday belongs to the last week of the
/// prior ISO year.
#[must_use]
pub fn round_to_sunday(date: NaiveDate) -> NaiveDate {
    let iso_weekday = date.weekday().number_from_monday();
    if iso_weekday == 7 {
        return date;
    }
    date - chrono::Duration::days(i64::from(iso_weekday))
}

fn year(date: NaiveDate) -> String {
    format!("{:04}", date.year())
}

fn two(n: u32) -> String {
    format!("{n:02}")
}
