use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DAY_BUCKETS: usize = 31;
pub const MONTH_BUCKETS: usize = 12;

/// Message count for one calendar day. Slot `day - 1` of a 31-slot ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayBucket {
    pub date: Option<NaiveDate>,
    pub count: u64,
}

/// Message count for one month. Slot `month - 1` of a 12-slot ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthBucket {
    pub year: Option<i32>,
    pub count: u64,
}

/// Text activity counters for one guild, channel or member.
///
/// Messages land in day buckets. `register_day` folds a finished day into
/// its month bucket and the total; until then the day only lives in its
/// day bucket, and queries add it back in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub days: [DayBucket; DAY_BUCKETS],
    pub months: [MonthBucket; MONTH_BUCKETS],
    pub total: u64,
    /// Latest day folded into months and total.
    pub registered_through: Option<NaiveDate>,
}

impl ActivityStats {
    fn day_slot(date: NaiveDate) -> usize {
        date.day0() as usize
    }

    fn month_slot(date: NaiveDate) -> usize {
        date.month0() as usize
    }

    pub fn record_message(&mut self, today: NaiveDate) {
        let bucket = &mut self.days[Self::day_slot(today)];
        if bucket.date != Some(today) {
            // Slot still holds last month's (or older) day.
            *bucket = DayBucket {
                date: Some(today),
                count: 0,
            };
        }
        bucket.count += 1;
    }

    fn is_registered(&self, date: NaiveDate) -> bool {
        self.registered_through.is_some_and(|last| date <= last)
    }

    /// Fold `date` into its month bucket and the total. A date at or before
    /// the last registered one is ignored.
    pub fn register_day(&mut self, date: NaiveDate) {
        if self.is_registered(date) {
            return;
        }

        let count = self.count_on(date);
        let month = &mut self.months[Self::month_slot(date)];
        if month.year != Some(date.year()) {
            *month = MonthBucket {
                year: Some(date.year()),
                count: 0,
            };
        }
        month.count += count;
        self.total += count;
        self.registered_through = Some(date);
    }

    fn count_on(&self, date: NaiveDate) -> u64 {
        let bucket = self.days[Self::day_slot(date)];
        if bucket.date == Some(date) {
            bucket.count
        } else {
            0
        }
    }

    /// Day buckets not yet folded into months and total.
    fn pending(&self) -> impl Iterator<Item = &DayBucket> {
        self.days
            .iter()
            .filter(move |b| b.date.is_some_and(|d| !self.is_registered(d)))
    }

    /// Messages on the day `days_ago` days before `today`, or `None` when the
    /// slot has been recycled or never used.
    pub fn day(&self, today: NaiveDate, days_ago: u32) -> Option<(NaiveDate, u64)> {
        if days_ago as usize >= DAY_BUCKETS {
            return None;
        }
        let date = today - Duration::days(i64::from(days_ago));
        let bucket = self.days[Self::day_slot(date)];
        (bucket.date == Some(date)).then_some((date, bucket.count))
    }

    /// Messages in the month `months_ago` months before the current one.
    /// Returns the first day of that month along with the count.
    pub fn month(&self, today: NaiveDate, months_ago: u32) -> Option<(NaiveDate, u64)> {
        if months_ago as usize >= MONTH_BUCKETS {
            return None;
        }
        let first = today.with_day(1)? - Months::new(months_ago);

        let bucket = self.months[Self::month_slot(first)];
        let registered = if bucket.year == Some(first.year()) {
            bucket.count
        } else {
            0
        };
        let pending: u64 = self
            .pending()
            .filter(|b| {
                b.date
                    .is_some_and(|d| d.year() == first.year() && d.month() == first.month())
            })
            .map(|b| b.count)
            .sum();

        let count = registered + pending;
        (count > 0).then_some((first, count))
    }

    /// All messages ever counted, including days not yet registered.
    pub fn total(&self) -> u64 {
        self.total + self.pending().map(|b| b.count).sum::<u64>()
    }
}

/// Which counters a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsScope {
    Guild,
    Channel(u64),
    Member(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsPeriod {
    Day { days_ago: u32 },
    Month { months_ago: u32 },
    Total,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    pub enabled: bool,
    pub ignored_channels: Vec<u64>,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ignored_channels: Vec::new(),
        }
    }
}

/// Everything tracked for one guild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildStats {
    pub settings: StatsSettings,
    pub guild: ActivityStats,
    pub channels: HashMap<u64, ActivityStats>,
    pub members: HashMap<u64, ActivityStats>,
}

impl GuildStats {
    pub fn scope(&self, scope: StatsScope) -> Option<&ActivityStats> {
        match scope {
            StatsScope::Guild => Some(&self.guild),
            StatsScope::Channel(id) => self.channels.get(&id),
            StatsScope::Member(id) => self.members.get(&id),
        }
    }

    pub fn record_message(&mut self, channel_id: u64, member_id: u64, today: NaiveDate) {
        self.guild.record_message(today);
        self.channels
            .entry(channel_id)
            .or_default()
            .record_message(today);
        self.members
            .entry(member_id)
            .or_default()
            .record_message(today);
    }

    pub fn register_day(&mut self, date: NaiveDate) {
        self.guild.register_day(date);
        self.channels
            .values_mut()
            .chain(self.members.values_mut())
            .for_each(|stats| stats.register_day(date));
    }

    /// Earliest date still held in any day bucket.
    pub fn oldest_recorded_day(&self) -> Option<NaiveDate> {
        std::iter::once(&self.guild)
            .chain(self.channels.values())
            .chain(self.members.values())
            .flat_map(|s| s.days.iter().filter_map(|b| b.date))
            .min()
    }

    /// Oldest registration mark across all counters.
    pub fn registered_through(&self) -> Option<NaiveDate> {
        std::iter::once(&self.guild)
            .chain(self.channels.values())
            .chain(self.members.values())
            .filter_map(|s| s.registered_through)
            .min()
    }
}

/// Time left until the next UTC midnight.
pub fn until_next_midnight(now: DateTime<Utc>) -> std::time::Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());

    next.and_then(|midnight| (midnight - now).to_std().ok())
        .unwrap_or(std::time::Duration::from_secs(24 * 60 * 60))
}
