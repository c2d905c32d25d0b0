// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Timestamp handling shared by ingest, the month index, and query
//! criteria. Everything is normalized to epoch milliseconds, UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Parses an ISO-8601 value: a full RFC 3339 timestamp, a naive
/// `YYYY-MM-DDTHH:MM:SS`, or a bare `YYYY-MM-DD` (taken as midnight UTC).
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc().timestamp_millis());
    }
    parse_date(raw).map(start_of_day_ms)
}

/// Start of the given civil day, UTC.
pub fn start_of_day_ms(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Last millisecond of the given civil day, UTC. Used for the inclusive
/// latest-return bound.
pub fn end_of_day_ms(date: NaiveDate) -> i64 {
    start_of_day_ms(date) + MILLIS_PER_DAY - 1
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    // A full timestamp is also an acceptable way to spell a date bound.
    parse_timestamp_ms_strict(raw).map(|ms| {
        DateTime::<Utc>::from_timestamp_millis(ms)
            .map(|ts| ts.date_naive())
            .unwrap_or(NaiveDate::MIN)
    })
}

fn parse_timestamp_ms_strict(raw: &str) -> Option<i64> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Coarse month bucket key for the departure-month index: `year * 100 +
/// month`, e.g. 202406 for June 2024. Timestamps outside chrono's range
/// fold into bucket 0.
pub fn month_key(timestamp_ms: i64) -> u32 {
    match DateTime::<Utc>::from_timestamp_millis(timestamp_ms) {
        Some(ts) => ts.year().max(0) as u32 * 100 + ts.month(),
        None => 0,
    }
}

/// Iterates month keys from `start` to `end` inclusive. The fan-out is
/// O(months-in-range), which is what makes the coarse index usable for
/// range predicates.
pub fn month_range(start: u32, end: u32) -> impl Iterator<Item = u32> {
    let mut year = start / 100;
    let mut month = (start % 100).max(1);
    std::iter::from_fn(move || {
        let key = year * 100 + month;
        if key > end {
            return None;
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
        Some(key)
    })
}

/// Whole days between two departure timestamps, for the derived duration
/// column.
pub fn days_between(start_ms: i64, end_ms: i64) -> i64 {
    (end_ms - start_ms) / MILLIS_PER_DAY
}
