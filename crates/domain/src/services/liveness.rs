//! Live / Latest / Historical classification of location records.
//!
//! Classification is derived per query and never stored. Only a subject's
//! most recent record can be Live or Latest; everything older is Historical.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::location::LocationRecord;

/// Default recency window when a user has not configured one.
pub const DEFAULT_THRESHOLD_MINUTES: i32 = 10;

/// Liveness of a single record at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Live,
    Latest,
    Historical,
}

/// A record annotated with its liveness and the threshold that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedLocation {
    #[serde(flatten)]
    pub record: LocationRecord,
    pub liveness: Liveness,
    pub location_time_threshold_minutes: i32,
}

impl ClassifiedLocation {
    pub fn is_live(&self) -> bool {
        self.liveness == Liveness::Live
    }
}

fn epoch_minute<Tz: TimeZone>(instant: &DateTime<Tz>) -> i64 {
    instant.timestamp().div_euclid(60)
}

/// Whole minutes elapsed between `instant` and `now`.
pub fn age_minutes<Tz: TimeZone>(instant: &DateTime<Tz>, now: DateTime<Utc>) -> i64 {
    epoch_minute(&now) - epoch_minute(instant)
}

/// Classifies one record.
///
/// `is_latest` must be true only for the subject's most recent record.
pub fn classify(
    record: &LocationRecord,
    threshold_minutes: i32,
    is_latest: bool,
    now: DateTime<Utc>,
) -> Liveness {
    if !is_latest {
        return Liveness::Historical;
    }
    if age_minutes(&record.local_timestamp, now) <= i64::from(threshold_minutes) {
        Liveness::Live
    } else {
        Liveness::Latest
    }
}

/// The most recent record: highest local instant, ties to the highest id.
pub fn latest_of<'a, I>(records: I) -> Option<&'a LocationRecord>
where
    I: IntoIterator<Item = &'a LocationRecord>,
{
    records.into_iter().max_by_key(|record| record.recency_key())
}

/// Annotates one subject's records.
///
/// `latest_id` is the id of the subject's overall latest record, which
/// may lie outside `records`.
pub fn annotate(
    records: Vec<LocationRecord>,
    latest_id: Option<i64>,
    threshold_minutes: i32,
    now: DateTime<Utc>,
) -> Vec<ClassifiedLocation> {
    records
        .into_iter()
        .map(|record| {
            let is_latest = latest_id == Some(record.id);
            ClassifiedLocation {
                liveness: classify(&record, threshold_minutes, is_latest, now),
                location_time_threshold_minutes: threshold_minutes,
                record,
            }
        })
        .collect()
}

/// The first instant at which `record` is no longer Live.
pub fn live_until(record: &LocationRecord, threshold_minutes: i32) -> DateTime<Utc> {
    let minute = epoch_minute(&record.local_timestamp) + i64::from(threshold_minutes) + 1;
    DateTime::<Utc>::default() + Duration::minutes(minute)
}

/// Earliest instant at which a currently Live record becomes Latest.
pub fn next_transition(
    records: &[ClassifiedLocation],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    records
        .iter()
        .filter(|location| location.is_live())
        .map(|location| live_until(&location.record, location.location_time_threshold_minutes))
        .filter(|at| *at > now)
        .min()
}

/// Delay from `now` until `at`, zero if `at` has passed.
pub fn delay_until(at: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (at - now).to_std().unwrap_or(std::time::Duration::ZERO)
}

/// One-shot re-classification timer guarded by a generation counter.
///
/// Each `schedule` supersedes the previous one and stops its sleeping task;
/// a superseded or cancelled timer never delivers. Receivers should still
/// check [`LivenessRefresh::is_current`] since a tick may be in the channel
/// when a newer schedule starts.
#[derive(Debug)]
pub struct LivenessRefresh {
    generation: Arc<AtomicU64>,
    tx: mpsc::Sender<u64>,
    pending: Mutex<Option<CancellationToken>>,
}

impl LivenessRefresh {
    pub fn new() -> (Self, mpsc::Receiver<u64>) {
        let (tx, rx) = mpsc::channel(4);
        (
            Self {
                generation: Arc::new(AtomicU64::new(0)),
                tx,
                pending: Mutex::new(None),
            },
            rx,
        )
    }

    /// Swaps the pending timer's token, stopping the one it replaces.
    fn replace_pending(&self, next: Option<CancellationToken>) {
        let previous = match self.pending.lock() {
            Ok(mut pending) => std::mem::replace(&mut *pending, next),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), next),
        };
        if let Some(token) = previous {
            token.cancel();
        }
    }

    /// Arms the timer to fire after `delay`, returning its generation.
    pub fn schedule(&self, delay: std::time::Duration) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let tx = self.tx.clone();
        let token = CancellationToken::new();
        self.replace_pending(Some(token.clone()));

        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if current.load(Ordering::SeqCst) == generation {
                        let _ = tx.send(generation).await;
                    }
                }
            }
        });

        generation
    }

    /// Disarms any pending timer.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.replace_pending(None);
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

impl Drop for LivenessRefresh {
    fn drop(&mut self) {
        self.cancel();
    }
}
