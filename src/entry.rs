//! Cache Entries and Expiration
//!
//! Expiration options shared by both tiers and the persisted entry record.
//!
//! # Expiration Rules
//!
//! - **Absolute**: a fixed UTC instant, or a duration relative to the write time.
//!   The instant wins when both are supplied.
//! - **Sliding**: a renewal window; every successful read moves the expiry to
//!   `now + renewal`.
//! - **Combined**: sliding renewal never moves the expiry past the absolute bound.
//!
//! An entry is expired when it has an expiry and `now >= expiry`.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// Add a std duration to a UTC instant, saturating at the largest representable instant
pub(crate) fn add_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn cap(expiry: DateTime<Utc>, bound: Option<DateTime<Utc>>) -> DateTime<Utc> {
    bound.map_or(expiry, |bound| expiry.min(bound))
}

/// Expiration options for a cache write
///
/// Used for both the memory tier and the persistent tier; each tier evaluates
/// its own copy independently.
///
/// # Example
///
/// ```rust
/// use multi_level_cache::EntryOptions;
/// use std::time::Duration;
///
/// let options = EntryOptions::new()
///     .with_absolute_expiration_relative_to_now(Duration::from_secs(3600))
///     .with_sliding_expiration(Duration::from_secs(300));
/// assert!(options.has_expiration());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOptions {
    /// Fixed instant after which the entry is invalid
    pub absolute_expiration: Option<DateTime<Utc>>,
    /// Absolute expiration measured from the time of the write
    pub absolute_expiration_relative_to_now: Option<Duration>,
    /// Renewal window extended on every successful read
    pub sliding_expiration: Option<Duration>,
}

impl EntryOptions {
    /// Options with no expiration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire at a fixed instant, normalized to UTC
    #[must_use]
    pub fn with_absolute_expiration<Tz: TimeZone>(mut self, at: DateTime<Tz>) -> Self {
        self.absolute_expiration = Some(at.with_timezone(&Utc));
        self.absolute_expiration_relative_to_now = None;
        self
    }

    /// Expire a fixed duration after the write
    #[must_use]
    pub fn with_absolute_expiration_relative_to_now(mut self, after: Duration) -> Self {
        self.absolute_expiration_relative_to_now = Some(after);
        self.absolute_expiration = None;
        self
    }

    /// Expire after `window` without reads
    #[must_use]
    pub fn with_sliding_expiration(mut self, window: Duration) -> Self {
        self.sliding_expiration = Some(window);
        self
    }

    /// Whether any expiration is configured
    #[must_use]
    pub fn has_expiration(&self) -> bool {
        self.absolute_expiration.is_some()
            || self.absolute_expiration_relative_to_now.is_some()
            || self.sliding_expiration.is_some()
    }

    /// Absolute bound for a write performed at `now`
    #[must_use]
    pub fn absolute_deadline(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.absolute_expiration.or_else(|| {
            self.absolute_expiration_relative_to_now
                .map(|after| add_duration(now, after))
        })
    }

    /// Compute the expiration of a write performed at `now`
    #[must_use]
    pub fn resolve(&self, now: DateTime<Utc>) -> Expiration {
        let absolute = self.absolute_deadline(now);

        match self.sliding_expiration {
            Some(renewal) => Expiration {
                expiry: Some(cap(add_duration(now, renewal), absolute)),
                renewal: Some(renewal),
                absolute,
            },
            None => Expiration {
                expiry: absolute,
                renewal: None,
                absolute,
            },
        }
    }
}

/// Resolved expiration of a single write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration {
    /// Effective expiry; `None` never expires
    pub expiry: Option<DateTime<Utc>>,
    /// Sliding renewal window
    pub renewal: Option<Duration>,
    /// Absolute bound that renewal may not exceed
    pub absolute: Option<DateTime<Utc>>,
}

/// Entry stored by the persistent tier
///
/// Invariant: whenever `renewal` is set, `expiry` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Unique key
    pub key: String,
    /// Stored bytes
    pub value: Vec<u8>,
    /// Instant from which the entry is stale
    pub expiry: Option<DateTime<Utc>>,
    /// Sliding renewal window
    pub renewal: Option<Duration>,
    /// Absolute bound on renewal
    pub absolute_expiry: Option<DateTime<Utc>>,
}

impl CacheEntry {
    /// Build the entry for a write performed at `now`
    #[must_use]
    pub fn new(key: impl Into<String>, value: Vec<u8>, options: &EntryOptions, now: DateTime<Utc>) -> Self {
        let expiration = options.resolve(now);
        Self {
            key: key.into(),
            value,
            expiry: expiration.expiry,
            renewal: expiration.renewal,
            absolute_expiry: expiration.absolute,
        }
    }

    /// Whether the entry is stale at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| now >= expiry)
    }

    /// Slide the expiry forward from `now`
    ///
    /// Returns `false` (and changes nothing) when the entry has no renewal window.
    pub fn renew(&mut self, now: DateTime<Utc>) -> bool {
        let Some(renewal) = self.renewal else {
            return false;
        };
        self.expiry = Some(cap(add_duration(now, renewal), self.absolute_expiry));
        true
    }
}
