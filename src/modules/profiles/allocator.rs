//! Enrollment number allocation.
//!
//! Student profiles get a human-readable code shaped
//! `STU<year><month><4-digit zero-padded sequence>`, e.g. `STU2026080042`.
//! Two strategies exist:
//!
//! - [`CountingAllocator`] derives the sequence from the current student
//!   count. This is the legacy scheme and it is NOT atomic: two
//!   registrations counting in the same period race and build the same
//!   code. It is kept selectable (and tested) rather than silently removed.
//! - [`SequenceAllocator`] takes the next value from an atomic per-period
//!   counter at the storage layer. This is the default.
//!
//! Both fall back to a timestamp-derived suffix when the storage query
//! fails, trading a pretty sequence for forward progress.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tracing::warn;

use crate::policy::Actor;
use crate::policy::store::ProfileStore;

pub const ENROLLMENT_PREFIX: &str = "STU";

/// `<year><month>` bucket the sequence runs in, e.g. `"202608"`.
pub fn current_period(now: DateTime<Utc>) -> String {
    format!("{:04}{:02}", now.year(), now.month())
}

pub fn format_code(period: &str, seq: i64) -> String {
    format!("{ENROLLMENT_PREFIX}{period}{seq:04}")
}

fn fallback_code(now: DateTime<Utc>) -> String {
    // Millisecond-derived suffix; unique enough to make progress, ugly
    // enough to stand out in an audit.
    let suffix = now.timestamp_millis() % 1_000_000;
    format!("{ENROLLMENT_PREFIX}{}{suffix:06}", current_period(now))
}

#[async_trait]
pub trait EnrollmentAllocator: Send + Sync {
    /// Produce a candidate enrollment code. Uniqueness is ultimately
    /// enforced by the store's constraint; the provisioner re-allocates once
    /// on a collision.
    async fn allocate(&self, store: &dyn ProfileStore) -> String;
}

/// Legacy count-then-construct allocation. Known race under concurrent
/// registrations in the same period; see the module docs.
pub struct CountingAllocator;

#[async_trait]
impl EnrollmentAllocator for CountingAllocator {
    async fn allocate(&self, store: &dyn ProfileStore) -> String {
        let now = Utc::now();
        match store.count_students(&Actor::System).await {
            Ok(count) => format_code(&current_period(now), count + 1),
            Err(err) => {
                warn!(error = %err, "student count failed; using timestamp fallback code");
                fallback_code(now)
            }
        }
    }
}

/// Atomic per-period sequence allocation.
pub struct SequenceAllocator;

#[async_trait]
impl EnrollmentAllocator for SequenceAllocator {
    async fn allocate(&self, store: &dyn ProfileStore) -> String {
        let now = Utc::now();
        let period = current_period(now);
        match store.next_enrollment_seq(&Actor::System, &period).await {
            Ok(seq) => format_code(&period, seq),
            Err(err) => {
                warn!(error = %err, "enrollment sequence failed; using timestamp fallback code");
                fallback_code(now)
            }
        }
    }
}

/// Allocator selection, from `ENROLLMENT_ALLOCATOR` (`sequence` | `counting`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorKind {
    Sequence,
    Counting,
}

impl AllocatorKind {
    pub fn from_env() -> Self {
        match std::env::var("ENROLLMENT_ALLOCATOR").as_deref() {
            Ok("counting") => AllocatorKind::Counting,
            _ => AllocatorKind::Sequence,
        }
    }

    pub fn build(self) -> std::sync::Arc<dyn EnrollmentAllocator> {
        match self {
            AllocatorKind::Sequence => std::sync::Arc::new(SequenceAllocator),
            AllocatorKind::Counting => std::sync::Arc::new(CountingAllocator),
        }
    }
}
