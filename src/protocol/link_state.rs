use log::debug;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::types::RouteOutcome;
use crate::error::ValidationError;
use crate::types::{check_unique_dests, same_vector, Address, Entry};

/// Latest accepted ROUTE advertisement from one origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStateRecord {
    pub origin: Address,
    pub vector: Vec<Entry>,
    pub seq: u32,
    pub ttl: Duration,
    pub received_at: Instant,
}

impl LinkStateRecord {
    /// Valid while `now - received_at <= ttl`
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.received_at) <= self.ttl
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }
}

/// Per-origin link state, shared by the receive loops and the announce cycle.
#[derive(Debug, Default)]
pub struct LinkStateStore {
    records: RwLock<HashMap<Address, LinkStateRecord>>,
}

impl LinkStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(
        &self,
        origin: Address,
        vector: Vec<Entry>,
        seq: u32,
        ttl: Duration,
    ) -> Result<RouteOutcome, ValidationError> {
        self.record_at(origin, vector, seq, ttl, Instant::now()).await
    }

    /// Store an advertisement unless a live record with the same or a newer
    /// sequence number is already held.
    pub async fn record_at(
        &self,
        origin: Address,
        vector: Vec<Entry>,
        seq: u32,
        ttl: Duration,
        now: Instant,
    ) -> Result<RouteOutcome, ValidationError> {
        check_unique_dests(&vector)?;

        let mut records = self.records.write().await;
        let changed = match records.get(&origin) {
            Some(prev) if prev.is_valid_at(now) => {
                if seq <= prev.seq {
                    debug!(
                        "Stale ROUTE from {}: seq {} <= stored {}",
                        origin, seq, prev.seq
                    );
                    return Ok(RouteOutcome::Stale);
                }
                !same_vector(&prev.vector, &vector)
            }
            _ => true,
        };

        records.insert(
            origin,
            LinkStateRecord {
                origin,
                vector,
                seq,
                ttl,
                received_at: now,
            },
        );
        Ok(RouteOutcome::Accepted { changed })
    }

    pub async fn is_valid(&self, origin: Address) -> bool {
        self.records
            .read()
            .await
            .get(&origin)
            .is_some_and(LinkStateRecord::is_valid)
    }

    pub async fn get(&self, origin: Address) -> Option<LinkStateRecord> {
        self.records.read().await.get(&origin).cloned()
    }

    /// Every stored record, expired ones included
    pub async fn snapshot(&self) -> Vec<LinkStateRecord> {
        let mut records: Vec<LinkStateRecord> =
            self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.origin);
        records
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}
