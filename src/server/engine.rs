//! Lock queue engine: per-resource FIFO queues and lock records.
//!
//! The engine is a plain state machine driven by the coordinator task. It
//! never touches sockets or clocks; callers pass `now` (epoch ms) and
//! deliver the [`Notification`]s a sweep returns.
//!
//! # Acquisition
//!
//! ```text
//! request_lock(A|B) ──► queue[A]: [.., item]   queue[B]: [.., item]   (Pending)
//!                              │                       │
//!  sweep: head of each queue marked active, lock.active_count += 1
//!                              └──────────┬────────────┘
//!                    active_count == resources.len() ──► Active, `locked`
//! ```
//!
//! Items refer to their lock by [`LockId`], a key into the lock table, so
//! destroying a lock is one table removal plus one queue removal per
//! resource.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::LockError;
use crate::protocol::{LockId, ServerMessage};

/// Parameters of a lock request after protocol parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    /// Resource names in request order.
    pub resources: Vec<String>,
    /// Lease length in ms; must be positive.
    pub ttl: i64,
    /// Request timeout in ms, `0` for none.
    pub timeout: u64,
    /// Maximum queue depth to wait behind, `0` for unlimited.
    pub tolerate: usize,
}

/// Lifecycle of a lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Waiting for the head of one or more queues.
    Pending,
    /// Holding every requested resource.
    Active,
}

#[derive(Debug)]
struct LockRecord {
    owner: String,
    resources: Vec<String>,
    active_count: usize,
    state: LockState,
    timeout_at: Option<u64>,
    expires_at: Option<u64>,
    ttl: u64,
}

impl LockRecord {
    /// Deadline the sweep has to wake up for, if any.
    fn next_deadline(&self) -> Option<u64> {
        match self.state {
            LockState::Pending => self.timeout_at,
            LockState::Active => self.expires_at,
        }
    }
}

#[derive(Debug)]
struct Item {
    lock_id: LockId,
    head_active: bool,
}

/// A message the engine wants delivered to a client identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Target socket id (the lock owner).
    pub socket_id: String,
    /// Message to deliver.
    pub message: ServerMessage,
}

/// Output of one sweep pass.
#[derive(Debug, Default)]
pub struct Sweep {
    /// Notifications in the order the pass produced them.
    pub notifications: Vec<Notification>,
    /// Earliest upcoming deadline (epoch ms), `None` if no lock has one.
    pub next_deadline: Option<u64>,
}

/// Monotonic server counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    /// Lock attempts, including rejected ones.
    pub lock_count: u64,
    /// Attempts rejected by the tolerate threshold.
    pub intolerance_count: u64,
    /// Pending locks that hit their request timeout.
    pub timeout_count: u64,
    /// Locks that became active.
    pub locked_count: u64,
    /// Active locks whose lease lapsed.
    pub expired_count: u64,
    /// Successful unlocks.
    pub finished_count: u64,
    /// Successful extends.
    pub extend_count: u64,
    /// Failed extends.
    pub extend_failed_count: u64,
}

/// Read-only status snapshot, serialized as the `status` reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    /// Known client identities, connected or not.
    pub socket_count: usize,
    /// Lock records currently held or queued.
    pub current_locks: usize,
    /// Milliseconds since the server started.
    pub live_time: u64,
    /// Server start, epoch ms.
    pub start_at: u64,
    /// Counters since start.
    #[serde(flatten)]
    pub counters: Counters,
}

/// Owner of all queues and lock records.
#[derive(Debug)]
pub struct LockEngine {
    locks: HashMap<LockId, LockRecord>,
    queues: HashMap<String, VecDeque<Item>>,
    counters: Counters,
    started_at: u64,
}

impl LockEngine {
    /// Create an empty engine that started at `now`.
    pub fn new(now: u64) -> Self {
        Self {
            locks: HashMap::new(),
            queues: HashMap::new(),
            counters: Counters::default(),
            started_at: now,
        }
    }

    /// Enqueue a lock request for `owner`.
    ///
    /// The lock starts Pending; run [`LockEngine::sweep`] afterwards so it can
    /// become active without waiting for the next tick.
    ///
    /// # Errors
    ///
    /// - [`LockError::InvalidArgument`] for a non-positive ttl, an empty
    ///   resource name, or a timeout past the end of the clock.
    /// - [`LockError::Intolerant`] if a queue is deeper than `tolerate`; no
    ///   item of this request is left behind.
    pub fn request_lock(
        &mut self,
        owner: &str,
        request: LockRequest,
        now: u64,
    ) -> Result<LockId, LockError> {
        let ttl = u64::try_from(request.ttl)
            .ok()
            .filter(|ttl| *ttl > 0)
            .ok_or(LockError::InvalidArgument("ttl should be integer!"))?;

        let mut resources: Vec<String> = Vec::with_capacity(request.resources.len());
        for resource in request.resources {
            if resource.is_empty() {
                return Err(LockError::InvalidArgument("resource is required!"));
            }
            if !resources.contains(&resource) {
                resources.push(resource);
            }
        }
        if resources.is_empty() {
            return Err(LockError::InvalidArgument("resource is required!"));
        }
        let timeout_at = match request.timeout {
            0 => None,
            timeout => Some(
                now.checked_add(timeout)
                    .ok_or(LockError::InvalidArgument("timeout is too large!"))?,
            ),
        };

        self.counters.lock_count += 1;
        let lock_id = loop {
            let candidate = generate_lock_id(now);
            if !self.locks.contains_key(&candidate) {
                break candidate;
            }
        };

        for (index, resource) in resources.iter().enumerate() {
            let queue = self.queues.entry(resource.clone()).or_default();
            if request.tolerate > 0 && queue.len() > request.tolerate {
                self.rollback(&resources[..index]);
                self.counters.intolerance_count += 1;
                return Err(LockError::Intolerant);
            }
            queue.push_back(Item {
                lock_id: lock_id.clone(),
                head_active: false,
            });
        }

        log::debug!(
            "[Engine] Queued lock {} for {} on {:?} (ttl {}ms)",
            lock_id,
            owner,
            resources,
            ttl
        );

        self.locks.insert(
            lock_id.clone(),
            LockRecord {
                owner: owner.to_string(),
                resources,
                active_count: 0,
                state: LockState::Pending,
                timeout_at,
                expires_at: None,
                ttl,
            },
        );

        Ok(lock_id)
    }

    /// Pop the items this request appended to `resources`.
    ///
    /// They are the newest entries of their queues because enqueue and
    /// rollback run in one call on the coordinator task.
    fn rollback(&mut self, resources: &[String]) {
        for resource in resources {
            if let Some(queue) = self.queues.get_mut(resource) {
                queue.pop_back();
                if queue.is_empty() {
                    self.queues.remove(resource);
                }
            }
        }
    }

    /// Add `ttl` ms to an active lock's expiry.
    ///
    /// Extension is additive from the current deadline, not from `now`.
    /// Returns the new expiry (epoch ms).
    pub fn extend_lock(&mut self, lock_id: &LockId, ttl: i64) -> Result<u64, LockError> {
        let result = self.try_extend(lock_id, ttl);
        match result {
            Ok(_) => self.counters.extend_count += 1,
            Err(_) => self.counters.extend_failed_count += 1,
        }
        result
    }

    fn try_extend(&mut self, lock_id: &LockId, ttl: i64) -> Result<u64, LockError> {
        let lock = self.locks.get_mut(lock_id).ok_or(LockError::NotFound)?;
        if lock.state != LockState::Active {
            return Err(LockError::NotLocked);
        }
        let ttl = u64::try_from(ttl)
            .ok()
            .filter(|ttl| *ttl > 0)
            .ok_or(LockError::InvalidArgument("ttl should be integer!"))?;

        let expires_at = lock
            .expires_at
            .unwrap_or_default()
            .checked_add(ttl)
            .ok_or(LockError::InvalidArgument("ttl is too large!"))?;
        lock.expires_at = Some(expires_at);
        Ok(expires_at)
    }

    /// Release a lock, pending or active.
    pub fn release_lock(&mut self, lock_id: &LockId) -> Result<(), LockError> {
        self.destroy(lock_id).ok_or(LockError::NotFound)?;
        self.counters.finished_count += 1;
        Ok(())
    }

    /// Remove a lock record and all of its queue items.
    fn destroy(&mut self, lock_id: &LockId) -> Option<LockRecord> {
        let lock = self.locks.remove(lock_id)?;
        for resource in &lock.resources {
            if let Some(queue) = self.queues.get_mut(resource) {
                if let Some(pos) = queue.iter().position(|item| &item.lock_id == lock_id) {
                    queue.remove(pos);
                }
            }
        }
        Some(lock)
    }

    /// Run one scheduling pass at `now`.
    ///
    /// Fires request timeouts and lease expirations, promotes queue heads,
    /// activates locks whose every item is head-active, and reports the next
    /// deadline to wake up for.
    pub fn sweep(&mut self, now: u64) -> Sweep {
        let mut sweep = Sweep::default();

        let due: Vec<(LockId, LockState)> = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.next_deadline().is_some_and(|at| at <= now))
            .map(|(id, lock)| (id.clone(), lock.state))
            .collect();

        for (lock_id, state) in due {
            let Some(lock) = self.destroy(&lock_id) else {
                continue;
            };
            let message = match state {
                LockState::Pending => {
                    self.counters.timeout_count += 1;
                    log::debug!("[Engine] Lock {} timed out", lock_id);
                    ServerMessage::Timeout { lock_id }
                }
                LockState::Active => {
                    self.counters.expired_count += 1;
                    log::debug!("[Engine] Lock {} expired", lock_id);
                    ServerMessage::Expired { lock_id }
                }
            };
            sweep.notifications.push(Notification {
                socket_id: lock.owner,
                message,
            });
        }

        let Self { locks, queues, counters, .. } = self;
        queues.retain(|_, queue| !queue.is_empty());
        for queue in queues.values_mut() {
            let Some(head) = queue.front_mut() else {
                continue;
            };
            if head.head_active {
                continue;
            }
            head.head_active = true;

            let Some(lock) = locks.get_mut(&head.lock_id) else {
                continue;
            };
            lock.active_count += 1;
            if lock.active_count == lock.resources.len() {
                let expires_at = now.saturating_add(lock.ttl);
                lock.state = LockState::Active;
                lock.timeout_at = None;
                lock.expires_at = Some(expires_at);
                counters.locked_count += 1;
                log::debug!("[Engine] Lock {} acquired until {}", head.lock_id, expires_at);
                sweep.notifications.push(Notification {
                    socket_id: lock.owner.clone(),
                    message: ServerMessage::Locked {
                        lock_id: head.lock_id.clone(),
                        expires_at,
                    },
                });
            }
        }

        sweep.next_deadline = locks.values().filter_map(LockRecord::next_deadline).min();
        sweep
    }

    /// Status snapshot at `now`.
    pub fn status(&self, socket_count: usize, now: u64) -> ServerStatus {
        ServerStatus {
            socket_count,
            current_locks: self.locks.len(),
            live_time: now.saturating_sub(self.started_at),
            start_at: self.started_at,
            counters: self.counters.clone(),
        }
    }

    /// State of a lock, if it exists.
    pub fn lock_state(&self, lock_id: &LockId) -> Option<LockState> {
        self.locks.get(lock_id).map(|lock| lock.state)
    }

    /// Expiry deadline of an active lock.
    pub fn expires_at(&self, lock_id: &LockId) -> Option<u64> {
        self.locks.get(lock_id).and_then(|lock| lock.expires_at)
    }

    /// Lock ids queued on `resource`, head first.
    pub fn queue(&self, resource: &str) -> Vec<LockId> {
        self.queues
            .get(resource)
            .map(|queue| queue.iter().map(|item| item.lock_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of non-empty resource queues.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Drop every lock and queue (server shutdown).
    pub fn clear(&mut self) {
        self.locks.clear();
        self.queues.clear();
    }
}

/// Hex epoch-ms prefix plus random hex suffix.
fn generate_lock_id(now: u64) -> LockId {
    LockId(format!("{now:x}{:016x}", rand::random::<u64>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn request(resources: &str, ttl: i64) -> LockRequest {
        LockRequest {
            resources: resources.split('|').map(str::to_string).collect(),
            ttl,
            timeout: 0,
            tolerate: 0,
        }
    }

    fn locked_ids(sweep: &Sweep) -> Vec<LockId> {
        sweep
            .notifications
            .iter()
            .filter_map(|n| match &n.message {
                ServerMessage::Locked { lock_id, .. } => Some(lock_id.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_idle_resource_locks_on_first_sweep() {
        let mut engine = LockEngine::new(T0);
        let id = engine.request_lock("s1", request("r", 5000), T0).unwrap();
        assert_eq!(engine.lock_state(&id), Some(LockState::Pending));

        let sweep = engine.sweep(T0);
        assert_eq!(
            sweep.notifications,
            vec![Notification {
                socket_id: "s1".into(),
                message: ServerMessage::Locked { lock_id: id.clone(), expires_at: T0 + 5000 },
            }]
        );
        assert_eq!(engine.lock_state(&id), Some(LockState::Active));
        assert_eq!(sweep.next_deadline, Some(T0 + 5000));
    }

    #[test]
    fn test_invalid_ttl_rejected_without_side_effects() {
        let mut engine = LockEngine::new(T0);
        for ttl in [0, -5] {
            assert_eq!(
                engine.request_lock("s1", request("r", ttl), T0),
                Err(LockError::InvalidArgument("ttl should be integer!"))
            );
        }
        assert_eq!(engine.queue_count(), 0);
        assert_eq!(engine.status(0, T0).counters.lock_count, 0);
    }

    #[test]
    fn test_empty_resource_rejected() {
        let mut engine = LockEngine::new(T0);
        assert_eq!(
            engine.request_lock("s1", request("a||b", 100), T0),
            Err(LockError::InvalidArgument("resource is required!"))
        );
        assert_eq!(engine.queue_count(), 0);
    }

    #[test]
    fn test_duplicate_resources_collapse() {
        let mut engine = LockEngine::new(T0);
        let id = engine.request_lock("s1", request("a|a", 100), T0).unwrap();
        assert_eq!(engine.queue("a"), vec![id.clone()]);
        engine.sweep(T0);
        assert_eq!(engine.lock_state(&id), Some(LockState::Active));
    }

    #[test]
    fn test_fifo_order_on_single_resource() {
        let mut engine = LockEngine::new(T0);
        let first = engine.request_lock("s1", request("r", 1000), T0).unwrap();
        let second = engine.request_lock("s2", request("r", 1000), T0).unwrap();

        assert_eq!(locked_ids(&engine.sweep(T0)), vec![first.clone()]);
        assert_eq!(engine.lock_state(&second), Some(LockState::Pending));

        engine.release_lock(&first).unwrap();
        let sweep = engine.sweep(T0 + 10);
        assert_eq!(locked_ids(&sweep), vec![second.clone()]);
        assert_eq!(engine.expires_at(&second), Some(T0 + 10 + 1000));
    }

    #[test]
    fn test_multi_resource_is_all_or_nothing() {
        let mut engine = LockEngine::new(T0);
        let holder_b = engine.request_lock("s1", request("b", 1000), T0).unwrap();
        engine.sweep(T0);

        let both = engine.request_lock("s2", request("a|b", 1000), T0).unwrap();
        let sweep = engine.sweep(T0);
        assert!(locked_ids(&sweep).is_empty());
        assert_eq!(engine.lock_state(&both), Some(LockState::Pending));

        engine.release_lock(&holder_b).unwrap();
        let sweep = engine.sweep(T0 + 1);
        assert_eq!(locked_ids(&sweep), vec![both.clone()]);
        assert_eq!(engine.queue("a"), vec![both.clone()]);
        assert_eq!(engine.queue("b"), vec![both]);
    }

    #[test]
    fn test_interleaved_multi_resource_requests_do_not_deadlock() {
        let mut engine = LockEngine::new(T0);
        let ab = engine.request_lock("s1", request("a|b", 1000), T0).unwrap();
        let ba = engine.request_lock("s2", request("b|a", 1000), T0).unwrap();

        assert_eq!(locked_ids(&engine.sweep(T0)), vec![ab.clone()]);
        engine.release_lock(&ab).unwrap();
        assert_eq!(locked_ids(&engine.sweep(T0 + 1)), vec![ba]);
    }

    #[test]
    fn test_disjoint_locks_all_activate() {
        let mut engine = LockEngine::new(T0);
        let ids: Vec<LockId> = (0..5)
            .map(|i| engine.request_lock("s1", request(&format!("r{i}"), 100), T0).unwrap())
            .collect();
        let mut activated = locked_ids(&engine.sweep(T0));
        activated.sort();
        let mut expected = ids;
        expected.sort();
        assert_eq!(activated, expected);
    }

    #[test]
    fn test_intolerant_rejection_leaves_queues_untouched() {
        let mut engine = LockEngine::new(T0);
        let holder = engine.request_lock("s1", request("b", 1000), T0).unwrap();
        let waiter = engine.request_lock("s2", request("b", 1000), T0).unwrap();

        let mut req = request("a|b", 1000);
        req.tolerate = 1;
        assert_eq!(engine.request_lock("s3", req, T0), Err(LockError::Intolerant));

        assert!(engine.queue("a").is_empty());
        assert_eq!(engine.queue("b"), vec![holder, waiter]);
        assert_eq!(engine.queue_count(), 1);

        let counters = engine.status(0, T0).counters;
        assert_eq!(counters.lock_count, 3);
        assert_eq!(counters.intolerance_count, 1);
    }

    #[test]
    fn test_tolerate_allows_shallow_queue() {
        let mut engine = LockEngine::new(T0);
        engine.request_lock("s1", request("r", 1000), T0).unwrap();
        let mut req = request("r", 1000);
        req.tolerate = 1;
        assert!(engine.request_lock("s2", req, T0).is_ok());
    }

    #[test]
    fn test_extend_pending_is_not_locked() {
        let mut engine = LockEngine::new(T0);
        engine.request_lock("s1", request("r", 1000), T0).unwrap();
        let waiter = engine.request_lock("s2", request("r", 1000), T0).unwrap();
        engine.sweep(T0);

        assert_eq!(engine.extend_lock(&waiter, 500), Err(LockError::NotLocked));
        assert_eq!(engine.status(0, T0).counters.extend_failed_count, 1);
    }

    #[test]
    fn test_extend_is_additive_from_current_deadline() {
        let mut engine = LockEngine::new(T0);
        let id = engine.request_lock("s1", request("r", 1000), T0).unwrap();
        engine.sweep(T0);

        assert_eq!(engine.extend_lock(&id, 500), Ok(T0 + 1500));
        assert_eq!(engine.extend_lock(&id, 500), Ok(T0 + 2000));
        assert_eq!(engine.extend_lock(&id, 0), Err(LockError::InvalidArgument("ttl should be integer!")));
        assert_eq!(engine.extend_lock(&LockId::from("nope"), 10), Err(LockError::NotFound));

        let counters = engine.status(0, T0).counters;
        assert_eq!(counters.extend_count, 2);
        assert_eq!(counters.extend_failed_count, 2);
    }

    #[test]
    fn test_extend_past_clock_range_is_rejected() {
        let mut engine = LockEngine::new(T0);
        let id = engine.request_lock("s1", request("r", 1000), T0).unwrap();
        engine.sweep(T0);

        let first = engine.extend_lock(&id, i64::MAX).unwrap();
        assert_eq!(first, T0 + 1000 + i64::MAX as u64);
        assert_eq!(
            engine.extend_lock(&id, i64::MAX),
            Err(LockError::InvalidArgument("ttl is too large!"))
        );
        assert_eq!(engine.expires_at(&id), Some(first));
        assert_eq!(engine.status(0, T0).counters.extend_failed_count, 1);
    }

    #[test]
    fn test_unbounded_timeout_is_rejected_without_side_effects() {
        let mut engine = LockEngine::new(T0);
        let mut req = request("r", 1000);
        req.timeout = u64::MAX;
        assert_eq!(
            engine.request_lock("s1", req, T0),
            Err(LockError::InvalidArgument("timeout is too large!"))
        );
        assert_eq!(engine.queue_count(), 0);
        assert_eq!(engine.status(0, T0).counters.lock_count, 0);
    }

    #[test]
    fn test_maximal_ttl_activates_without_overflow() {
        let mut engine = LockEngine::new(T0);
        let id = engine.request_lock("s1", request("r", i64::MAX), T0).unwrap();
        let sweep = engine.sweep(T0);
        assert_eq!(locked_ids(&sweep), vec![id.clone()]);
        assert_eq!(engine.expires_at(&id), Some(T0 + i64::MAX as u64));
    }

    #[test]
    fn test_request_timeout_frees_queue_for_next_waiter() {
        let mut engine = LockEngine::new(T0);
        let holder = engine.request_lock("s1", request("a", 10_000), T0).unwrap();
        engine.sweep(T0);

        let mut req = request("a|b", 1000);
        req.timeout = 50;
        let timed = engine.request_lock("s2", req, T0).unwrap();
        let later = engine.request_lock("s3", request("b", 1000), T0).unwrap();

        let sweep = engine.sweep(T0);
        assert_eq!(sweep.next_deadline, Some(T0 + 50));
        assert!(locked_ids(&sweep).is_empty());

        let sweep = engine.sweep(T0 + 50);
        assert_eq!(
            sweep.notifications[0],
            Notification {
                socket_id: "s2".into(),
                message: ServerMessage::Timeout { lock_id: timed.clone() },
            }
        );
        assert_eq!(locked_ids(&sweep), vec![later]);
        assert_eq!(engine.lock_state(&timed), None);
        assert_eq!(engine.queue("a"), vec![holder]);
        assert_eq!(engine.status(0, T0).counters.timeout_count, 1);
    }

    #[test]
    fn test_expiry_notifies_owner_and_promotes_waiter() {
        let mut engine = LockEngine::new(T0);
        let first = engine.request_lock("s1", request("r", 100), T0).unwrap();
        let second = engine.request_lock("s2", request("r", 100), T0).unwrap();
        engine.sweep(T0);

        assert!(engine.sweep(T0 + 99).notifications.is_empty());

        let sweep = engine.sweep(T0 + 100);
        assert_eq!(
            sweep.notifications,
            vec![
                Notification {
                    socket_id: "s1".into(),
                    message: ServerMessage::Expired { lock_id: first },
                },
                Notification {
                    socket_id: "s2".into(),
                    message: ServerMessage::Locked { lock_id: second, expires_at: T0 + 200 },
                },
            ]
        );
        assert_eq!(engine.status(0, T0).counters.expired_count, 1);
    }

    #[test]
    fn test_release_unknown_is_not_found() {
        let mut engine = LockEngine::new(T0);
        assert_eq!(engine.release_lock(&LockId::from("missing")), Err(LockError::NotFound));
    }

    #[test]
    fn test_release_pending_removes_items() {
        let mut engine = LockEngine::new(T0);
        let holder = engine.request_lock("s1", request("a", 1000), T0).unwrap();
        let waiter = engine.request_lock("s2", request("a|b", 1000), T0).unwrap();
        engine.sweep(T0);
        assert_eq!(engine.queue("b"), vec![waiter.clone()]);

        engine.release_lock(&waiter).unwrap();
        engine.sweep(T0);
        assert_eq!(engine.queue("a"), vec![holder]);
        assert!(engine.queue("b").is_empty());
        assert_eq!(engine.queue_count(), 1);
    }

    #[test]
    fn test_status_snapshot_serializes_camel_case() {
        let mut engine = LockEngine::new(T0);
        let id = engine.request_lock("s1", request("goods-1", 5000), T0).unwrap();
        engine.sweep(T0);
        engine.extend_lock(&id, 1000).unwrap();
        engine.release_lock(&id).unwrap();

        let status = engine.status(1, T0 + 42);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["lockCount"], 1);
        assert_eq!(json["lockedCount"], 1);
        assert_eq!(json["extendCount"], 1);
        assert_eq!(json["finishedCount"], 1);
        assert_eq!(json["currentLocks"], 0);
        assert_eq!(json["socketCount"], 1);
        assert_eq!(json["liveTime"], 42);
        assert_eq!(json["startAt"], T0);
    }

    #[test]
    fn test_lock_ids_are_unique() {
        let mut engine = LockEngine::new(T0);
        let a = engine.request_lock("s1", request("a", 10), T0).unwrap();
        let b = engine.request_lock("s1", request("b", 10), T0).unwrap();
        assert_ne!(a, b);
        assert!(a.0.starts_with(&format!("{T0:x}")));
        assert_eq!(a.0.len(), format!("{T0:x}").len() + 16);
    }
}
