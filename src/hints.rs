//! Hints database: a shared, append-only set of zones, each holding up to
//! 16 nameserver addresses in a priority-ordered replacement ring. Priority
//! bookkeeping (`saved`/`effective`/loss/deadline) is mutated through
//! relaxed atomics rather than a lock, since an iterator racing an update is
//! an accepted, advisory inconsistency rather than a correctness bug.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::trace;
use rand::Rng;

use crate::clock;
use crate::resolv::ResolvConf;

const MAX_SLOTS: usize = 16;

struct Slot {
    addr: Mutex<Option<SocketAddr>>,
    saved: AtomicU32,
    effective: AtomicU32,
    loss: AtomicU32,
    deadline: AtomicU64,
}

impl Slot {
    fn empty() -> Slot {
        Slot {
            addr: Mutex::new(None),
            saved: AtomicU32::new(0),
            effective: AtomicU32::new(0),
            loss: AtomicU32::new(0),
            deadline: AtomicU64::new(0),
        }
    }
}

struct Zone {
    name: String,
    slots: [Slot; MAX_SLOTS],
    count: AtomicUsize,
    insert_lock: Mutex<()>,
}

impl Zone {
    fn new(name: &str) -> Zone {
        Zone {
            name: name.to_string(),
            slots: std::array::from_fn(|_| Slot::empty()),
            count: AtomicUsize::new(0),
            insert_lock: Mutex::new(()),
        }
    }

    /// Places `address` in slot `count % 16`. When the zone is already at
    /// capacity this overwrites the slot in the ring's next position
    /// *without* advancing `count` — preserved from the source this design
    /// is based on, which has the same quirk.
    fn insert(&self, address: SocketAddr, priority: u32) {
        let _guard = self.insert_lock.lock().unwrap();
        let count = self.count.load(Ordering::Relaxed);
        let idx = count % MAX_SLOTS;
        let priority = priority.max(1);

        let slot = &self.slots[idx];
        *slot.addr.lock().unwrap() = Some(address);
        slot.saved.store(priority, Ordering::Relaxed);
        slot.effective.store(priority, Ordering::Relaxed);
        slot.loss.store(0, Ordering::Relaxed);
        slot.deadline.store(0, Ordering::Relaxed);

        if count < MAX_SLOTS {
            self.count.store(count + 1, Ordering::Relaxed);
        }
    }

    fn update(&self, address: &SocketAddr, nice: i32) {
        let now = clock::now();
        let count = self.count.load(Ordering::Relaxed).min(MAX_SLOTS);

        for slot in &self.slots[..count] {
            let matches = slot
                .addr
                .lock()
                .unwrap()
                .map(|a| a == *address)
                .unwrap_or(false);

            if matches {
                if nice < 0 {
                    let loss = slot.loss.fetch_add(1, Ordering::Relaxed) + 1;
                    slot.effective.store(0, Ordering::Relaxed);
                    let backoff = (3 * loss).min(60) as u64;
                    slot.deadline.store(now + backoff, Ordering::Relaxed);
                    trace!("hints: {} marked down, re-enable in {}s", address, backoff);
                } else if nice > 0 {
                    let saved = slot.saved.load(Ordering::Relaxed);
                    slot.effective.store(saved, Ordering::Relaxed);
                    slot.deadline.store(0, Ordering::Relaxed);
                    slot.loss.store(0, Ordering::Relaxed);
                }
            } else {
                let deadline = slot.deadline.load(Ordering::Relaxed);
                if deadline != 0 && now >= deadline {
                    let saved = slot.saved.load(Ordering::Relaxed);
                    slot.effective.store(saved, Ordering::Relaxed);
                    slot.deadline.store(0, Ordering::Relaxed);
                }
            }
        }
    }

    fn min_priority_above(&self, floor: u32) -> Option<u32> {
        let count = self.count.load(Ordering::Relaxed).min(MAX_SLOTS);
        self.slots[..count]
            .iter()
            .map(|s| s.effective.load(Ordering::Relaxed))
            .filter(|&p| p > floor)
            .min()
    }

    fn next(&self, state: &mut HintsIterState) -> Option<SocketAddr> {
        let count = self.count.load(Ordering::Relaxed).min(MAX_SLOTS);
        if count == 0 {
            return None;
        }

        loop {
            if !state.started || state.p >= state.end {
                match self.min_priority_above(state.target) {
                    Some(target) => {
                        state.target = target;
                        let offset = rand::thread_rng().gen_range(0..count);
                        state.p = offset;
                        state.end = offset + count;
                        state.started = true;
                    }
                    None => return None,
                }
            }

            while state.p < state.end {
                let idx = state.p % count;
                state.p += 1;
                let slot = &self.slots[idx];
                if slot.effective.load(Ordering::Relaxed) == state.target {
                    if let Some(addr) = *slot.addr.lock().unwrap() {
                        return Some(addr);
                    }
                }
            }
        }
    }
}

/// Externalized state for [`HintsDb::next`]: the priority level currently
/// being drained, a ring pointer, and the offset at which the current pass
/// ends. Reseeded with a random starting offset each time the target
/// priority advances, so concurrent callers don't all favor the same slot.
#[derive(Debug, Clone, Copy)]
pub struct HintsIterState {
    target: u32,
    p: usize,
    end: usize,
    started: bool,
}

impl HintsIterState {
    pub fn new() -> HintsIterState {
        HintsIterState {
            target: 0,
            p: 0,
            end: 0,
            started: false,
        }
    }
}

impl Default for HintsIterState {
    fn default() -> Self {
        Self::new()
    }
}

struct HintsDbData {
    zones: RwLock<Vec<Arc<Zone>>>,
}

/// Shared, reference-counted hints database. The zone list is append-only:
/// a zone, once fully built, is pushed under a write lock and never removed
/// or mutated in place, so a concurrent iterator can never observe a
/// half-linked zone. `acquire`/`release` follow the same Arc-wrapper
/// convention as [`crate::resolv::ResolvConf`].
#[derive(Clone)]
pub struct HintsDb(Arc<HintsDbData>);

impl HintsDb {
    pub fn new() -> HintsDb {
        HintsDb(Arc::new(HintsDbData {
            zones: RwLock::new(Vec::new()),
        }))
    }

    pub fn acquire(&self) -> HintsDb {
        self.clone()
    }

    pub fn release(self) {
        drop(self);
    }

    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    fn find_or_create_zone(&self, name: &str) -> Arc<Zone> {
        {
            let zones = self.0.zones.read().unwrap();
            if let Some(zone) = zones.iter().find(|z| z.name.eq_ignore_ascii_case(name)) {
                return Arc::clone(zone);
            }
        }

        let mut zones = self.0.zones.write().unwrap();
        if let Some(zone) = zones.iter().find(|z| z.name.eq_ignore_ascii_case(name)) {
            return Arc::clone(zone);
        }
        let zone = Arc::new(Zone::new(name));
        zones.push(Arc::clone(&zone));
        zone
    }

    pub fn insert(&self, zone: &str, address: SocketAddr, priority: u32) {
        self.find_or_create_zone(zone).insert(address, priority);
    }

    /// Installs each of `resconf`'s nameservers as a slot for the root
    /// zone, in their original configured order.
    pub fn insert_resconf(&self, zone: &str, resconf: &ResolvConf) {
        for (i, addr) in resconf.nameservers().iter().enumerate() {
            self.insert(zone, *addr, (i + 1) as u32);
        }
    }

    pub fn update(&self, zone: &str, address: &SocketAddr, nice: i32) {
        self.find_or_create_zone(zone).update(address, nice);
    }

    pub fn count(&self, zone: &str) -> usize {
        self.find_or_create_zone(zone)
            .count
            .load(Ordering::Relaxed)
    }

    /// Advances `state` to the next address in ascending effective-priority
    /// order, or `None` once every non-disabled slot has been yielded for
    /// every priority level present.
    pub fn next(&self, zone: &str, state: &mut HintsIterState) -> Option<SocketAddr> {
        self.find_or_create_zone(zone).next(state)
    }
}

impl Default for HintsDb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(1, 1, 1, last)), 53)
    }

    #[test]
    fn iterator_yields_every_inserted_slot() {
        crate::test_support::init_logging();
        let db = HintsDb::new();
        db.insert(".", addr(1), 1);
        db.insert(".", addr(2), 2);
        db.insert(".", addr(3), 3);

        let mut state = HintsIterState::new();
        let mut seen = Vec::new();
        while let Some(a) = db.next(".", &mut state) {
            seen.push(a);
        }
        seen.sort_by_key(|a| a.to_string());
        let mut expected = vec![addr(1), addr(2), addr(3)];
        expected.sort_by_key(|a| a.to_string());
        assert_eq!(seen, expected);
    }

    #[test]
    fn negative_nice_removes_address_from_rotation() {
        let db = HintsDb::new();
        db.insert(".", addr(1), 1);
        db.insert(".", addr(2), 2);
        db.update(".", &addr(1), -1);

        let mut state = HintsIterState::new();
        let mut seen = Vec::new();
        while let Some(a) = db.next(".", &mut state) {
            seen.push(a);
        }
        assert_eq!(seen, vec![addr(2)]);
    }

    #[test]
    fn positive_nice_restores_a_disabled_slot_immediately() {
        let db = HintsDb::new();
        db.insert(".", addr(1), 1);
        db.update(".", &addr(1), -1);
        db.update(".", &addr(1), 1);

        let mut state = HintsIterState::new();
        assert_eq!(db.next(".", &mut state), Some(addr(1)));
    }

    #[test]
    fn insert_beyond_capacity_overwrites_ring_slot_without_growing_count() {
        let db = HintsDb::new();
        for i in 0..20u8 {
            db.insert(".", addr(i), (i as u32) + 1);
        }
        assert_eq!(db.count("."), MAX_SLOTS);
    }

    #[test]
    fn deadline_reactivates_slot_after_synthetic_time_advance() {
        let db = HintsDb::new();
        db.insert(".", addr(1), 1);
        db.insert(".", addr(2), 2);
        db.insert(".", addr(3), 3);

        db.update(".", &addr(1), -1); // loss=1 => backoff = min(60, 3*1) = 3s

        let mut state = HintsIterState::new();
        assert_eq!(db.next(".", &mut state), Some(addr(2)));

        clock::advance_for_test(60);
        // any subsequent update, even one that doesn't touch addr(1) itself,
        // is where the past-deadline scan runs and re-enables it.
        db.update(".", &addr(2), 0);

        let mut state = HintsIterState::new();
        assert_eq!(db.next(".", &mut state), Some(addr(1)));
    }

    #[test]
    fn insert_resconf_installs_nameservers_in_order() {
        let conf = ResolvConf::load("nameserver 9.9.9.9\nnameserver 1.1.1.1\n");
        let db = HintsDb::new();
        db.insert_resconf(".", &conf);
        assert_eq!(db.count("."), 2);
    }

    #[test]
    fn acquire_and_release_share_the_same_zone_set() {
        let db = HintsDb::new();
        db.insert(".", addr(1), 1);
        let handle = db.acquire();
        assert_eq!(handle.count("."), 1);
        handle.release();
    }
}
