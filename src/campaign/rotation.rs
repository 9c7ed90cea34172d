//! Round-robin account selection and per-account pacing for one run.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use tokio::{sync::watch, time::Instant};

use crate::registry::Account;

/// Longest spacing a lane will keep. Larger pauses are capped here so slot
/// arithmetic never overflows an `Instant`.
pub(crate) const MAX_PAUSE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// A claimed account together with the earliest moment its lane may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lease {
    pub index: usize,
    slot: Instant,
}

#[derive(Debug, Default)]
struct LaneState {
    next_slot: Option<Instant>,
    last_start: Option<Instant>,
}

/// Pacing is kept per lane. With a single connection every account shares one
/// lane, so the pause separates all sends of the run.
#[derive(Debug)]
pub(crate) struct Rotation {
    accounts: Vec<Account>,
    lanes: Vec<parking_lot::Mutex<LaneState>>,
    cursor: AtomicUsize,
    pause: Duration,
}

impl Rotation {
    /// `accounts` must not be empty.
    pub fn new(accounts: Vec<Account>, pause: Duration, max_connections: usize) -> Self {
        let lane_count = if max_connections <= 1 { 1 } else { accounts.len() };
        let lanes = (0..lane_count).map(|_| Default::default()).collect();
        Self {
            accounts,
            lanes,
            cursor: AtomicUsize::new(0),
            pause: pause.min(MAX_PAUSE),
        }
    }

    fn lane(&self, index: usize) -> &parking_lot::Mutex<LaneState> {
        &self.lanes[index % self.lanes.len()]
    }

    pub fn account(&self, lease: &Lease) -> &Account {
        &self.accounts[lease.index]
    }

    /// Next account in rotation.
    pub fn claim(&self) -> Lease {
        let index = self.advance();
        self.reserve(index)
    }

    /// Next account in rotation that is not `previous`, unless it is the only one.
    pub fn claim_after(&self, previous: usize) -> Lease {
        let mut index = self.advance();
        while index == previous && self.accounts.len() > 1 {
            index = self.advance();
        }
        self.reserve(index)
    }

    fn advance(&self) -> usize {
        let len = self.accounts.len();
        let (Ok(index) | Err(index)) =
            self.cursor
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some((current + 1) % len)
                });
        index
    }

    fn reserve(&self, index: usize) -> Lease {
        let now = Instant::now();
        let mut lane = self.lane(index).lock();
        let slot = lane.next_slot.map_or(now, |next| next.max(now));
        lane.next_slot = Some(slot + self.pause);
        Lease { index, slot }
    }

    /// Waits until the lease's lane may start a send, keeping at least the
    /// configured pause between two sends on the same account.
    ///
    /// Returns `false` if a stop was requested first.
    pub async fn wait_turn(&self, lease: &Lease, stop: &mut watch::Receiver<bool>) -> bool {
        loop {
            let target = {
                let lane = self.lane(lease.index).lock();
                lane.last_start
                    .map_or(lease.slot, |last| lease.slot.max(last + self.pause))
            };

            tokio::select! {
                biased;
                _ = stop_requested(stop) => return false,
                _ = tokio::time::sleep_until(target) => {}
            }

            let now = Instant::now();
            let mut lane = self.lane(lease.index).lock();
            if lane.last_start.is_none_or(|last| now >= last + self.pause) {
                lane.last_start = Some(now);
                return true;
            }
        }
    }
}

/// Resolves once `true` has been sent; never resolves if the sender is gone.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let sender_gone = stop.wait_for(|stopped| *stopped).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}
