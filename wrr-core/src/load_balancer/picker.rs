//! Smooth weighted round-robin selection.
//!
//! Every pick adds each endpoint's weight to its credit, selects the endpoint
//! with the highest credit and charges it the total weight. Over a full cycle
//! of `sum(weights)` picks each endpoint is selected exactly `weight` times,
//! and picks of heavy endpoints are interleaved with the others instead of
//! arriving back to back.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::load_balancer::tracker::Freshness;

/// Largest cycle that is computed up front when a picker is built, measured
/// after dividing the weights by their greatest common divisor.
///
/// Smaller cycles are served lock-free from a precomputed order; larger ones
/// step the credit vector under a lock on every pick.
const MAX_PRECOMPUTED_CYCLE: u64 = 4096;

/// An endpoint together with the weight it is scheduled with.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedEndpoint {
    /// The endpoint handed to the caller when picked.
    pub endpoint: Endpoint,
    /// Scheduling weight. Zero is treated as one.
    pub weight: u32,
    /// Freshness of the weight when the snapshot was built.
    pub freshness: Freshness,
}

impl WeightedEndpoint {
    fn scheduled_weight(&self) -> u32 {
        self.weight.max(1)
    }
}

/// An immutable, ordered weight vector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightSnapshot {
    entries: Vec<WeightedEndpoint>,
}

impl WeightSnapshot {
    /// Build a snapshot. Order is significant: ties go to earlier entries.
    pub fn new(entries: Vec<WeightedEndpoint>) -> Self {
        Self { entries }
    }

    /// The entries in scheduling order.
    pub fn entries(&self) -> &[WeightedEndpoint] {
        &self.entries
    }

    /// Find the entry for `address`.
    pub fn get(&self, address: SocketAddr) -> Option<&WeightedEndpoint> {
        self.entries
            .iter()
            .find(|e| e.endpoint.address() == address)
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot has no endpoints.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the scheduled weights, i.e. the length of one full cycle.
    pub fn total_weight(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| u64::from(e.scheduled_weight()))
            .sum()
    }
}

#[derive(Debug)]
struct Credits {
    weights: Vec<i64>,
    current: Vec<i64>,
    total: i64,
}

impl Credits {
    /// Credits over the snapshot's weights divided by their common divisor.
    /// Scaling every weight by the same factor leaves the pick order
    /// unchanged, so the reduced cycle is the same schedule, only shorter.
    fn new(snapshot: &WeightSnapshot) -> Self {
        let divisor = snapshot
            .entries
            .iter()
            .fold(0, |acc, e| gcd(acc, e.scheduled_weight()))
            .max(1);
        let weights: Vec<i64> = snapshot
            .entries
            .iter()
            .map(|e| i64::from(e.scheduled_weight() / divisor))
            .collect();
        Self {
            current: vec![0; weights.len()],
            total: weights.iter().sum(),
            weights,
        }
    }

    /// Advance one pick and return the selected index.
    fn step(&mut self) -> usize {
        let mut best = 0;
        for i in 0..self.current.len() {
            self.current[i] += self.weights[i];
            // Strict comparison: ties go to the lowest index.
            if self.current[i] > self.current[best] {
                best = i;
            }
        }
        self.current[best] -= self.total;
        best
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[derive(Debug)]
enum Schedule {
    Empty,
    Cycle { order: Box<[u32]>, cursor: AtomicU64 },
    Stepped(Mutex<Credits>),
}

impl Schedule {
    fn build(snapshot: &WeightSnapshot) -> Self {
        if snapshot.is_empty() {
            return Schedule::Empty;
        }

        let mut credits = Credits::new(snapshot);
        let total = credits.total as u64;
        if total > MAX_PRECOMPUTED_CYCLE {
            return Schedule::Stepped(Mutex::new(credits));
        }

        let order = (0..total).map(|_| credits.step() as u32).collect();
        Schedule::Cycle {
            order,
            cursor: AtomicU64::new(0),
        }
    }
}

/// Picks endpoints from one snapshot.
///
/// The scheduling state belongs to the picker, so publishing a new snapshot
/// (and with it a new picker) starts a fresh cycle.
#[derive(Debug)]
pub struct WeightedPicker {
    snapshot: WeightSnapshot,
    schedule: Schedule,
}

impl WeightedPicker {
    /// Build a picker for `snapshot`.
    pub fn new(snapshot: WeightSnapshot) -> Self {
        let schedule = Schedule::build(&snapshot);
        Self { snapshot, schedule }
    }

    /// A picker with no endpoints.
    pub fn empty() -> Self {
        Self::new(WeightSnapshot::default())
    }

    /// The snapshot this picker schedules over.
    pub fn snapshot(&self) -> &WeightSnapshot {
        &self.snapshot
    }

    /// Select the next endpoint.
    pub fn pick(&self) -> Result<Endpoint> {
        let index = match &self.schedule {
            Schedule::Empty => return Err(Error::NoEndpointsAvailable),
            Schedule::Cycle { order, cursor } => {
                let position = cursor.fetch_add(1, Ordering::Relaxed) % order.len() as u64;
                order[position as usize] as usize
            }
            Schedule::Stepped(credits) => credits.lock().step(),
        };
        Ok(self.snapshot.entries[index].endpoint.clone())
    }
}
