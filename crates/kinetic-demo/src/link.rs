//! In-process network link with fixed latency and seeded packet loss.

use std::collections::VecDeque;

use kinetic_movement::Reliability;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Counters for one direction of a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub sent: u64,
    pub dropped: u64,
    pub delivered: u64,
}

/// One direction of a loopback connection.
///
/// Every payload arrives `latency_ticks` after it was sent, in send order.
/// Unreliable payloads are dropped with probability `loss`; reliable ones
/// always arrive.
pub struct LossyLink<T> {
    latency_ticks: u64,
    loss: f64,
    rng: Xoshiro256StarStar,
    in_flight: VecDeque<(u64, T)>,
    stats: LinkStats,
}

impl<T> LossyLink<T> {
    pub fn new(latency_ticks: u32, loss: f32, seed: u64) -> Self {
        let loss = if loss.is_finite() {
            f64::from(loss.clamp(0.0, 1.0))
        } else {
            0.0
        };
        Self {
            latency_ticks: u64::from(latency_ticks),
            loss,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            in_flight: VecDeque::new(),
            stats: LinkStats::default(),
        }
    }

    /// Queues `payload` at tick `now`.
    pub fn send(&mut self, now: u64, payload: T, reliability: Reliability) {
        self.stats.sent += 1;
        if reliability == Reliability::Unreliable && self.rng.gen_bool(self.loss) {
            self.stats.dropped += 1;
            return;
        }
        self.in_flight
            .push_back((now + self.latency_ticks, payload));
    }

    /// Takes every payload due at or before tick `now`.
    pub fn deliver(&mut self, now: u64) -> Vec<T> {
        let mut due = Vec::new();
        while self.in_flight.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, payload)) = self.in_flight.pop_front() {
                due.push(payload);
            }
        }
        self.stats.delivered += due.len() as u64;
        due
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}
