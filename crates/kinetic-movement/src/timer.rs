//! Delayed-event scheduling with single-use cancellation tokens.
//!
//! A [`TimerHandle`] is not `Clone` and is consumed by
//! [`TimerService::cancel`], so a handle can only be cancelled once. Holders
//! keep their handle in a [`TimerSlot`], which cancels the outstanding timer
//! before scheduling a new one and ignores fires whose id no longer matches.

use std::fmt;

/// Fire times within this many seconds of `now` count as due.
const DUE_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Identifier of a scheduled timer, reported back when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Single-use cancellation token for one scheduled timer.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a TimerHandle makes the timer uncancellable"]
pub struct TimerHandle {
    id: TimerId,
}

impl TimerHandle {
    /// The id the timer will fire with.
    pub fn id(&self) -> TimerId {
        self.id
    }
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredTimer<E> {
    /// Id of the handle that scheduled it.
    pub id: TimerId,
    /// Payload supplied at scheduling time.
    pub event: E,
}

// ---------------------------------------------------------------------------
// TimerService
// ---------------------------------------------------------------------------

/// Schedules payloads to be delivered after a delay.
pub trait TimerService<E> {
    /// Schedules `event` to fire after `delay` seconds.
    fn schedule(&mut self, delay: f32, event: E) -> TimerHandle;

    /// Cancels a pending timer. Returns `false` if it had already fired.
    fn cancel(&mut self, handle: TimerHandle) -> bool;
}

// ---------------------------------------------------------------------------
// TimerQueue
// ---------------------------------------------------------------------------

struct PendingTimer<E> {
    id: TimerId,
    due: f64,
    event: E,
}

/// Tick-driven [`TimerService`]: time only moves when [`advance`] is called.
///
/// [`advance`]: TimerQueue::advance
pub struct TimerQueue<E> {
    now: f64,
    next_id: u64,
    pending: Vec<PendingTimer<E>>,
}

impl<E> TimerQueue<E> {
    /// An empty queue at time zero.
    pub fn new() -> Self {
        Self {
            now: 0.0,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    /// Seconds elapsed since creation.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Advances time by `dt` seconds and returns every timer that came due,
    /// ordered by fire time, then by scheduling order.
    pub fn advance(&mut self, dt: f32) -> Vec<FiredTimer<E>> {
        self.now += f64::from(dt.max(0.0));
        let now = self.now + DUE_EPSILON;

        let mut due = Vec::new();
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].due <= now {
                due.push(self.pending.swap_remove(i));
            } else {
                i += 1;
            }
        }
        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)));
        due.into_iter()
            .map(|t| FiredTimer {
                id: t.id,
                event: t.event,
            })
            .collect()
    }

    /// Returns `true` if the timer with `id` has neither fired nor been
    /// cancelled.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.pending.iter().any(|t| t.id == id)
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> TimerService<E> for TimerQueue<E> {
    fn schedule(&mut self, delay: f32, event: E) -> TimerHandle {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.push(PendingTimer {
            id,
            due: self.now + f64::from(delay.max(0.0)),
            event,
        });
        TimerHandle { id }
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|t| t.id != handle.id);
        self.pending.len() != before
    }
}

// ---------------------------------------------------------------------------
// TimerSlot
// ---------------------------------------------------------------------------

/// Holds at most one outstanding timer for a single purpose.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<TimerHandle>,
}

impl TimerSlot {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels any outstanding timer, then schedules a new one.
    pub fn restart<E>(&mut self, service: &mut impl TimerService<E>, delay: f32, event: E) {
        self.cancel(service);
        self.handle = Some(service.schedule(delay, event));
    }

    /// Cancels the outstanding timer, if any. Cancelling an empty slot is a
    /// no-op that returns `false`.
    pub fn cancel<E>(&mut self, service: &mut impl TimerService<E>) -> bool {
        self.handle
            .take()
            .is_some_and(|handle| service.cancel(handle))
    }

    /// Claims a fired timer. Returns `true` and empties the slot only if
    /// `id` is the timer this slot is waiting for; stale fires return
    /// `false`.
    pub fn claim(&mut self, id: TimerId) -> bool {
        if self.handle.as_ref().is_some_and(|h| h.id == id) {
            self.handle = None;
            true
        } else {
            false
        }
    }

    /// Returns `true` while a timer is outstanding.
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_fires_after_delay() {
        let mut queue = TimerQueue::new();
        let handle = queue.schedule(1.0, "unfreeze");
        assert!(queue.advance(0.5).is_empty());
        assert!(queue.is_pending(handle.id()));

        let fired = queue.advance(0.5);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, handle.id());
        assert_eq!(fired[0].event, "unfreeze");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_accumulated_ticks_reach_due_time() {
        let mut queue = TimerQueue::new();
        let _handle = queue.schedule(3.0, ());
        let mut fired_at = None;
        for tick in 1..=200 {
            if !queue.advance(1.0 / 60.0).is_empty() {
                fired_at = Some(tick);
                break;
            }
        }
        assert_eq!(fired_at, Some(180));
    }

    #[test]
    fn test_fire_order_by_time_then_schedule_order() {
        let mut queue = TimerQueue::new();
        let _late = queue.schedule(2.0, 'c');
        let _a = queue.schedule(1.0, 'a');
        let _b = queue.schedule(1.0, 'b');
        let events: Vec<char> = queue.advance(5.0).into_iter().map(|f| f.event).collect();
        assert_eq!(events, vec!['a', 'b', 'c']);
    }

    #[test]
    fn test_cancel_prevents_fire() {
        let mut queue = TimerQueue::new();
        let handle = queue.schedule(1.0, 1);
        assert!(queue.cancel(handle));
        assert!(queue.advance(2.0).is_empty());
    }

    #[test]
    fn test_cancel_after_fire_reports_false() {
        let mut queue = TimerQueue::new();
        let handle = queue.schedule(0.1, 1);
        assert_eq!(queue.advance(0.2).len(), 1);
        assert!(!queue.cancel(handle));
    }

    #[test]
    fn test_slot_double_cancel_is_noop() {
        let mut queue = TimerQueue::new();
        let mut slot = TimerSlot::new();
        slot.restart(&mut queue, 1.0, ());
        assert!(slot.cancel(&mut queue));
        assert!(!slot.cancel(&mut queue));
        assert!(!slot.is_armed());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_slot_restart_cancels_previous_timer() {
        let mut queue = TimerQueue::new();
        let mut slot = TimerSlot::new();
        slot.restart(&mut queue, 1.0, "first");
        slot.restart(&mut queue, 3.0, "second");
        assert_eq!(queue.len(), 1);

        assert!(queue.advance(1.5).is_empty());
        let fired = queue.advance(2.0);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].event, "second");
        assert!(slot.claim(fired[0].id));
        assert!(!slot.is_armed());
    }

    #[test]
    fn test_slot_ignores_stale_fire() {
        let mut queue = TimerQueue::new();
        let mut slot = TimerSlot::new();
        slot.restart(&mut queue, 0.5, ());
        let fired = queue.advance(1.0);
        let stale = fired[0].id;

        slot.restart(&mut queue, 0.5, ());
        assert!(!slot.claim(stale));
        assert!(slot.is_armed());
    }
}
