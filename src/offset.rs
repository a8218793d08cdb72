//! Clock offset computation and correction
//!
//! When a sync packet arrives, the event-routing fabric has already captured
//! the local sync timer at the moment the packet's address was detected. The
//! peer's timer at that same moment is the value it sent, plus the calibrated
//! TX chain delay. The difference between the two is the offset.
//!
//! The offset is never applied by software. Instead, a compare channel of the
//! sync timer is armed so that the timer clears itself when it reaches
//! `TIMER_MAX - offset`. The routing channel doing the clearing is part of a
//! channel group, and a second channel disables that group on the same
//! compare event. The correction therefore fires exactly once, in hardware,
//! without any jitter from interrupt latency.

use log::debug;

use crate::{
    configs::RoutingConfig,
    ll::{Event, EventRouter, Task, Timer, TimerId},
    time::{Ticks, TIMER_MAX},
};


/// Compare channel of the sync timer that holds the wrap value
pub const SYNC_WRAP_CC: usize = 0;

/// Compare channel of the sync timer that receives captures
pub const SYNC_CAPTURE_CC: usize = 1;

/// Compare channel of the sync timer used to apply corrections
pub const SYNC_CORRECTION_CC: usize = 2;

/// Compare channel of the sync timer reserved for debug output
pub const SYNC_DEBUG_CC: usize = 3;


/// Offset of the peer's sync timer relative to the local one, in ticks
///
/// Always within `0..=TIMER_MAX`. Both `0` and `TIMER_MAX` mean that the
/// timers are in phase.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClockOffset(u32);

impl ClockOffset {
    /// Returns the offset in sync timer ticks
    pub fn ticks(&self) -> u32 {
        self.0
    }

    /// Indicates whether the local timer needs to be corrected
    pub fn needs_correction(&self) -> bool {
        self.0 != 0 && self.0 != TIMER_MAX
    }

    /// The sync timer value at which the local timer must be cleared
    ///
    /// Clearing at this value shifts the local timer forward by the offset.
    pub fn compare_value(&self) -> u32 {
        TIMER_MAX - self.0
    }
}


/// Computes the offset between the local sync timer and the peer's
///
/// `local_capture` is the local timer when the packet's address was
/// detected. `peer_value` is the timer value the peer sent, and
/// `tx_chain_delay` the calibrated delay between the peer's capture and the
/// local detection.
///
/// The peer's timer at the moment of detection is folded onto the timer's
/// period before the difference is taken, so the result stays within
/// `0..=TIMER_MAX` even if the peer's value plus the delay wraps.
///
/// # Example
///
/// ``` rust
/// use timeslot_sync::{
///     offset::compute_offset,
///     time::Ticks,
/// };
///
/// // The local timer has wrapped relative to the peer's implied arrival time
/// let offset = compute_offset(Ticks::new(60_000).unwrap(), 2_000, 1_084);
/// assert_eq!(offset.ticks(), 8_619);
/// ```
pub fn compute_offset(
    local_capture: Ticks,
    peer_value: i32,
    tx_chain_delay: u32,
)
    -> ClockOffset
{
    let local = local_capture.value();
    let peer_at_capture =
        Ticks::wrapping(peer_value as i64 + tx_chain_delay as i64).value();

    let offset = if local > peer_at_capture {
        TIMER_MAX - local + peer_at_capture
    }
    else {
        peer_at_capture - local
    };

    ClockOffset(offset)
}


/// Arms the one-shot hardware correction of the sync timer
///
/// Returns `false` without touching any hardware, if the timers are already
/// in phase.
///
/// The order of operations matters: the correction channel is removed from
/// the group (by disabling the group) before it is re-routed, and only
/// enabled again after the compare value is in place. Otherwise a stale
/// compare value could clear the timer at the wrong moment.
pub fn apply_correction<TIMER, ROUTER>(
    offset: ClockOffset,
    sync_timer: &mut TIMER,
    router: &mut ROUTER,
    routing: &RoutingConfig,
)
    -> bool
    where
        TIMER:  Timer,
        ROUTER: EventRouter,
{
    if !offset.needs_correction() {
        debug!("Sync timer already in phase");
        return false;
    }

    let clear = routing.tx_capture;
    let disarm = routing.tx_start;
    let compare = Event::TimerCompare(TimerId::Sync, SYNC_CORRECTION_CC);

    router.disable(RoutingConfig::mask(&[clear]));
    router.connect(clear, compare, Task::TimerClear(TimerId::Sync));

    router.disable(RoutingConfig::mask(&[disarm]));
    router.connect(disarm, compare, Task::GroupDisable(routing.group));

    router.disable_group(routing.group);
    router.set_group(routing.group, RoutingConfig::mask(&[clear]));

    sync_timer.set_compare(SYNC_CORRECTION_CC, offset.compare_value());

    router.enable(RoutingConfig::mask(&[clear, disarm]));

    debug!(
        "Correction armed: offset {} ticks, clear at {}",
        offset.ticks(),
        offset.compare_value(),
    );

    true
}


#[cfg(test)]
mod tests {
    use crate::testing::{FakeRouter, FakeTimer, RouterCall};

    use super::*;

    const DELAY: u32 = 1084;

    fn ticks(value: u32) -> Ticks {
        Ticks::new(value).unwrap()
    }

    #[test]
    fn offset_when_local_timer_has_wrapped() {
        let offset = compute_offset(ticks(60_000), 2_000, DELAY);
        assert_eq!(offset.ticks(), 8_619);
    }

    #[test]
    fn offset_when_local_timer_is_behind() {
        let offset = compute_offset(ticks(1_000), 500, DELAY);
        assert_eq!(offset.ticks(), 584);
    }

    #[test]
    fn offset_stays_in_range_and_restores_peer_time() {
        let step = 997;
        let mut local = 0;

        while local <= TIMER_MAX {
            let mut peer = 0;

            while peer <= TIMER_MAX {
                let offset = compute_offset(ticks(local), peer as i32, DELAY);

                assert!(offset.ticks() <= TIMER_MAX);
                assert_eq!(
                    (ticks(local) + offset.ticks()).phase(),
                    Ticks::wrapping((peer + DELAY) as i64).phase(),
                    "local {}, peer {}", local, peer,
                );

                peer += step;
            }

            local += step;
        }
    }

    #[test]
    fn offset_at_the_wrap_boundaries() {
        for &(local, peer) in &[(0, 0), (TIMER_MAX, 0), (TIMER_MAX, TIMER_MAX)] {
            let offset = compute_offset(ticks(local), peer as i32, DELAY);

            assert!(offset.ticks() <= TIMER_MAX);
            assert_eq!(
                (ticks(local) + offset.ticks()).phase(),
                Ticks::wrapping((peer + DELAY) as i64).phase(),
            );
        }
    }

    #[test]
    fn aligned_clocks_need_no_correction() {
        let offset = compute_offset(ticks(DELAY + 500), 500, DELAY);
        assert_eq!(offset.ticks(), 0);
        assert!(!offset.needs_correction());

        assert!(!ClockOffset(TIMER_MAX).needs_correction());
    }

    #[test]
    fn aligned_clocks_leave_hardware_alone() {
        let mut timer = FakeTimer::default();
        let mut router = FakeRouter::default();

        for &offset in &[ClockOffset(0), ClockOffset(TIMER_MAX)] {
            let applied = apply_correction(
                offset,
                &mut timer,
                &mut router,
                &RoutingConfig::default(),
            );

            assert!(!applied);
        }

        assert!(router.calls.is_empty());
        assert_eq!(timer.cc[SYNC_CORRECTION_CC], 0);
    }

    #[test]
    fn correction_is_armed_in_order() {
        let mut timer = FakeTimer::default();
        let mut router = FakeRouter::default();
        let routing = RoutingConfig::default();

        let applied = apply_correction(
            ClockOffset(584),
            &mut timer,
            &mut router,
            &routing,
        );
        assert!(applied);

        let compare = Event::TimerCompare(TimerId::Sync, SYNC_CORRECTION_CC);
        assert_eq!(
            router.calls,
            [
                RouterCall::Disable(0b001),
                RouterCall::Connect(0, compare, Task::TimerClear(TimerId::Sync)),
                RouterCall::Disable(0b010),
                RouterCall::Connect(1, compare, Task::GroupDisable(0)),
                RouterCall::DisableGroup(0),
                RouterCall::SetGroup(0, 0b001),
                RouterCall::Enable(0b011),
            ],
        );
        assert_eq!(timer.cc[SYNC_CORRECTION_CC], TIMER_MAX - 584);
    }

    #[test]
    fn fired_correction_rephases_and_disarms() {
        let mut timer = FakeTimer::default();
        let mut router = FakeRouter::default();
        let routing = RoutingConfig::default();

        apply_correction(ClockOffset(584), &mut timer, &mut router, &routing);

        let compare = Event::TimerCompare(TimerId::Sync, SYNC_CORRECTION_CC);
        let tasks = router.fire(compare);
        assert!(tasks.contains(&Task::TimerClear(TimerId::Sync)));
        assert!(tasks.contains(&Task::GroupDisable(0)));

        // The clearing channel is gone after the first match
        let tasks = router.fire(compare);
        assert!(!tasks.contains(&Task::TimerClear(TimerId::Sync)));
    }
}
