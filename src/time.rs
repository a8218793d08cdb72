//! Time-related types based on the shared sync timer
//!
//! Both nodes run a free-running 16-bit timer at 16 MHz. The timer's
//! compare-0 register is set to [`TIMER_MAX`] and shorted to its clear task,
//! so the counter wraps back to zero at that value: `TIMER_MAX` and `0` are
//! the same phase, and arithmetic on [`Ticks`] is done modulo `TIMER_MAX`.


use core::ops::Add;
use serde::{Serialize, Deserialize};


/// The maximum value of the 16-bit sync timer
pub const TIMER_MAX: u32 = 65536 - 1;

/// The maximum value of the 24-bit reference clock counter
///
/// Sync packets carry the counter masked to this width.
pub const RTC_MAX: u32 = 16_777_216 - 1;


/// A reading of the sync timer
///
/// You can get one from a capture register of the sync timer, or from a
/// received [`SyncPacket`].
///
/// [`SyncPacket`]: ../packet/struct.SyncPacket.html
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(C)]
pub struct Ticks(u32);

impl Ticks {
    /// Creates a new instance of `Ticks`
    ///
    /// The given value must fit the sync timer, so:
    /// 0 <= `value` <= `TIMER_MAX`
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if it
    /// isn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use timeslot_sync::time::{
    ///     TIMER_MAX,
    ///     Ticks,
    /// };
    ///
    /// assert!(Ticks::new(TIMER_MAX).is_some());
    /// assert!(Ticks::new(TIMER_MAX + 1).is_none());
    /// ```
    pub fn new(value: u32) -> Option<Self> {
        if value <= TIMER_MAX {
            Some(Ticks(value))
        }
        else {
            None
        }
    }

    /// Creates `Ticks` from any integer, folding it onto the timer's period
    ///
    /// Negative values count backwards from the wrap point.
    pub fn wrapping(value: i64) -> Self {
        // `rem_euclid` with a positive modulus never returns a negative
        // number, and the result is below `TIMER_MAX`.
        Ticks(value.rem_euclid(TIMER_MAX as i64) as u32)
    }

    /// Returns the raw timer value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the position of this reading within the timer's period
    ///
    /// This is `value()`, except that `TIMER_MAX` maps to `0`.
    pub fn phase(&self) -> u32 {
        self.0 % TIMER_MAX
    }
}

impl Add<u32> for Ticks {
    type Output = Ticks;

    fn add(self, rhs: u32) -> Self::Output {
        Ticks::wrapping(self.0 as i64 + rhs as i64)
    }
}
