//! The timeslot scheduler contract
//!
//! The time sync doesn't own the radio. It borrows it in timeslots granted by
//! an external time-division scheduler (on nRF52 devices, the SoftDevice's
//! radio timeslot API). This module describes what the time sync needs from
//! that scheduler, and what it hands back.

use num_enum::TryFromPrimitive;


/// Largest distance the scheduler accepts in a [`Request::Normal`], in
/// microseconds
pub const DEFAULT_MAX_DISTANCE_US: u32 = 128_000_000 - 1;

/// Longest time the scheduler may wait before granting a
/// [`Request::Earliest`], in microseconds
pub const EARLIEST_TIMEOUT_MAX_US: u32 = 128_000_000 - 1;


/// Time-division radio scheduler
///
/// Implementations forward to the platform's scheduler. Signals and system
/// events flow the other way: the platform delivers them to
/// [`TimeSync::on_signal`] and [`TimeSync::on_system_event`].
///
/// [`TimeSync::on_signal`]: ../hl/struct.TimeSync.html#method.on_signal
/// [`TimeSync::on_system_event`]: ../hl/struct.TimeSync.html#method.on_system_event
pub trait Scheduler {
    /// Status reported when the scheduler rejects a call
    type Error;

    /// Requests the high-frequency crystal oscillator
    fn request_hf_clock(&mut self) -> Result<(), Self::Error>;

    /// Switches to the constant-latency power mode
    fn set_constant_latency(&mut self) -> Result<(), Self::Error>;

    /// Opens a timeslot session
    fn open_session(&mut self) -> Result<(), Self::Error>;

    /// Closes the timeslot session
    fn close_session(&mut self) -> Result<(), Self::Error>;

    /// Requests a timeslot
    fn request(&mut self, request: Request) -> Result<(), Self::Error>;

    /// Largest distance the scheduler accepts in a [`Request::Normal`]
    fn max_distance_us(&self) -> u32 {
        DEFAULT_MAX_DISTANCE_US
    }
}


/// A timeslot request
///
/// Timeslots are always requested with the high-frequency crystal guaranteed
/// to be running, at normal priority.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Request {
    /// The earliest possible timeslot
    Earliest {
        /// Longest time the scheduler may take to grant the timeslot
        timeout_us: u32,

        /// Length of the timeslot
        length_us: u32,
    },

    /// A timeslot at a fixed distance from the start of the current one
    Normal {
        /// Distance from the start of the current timeslot
        distance_us: u32,

        /// Length of the timeslot
        length_us: u32,
    },
}

impl Request {
    /// Creates an earliest-available request for a timeslot of `length_us`
    pub fn earliest(length_us: u32) -> Self {
        Request::Earliest {
            timeout_us: EARLIEST_TIMEOUT_MAX_US,
            length_us,
        }
    }
}


/// Signal delivered by the scheduler while a timeslot is active
///
/// The discriminants are the raw signal types of the nRF SoftDevice.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum Signal {
    /// The timeslot has started
    SlotStart = 0,

    /// The slot timer's interrupt fired
    TimerEvent = 1,

    /// The radio's interrupt fired
    RadioEvent = 2,

    /// A requested extension was denied
    ExtensionFailed = 3,

    /// A requested extension was granted
    ExtensionSucceeded = 4,
}


/// What the scheduler should do after a signal has been handled
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Keep the timeslot running
    NoAction,

    /// Extend the current timeslot
    Extend {
        /// Length to add to the timeslot
        length_us: u32,
    },

    /// End the current timeslot and request the next one
    RequestNext(Request),
}


/// Platform event delivered outside of timeslots
///
/// The discriminants are the raw event codes of the nRF SoftDevice.
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
#[repr(u32)]
pub enum SystemEvent {
    /// The high-frequency crystal has started
    HfClockStarted = 0,

    /// Supply voltage dropped below the warning threshold
    PowerFailureWarning = 1,

    /// A flash operation finished
    FlashOperationSuccess = 2,

    /// A flash operation failed
    FlashOperationError = 3,

    /// A requested timeslot could not be scheduled
    Blocked = 4,

    /// A scheduled timeslot was revoked
    Canceled = 5,

    /// The signal callback returned an invalid action
    InvalidCallbackReturn = 6,

    /// The session has no outstanding requests
    SessionIdle = 7,

    /// The session was closed
    SessionClosed = 8,
}
