//! Peripheral-level interface used by the time sync
//!
//! The time sync never touches hardware registers directly. Everything it
//! needs from the radio, the timers, the event-routing fabric and the
//! reference clock is expressed as methods on the traits in this module.
//! Implementations for the nRF52832 live in the [`nrf52`] module (behind the
//! `nrf52` feature); tests use simulated peripherals.
//!
//! All methods are expected to have the side effect of the register access
//! they stand for, and nothing more. None of them block.
//!
//! [`nrf52`]: ../nrf52/index.html

use crate::packet::PACKET_LEN;


/// Radio transceiver
pub trait Radio {
    /// Powers the radio peripheral on
    fn power_on(&mut self);

    /// Configures link parameters and enables the frame-end interrupt
    ///
    /// Expects the radio to be disabled.
    fn configure(&mut self, link: &LinkConfig);

    /// Sets the radio's shortcuts between its own events and tasks
    fn set_shorts(&mut self, shorts: RadioShorts);

    /// Triggers the RX enable task
    fn start_rx(&mut self);

    /// Triggers the TX enable task
    fn start_tx(&mut self);

    /// Triggers the disable task
    fn disable(&mut self);

    /// Indicates whether the radio is currently in its receive state
    fn is_receiving(&self) -> bool;

    /// Indicates whether the disabled event is pending
    fn is_disabled_event(&self) -> bool;

    /// Clears the disabled event
    fn clear_disabled_event(&mut self);

    /// Indicates whether the frame-end event is pending
    fn is_end_event(&self) -> bool;

    /// Clears the frame-end event
    fn clear_end_event(&mut self);

    /// Indicates whether the CRC of the last received frame was valid
    fn is_crc_ok(&self) -> bool;

    /// Disables all radio interrupts
    fn disable_interrupts(&mut self);

    /// Places a packet in the radio's packet buffer for transmission
    fn write_packet(&mut self, packet: &[u8; PACKET_LEN]);

    /// Returns the content of the radio's packet buffer
    fn read_packet(&self) -> [u8; PACKET_LEN];
}

/// Link parameters that both nodes must agree on
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LinkConfig {
    /// Address prefix byte followed by four base address bytes
    pub address: [u8; 5],

    /// Radio channel (2400 + `channel` MHz)
    pub channel: u8,

    /// Transmit power in dBm
    pub tx_power_dbm: i8,

    /// Length of the static payload
    pub payload_len: u8,
}

/// Radio shortcuts used by the time sync
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RadioShorts {
    /// Start the radio when it is ready
    pub ready_start: bool,

    /// Restart the radio when a frame ends (continuous reception)
    pub end_start: bool,

    /// Disable the radio when a frame ends
    pub end_disable: bool,
}


/// Hardware timer with compare/capture channels
pub trait Timer {
    /// Triggers the start task
    fn start(&mut self);

    /// Triggers the stop task
    fn stop(&mut self);

    /// Triggers the clear task
    fn clear(&mut self);

    /// Puts the timer in timer mode with the given prescaler and width
    fn configure(&mut self, config: TimerConfig);

    /// Sets the timer's shortcuts
    fn set_shorts(&mut self, shorts: TimerShorts);

    /// Writes a compare register
    fn set_compare(&mut self, channel: usize, value: u32);

    /// Reads a compare register
    ///
    /// After a capture task, this is the captured timer value.
    fn compare(&self, channel: usize) -> u32;

    /// Indicates whether a compare event is pending
    fn is_compare_event(&self, channel: usize) -> bool;

    /// Clears a compare event
    fn clear_compare_event(&mut self, channel: usize);

    /// Enables the interrupt for a compare event
    fn enable_compare_interrupt(&mut self, channel: usize);

    /// Disables the interrupts for all compare events
    fn disable_compare_interrupts(&mut self);

    /// Indicates whether the interrupt for a compare event is enabled
    fn is_compare_interrupt_enabled(&self, channel: usize) -> bool;

    /// Unmasks the timer's interrupt line in the interrupt controller
    fn unmask_interrupt(&mut self);
}

/// Timer mode configuration
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimerConfig {
    /// Timer frequency is 16 MHz / 2^`prescaler`
    pub prescaler: u8,

    /// Counter width
    pub width: BitWidth,
}

/// Counter width of a timer
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BitWidth {
    /// 8 bit
    Bits8,
    /// 16 bit
    Bits16,
    /// 24 bit
    Bits24,
    /// 32 bit
    Bits32,
}

/// Timer shortcuts used by the time sync
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TimerShorts {
    /// Compare channel whose event clears the timer
    pub clear_on: Option<usize>,

    /// Compare channel whose event stops the timer
    pub stop_on: Option<usize>,
}


/// Identifies one of the two high-frequency timers owned by the time sync
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimerId {
    /// The free-running sync timer, shared time base of both nodes
    Sync,

    /// The one-shot timer that triggers capture and transmission
    Trigger,
}

/// Peripheral event that can be routed
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// The radio detected a valid address (sync word)
    RadioAddress,

    /// A timer's compare channel matched
    TimerCompare(TimerId, usize),
}

/// Peripheral task that can be triggered by a routed event
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Task {
    /// Start the radio's transmission or reception
    RadioStart,

    /// Capture a timer's value into a compare register
    TimerCapture(TimerId, usize),

    /// Clear a timer
    TimerClear(TimerId),

    /// Disable all channels in a channel group
    GroupDisable(u8),
}

/// Event-routing fabric
///
/// Connects peripheral events to peripheral tasks without CPU involvement.
/// Channels are addressed individually or through bit masks.
pub trait EventRouter {
    /// Number of channels available for routing
    const CHANNELS: u8;

    /// Number of channel groups
    const GROUPS: u8;

    /// Routes `event` to `task` on `channel`
    ///
    /// The channel's enabled state is not changed.
    fn connect(&mut self, channel: u8, event: Event, task: Task);

    /// Enables the channels in `mask`
    fn enable(&mut self, mask: u32);

    /// Disables the channels in `mask`
    fn disable(&mut self, mask: u32);

    /// Sets the channels that belong to `group`
    fn set_group(&mut self, group: u8, mask: u32);

    /// Triggers the group's disable task
    fn disable_group(&mut self, group: u8);
}


/// Low-frequency reference clock
pub trait ReferenceClock {
    /// Returns the current counter value
    fn counter(&self) -> u32;

    /// Returns the configured prescaler
    fn prescaler(&self) -> u32;
}


/// The peripherals used by the time sync
///
/// All handles are owned. They are handed over in [`TimeSync::init`] and are
/// only accessed from the scheduler's callback context afterwards.
///
/// [`TimeSync::init`]: ../hl/struct.TimeSync.html#method.init
pub struct Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY> {
    /// Radio transceiver
    pub radio: RADIO,

    /// Free-running timer that both nodes synchronize
    pub sync_timer: TIMER,

    /// One-shot timer that triggers capture and transmission of sync packets
    pub trigger_timer: TIMER,

    /// Timer that the scheduler lends out for the duration of a timeslot
    pub slot_timer: TIMER,

    /// Event-routing fabric
    pub router: ROUTER,

    /// Reference clock, sampled into outgoing sync packets
    pub clock: CLOCK,

    /// Bounds the busy-waits
    ///
    /// Needs to count in microseconds.
    pub delay: DELAY,
}
