//! Configuration structs for the time sync
//!
//! The configuration is passed to [`TimeSync::init`], which validates it once.
//! The defaults are the values the timing constants were calibrated with.
//!
//! [`TimeSync::init`]: ../hl/struct.TimeSync.html#method.init

use crate::{time::TIMER_MAX, Error};


/// Prescaler the reference clock must run with
///
/// The `rtc_val` field of outgoing sync packets is only meaningful to the
/// peer if both nodes run their reference clock at the same rate.
pub const SYNC_RTC_PRESCALER: u32 = 0;

/// Prescaler of the sync timer (16 MHz)
///
/// The default TX chain delay was calibrated for this prescaler.
pub const SYNC_TIMER_PRESCALER: u8 = 0;

/// Highest radio channel number (2400 + 100 MHz)
pub const MAX_RADIO_CHANNEL: u8 = 100;


/// Time sync configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Radio link address
    ///
    /// The first byte is the address prefix, the remaining four bytes form
    /// the base address.
    pub address: [u8; 5],

    /// Radio channel. The radio operates at 2400 + `channel` MHz.
    pub channel: u8,

    /// Event-routing channels and group used by the time sync
    pub routing: RoutingConfig,

    /// Delay between the sender's timer capture and the receiver's address
    /// detection, in sync timer ticks
    ///
    /// This depends on the radio ramp-up and on how quickly the sender's
    /// code runs, so it needs to be calibrated per build.
    pub tx_chain_delay: u32,

    /// Upper bound for each of the busy-waits, in microseconds
    ///
    /// Both waits complete within tens of microseconds on real hardware.
    pub busy_wait_timeout_us: u32,

    /// Timeslot lengths and margins
    pub timeslot: TimeslotConfig,

    /// Timing of the hardware-triggered sync packet transmission
    pub tx_trigger: TxTriggerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            address: [0xde, 0xad, 0xbe, 0xef, 0x19],
            channel: 8,
            routing: Default::default(),
            tx_chain_delay: 1084,
            busy_wait_timeout_us: 1000,
            timeslot: Default::default(),
            tx_trigger: Default::default(),
        }
    }
}

impl Config {
    /// Checks the configuration for consistency
    ///
    /// `routing_channels` and `routing_groups` are the number of channels and
    /// groups the event-routing fabric provides.
    pub fn validate<E>(
        &self,
        routing_channels: u8,
        routing_groups: u8,
    )
        -> Result<(), Error<E>>
    {
        if self.channel > MAX_RADIO_CHANNEL {
            return Err(Error::InvalidParameter);
        }
        if self.tx_chain_delay >= TIMER_MAX {
            return Err(Error::InvalidParameter);
        }
        if self.busy_wait_timeout_us == 0 {
            return Err(Error::InvalidParameter);
        }

        self.routing.validate(routing_channels, routing_groups)?;
        self.timeslot.validate()?;
        self.tx_trigger.validate()?;

        Ok(())
    }
}


/// Event-routing resources reserved for the time sync
///
/// The two TX channels are reused on the receiving side to apply clock
/// corrections. A node never transmits and corrects in the same timeslot.
#[derive(Clone, Debug)]
pub struct RoutingConfig {
    /// Channel that captures the sync timer when the TX trigger timer fires.
    /// Also clears the sync timer when a correction is applied.
    pub tx_capture: u8,

    /// Channel that starts the transmission when the TX trigger timer fires.
    /// Also disarms the correction once it has been applied.
    pub tx_start: u8,

    /// Channel that captures the sync timer when the radio detects the
    /// address of an incoming packet
    pub rx_capture: u8,

    /// Channel group used to disarm a correction after it has fired once
    pub group: u8,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            tx_capture: 0,
            tx_start: 1,
            rx_capture: 2,
            group: 0,
        }
    }
}

impl RoutingConfig {
    /// Returns the channels as a bit mask
    pub fn mask(channels: &[u8]) -> u32 {
        channels.iter().fold(0, |mask, &channel| mask | 1u32 << channel)
    }

    fn validate<E>(&self, channels: u8, groups: u8) -> Result<(), Error<E>> {
        let all = [self.tx_capture, self.tx_start, self.rx_capture];

        if all.iter().any(|&channel| channel >= channels) {
            return Err(Error::InvalidParameter);
        }
        if self.tx_capture == self.tx_start
            || self.tx_capture == self.rx_capture
            || self.tx_start == self.rx_capture
        {
            return Err(Error::InvalidParameter);
        }
        if self.group >= groups {
            return Err(Error::InvalidParameter);
        }

        Ok(())
    }
}


/// Timeslot lengths and margins, all in microseconds
#[derive(Clone, Debug)]
pub struct TimeslotConfig {
    /// Length of each requested timeslot
    pub length_us: u32,

    /// Length added to the timeslot by each extension
    pub extension_us: u32,

    /// Activity must be finished this long before the timeslot ends
    pub safety_margin_us: u32,

    /// An extension is requested this long before the timeslot ends
    pub extend_margin_us: u32,

    /// Subtracted from each extension when re-arming the slot timer, to
    /// account for the time the extension request takes
    pub extension_latency_us: u32,

    /// Maximum cumulative length of one continuous timeslot
    pub max_total_us: u32,

    /// Headroom kept below `max_total_us`
    pub total_margin_us: u32,
}

impl Default for TimeslotConfig {
    fn default() -> Self {
        TimeslotConfig {
            length_us: 1000,
            extension_us: 1000,
            safety_margin_us: 500,
            extend_margin_us: 700,
            extension_latency_us: 25,
            max_total_us: 128_000_000,
            total_margin_us: 5000,
        }
    }
}

impl TimeslotConfig {
    /// Slot timer value at which the timeslot activity is wrapped up
    pub fn end_compare_us(&self) -> u32 {
        self.length_us - self.safety_margin_us
    }

    /// Slot timer value at which an extension is requested
    pub fn extend_compare_us(&self) -> u32 {
        self.length_us - self.extend_margin_us
    }

    /// Cumulative length below which another extension may be requested
    pub fn extension_ceiling_us(&self) -> u32 {
        self.max_total_us - self.total_margin_us - self.extension_us
    }

    fn validate<E>(&self) -> Result<(), Error<E>> {
        let margins_fit = self.safety_margin_us < self.length_us
            && self.extend_margin_us < self.length_us
            && self.extend_margin_us > self.safety_margin_us;
        let extension_fits = self.extension_latency_us < self.extension_us;
        let total_fits = self.total_margin_us + self.extension_us
            < self.max_total_us;

        if margins_fit && extension_fits && total_fits {
            Ok(())
        }
        else {
            Err(Error::InvalidParameter)
        }
    }
}


/// Timing of the TX trigger timer, in microseconds after it is started
#[derive(Clone, Debug)]
pub struct TxTriggerConfig {
    /// When the sync timer is captured. Matches the radio's TX ramp-up time.
    pub capture_us: u32,

    /// When the transmission is started. The gap to `capture_us` leaves
    /// time to copy the captured value into the outgoing packet.
    pub start_us: u32,
}

impl Default for TxTriggerConfig {
    fn default() -> Self {
        TxTriggerConfig {
            capture_us: 40,
            start_us: 50,
        }
    }
}

impl TxTriggerConfig {
    fn validate<E>(&self) -> Result<(), Error<E>> {
        if self.capture_us == 0 || self.start_us <= self.capture_us {
            return Err(Error::InvalidParameter);
        }

        Ok(())
    }
}
