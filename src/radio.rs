//! Radio role controller
//!
//! Drives the radio during a timeslot. In the receive role, the radio listens
//! continuously and every valid sync packet leads to a clock correction. In
//! the transmit role, one sync packet is sent per timeslot, with capture and
//! transmission triggered by hardware at a fixed distance from each other.

use embedded_hal::timer::CountDown;
use log::{debug, warn};

use crate::{
    configs::{Config, RoutingConfig, SYNC_TIMER_PRESCALER},
    ll::{
        BitWidth,
        Event,
        EventRouter,
        LinkConfig,
        Peripherals,
        Radio,
        RadioShorts,
        ReferenceClock,
        Task,
        Timer,
        TimerConfig,
        TimerId,
        TimerShorts,
    },
    offset::{self, ClockOffset, SYNC_CAPTURE_CC, SYNC_DEBUG_CC, SYNC_WRAP_CC},
    packet::{SyncPacket, PACKET_LEN},
    time::{Ticks, RTC_MAX, TIMER_MAX},
    util::poll_flag,
    Error,
};


/// Transmit power of sync packets, in dBm
pub const TX_POWER_DBM: i8 = 4;

/// Compare channel of the trigger timer that captures the sync timer
pub const TRIGGER_CAPTURE_CC: usize = 0;

/// Compare channel of the trigger timer that starts the transmission
pub const TRIGGER_START_CC: usize = 1;

/// Prescaler of the trigger timer (1 MHz)
const TRIGGER_PRESCALER: u8 = 4;


/// The role this node plays in the synchronization
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// Listen for sync packets and correct the local clock
    Receive,

    /// Send a sync packet periodically
    Transmit {
        /// Distance between consecutive transmit timeslots
        distance_us: u32,
    },
}

/// What the radio is doing
///
/// Only changes in the timeslot begin and end handlers. After every timeslot
/// end, the radio is `Idle`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RadioState {
    /// Not in use
    Idle,

    /// Listening for sync packets
    Receiving,

    /// Sending a sync packet
    Transmitting,
}


/// Drives the radio within timeslots
#[derive(Debug)]
pub struct RoleController {
    role:            Role,
    state:           RadioState,
    tx_count:        u32,
    rx_count:        u32,
    last_packet:     Option<SyncPacket>,
    last_correction: Option<ClockOffset>,
}

impl RoleController {
    /// Creates a controller in the receive role
    pub fn new() -> Self {
        RoleController {
            role:            Role::Receive,
            state:           RadioState::Idle,
            tx_count:        0,
            rx_count:        0,
            last_packet:     None,
            last_correction: None,
        }
    }

    /// Resets role and radio state, keeping the diagnostic counters
    pub fn reset(&mut self) {
        self.role = Role::Receive;
        self.state = RadioState::Idle;
    }

    /// Returns the configured role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Sets the role. Takes effect at the next timeslot start.
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    /// Returns the radio state
    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Number of sync packets sent
    pub fn tx_count(&self) -> u32 {
        self.tx_count
    }

    /// Number of valid sync packets received
    pub fn rx_count(&self) -> u32 {
        self.rx_count
    }

    /// The most recently sent or received sync packet
    pub fn last_packet(&self) -> Option<SyncPacket> {
        self.last_packet
    }

    /// The most recent offset that required a correction
    pub fn last_correction(&self) -> Option<ClockOffset> {
        self.last_correction
    }

    /// Starts the radio activity of a timeslot
    pub fn slot_begin<RADIO, TIMER, ROUTER, CLOCK, DELAY, E>(
        &mut self,
        p:      &mut Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>,
        config: &Config,
    )
        -> Result<(), Error<E>>
        where
            RADIO:  Radio,
            TIMER:  Timer,
            ROUTER: EventRouter,
            CLOCK:  ReferenceClock,
            DELAY:  CountDown,
            DELAY::Time: From<u32>,
    {
        match self.role {
            Role::Receive => {
                self.begin_rx(p, config);
                Ok(())
            }
            Role::Transmit { .. } => {
                self.begin_tx(p, config)
            }
        }
    }

    fn begin_rx<RADIO, TIMER, ROUTER, CLOCK, DELAY>(
        &mut self,
        p:      &mut Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>,
        config: &Config,
    )
        where
            RADIO:  Radio,
            ROUTER: EventRouter,
    {
        // Within an extended timeslot the radio keeps receiving. Don't
        // disturb it.
        if self.state == RadioState::Receiving && p.radio.is_receiving() {
            return;
        }

        p.radio.configure(&link_config(config));
        p.radio.set_shorts(RadioShorts {
            ready_start: true,
            end_start:   true,
            end_disable: false,
        });
        p.radio.start_rx();

        let channel = config.routing.rx_capture;
        p.router.connect(
            channel,
            Event::RadioAddress,
            Task::TimerCapture(TimerId::Sync, SYNC_CAPTURE_CC),
        );
        p.router.enable(RoutingConfig::mask(&[channel]));

        self.state = RadioState::Receiving;
        debug!("Listening for sync packets");
    }

    fn begin_tx<RADIO, TIMER, ROUTER, CLOCK, DELAY, E>(
        &mut self,
        p:      &mut Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>,
        config: &Config,
    )
        -> Result<(), Error<E>>
        where
            RADIO:  Radio,
            TIMER:  Timer,
            ROUTER: EventRouter,
            CLOCK:  ReferenceClock,
            DELAY:  CountDown,
            DELAY::Time: From<u32>,
    {
        if self.state == RadioState::Receiving {
            p.radio.clear_disabled_event();
            p.radio.disable();

            p.delay.start(config.busy_wait_timeout_us);
            block_timeout!(
                &mut p.delay,
                poll_flag(p.radio.is_disabled_event())
            )?;
        }

        p.radio.configure(&link_config(config));

        // The trigger timer captures the sync timer and, a fixed time later,
        // starts the transmission. Neither depends on when this code runs.
        let capture = config.routing.tx_capture;
        let start = config.routing.tx_start;
        p.router.connect(
            capture,
            Event::TimerCompare(TimerId::Trigger, TRIGGER_CAPTURE_CC),
            Task::TimerCapture(TimerId::Sync, SYNC_CAPTURE_CC),
        );
        p.router.enable(RoutingConfig::mask(&[capture]));
        p.router.connect(
            start,
            Event::TimerCompare(TimerId::Trigger, TRIGGER_START_CC),
            Task::RadioStart,
        );
        p.router.enable(RoutingConfig::mask(&[start]));

        let trigger = &mut p.trigger_timer;
        trigger.configure(TimerConfig {
            prescaler: TRIGGER_PRESCALER,
            width:     BitWidth::Bits16,
        });
        trigger.set_shorts(TimerShorts {
            clear_on: Some(TRIGGER_START_CC),
            stop_on:  Some(TRIGGER_START_CC),
        });
        trigger.stop();
        trigger.clear();
        trigger.set_compare(TRIGGER_CAPTURE_CC, config.tx_trigger.capture_us);
        trigger.set_compare(TRIGGER_START_CC, config.tx_trigger.start_us);
        trigger.clear_compare_event(TRIGGER_CAPTURE_CC);
        trigger.clear_compare_event(TRIGGER_START_CC);

        p.radio.set_shorts(RadioShorts {
            ready_start: false,
            end_start:   false,
            end_disable: true,
        });
        p.radio.start_tx();
        p.trigger_timer.start();

        p.delay.start(config.busy_wait_timeout_us);
        block_timeout!(
            &mut p.delay,
            poll_flag(p.trigger_timer.is_compare_event(TRIGGER_CAPTURE_CC))
        )?;

        // The radio only reads the packet buffer once the start task fires,
        // which leaves the gap between the two compare values to fill it in.
        let packet = SyncPacket {
            timer_val: p.sync_timer.compare(SYNC_CAPTURE_CC) as i32,
            rtc_val:   (p.clock.counter() & RTC_MAX) as i32,
        };
        p.radio.write_packet(&packet.encode()?);

        self.state = RadioState::Transmitting;
        self.last_packet = Some(packet);
        self.tx_count = self.tx_count.wrapping_add(1);

        Ok(())
    }

    /// Ends the radio activity of a timeslot
    pub fn slot_end<RADIO, TIMER, ROUTER, CLOCK, DELAY>(
        &mut self,
        p:      &mut Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>,
        config: &Config,
    )
        where
            RADIO:  Radio,
            ROUTER: EventRouter,
    {
        p.radio.disable();
        p.radio.disable_interrupts();

        let routing = &config.routing;
        p.router.disable(RoutingConfig::mask(&[routing.rx_capture]));
        if self.state == RadioState::Transmitting {
            p.router.disable(
                RoutingConfig::mask(&[routing.tx_capture, routing.tx_start])
            );
        }

        self.state = RadioState::Idle;
    }

    /// Handles the radio's interrupt
    ///
    /// If a frame with a valid CRC has been received while listening, the
    /// clock offset to the sender is computed and the correction armed.
    pub fn handle_radio_event<RADIO, TIMER, ROUTER, CLOCK, DELAY>(
        &mut self,
        p:      &mut Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>,
        config: &Config,
    )
        where
            RADIO:  Radio,
            TIMER:  Timer,
            ROUTER: EventRouter,
    {
        if !p.radio.is_end_event() {
            return;
        }
        p.radio.clear_end_event();

        if self.state != RadioState::Receiving || !p.radio.is_crc_ok() {
            return;
        }

        let packet = match SyncPacket::decode(&p.radio.read_packet()) {
            Ok(packet) => packet,
            Err(error) => {
                warn!("Dropping undecodable sync packet: {:?}", error);
                return;
            }
        };

        let local = Ticks::wrapping(p.sync_timer.compare(SYNC_CAPTURE_CC) as i64);
        let offset = offset::compute_offset(
            local,
            packet.timer_val,
            config.tx_chain_delay,
        );

        if offset::apply_correction(
            offset,
            &mut p.sync_timer,
            &mut p.router,
            &config.routing,
        ) {
            self.last_correction = Some(offset);
        }

        self.last_packet = Some(packet);
        self.rx_count = self.rx_count.wrapping_add(1);
    }
}

impl Default for RoleController {
    fn default() -> Self {
        Self::new()
    }
}


/// The link parameters of the sync packet exchange
pub fn link_config(config: &Config) -> LinkConfig {
    LinkConfig {
        address:      config.address,
        channel:      config.channel,
        tx_power_dbm: TX_POWER_DBM,
        payload_len:  PACKET_LEN as u8,
    }
}

/// Starts the free-running sync timer
///
/// The timer wraps at `TIMER_MAX`, through its wrap compare channel and a
/// shortcut to its clear task.
pub fn start_sync_timer<TIMER: Timer>(sync_timer: &mut TIMER) {
    sync_timer.stop();
    sync_timer.clear();
    sync_timer.configure(TimerConfig {
        prescaler: SYNC_TIMER_PRESCALER,
        width:     BitWidth::Bits16,
    });
    sync_timer.set_compare(SYNC_WRAP_CC, TIMER_MAX);
    sync_timer.set_compare(SYNC_DEBUG_CC, TIMER_MAX / 2);
    sync_timer.set_shorts(TimerShorts {
        clear_on: Some(SYNC_WRAP_CC),
        stop_on:  None,
    });
    sync_timer.start();
}


#[cfg(test)]
mod tests {
    use crate::{
        offset::SYNC_CORRECTION_CC,
        testing::{peripherals, RadioMode, TestPeripherals},
    };

    use super::*;

    type Result = core::result::Result<(), Error<()>>;

    fn receive_packet(p: &mut TestPeripherals, local: u32, peer: i32) {
        p.sync_timer.cc[SYNC_CAPTURE_CC] = local;
        p.radio.rx_buffer = SyncPacket { timer_val: peer, rtc_val: 7 }
            .encode()
            .unwrap();
        p.radio.crc_ok = true;
        p.radio.end_event = true;
    }

    #[test]
    fn receive_role_listens_and_routes_address_to_capture() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();

        let result: Result = controller.slot_begin(&mut p, &config);
        assert!(result.is_ok());

        assert_eq!(controller.state(), RadioState::Receiving);
        assert_eq!(p.radio.mode, RadioMode::Rx);
        assert_eq!(p.radio.link, Some(link_config(&config)));
        assert!(p.radio.shorts.ready_start && p.radio.shorts.end_start);
        assert_eq!(
            p.router.route(config.routing.rx_capture),
            Some((
                Event::RadioAddress,
                Task::TimerCapture(TimerId::Sync, SYNC_CAPTURE_CC),
            )),
        );
        assert!(p.router.is_enabled(config.routing.rx_capture));
    }

    #[test]
    fn receive_role_leaves_running_reception_alone() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();

        let _: Result = controller.slot_begin(&mut p, &config);
        let configured = p.radio.configure_count;

        let _: Result = controller.slot_begin(&mut p, &config);
        assert_eq!(p.radio.configure_count, configured);
    }

    #[test]
    fn reference_clock_is_sent_as_24_bit_value() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();
        controller.set_role(Role::Transmit { distance_us: 100_000 });

        p.clock.counter = RTC_MAX + 1 + 42;

        let _: Result = controller.slot_begin(&mut p, &config);
        assert_eq!(
            controller.last_packet().map(|packet| packet.rtc_val),
            Some(42),
        );
    }

    #[test]
    fn transmit_role_captures_and_sends_packet() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();
        controller.set_role(Role::Transmit { distance_us: 100_000 });

        p.sync_timer.cc[SYNC_CAPTURE_CC] = 12_345;
        p.clock.counter = 777;

        let result: Result = controller.slot_begin(&mut p, &config);
        assert!(result.is_ok());

        let sent = SyncPacket { timer_val: 12_345, rtc_val: 777 };
        assert_eq!(controller.state(), RadioState::Transmitting);
        assert_eq!(controller.tx_count(), 1);
        assert_eq!(controller.last_packet(), Some(sent));
        assert_eq!(p.radio.tx_buffer, sent.encode().unwrap());
        assert_eq!(p.radio.mode, RadioMode::Tx);
        assert!(p.radio.shorts.end_disable);

        assert_eq!(p.trigger_timer.cc[TRIGGER_CAPTURE_CC], 40);
        assert_eq!(p.trigger_timer.cc[TRIGGER_START_CC], 50);
        assert_eq!(
            p.router.route(config.routing.tx_capture),
            Some((
                Event::TimerCompare(TimerId::Trigger, TRIGGER_CAPTURE_CC),
                Task::TimerCapture(TimerId::Sync, SYNC_CAPTURE_CC),
            )),
        );
        assert_eq!(
            p.router.route(config.routing.tx_start),
            Some((
                Event::TimerCompare(TimerId::Trigger, TRIGGER_START_CC),
                Task::RadioStart,
            )),
        );
    }

    #[test]
    fn transmit_role_disables_reception_first() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();

        let _: Result = controller.slot_begin(&mut p, &config);
        controller.set_role(Role::Transmit { distance_us: 100_000 });
        let result: Result = controller.slot_begin(&mut p, &config);

        assert!(result.is_ok());
        assert!(p.radio.disable_count >= 1);
        assert_eq!(p.radio.mode, RadioMode::Tx);
    }

    #[test]
    fn transmit_times_out_if_radio_never_disables() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();

        let _: Result = controller.slot_begin(&mut p, &config);
        p.radio.stall_disable = true;
        controller.set_role(Role::Transmit { distance_us: 100_000 });

        let result: Result = controller.slot_begin(&mut p, &config);
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(controller.tx_count(), 0);
    }

    #[test]
    fn transmit_times_out_if_trigger_never_fires() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();
        controller.set_role(Role::Transmit { distance_us: 100_000 });
        p.trigger_timer.stall = true;

        let result: Result = controller.slot_begin(&mut p, &config);
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(controller.state(), RadioState::Idle);
    }

    #[test]
    fn slot_end_returns_to_idle_and_tears_down_routing() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();
        controller.set_role(Role::Transmit { distance_us: 100_000 });

        let _: Result = controller.slot_begin(&mut p, &config);
        controller.slot_end(&mut p, &config);

        assert_eq!(controller.state(), RadioState::Idle);
        assert_eq!(p.radio.mode, RadioMode::Disabled);
        assert!(!p.radio.interrupts_enabled);
        assert!(!p.router.is_enabled(config.routing.rx_capture));
        assert!(!p.router.is_enabled(config.routing.tx_capture));
        assert!(!p.router.is_enabled(config.routing.tx_start));
    }

    #[test]
    fn valid_packet_arms_correction() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();
        let _: Result = controller.slot_begin(&mut p, &config);

        receive_packet(&mut p, 1_000, 500);
        controller.handle_radio_event(&mut p, &config);

        assert_eq!(controller.rx_count(), 1);
        assert_eq!(
            controller.last_correction().map(|offset| offset.ticks()),
            Some(584),
        );
        assert_eq!(p.sync_timer.cc[SYNC_CORRECTION_CC], TIMER_MAX - 584);
        assert!(!p.radio.end_event);
    }

    #[test]
    fn packet_with_bad_crc_is_ignored() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();
        let _: Result = controller.slot_begin(&mut p, &config);

        receive_packet(&mut p, 1_000, 500);
        p.radio.crc_ok = false;
        controller.handle_radio_event(&mut p, &config);

        assert_eq!(controller.rx_count(), 0);
        assert_eq!(controller.last_correction(), None);
        assert!(!p.radio.end_event);
    }

    #[test]
    fn frame_end_while_transmitting_is_not_a_reception() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();
        controller.set_role(Role::Transmit { distance_us: 100_000 });
        let _: Result = controller.slot_begin(&mut p, &config);

        receive_packet(&mut p, 1_000, 500);
        controller.handle_radio_event(&mut p, &config);

        assert_eq!(controller.rx_count(), 0);
        assert_eq!(p.sync_timer.cc[SYNC_CORRECTION_CC], 0);
    }

    #[test]
    fn aligned_packet_counts_without_correction() {
        let mut p = peripherals();
        let config = Config::default();
        let mut controller = RoleController::new();
        let _: Result = controller.slot_begin(&mut p, &config);

        receive_packet(&mut p, 1_584, 500);
        controller.handle_radio_event(&mut p, &config);

        assert_eq!(controller.rx_count(), 1);
        assert_eq!(controller.last_correction(), None);
    }

    #[test]
    fn sync_timer_wraps_at_timer_max() {
        let mut p = peripherals();
        start_sync_timer(&mut p.sync_timer);

        assert!(p.sync_timer.running);
        assert_eq!(p.sync_timer.cc[0], TIMER_MAX);
        assert_eq!(p.sync_timer.shorts.clear_on, Some(0));
        assert_eq!(
            p.sync_timer.config,
            Some(TimerConfig { prescaler: 0, width: BitWidth::Bits16 }),
        );
    }
}
