//! High-level interface to the time sync
//!
//! The entry point to this API is the [`TimeSync`] struct. It owns the
//! peripherals and the scheduler handle, and is driven from two directions:
//! the application calls [`TimeSync::enable`], [`TimeSync::start_periodic_tx`]
//! and friends, while the platform forwards the scheduler's signals and
//! system events to [`TimeSync::on_signal`] and
//! [`TimeSync::on_system_event`].
//!
//! Both directions must run in the same execution context, or be serialized
//! by the caller. On nRF52 devices the signal callback preempts the radio
//! interrupt, which in turn never preempts the signal callback, so no further
//! locking is needed.

use core::fmt;

use embedded_hal::timer::CountDown;
use log::{debug, error, info, warn};
use num_enum::TryFromPrimitive;

use crate::{
    configs::{Config, SYNC_RTC_PRESCALER},
    error::FatalKind,
    ll::{EventRouter, Peripherals, Radio, ReferenceClock, Timer},
    offset::ClockOffset,
    packet::SyncPacket,
    radio::{self, RadioState, Role, RoleController},
    scheduler::{Action, Request, Scheduler, Signal, SystemEvent},
    slot::{SlotMachine, SlotState},
    Error,
};


/// Lifecycle of the scheduler session
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Session {
    /// Initialized, never enabled
    Initialized,

    /// The session is open and timeslots are being requested
    Open,

    /// The scheduler reported the session idle and it is being closed
    Closing,

    /// The scheduler confirmed that the session is closed
    Closed,
}


/// Entry point to the time sync API
pub struct TimeSync<S, RADIO, TIMER, ROUTER, CLOCK, DELAY> {
    scheduler:   S,
    peripherals: Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>,
    config:      Config,
    session:     Session,
    slot:        SlotMachine,
    radio:       RoleController,

    blocked_cancelled_count: u32,
}

impl<S, RADIO, TIMER, ROUTER, CLOCK, DELAY>
    TimeSync<S, RADIO, TIMER, ROUTER, CLOCK, DELAY>
    where
        S:      Scheduler,
        RADIO:  Radio,
        TIMER:  Timer,
        ROUTER: EventRouter,
        CLOCK:  ReferenceClock,
        DELAY:  CountDown,
        DELAY::Time: From<u32>,
{
    /// Create a new instance of `TimeSync`
    ///
    /// Validates the configuration against the event-routing fabric and
    /// checks that the reference clock runs with the required prescaler. No
    /// hardware is touched until [`TimeSync::enable`] is called.
    pub fn init(
        scheduler:   S,
        peripherals: Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>,
        config:      Config,
    )
        -> Result<Self, Error<S::Error>>
    {
        config.validate(ROUTER::CHANNELS, ROUTER::GROUPS)?;

        if peripherals.clock.prescaler() != SYNC_RTC_PRESCALER {
            return Err(Error::InvalidState);
        }

        Ok(TimeSync {
            scheduler,
            peripherals,
            config,
            session: Session::Initialized,
            slot:    SlotMachine::new(),
            radio:   RoleController::new(),

            blocked_cancelled_count: 0,
        })
    }

    /// Opens the scheduler session and starts the sync timer
    ///
    /// The node starts out in the receive role. Returns
    /// [`Error::InvalidState`], if the session is already open.
    pub fn enable(&mut self) -> Result<(), Error<S::Error>> {
        if self.is_open() {
            return Err(Error::InvalidState);
        }

        self.scheduler.request_hf_clock()
            .map_err(Error::Scheduler)?;
        self.scheduler.set_constant_latency()
            .map_err(Error::Scheduler)?;
        self.scheduler.open_session()
            .map_err(Error::Scheduler)?;
        self.scheduler
            .request(Request::earliest(self.config.timeslot.length_us))
            .map_err(Error::Scheduler)?;

        self.blocked_cancelled_count = 0;
        self.radio.reset();
        self.slot = SlotMachine::new();

        radio::start_sync_timer(&mut self.peripherals.sync_timer);

        self.session = Session::Open;
        info!("Time sync session open");

        Ok(())
    }

    /// Closing the session is not supported
    ///
    /// A timeslot may be active at any time, and the radio activity in it
    /// can't be stopped from outside the scheduler's callback context.
    /// Always returns [`Error::NotSupported`].
    pub fn disable(&mut self) -> Result<(), Error<S::Error>> {
        Err(Error::NotSupported)
    }

    /// Sends sync packets at `frequency_hz`
    ///
    /// Takes effect at the next timeslot start. Fails with
    /// [`Error::InvalidParameter`], if the resulting distance between
    /// timeslots is not below what the scheduler supports.
    pub fn start_periodic_tx(&mut self, frequency_hz: u32)
        -> Result<(), Error<S::Error>>
    {
        if frequency_hz == 0 {
            return Err(Error::InvalidParameter);
        }

        let distance_us = 1_000_000 / frequency_hz;
        if distance_us >= self.scheduler.max_distance_us() {
            return Err(Error::InvalidParameter);
        }

        self.radio.set_role(Role::Transmit { distance_us });
        info!("Sending sync packets every {} us", distance_us);

        Ok(())
    }

    /// Stops sending sync packets and goes back to listening
    ///
    /// Takes effect at the next timeslot start.
    pub fn stop_tx(&mut self) -> Result<(), Error<S::Error>> {
        self.radio.set_role(Role::Receive);
        info!("Listening for sync packets");

        Ok(())
    }

    /// Handles a signal of the scheduler
    ///
    /// `signal` is the raw signal type, as delivered by the platform. Panics
    /// if the signal can't be handled, as there is no way to report an error
    /// to the scheduler.
    pub fn on_signal(&mut self, signal: u8) -> Action
        where S::Error: fmt::Debug
    {
        match self.try_on_signal(signal) {
            Ok(action) => action,
            Err(err) => {
                error!("Timeslot signal {} failed: {:?}", signal, err);
                panic!("Timeslot signal {} failed: {:?}", signal, err);
            }
        }
    }

    /// Handles a signal of the scheduler, returning errors to the caller
    pub fn try_on_signal(&mut self, signal: u8)
        -> Result<Action, Error<S::Error>>
    {
        let signal = Signal::try_from_primitive(signal)
            .map_err(|_| fatal!(FatalKind::UnknownSignal(signal)))?;

        self.slot.handle(
            signal,
            &mut self.radio,
            &mut self.peripherals,
            &self.config,
        )
    }

    /// Handles a system event of the platform
    ///
    /// `event` is the raw event code. Events that don't concern the time sync
    /// are ignored. Panics if the event can't be handled.
    pub fn on_system_event(&mut self, event: u32)
        where S::Error: fmt::Debug
    {
        if let Err(err) = self.try_on_system_event(event) {
            error!("System event {} failed: {:?}", event, err);
            panic!("System event {} failed: {:?}", event, err);
        }
    }

    /// Handles a system event of the platform, returning errors to the caller
    pub fn try_on_system_event(&mut self, event: u32)
        -> Result<(), Error<S::Error>>
    {
        let event = match SystemEvent::try_from_primitive(event) {
            Ok(event) => event,
            Err(_) => {
                warn!("Ignoring unknown system event {}", event);
                return Ok(());
            }
        };

        match event {
            SystemEvent::Blocked | SystemEvent::Canceled => {
                // Keep the session going, no matter the role. A transmitting
                // node returns to its periodic distance at the end of the
                // next timeslot.
                self.blocked_cancelled_count =
                    self.blocked_cancelled_count.wrapping_add(1);
                debug!(
                    "Timeslot {:?}, requesting earliest ({} so far)",
                    event,
                    self.blocked_cancelled_count,
                );

                self.scheduler
                    .request(Request::earliest(self.config.timeslot.length_us))
                    .map_err(Error::Scheduler)?;
            }
            SystemEvent::InvalidCallbackReturn => {
                return Err(fatal!(FatalKind::InvalidCallbackReturn).into());
            }
            SystemEvent::SessionIdle => {
                info!("Session idle, closing");
                self.scheduler.close_session()
                    .map_err(Error::Scheduler)?;
                self.session = Session::Closing;
            }
            SystemEvent::SessionClosed => {
                info!("Session closed");
                self.session = Session::Closed;
            }
            SystemEvent::FlashOperationSuccess
            | SystemEvent::FlashOperationError => {}
            SystemEvent::HfClockStarted
            | SystemEvent::PowerFailureWarning => {
                debug!("Ignoring system event {:?}", event);
            }
        }

        Ok(())
    }
}

impl<S, RADIO, TIMER, ROUTER, CLOCK, DELAY>
    TimeSync<S, RADIO, TIMER, ROUTER, CLOCK, DELAY>
{
    /// Indicates whether the scheduler session is open
    ///
    /// A session that is being closed still counts as open.
    pub fn is_open(&self) -> bool {
        match self.session {
            Session::Open | Session::Closing => true,
            Session::Initialized | Session::Closed => false,
        }
    }

    /// Returns the lifecycle phase of the scheduler session
    pub fn session(&self) -> Session {
        self.session
    }

    /// Number of timeslots that were blocked or canceled since `enable`
    pub fn blocked_cancelled_count(&self) -> u32 {
        self.blocked_cancelled_count
    }

    /// Number of sync packets sent
    pub fn tx_count(&self) -> u32 {
        self.radio.tx_count()
    }

    /// Number of valid sync packets received
    pub fn rx_count(&self) -> u32 {
        self.radio.rx_count()
    }

    /// The most recent offset that required a correction
    pub fn last_correction(&self) -> Option<ClockOffset> {
        self.radio.last_correction()
    }

    /// The most recently sent or received sync packet
    ///
    /// On a listening node, `rtc_val` is the peer's reference clock at the
    /// time it sent the packet.
    pub fn last_packet(&self) -> Option<SyncPacket> {
        self.radio.last_packet()
    }

    /// What the radio is doing
    pub fn radio_state(&self) -> RadioState {
        self.radio.state()
    }

    /// The configured role
    pub fn role(&self) -> Role {
        self.radio.role()
    }

    /// Where the current timeslot stands
    pub fn slot_state(&self) -> SlotState {
        self.slot.state()
    }

    /// Provides direct access to the peripherals
    ///
    /// Reading is harmless, but changing anything from outside the callback
    /// context will interfere with the time sync.
    pub fn peripherals(&mut self)
        -> &mut Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>
    {
        &mut self.peripherals
    }
}

// Can't be derived without putting requirements on the type parameters.
impl<S, RADIO, TIMER, ROUTER, CLOCK, DELAY> fmt::Debug
    for TimeSync<S, RADIO, TIMER, ROUTER, CLOCK, DELAY>
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TimeSync {{ session: ")?;
        self.session.fmt(f)?;
        write!(f, ", role: ")?;
        self.radio.role().fmt(f)?;
        write!(f, ", .. }}")?;

        Ok(())
    }
}
