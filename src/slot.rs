//! Timeslot state machine
//!
//! Reacts to the signals the scheduler delivers while a timeslot is active.
//! The slot timer, lent out by the scheduler for the duration of the
//! timeslot, has two compare channels: one that fires shortly before the
//! timeslot ends and wraps up the radio activity, and one that fires a bit
//! earlier and decides whether to extend the timeslot.
//!
//! Transmitting timeslots are never extended, so that the distance between
//! sync packets stays exactly periodic.

use embedded_hal::timer::CountDown;
use log::debug;

use crate::{
    configs::Config,
    ll::{
        BitWidth,
        EventRouter,
        Peripherals,
        Radio,
        ReferenceClock,
        Timer,
        TimerConfig,
        TimerShorts,
    },
    radio::{Role, RoleController},
    scheduler::{Action, Request, Signal},
    Error,
};


/// Compare channel of the slot timer that ends the timeslot
pub const SLOT_END_CC: usize = 0;

/// Compare channel of the slot timer that decides on extensions
pub const SLOT_EXTEND_CC: usize = 1;

/// Prescaler of the slot timer (1 MHz)
const SLOT_TIMER_PRESCALER: u8 = 4;


/// Where the current timeslot stands
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SlotState {
    /// No timeslot is active
    SlotNotStarted,

    /// A timeslot is active
    SlotActive,

    /// An extension of the active timeslot was requested
    ExtensionPending,
}

/// Bookkeeping for one continuous timeslot
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SlotAccounting {
    /// Length the timeslot has been extended by so far
    pub total_timeslot_length_us: u32,

    /// Distance to the next timeslot, taken from the role at timeslot start
    pub requested_distance_us: u32,
}


/// Handles scheduler signals for the active timeslot
#[derive(Debug)]
pub struct SlotMachine {
    state:      SlotState,
    accounting: SlotAccounting,
}

impl SlotMachine {
    /// Creates a state machine with no active timeslot
    pub fn new() -> Self {
        SlotMachine {
            state:      SlotState::SlotNotStarted,
            accounting: SlotAccounting::default(),
        }
    }

    /// Returns the state of the current timeslot
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Returns the bookkeeping of the current timeslot
    pub fn accounting(&self) -> SlotAccounting {
        self.accounting
    }

    /// Handles a signal from the scheduler
    pub fn handle<RADIO, TIMER, ROUTER, CLOCK, DELAY, E>(
        &mut self,
        signal: Signal,
        radio:  &mut RoleController,
        p:      &mut Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>,
        config: &Config,
    )
        -> Result<Action, Error<E>>
        where
            RADIO:  Radio,
            TIMER:  Timer,
            ROUTER: EventRouter,
            CLOCK:  ReferenceClock,
            DELAY:  CountDown,
            DELAY::Time: From<u32>,
    {
        match signal {
            Signal::SlotStart => {
                self.start(radio, p, config)?;
                Ok(Action::NoAction)
            }
            Signal::TimerEvent => {
                if let Some(action) = self.timer_event(radio, p, config) {
                    return Ok(action);
                }

                // Nothing to decide. Check the radio, like for a radio
                // signal.
                radio.handle_radio_event(p, config);
                Ok(Action::NoAction)
            }
            Signal::RadioEvent => {
                radio.handle_radio_event(p, config);
                Ok(Action::NoAction)
            }
            Signal::ExtensionFailed => {
                // The end compare is still armed and fires before the
                // timeslot actually ends.
                debug!("Extension denied");
                self.state = SlotState::SlotActive;
                Ok(Action::NoAction)
            }
            Signal::ExtensionSucceeded => {
                self.extended(&mut p.slot_timer, config);
                Ok(Action::NoAction)
            }
        }
    }

    fn start<RADIO, TIMER, ROUTER, CLOCK, DELAY, E>(
        &mut self,
        radio:  &mut RoleController,
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
        let timeslot = &config.timeslot;
        let timer = &mut p.slot_timer;

        timer.stop();
        timer.clear();
        timer.configure(TimerConfig {
            prescaler: SLOT_TIMER_PRESCALER,
            width:     BitWidth::Bits24,
        });
        timer.set_shorts(TimerShorts::default());
        timer.clear_compare_event(SLOT_END_CC);
        timer.clear_compare_event(SLOT_EXTEND_CC);

        timer.disable_compare_interrupts();
        timer.enable_compare_interrupt(SLOT_END_CC);
        if radio.role() == Role::Receive {
            timer.enable_compare_interrupt(SLOT_EXTEND_CC);
        }

        timer.set_compare(SLOT_END_CC, timeslot.end_compare_us());
        timer.set_compare(SLOT_EXTEND_CC, timeslot.extend_compare_us());
        timer.start();

        p.radio.power_on();
        p.slot_timer.unmask_interrupt();

        self.state = SlotState::SlotActive;
        self.accounting = SlotAccounting {
            total_timeslot_length_us: 0,
            requested_distance_us:    distance_of(radio.role()),
        };

        radio.slot_begin(p, config)
    }

    fn timer_event<RADIO, TIMER, ROUTER, CLOCK, DELAY>(
        &mut self,
        radio:  &mut RoleController,
        p:      &mut Peripherals<RADIO, TIMER, ROUTER, CLOCK, DELAY>,
        config: &Config,
    )
        -> Option<Action>
        where
            RADIO:  Radio,
            TIMER:  Timer,
            ROUTER: EventRouter,
    {
        let timer = &mut p.slot_timer;

        if timer.is_compare_event(SLOT_END_CC)
            && timer.is_compare_interrupt_enabled(SLOT_END_CC)
        {
            timer.stop();
            timer.clear_compare_event(SLOT_END_CC);

            let next = self.next_request(radio.role(), config);

            radio.slot_end(p, config);
            self.state = SlotState::SlotNotStarted;
            self.accounting.total_timeslot_length_us = 0;

            debug!("Timeslot ended, requesting {:?}", next);
            return Some(Action::RequestNext(next));
        }

        if timer.is_compare_event(SLOT_EXTEND_CC)
            && timer.is_compare_interrupt_enabled(SLOT_EXTEND_CC)
        {
            timer.clear_compare_event(SLOT_EXTEND_CC);

            if radio.role() != Role::Receive {
                return None;
            }

            let total = self.accounting.total_timeslot_length_us;
            if total < config.timeslot.extension_ceiling_us() {
                self.state = SlotState::ExtensionPending;
                return Some(Action::Extend {
                    length_us: config.timeslot.extension_us,
                });
            }

            // The timeslot can't grow any further. Let the scheduler end it
            // and start over with a fresh one.
            let next = Request::Normal {
                distance_us: total + self.accounting.requested_distance_us,
                length_us:   config.timeslot.length_us,
            };
            radio.slot_end(p, config);
            self.state = SlotState::SlotNotStarted;
            self.accounting.total_timeslot_length_us = 0;

            debug!("Timeslot at its limit, requesting {:?}", next);
            return Some(Action::RequestNext(next));
        }

        None
    }

    fn next_request(&self, role: Role, config: &Config) -> Request {
        match role {
            Role::Transmit { distance_us } => Request::Normal {
                distance_us: self.accounting.total_timeslot_length_us
                    + distance_us,
                length_us:   config.timeslot.length_us,
            },
            Role::Receive => Request::earliest(config.timeslot.length_us),
        }
    }

    fn extended<TIMER: Timer>(&mut self, timer: &mut TIMER, config: &Config) {
        let timeslot = &config.timeslot;
        let shift = timeslot.extension_us - timeslot.extension_latency_us;

        timer.stop();
        timer.clear_compare_event(SLOT_END_CC);
        timer.clear_compare_event(SLOT_EXTEND_CC);
        let end = timer.compare(SLOT_END_CC);
        let extend = timer.compare(SLOT_EXTEND_CC);
        timer.set_compare(SLOT_END_CC, end + shift);
        timer.set_compare(SLOT_EXTEND_CC, extend + shift);
        timer.start();

        self.accounting.total_timeslot_length_us += timeslot.extension_us;
        self.state = SlotState::SlotActive;
    }
}

impl Default for SlotMachine {
    fn default() -> Self {
        Self::new()
    }
}


fn distance_of(role: Role) -> u32 {
    match role {
        Role::Transmit { distance_us } => distance_us,
        Role::Receive => 0,
    }
}
