//! Radio time synchronization between two nodes sharing a timeslot scheduler
//!
//! One node periodically sends a sync packet carrying a snapshot of its
//! free-running sync timer. The other node timestamps the packet's arrival on
//! its own sync timer, computes the offset and corrects its timer in
//! hardware, through the event-routing fabric.
//!
//! The radio is only used within timeslots granted by an external
//! time-division scheduler. See the [`hl`] module for the entry point, and
//! the [`ll`] and [`scheduler`] modules for what the platform has to provide.
//!
//! [`hl`]: hl/index.html
//! [`ll`]: ll/index.html
//! [`scheduler`]: scheduler/index.html


#![no_std]

#![deny(missing_docs)]


#[cfg(test)]
extern crate std;


#[macro_use]
pub mod util;
#[macro_use]
pub mod error;

pub mod configs;
pub mod hl;
pub mod ll;
pub mod offset;
pub mod packet;
pub mod radio;
pub mod scheduler;
pub mod slot;
pub mod time;

#[cfg(feature = "nrf52")]
pub mod nrf52;

#[cfg(test)]
mod testing;


pub use crate::{
    configs::{Config, RoutingConfig, TimeslotConfig, TxTriggerConfig},
    error::{Error, Fatal, FatalKind},
    hl::{Session, TimeSync},
    ll::Peripherals,
    radio::{RadioState, Role},
    scheduler::{Action, Request, Scheduler, Signal, SystemEvent},
    time::{Ticks, TIMER_MAX},
};
