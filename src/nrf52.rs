//! Implementation of the peripheral traits for the nRF52832
//!
//! Binds [`Radio`], [`Timer`], [`EventRouter`] and [`ReferenceClock`] to the
//! RADIO, TIMER, PPI and RTC peripherals through the PAC re-exported by
//! `nrf52832-hal`. Only available with the `nrf52` feature.
//!
//! Under the SoftDevice, TIMER0 is lent out for the duration of each timeslot
//! and serves as the slot timer. TIMER1 and TIMER2 serve as sync and trigger
//! timer. A `nrf52832_hal::Timer` on a further instance serves as the
//! busy-wait bound.
//!
//! ``` rust,ignore
//! let p = pac::Peripherals::take().unwrap();
//!
//! let sync_timer    = NrfTimer::new(p.TIMER1);
//! let trigger_timer = NrfTimer::new(p.TIMER2);
//! let router        = NrfPpi::new(p.PPI, &sync_timer, &trigger_timer);
//!
//! let peripherals = Peripherals {
//!     radio:      NrfRadio::new(p.RADIO, packet_buffer),
//!     sync_timer,
//!     trigger_timer,
//!     slot_timer: NrfTimer::new(p.TIMER0),
//!     router,
//!     clock:      NrfRtc::new(p.RTC1),
//!     delay:      Timer::new(p.TIMER3),
//! };
//!
//! let mut sync = TimeSync::init(scheduler, peripherals, Config::default())?;
//! ```
//!
//! [`Radio`]: ../ll/trait.Radio.html
//! [`Timer`]: ../ll/trait.Timer.html
//! [`EventRouter`]: ../ll/trait.EventRouter.html
//! [`ReferenceClock`]: ../ll/trait.ReferenceClock.html

use core::{
    ops::Deref,
    sync::atomic::{compiler_fence, Ordering},
};

use cortex_m::peripheral::NVIC;
use nrf52832_hal::pac::{
    radio,
    rtc0,
    timer0,
    Interrupt,
    PPI,
    RADIO,
    TIMER0,
    TIMER1,
    TIMER2,
};

use crate::{
    ll::{
        BitWidth,
        Event,
        EventRouter,
        LinkConfig,
        RadioShorts,
        ReferenceClock,
        Task,
        TimerConfig,
        TimerId,
        TimerShorts,
    },
    packet::PACKET_LEN,
};


const RADIO_MODE_BLE_1MBIT: u32 = 3;
const RADIO_STATE_RX: u32 = 3;
const RADIO_CRC_LEN_TWO: u32 = 2;
const RADIO_CRC_INIT: u32 = 0xffff;
const RADIO_CRC_POLY: u32 = 0x11021;
const RADIO_BASE_ADDRESS_LEN: u32 = 4;
const RADIO_INT_END: u32 = 1 << 3;

const SHORT_READY_START: u32 = 1 << 0;
const SHORT_END_DISABLE: u32 = 1 << 1;
const SHORT_END_START: u32 = 1 << 5;

const PCNF1_ENDIAN_BIG: u32 = 1 << 24;
const PCNF1_BALEN_POS: u32 = 16;
const PCNF1_STATLEN_POS: u32 = 8;

const TIMER_MODE_TIMER: u32 = 0;
const TIMER_SHORT_STOP_POS: usize = 8;
const TIMER_INT_COMPARE_POS: usize = 16;
const TIMER_COMPARE_CHANNELS: usize = 4;


/// The nRF52's radio
///
/// The radio reads and writes packets through DMA, so the packet buffer must
/// stay in place while the radio is in use.
pub struct NrfRadio {
    radio:  RADIO,
    buffer: &'static mut [u8; PACKET_LEN],
}

impl NrfRadio {
    /// Wraps the radio peripheral and the buffer it exchanges packets in
    pub fn new(radio: RADIO, buffer: &'static mut [u8; PACKET_LEN]) -> Self {
        NrfRadio { radio, buffer }
    }

    /// Releases the radio peripheral and the buffer
    pub fn free(self) -> (RADIO, &'static mut [u8; PACKET_LEN]) {
        (self.radio, self.buffer)
    }

    fn regs(&self) -> &radio::RegisterBlock {
        &self.radio
    }
}

impl crate::ll::Radio for NrfRadio {
    fn power_on(&mut self) {
        self.regs().power.write(|w| unsafe { w.bits(1) });
    }

    fn configure(&mut self, link: &LinkConfig) {
        let packet_ptr = self.buffer.as_ptr() as u32;
        let r = self.regs();

        r.mode.write(|w| unsafe { w.bits(RADIO_MODE_BLE_1MBIT) });
        // Fast ramp-up
        r.modecnf0.write(|w| unsafe { w.bits(1) });

        r.crccnf.write(|w| unsafe { w.bits(RADIO_CRC_LEN_TWO) });
        r.crcinit.write(|w| unsafe { w.bits(RADIO_CRC_INIT) });
        r.crcpoly.write(|w| unsafe { w.bits(RADIO_CRC_POLY) });

        // No S0, LENGTH or S1 fields. Static length, no whitening.
        r.pcnf0.write(|w| unsafe { w.bits(0) });
        let len = link.payload_len as u32;
        r.pcnf1.write(|w| unsafe {
            w.bits(
                PCNF1_ENDIAN_BIG
                | RADIO_BASE_ADDRESS_LEN << PCNF1_BALEN_POS
                | len << PCNF1_STATLEN_POS
                | len
            )
        });
        r.packetptr.write(|w| unsafe { w.bits(packet_ptr) });

        let a = link.address;
        let base = u32::from_be_bytes([a[1], a[2], a[3], a[4]]);
        r.prefix0.write(|w| unsafe { w.bits(a[0] as u32) });
        r.base0.write(|w| unsafe { w.bits(base) });
        r.txaddress.write(|w| unsafe { w.bits(0) });
        r.rxaddresses.write(|w| unsafe { w.bits(1) });

        r.frequency.write(|w| unsafe { w.bits(link.channel as u32) });
        r.txpower.write(|w| unsafe { w.bits(link.tx_power_dbm as u8 as u32) });

        r.events_end.write(|w| unsafe { w.bits(0) });
        r.intenclr.write(|w| unsafe { w.bits(0xffff_ffff) });
        r.intenset.write(|w| unsafe { w.bits(RADIO_INT_END) });

        unsafe { NVIC::unmask(Interrupt::RADIO) };
    }

    fn set_shorts(&mut self, shorts: RadioShorts) {
        let mut bits = 0;
        if shorts.ready_start {
            bits |= SHORT_READY_START;
        }
        if shorts.end_start {
            bits |= SHORT_END_START;
        }
        if shorts.end_disable {
            bits |= SHORT_END_DISABLE;
        }

        self.regs().shorts.write(|w| unsafe { w.bits(bits) });
    }

    fn start_rx(&mut self) {
        self.regs().tasks_rxen.write(|w| unsafe { w.bits(1) });
    }

    fn start_tx(&mut self) {
        self.regs().tasks_txen.write(|w| unsafe { w.bits(1) });
    }

    fn disable(&mut self) {
        self.regs().tasks_disable.write(|w| unsafe { w.bits(1) });
    }

    fn is_receiving(&self) -> bool {
        self.regs().state.read().bits() == RADIO_STATE_RX
    }

    fn is_disabled_event(&self) -> bool {
        self.regs().events_disabled.read().bits() != 0
    }

    fn clear_disabled_event(&mut self) {
        self.regs().events_disabled.write(|w| unsafe { w.bits(0) });
    }

    fn is_end_event(&self) -> bool {
        self.regs().events_end.read().bits() != 0
    }

    fn clear_end_event(&mut self) {
        self.regs().events_end.write(|w| unsafe { w.bits(0) });
    }

    fn is_crc_ok(&self) -> bool {
        self.regs().crcstatus.read().bits() == 1
    }

    fn disable_interrupts(&mut self) {
        self.regs().intenclr.write(|w| unsafe { w.bits(0xffff_ffff) });
    }

    fn write_packet(&mut self, packet: &[u8; PACKET_LEN]) {
        self.buffer.copy_from_slice(packet);
        compiler_fence(Ordering::SeqCst);
    }

    fn read_packet(&self) -> [u8; PACKET_LEN] {
        compiler_fence(Ordering::SeqCst);
        *self.buffer
    }
}


/// An owned TIMER0, TIMER1 or TIMER2 peripheral
///
/// The three instances share a register layout, but are distinct types in the
/// PAC. Wrapping them lets sync, trigger and slot timer be of the same type.
pub enum TimerInstance {
    /// TIMER0
    Timer0(TIMER0),

    /// TIMER1
    Timer1(TIMER1),

    /// TIMER2
    Timer2(TIMER2),
}

impl From<TIMER0> for TimerInstance {
    fn from(timer: TIMER0) -> Self {
        TimerInstance::Timer0(timer)
    }
}

impl From<TIMER1> for TimerInstance {
    fn from(timer: TIMER1) -> Self {
        TimerInstance::Timer1(timer)
    }
}

impl From<TIMER2> for TimerInstance {
    fn from(timer: TIMER2) -> Self {
        TimerInstance::Timer2(timer)
    }
}


/// One of the nRF52's TIMER0-2 peripherals
pub struct NrfTimer {
    timer: TimerInstance,
}

impl NrfTimer {
    /// Wraps a timer peripheral
    pub fn new<T>(timer: T) -> Self
        where T: Into<TimerInstance>
    {
        NrfTimer { timer: timer.into() }
    }

    /// Releases the timer peripheral
    pub fn free(self) -> TimerInstance {
        self.timer
    }

    fn regs(&self) -> &timer0::RegisterBlock {
        match &self.timer {
            TimerInstance::Timer0(timer) => &**timer,
            TimerInstance::Timer1(timer) => &**timer,
            TimerInstance::Timer2(timer) => &**timer,
        }
    }

    fn interrupt(&self) -> Interrupt {
        match self.timer {
            TimerInstance::Timer0(_) => Interrupt::TIMER0,
            TimerInstance::Timer1(_) => Interrupt::TIMER1,
            TimerInstance::Timer2(_) => Interrupt::TIMER2,
        }
    }
}

impl crate::ll::Timer for NrfTimer {
    fn start(&mut self) {
        self.regs().tasks_start.write(|w| unsafe { w.bits(1) });
    }

    fn stop(&mut self) {
        self.regs().tasks_stop.write(|w| unsafe { w.bits(1) });
    }

    fn clear(&mut self) {
        self.regs().tasks_clear.write(|w| unsafe { w.bits(1) });
    }

    fn configure(&mut self, config: TimerConfig) {
        let bitmode = match config.width {
            BitWidth::Bits16 => 0,
            BitWidth::Bits8  => 1,
            BitWidth::Bits24 => 2,
            BitWidth::Bits32 => 3,
        };

        let r = self.regs();
        r.mode.write(|w| unsafe { w.bits(TIMER_MODE_TIMER) });
        r.bitmode.write(|w| unsafe { w.bits(bitmode) });
        r.prescaler.write(|w| unsafe { w.bits(config.prescaler as u32) });
    }

    fn set_shorts(&mut self, shorts: TimerShorts) {
        let mut bits = 0;
        if let Some(channel) = shorts.clear_on {
            bits |= 1 << channel;
        }
        if let Some(channel) = shorts.stop_on {
            bits |= 1 << (TIMER_SHORT_STOP_POS + channel);
        }

        self.regs().shorts.write(|w| unsafe { w.bits(bits) });
    }

    fn set_compare(&mut self, channel: usize, value: u32) {
        self.regs().cc[channel].write(|w| unsafe { w.bits(value) });
    }

    fn compare(&self, channel: usize) -> u32 {
        self.regs().cc[channel].read().bits()
    }

    fn is_compare_event(&self, channel: usize) -> bool {
        self.regs().events_compare[channel].read().bits() != 0
    }

    fn clear_compare_event(&mut self, channel: usize) {
        self.regs().events_compare[channel].write(|w| unsafe { w.bits(0) });
    }

    fn enable_compare_interrupt(&mut self, channel: usize) {
        let bit = 1 << (TIMER_INT_COMPARE_POS + channel);
        self.regs().intenset.write(|w| unsafe { w.bits(bit) });
    }

    fn disable_compare_interrupts(&mut self) {
        let mask = ((1 << TIMER_COMPARE_CHANNELS) - 1) << TIMER_INT_COMPARE_POS;
        self.regs().intenclr.write(|w| unsafe { w.bits(mask) });
    }

    fn is_compare_interrupt_enabled(&self, channel: usize) -> bool {
        let bit = 1 << (TIMER_INT_COMPARE_POS + channel);
        self.regs().intenset.read().bits() & bit != 0
    }

    fn unmask_interrupt(&mut self) {
        unsafe { NVIC::unmask(self.interrupt()) };
    }
}


/// The nRF52's programmable peripheral interconnect
///
/// Needs to know where the sync and trigger timers live, to translate
/// [`Event`] and [`Task`] into register addresses.
pub struct NrfPpi {
    ppi:     PPI,
    sync:    *const timer0::RegisterBlock,
    trigger: *const timer0::RegisterBlock,
}

impl NrfPpi {
    /// Wraps the PPI peripheral
    pub fn new(ppi: PPI, sync: &NrfTimer, trigger: &NrfTimer) -> Self {
        NrfPpi {
            ppi,
            sync:    sync.regs() as *const _,
            trigger: trigger.regs() as *const _,
        }
    }

    /// Releases the PPI peripheral
    pub fn free(self) -> PPI {
        self.ppi
    }

    fn timer(&self, id: TimerId) -> &timer0::RegisterBlock {
        let timer = match id {
            TimerId::Sync    => self.sync,
            TimerId::Trigger => self.trigger,
        };

        // Timer peripherals are memory-mapped at fixed addresses, which stay
        // valid for the whole program.
        unsafe { &*timer }
    }

    fn event_address(&self, event: Event) -> u32 {
        match event {
            Event::RadioAddress => {
                let radio = unsafe { &*RADIO::ptr() };
                &radio.events_address as *const _ as u32
            }
            Event::TimerCompare(id, channel) => {
                &self.timer(id).events_compare[channel] as *const _ as u32
            }
        }
    }

    fn task_address(&self, task: Task) -> u32 {
        match task {
            Task::RadioStart => {
                let radio = unsafe { &*RADIO::ptr() };
                &radio.tasks_start as *const _ as u32
            }
            Task::TimerCapture(id, channel) => {
                &self.timer(id).tasks_capture[channel] as *const _ as u32
            }
            Task::TimerClear(id) => {
                &self.timer(id).tasks_clear as *const _ as u32
            }
            Task::GroupDisable(group) => {
                &self.ppi.tasks_chg[group as usize].dis as *const _ as u32
            }
        }
    }
}

impl EventRouter for NrfPpi {
    const CHANNELS: u8 = 20;
    const GROUPS: u8 = 6;

    fn connect(&mut self, channel: u8, event: Event, task: Task) {
        let eep = self.event_address(event);
        let tep = self.task_address(task);

        let ch = &self.ppi.ch[channel as usize];
        ch.eep.write(|w| unsafe { w.bits(eep) });
        ch.tep.write(|w| unsafe { w.bits(tep) });
    }

    fn enable(&mut self, mask: u32) {
        self.ppi.chenset.write(|w| unsafe { w.bits(mask) });
    }

    fn disable(&mut self, mask: u32) {
        self.ppi.chenclr.write(|w| unsafe { w.bits(mask) });
    }

    fn set_group(&mut self, group: u8, mask: u32) {
        self.ppi.chg[group as usize].write(|w| unsafe { w.bits(mask) });
    }

    fn disable_group(&mut self, group: u8) {
        self.ppi.tasks_chg[group as usize].dis.write(|w| unsafe { w.bits(1) });
    }
}


/// One of the nRF52's RTC peripherals
///
/// The RTC must already be running. Under the SoftDevice, RTC0 is taken, but
/// RTC1 and RTC2 are available.
pub struct NrfRtc<R>(R);

impl<R> NrfRtc<R>
    where R: Deref<Target = rtc0::RegisterBlock>
{
    /// Wraps an RTC peripheral
    pub fn new(rtc: R) -> Self {
        NrfRtc(rtc)
    }

    /// Releases the RTC peripheral
    pub fn free(self) -> R {
        self.0
    }
}

impl<R> ReferenceClock for NrfRtc<R>
    where R: Deref<Target = rtc0::RegisterBlock>
{
    fn counter(&self) -> u32 {
        self.0.counter.read().bits()
    }

    fn prescaler(&self) -> u32 {
        self.0.prescaler.read().bits()
    }
}
