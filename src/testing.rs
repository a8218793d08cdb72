//! Simulated peripherals and scheduler for the unit tests
//!
//! The fakes record what is done to them and expose their state as public
//! fields, so tests can both set up hardware conditions and check the result.

use std::vec::Vec;

use void::Void;

use crate::{
    ll::{
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
        TimerShorts,
    },
    packet::PACKET_LEN,
    radio::TRIGGER_CAPTURE_CC,
    scheduler::{Request, Scheduler, DEFAULT_MAX_DISTANCE_US},
};


const COMPARE_CHANNELS: usize = 6;
const ROUTER_CHANNELS: usize = 20;
const ROUTER_GROUPS: usize = 6;


pub type TestPeripherals =
    Peripherals<FakeRadio, FakeTimer, FakeRouter, FakeClock, FakeCountDown>;

/// Peripherals that let every operation succeed
///
/// The trigger timer reports its capture compare as soon as it is started.
pub fn peripherals() -> TestPeripherals {
    let mut trigger_timer = FakeTimer::default();
    trigger_timer.fire_on_start = Some(TRIGGER_CAPTURE_CC);

    Peripherals {
        radio:         FakeRadio::default(),
        sync_timer:    FakeTimer::default(),
        trigger_timer,
        slot_timer:    FakeTimer::default(),
        router:        FakeRouter::default(),
        clock:         FakeClock::default(),
        delay:         FakeCountDown::default(),
    }
}


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RadioMode {
    Disabled,
    Rx,
    Tx,
}

#[derive(Debug)]
pub struct FakeRadio {
    pub mode:               RadioMode,
    pub powered:            bool,
    pub link:               Option<LinkConfig>,
    pub shorts:             RadioShorts,
    pub configure_count:    u32,
    pub disable_count:      u32,
    pub stall_disable:      bool,
    pub disabled_event:     bool,
    pub end_event:          bool,
    pub crc_ok:             bool,
    pub interrupts_enabled: bool,
    pub rx_buffer:          [u8; PACKET_LEN],
    pub tx_buffer:          [u8; PACKET_LEN],
}

impl Default for FakeRadio {
    fn default() -> Self {
        FakeRadio {
            mode:               RadioMode::Disabled,
            powered:            false,
            link:               None,
            shorts:             RadioShorts::default(),
            configure_count:    0,
            disable_count:      0,
            stall_disable:      false,
            disabled_event:     false,
            end_event:          false,
            crc_ok:             false,
            interrupts_enabled: false,
            rx_buffer:          [0; PACKET_LEN],
            tx_buffer:          [0; PACKET_LEN],
        }
    }
}

impl Radio for FakeRadio {
    fn power_on(&mut self) {
        self.powered = true;
    }

    fn configure(&mut self, link: &LinkConfig) {
        self.link = Some(*link);
        self.configure_count += 1;
        self.interrupts_enabled = true;
    }

    fn set_shorts(&mut self, shorts: RadioShorts) {
        self.shorts = shorts;
    }

    fn start_rx(&mut self) {
        self.mode = RadioMode::Rx;
    }

    fn start_tx(&mut self) {
        self.mode = RadioMode::Tx;
    }

    fn disable(&mut self) {
        self.disable_count += 1;
        if self.stall_disable {
            return;
        }
        self.mode = RadioMode::Disabled;
        self.disabled_event = true;
    }

    fn is_receiving(&self) -> bool {
        self.mode == RadioMode::Rx
    }

    fn is_disabled_event(&self) -> bool {
        self.disabled_event
    }

    fn clear_disabled_event(&mut self) {
        self.disabled_event = false;
    }

    fn is_end_event(&self) -> bool {
        self.end_event
    }

    fn clear_end_event(&mut self) {
        self.end_event = false;
    }

    fn is_crc_ok(&self) -> bool {
        self.crc_ok
    }

    fn disable_interrupts(&mut self) {
        self.interrupts_enabled = false;
    }

    fn write_packet(&mut self, packet: &[u8; PACKET_LEN]) {
        self.tx_buffer = *packet;
    }

    fn read_packet(&self) -> [u8; PACKET_LEN] {
        self.rx_buffer
    }
}


#[derive(Debug, Default)]
pub struct FakeTimer {
    pub cc:            [u32; COMPARE_CHANNELS],
    pub events:        [bool; COMPARE_CHANNELS],
    pub interrupts:    [bool; COMPARE_CHANNELS],
    pub running:       bool,
    pub irq_unmasked:  bool,
    pub shorts:        TimerShorts,
    pub config:        Option<TimerConfig>,

    /// Compare event that is raised right away when the timer starts
    pub fire_on_start: Option<usize>,

    /// Suppresses `fire_on_start`
    pub stall:         bool,
}

impl Timer for FakeTimer {
    fn start(&mut self) {
        self.running = true;
        if let (Some(channel), false) = (self.fire_on_start, self.stall) {
            self.events[channel] = true;
        }
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn clear(&mut self) {}

    fn configure(&mut self, config: TimerConfig) {
        self.config = Some(config);
    }

    fn set_shorts(&mut self, shorts: TimerShorts) {
        self.shorts = shorts;
    }

    fn set_compare(&mut self, channel: usize, value: u32) {
        self.cc[channel] = value;
    }

    fn compare(&self, channel: usize) -> u32 {
        self.cc[channel]
    }

    fn is_compare_event(&self, channel: usize) -> bool {
        self.events[channel]
    }

    fn clear_compare_event(&mut self, channel: usize) {
        self.events[channel] = false;
    }

    fn enable_compare_interrupt(&mut self, channel: usize) {
        self.interrupts[channel] = true;
    }

    fn disable_compare_interrupts(&mut self) {
        self.interrupts = [false; COMPARE_CHANNELS];
    }

    fn is_compare_interrupt_enabled(&self, channel: usize) -> bool {
        self.interrupts[channel]
    }

    fn unmask_interrupt(&mut self) {
        self.irq_unmasked = true;
    }
}


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RouterCall {
    Connect(u8, Event, Task),
    Enable(u32),
    Disable(u32),
    SetGroup(u8, u32),
    DisableGroup(u8),
}

#[derive(Debug, Default)]
pub struct FakeRouter {
    pub calls:   Vec<RouterCall>,
    pub routes:  [Option<(Event, Task)>; ROUTER_CHANNELS],
    pub enabled: u32,
    pub groups:  [u32; ROUTER_GROUPS],
}

impl FakeRouter {
    pub fn route(&self, channel: u8) -> Option<(Event, Task)> {
        self.routes[channel as usize]
    }

    pub fn is_enabled(&self, channel: u8) -> bool {
        self.enabled & 1 << channel != 0
    }

    /// Raises `event` and returns the tasks of all enabled channels it is
    /// routed to
    ///
    /// Group disable tasks take effect after all channels have seen the
    /// event.
    pub fn fire(&mut self, event: Event) -> Vec<Task> {
        let tasks: Vec<Task> = (0..Self::CHANNELS)
            .filter(|&channel| self.is_enabled(channel))
            .filter_map(|channel| self.route(channel))
            .filter(|&(routed, _)| routed == event)
            .map(|(_, task)| task)
            .collect();

        for task in &tasks {
            if let Task::GroupDisable(group) = *task {
                self.enabled &= !self.groups[group as usize];
            }
        }

        tasks
    }
}

impl EventRouter for FakeRouter {
    const CHANNELS: u8 = ROUTER_CHANNELS as u8;
    const GROUPS: u8 = ROUTER_GROUPS as u8;

    fn connect(&mut self, channel: u8, event: Event, task: Task) {
        self.calls.push(RouterCall::Connect(channel, event, task));
        self.routes[channel as usize] = Some((event, task));
    }

    fn enable(&mut self, mask: u32) {
        self.calls.push(RouterCall::Enable(mask));
        self.enabled |= mask;
    }

    fn disable(&mut self, mask: u32) {
        self.calls.push(RouterCall::Disable(mask));
        self.enabled &= !mask;
    }

    fn set_group(&mut self, group: u8, mask: u32) {
        self.calls.push(RouterCall::SetGroup(group, mask));
        self.groups[group as usize] = mask;
    }

    fn disable_group(&mut self, group: u8) {
        self.calls.push(RouterCall::DisableGroup(group));
        self.enabled &= !self.groups[group as usize];
    }
}


#[derive(Debug, Default)]
pub struct FakeClock {
    pub counter:   u32,
    pub prescaler: u32,
}

impl ReferenceClock for FakeClock {
    fn counter(&self) -> u32 {
        self.counter
    }

    fn prescaler(&self) -> u32 {
        self.prescaler
    }
}


/// Counts down one unit per `wait` call
#[derive(Debug, Default)]
pub struct FakeCountDown {
    pub remaining: u32,
}

impl embedded_hal::timer::CountDown for FakeCountDown {
    type Time = u32;

    fn start<T>(&mut self, count: T)
        where T: Into<Self::Time>
    {
        self.remaining = count.into();
    }

    fn wait(&mut self) -> nb::Result<(), Void> {
        if self.remaining == 0 {
            return Ok(());
        }

        self.remaining -= 1;
        Err(nb::Error::WouldBlock)
    }
}


/// Status returned by [`FakeScheduler`] when a call is set up to fail
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Rejected;

#[derive(Debug)]
pub struct FakeScheduler {
    pub requests:          Vec<Request>,
    pub hf_clock_requests: u32,
    pub latency_requests:  u32,
    pub opened:            u32,
    pub closed:            u32,
    pub max_distance_us:   u32,
    pub reject_open:       bool,
    pub reject_request:    bool,
}

impl Default for FakeScheduler {
    fn default() -> Self {
        FakeScheduler {
            requests:          Vec::new(),
            hf_clock_requests: 0,
            latency_requests:  0,
            opened:            0,
            closed:            0,
            max_distance_us:   DEFAULT_MAX_DISTANCE_US,
            reject_open:       false,
            reject_request:    false,
        }
    }
}

impl Scheduler for FakeScheduler {
    type Error = Rejected;

    fn request_hf_clock(&mut self) -> Result<(), Self::Error> {
        self.hf_clock_requests += 1;
        Ok(())
    }

    fn set_constant_latency(&mut self) -> Result<(), Self::Error> {
        self.latency_requests += 1;
        Ok(())
    }

    fn open_session(&mut self) -> Result<(), Self::Error> {
        if self.reject_open {
            return Err(Rejected);
        }
        self.opened += 1;
        Ok(())
    }

    fn close_session(&mut self) -> Result<(), Self::Error> {
        self.closed += 1;
        Ok(())
    }

    fn request(&mut self, request: Request) -> Result<(), Self::Error> {
        if self.reject_request {
            return Err(Rejected);
        }
        self.requests.push(request);
        Ok(())
    }

    fn max_distance_us(&self) -> u32 {
        self.max_distance_us
    }
}
