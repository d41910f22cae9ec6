//! Host-side stand-ins for the hardware the transport talks to

extern crate std;

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::vec::Vec;

use usb_device::bus::{PollResult, UsbBus};
use usb_device::endpoint::{EndpointAddress, EndpointType};
use usb_device::{Result, UsbDirection, UsbError};

use crate::interrupt::UsbInterrupts;
use crate::tick::Ticks;

#[derive(Default)]
pub struct BusState {
    next_index: [u8; 2],
    /// Packets waiting to be read, per OUT endpoint.
    pub pending: VecDeque<(EndpointAddress, Vec<u8>)>,
    /// Packets accepted by `write`, in order.
    pub written: Vec<(EndpointAddress, Vec<u8>)>,
    pub write_attempts: usize,
    /// Number of upcoming writes that report `WouldBlock`.
    pub busy_for: usize,
    /// Every write reports `WouldBlock`.
    pub always_busy: bool,
    /// Every write fails with this error.
    pub fail_with: Option<UsbError>,
    /// SETUP packet waiting on EP0.
    setup: Option<[u8; 8]>,
    /// Endpoints currently stalled.
    pub stalled: Vec<EndpointAddress>,
}

/// A `UsbBus` that records writes and serves queued reads.
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

#[derive(Clone)]
pub struct BusHandle(Arc<Mutex<BusState>>);

impl BusHandle {
    pub fn lock(&self) -> MutexGuard<'_, BusState> {
        self.0.lock().unwrap()
    }

    pub fn queue_packet(&self, ep: EndpointAddress, data: &[u8]) {
        self.lock().pending.push_back((ep, data.to_vec()));
    }

    pub fn written(&self) -> Vec<(EndpointAddress, Vec<u8>)> {
        self.lock().written.clone()
    }

    /// Queues a SETUP packet and its OUT data stage on EP0. Like the hardware, a new SETUP
    /// clears any stall left on EP0.
    pub fn queue_setup(&self, setup: [u8; 8], data: &[u8]) {
        let mut state = self.lock();
        state.setup = Some(setup);
        state.stalled.retain(|ep| ep.index() != 0);
        if !data.is_empty() {
            state.pending.push_back((ep0_out(), data.to_vec()));
        }
    }
}

pub fn ep0_out() -> EndpointAddress {
    EndpointAddress::from_parts(0, UsbDirection::Out)
}

pub fn ep0_in() -> EndpointAddress {
    EndpointAddress::from_parts(0, UsbDirection::In)
}

impl MockBus {
    pub fn new() -> (Self, BusHandle) {
        let state = Arc::new(Mutex::new(BusState::default()));
        (
            MockBus {
                state: state.clone(),
            },
            BusHandle(state),
        )
    }
}

impl UsbBus for MockBus {
    fn alloc_ep(
        &mut self,
        ep_dir: UsbDirection,
        ep_addr: Option<EndpointAddress>,
        _ep_type: EndpointType,
        _max_packet_size: u16,
        _interval: u8,
    ) -> Result<EndpointAddress> {
        if let Some(addr) = ep_addr {
            return Ok(EndpointAddress::from_parts(addr.index(), ep_dir));
        }
        let mut state = self.state.lock().unwrap();
        let slot = &mut state.next_index[(ep_dir == UsbDirection::In) as usize];
        *slot += 1;
        Ok(EndpointAddress::from_parts(*slot as usize, ep_dir))
    }

    fn enable(&mut self) {}

    fn reset(&self) {}

    fn set_device_address(&self, _addr: u8) {}

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        state.write_attempts += 1;
        if let Some(err) = state.fail_with {
            return Err(err);
        }
        if state.always_busy {
            return Err(UsbError::WouldBlock);
        }
        if state.busy_for > 0 {
            state.busy_for -= 1;
            return Err(UsbError::WouldBlock);
        }
        state.written.push((ep_addr, buf.to_vec()));
        Ok(buf.len())
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        if ep_addr == ep0_out() {
            if let Some(setup) = state.setup.take() {
                buf[..setup.len()].copy_from_slice(&setup);
                return Ok(setup.len());
            }
        }
        let pos = state
            .pending
            .iter()
            .position(|(addr, _)| *addr == ep_addr)
            .ok_or(UsbError::WouldBlock)?;
        let (_, packet) = state.pending.remove(pos).unwrap();
        if packet.len() > buf.len() {
            return Err(UsbError::BufferOverflow);
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }

    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool) {
        let mut state = self.state.lock().unwrap();
        state.stalled.retain(|ep| *ep != ep_addr);
        if stalled {
            state.stalled.push(ep_addr);
        }
    }

    fn is_stalled(&self, ep_addr: EndpointAddress) -> bool {
        self.state.lock().unwrap().stalled.contains(&ep_addr)
    }

    fn suspend(&self) {}

    fn resume(&self) {}

    /// Reports EP0 traffic only; bulk packets are delivered by calling `endpoint_out` directly.
    fn poll(&self) -> PollResult {
        let state = self.state.lock().unwrap();
        if state.setup.is_some() {
            PollResult::Data {
                ep_out: 0,
                ep_in_complete: 0,
                ep_setup: 1,
            }
        } else if state.pending.iter().any(|(ep, _)| *ep == ep0_out()) {
            PollResult::Data {
                ep_out: 1,
                ep_in_complete: 0,
                ep_setup: 0,
            }
        } else {
            PollResult::None
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqEvent {
    Enable,
    Disable,
    Priority(u8),
}

/// Interrupt lines that record what the transport asked for.
#[derive(Default)]
pub struct MockInterrupts {
    pub events: RefCell<Vec<IrqEvent>>,
}

impl MockInterrupts {
    pub fn is_enabled(&self) -> bool {
        self.events
            .borrow()
            .iter()
            .rev()
            .find(|event| matches!(event, IrqEvent::Enable | IrqEvent::Disable))
            == Some(&IrqEvent::Enable)
    }

    pub fn count(&self, event: IrqEvent) -> usize {
        self.events.borrow().iter().filter(|e| **e == event).count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl UsbInterrupts for MockInterrupts {
    fn enable(&self) {
        self.events.borrow_mut().push(IrqEvent::Enable);
    }
    fn disable(&self) {
        self.events.borrow_mut().push(IrqEvent::Disable);
    }
    fn set_priority(&self, priority: u8) {
        self.events.borrow_mut().push(IrqEvent::Priority(priority));
    }
}

/// A tick source that advances by one on every read.
pub struct StepTicks {
    now: Cell<u32>,
}

impl StepTicks {
    pub fn starting_at(now: u32) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    /// Current value, without advancing.
    pub fn peek(&self) -> u32 {
        self.now.get()
    }
}

impl Ticks for StepTicks {
    fn now(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        now
    }
}

/// An output pin that records its level changes with the tick they happened at.
pub struct RecordingPin<'t> {
    ticks: &'t StepTicks,
    pub changes: Vec<(bool, u32)>,
}

impl<'t> RecordingPin<'t> {
    pub fn new(ticks: &'t StepTicks) -> Self {
        Self {
            ticks,
            changes: Vec::new(),
        }
    }
}

impl embedded_hal::digital::v2::OutputPin for RecordingPin<'_> {
    type Error = core::convert::Infallible;

    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        self.changes.push((false, self.ticks.peek()));
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        self.changes.push((true, self.ticks.peek()));
        Ok(())
    }
}
