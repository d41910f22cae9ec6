//! The USB interrupt lines
//!
//! The USB peripheral raises three interrupts: a wakeup line, a high priority line signalling
//! transmit completion, and a low priority line signalling received data. The transport only
//! ever masks, unmasks or re-prioritizes all three together, and every one of them is serviced
//! by the same poll of the USB device.

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;

/// Priority assigned to the USB lines during bring-up. Medium, on a 0x00-0xF0 scale.
pub const USB_IRQ_PRIORITY: u8 = 0x88;

/// One of the three USB interrupt vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Vector {
    /// Resume from suspend.
    Wakeup,
    /// High priority events, transmit complete.
    HighPriority,
    /// Low priority events, data received and control traffic.
    LowPriority,
}

impl Vector {
    pub const ALL: [Vector; 3] = [Vector::Wakeup, Vector::HighPriority, Vector::LowPriority];
}

/// Control over the USB interrupt lines.
///
/// Implementations act on all three lines at once. Masking must take effect immediately: the
/// transport relies on no USB interrupt firing between `disable()` and the next `enable()`.
pub trait UsbInterrupts {
    /// Unmask the three lines.
    fn enable(&self);
    /// Mask the three lines.
    fn disable(&self);
    /// Set the same priority on the three lines.
    fn set_priority(&self, priority: u8);
}

impl<T: UsbInterrupts + ?Sized> UsbInterrupts for &T {
    fn enable(&self) {
        (**self).enable()
    }
    fn disable(&self) {
        (**self).disable()
    }
    fn set_priority(&self, priority: u8) {
        (**self).set_priority(priority)
    }
}

/// [`UsbInterrupts`] backed by the Cortex-M NVIC.
///
/// `I` is the device crate's interrupt enum. For an STM32F1 that's
/// `USB_WAKEUP`, `USB_HP_CAN_TX` and `USB_LP_CAN_RX0`.
#[derive(Clone, Copy, Debug)]
pub struct NvicLines<I> {
    lines: [I; 3],
}

impl<I: InterruptNumber> NvicLines<I> {
    /// Lines in [`Vector`] order: wakeup, high priority, low priority.
    pub const fn new(wakeup: I, high_priority: I, low_priority: I) -> Self {
        Self {
            lines: [wakeup, high_priority, low_priority],
        }
    }

    /// The interrupt number behind `vector`.
    pub fn line(&self, vector: Vector) -> I {
        match vector {
            Vector::Wakeup => self.lines[0],
            Vector::HighPriority => self.lines[1],
            Vector::LowPriority => self.lines[2],
        }
    }
}

impl<I: InterruptNumber> UsbInterrupts for NvicLines<I> {
    fn enable(&self) {
        for vector in Vector::ALL {
            let line = self.line(vector);
            // Safety: the USB handlers only touch state designed to be shared with the
            // foreground through atomics.
            unsafe { NVIC::unmask(line) };
        }
    }

    fn disable(&self) {
        for vector in Vector::ALL {
            NVIC::mask(self.line(vector));
        }
    }

    fn set_priority(&self, priority: u8) {
        // Safety: we only write the priority registers of the lines we own. Changing priority
        // can't break a priority-based critical section here; the USB handlers never share a
        // lock with lower-priority code.
        let mut nvic = unsafe { cortex_m::Peripherals::steal() }.NVIC;
        for vector in Vector::ALL {
            unsafe { nvic.set_priority(self.line(vector), priority) };
        }
    }
}
