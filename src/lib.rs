//! Interrupt-driven USB virtual COM port (CDC-ACM) for [usb-device](https://crates.io/crates/usb-device).
//!
//! CDC-ACM is a USB class that's supported out of the box by most operating systems and shows up
//! on the host as a serial port. [`VirtualComPort`] runs entirely from the USB interrupts:
//! received packets are echoed back and queued in a 128 byte ring, and foreground code reads them
//! a byte at a time with [`getch`](VirtualComPort::getch) or a line at a time with
//! [`readln`](VirtualComPort::readln). [`send`](VirtualComPort::send) writes synchronously with a
//! per-packet timeout.
//!
//! The port only passes data once a terminal has opened it, signalled by the host asserting both
//! DTR and RTS. [`wait_for_connection`](VirtualComPort::wait_for_connection) blocks until then.
//!
//! Example
//! =======
//!
//! A full example requires the use of a hardware-driver, an interrupt setup and a tick source,
//! but the hardware independent part is as follows:
//!
//! ```no_run
//! # use usb_device::class_prelude::*;
//! # use embedded_hal::digital::v2::OutputPin;
//! # fn dummy<B: UsbBus, I: usbd_vcom::UsbInterrupts, P: OutputPin>(
//! #     usb_bus: &UsbBusAllocator<B>, lines: I, pull_up: &mut P) {
//! use core::fmt::Write;
//! use usbd_vcom::{DeviceConfig, TickCounter, Vector, VirtualComPort};
//!
//! static TICKS: TickCounter = TickCounter::new();
//! // SysTick handler: TICKS.increment();
//!
//! let port = VirtualComPort::new(usb_bus, lines, &TICKS);
//! let mut usb = port
//!     .bring_up(usb_bus, pull_up, &DeviceConfig::default())
//!     .expect("USB bring-up");
//! // Each USB interrupt handler calls `usb.on_interrupt(Vector::...)`.
//! # let _ = usb.on_interrupt(Vector::LowPriority);
//!
//! port.wait_for_connection();
//! port.send(b"Started\r\n").ok();
//!
//! let mut line = [0u8; 100];
//! let mut out = &port;
//! for n in 0u16.. {
//!     port.send(b"Enter something : ").ok();
//!     let len = port.readln(&mut line);
//!     let text = core::str::from_utf8(&line[..len]).unwrap_or("?");
//!     write!(out, "\r\nWe got '{}'\r\n{:04X}\r\n", text, n).ok();
//! }
//! # }
//! ```

#![no_std]

#[macro_use]
mod log;

mod buffer;
mod cdc_acm;
mod connection;
mod interrupt;
mod io;
mod tick;
mod transport;

#[cfg(test)]
mod test_support;

pub use crate::buffer::RingBuffer;
pub use crate::cdc_acm::*;
pub use crate::connection::{ConnectionState, ControlLineState};
pub use crate::interrupt::*;
pub use crate::tick::*;
pub use crate::transport::*;
pub use embedded_io;
pub use usb_device::UsbError;

/// Errors reported by the port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The USB stack reported an error.
    Usb(UsbError),
    /// A packet couldn't be sent within [`TX_TIMEOUT_TICKS`]. The rest of the data was dropped.
    Timeout,
    /// The pull-up control pin couldn't be driven.
    Pin,
    /// The USB stack rejected the [`DeviceConfig`].
    Config,
}

impl From<UsbError> for Error {
    fn from(e: UsbError) -> Self {
        Self::Usb(e)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
