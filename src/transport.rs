use core::fmt;

use embedded_hal::digital::v2::OutputPin;
use usb_device::class_prelude::*;
use usb_device::prelude::*;

use crate::buffer::RingBuffer;
use crate::cdc_acm::{CdcAcmClass, LineCoding, LINE_CODING, USB_CLASS_CDC};
use crate::connection::ConnectionState;
use crate::interrupt::{UsbInterrupts, Vector, USB_IRQ_PRIORITY};
use crate::tick::Ticks;
use crate::{Error, Result};

/// Capacity of the receive ring in bytes.
pub const RX_BUFFER_SIZE: usize = 128;

/// Max packet size of the bulk endpoints, and the largest chunk `send` hands to the hardware.
pub const MAX_PACKET_SIZE: u16 = 64;

/// How long one chunk may wait for the IN endpoint before `send` gives up.
pub const TX_TIMEOUT_TICKS: u32 = 50;

/// Delay after the host asserts DTR and RTS, letting its driver finish attaching.
pub const CONNECT_SETTLE_TICKS: u32 = 100;

/// How long the pull-up line is held low to force the host to re-enumerate.
pub const RESCAN_TICKS: u32 = 200;

/// Numeric end-of-input marker returned by [`VirtualComPort::getch_raw`].
pub const EOF: i32 = -1;

/// Identity the device enumerates with.
#[derive(Clone, Copy, Debug)]
pub struct DeviceConfig {
    pub vid: u16,
    pub pid: u16,
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: &'static str,
    /// Bus power drawn, in mA.
    pub max_power_ma: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vid: 0x0483,
            pid: 0x5740,
            manufacturer: "Stenlund Open Source Group",
            product: "STM32 Simple Framework",
            serial_number: "1",
            max_power_ma: 100,
        }
    }
}

/// An interrupt-driven USB virtual COM port.
///
/// The port is the context shared by foreground code and the USB interrupt handlers. Every
/// operation takes `&self`: received bytes sit in a lock-free ring and the connection flag is
/// atomic. Put the port somewhere `'static` and hand its [`UsbInterruptHandler`] to the
/// interrupt side.
///
/// Received data is echoed back to the host as it arrives, then queued for [`getch`] and
/// [`readln`]. When the ring is full the oldest bytes are dropped.
///
/// [`getch`]: VirtualComPort::getch
/// [`readln`]: VirtualComPort::readln
pub struct VirtualComPort<'a, B: UsbBus, I, T> {
    class: CdcAcmClass<'a, B>,
    rx: RingBuffer<RX_BUFFER_SIZE>,
    interrupts: I,
    ticks: T,
}

impl<'a, B, I, T> VirtualComPort<'a, B, I, T>
where
    B: UsbBus,
    I: UsbInterrupts,
    T: Ticks,
{
    /// Allocates the port's interfaces and endpoints.
    ///
    /// Call this before building any `UsbDevice` on `alloc`.
    pub fn new(alloc: &'a UsbBusAllocator<B>, interrupts: I, ticks: T) -> Self {
        VirtualComPort {
            class: CdcAcmClass::new(alloc, MAX_PACKET_SIZE),
            rx: RingBuffer::new(),
            interrupts,
            ticks,
        }
    }

    /// Brings the port onto the bus.
    ///
    /// Holds `pull_up` low long enough for the host to see a disconnect, builds the USB device,
    /// then prioritizes and unmasks the USB interrupts. From then on the returned handler must
    /// be invoked from each of the three USB vectors.
    ///
    /// Requires the system clocks and tick source to be running already.
    pub fn bring_up<'p, P: OutputPin>(
        &'p self,
        alloc: &'a UsbBusAllocator<B>,
        pull_up: &mut P,
        config: &DeviceConfig,
    ) -> Result<UsbInterruptHandler<'p, 'a, B, I, T>> {
        trigger_rescan(pull_up, &self.ticks)?;

        let device = UsbDeviceBuilder::new(alloc, UsbVidPid(config.vid, config.pid))
            .strings(&[StringDescriptors::new(LangID::EN)
                .manufacturer(config.manufacturer)
                .product(config.product)
                .serial_number(config.serial_number)])
            .map_err(|_| Error::Config)?
            .device_class(USB_CLASS_CDC)
            .max_packet_size_0(64)
            .map_err(|_| Error::Config)?
            .max_power(config.max_power_ma)
            .map_err(|_| Error::Config)?
            .build();
        debug!("USB device built {=u16:#x}:{=u16:#x}", config.vid, config.pid);

        self.interrupts.set_priority(USB_IRQ_PRIORITY);
        self.interrupts.enable();

        Ok(UsbInterruptHandler { device, port: self })
    }

    /// Spins until a terminal asserts DTR and RTS, then waits for the host to settle.
    ///
    /// There is no timeout; without a host this never returns.
    pub fn wait_for_connection(&self) {
        while !self.is_connected() {
            core::hint::spin_loop();
        }
        self.ticks.wait(CONNECT_SETTLE_TICKS);
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.class.connection_state()
    }

    /// The line coding reported to the host. Never changes.
    pub fn line_coding(&self) -> &'static LineCoding {
        &LINE_CODING
    }

    /// Number of received bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.rx.len()
    }

    /// Takes one received byte, or `None` if nothing is waiting. Never blocks.
    pub fn getch(&self) -> Option<u8> {
        self.rx.pop()
    }

    /// Like [`getch`](VirtualComPort::getch), returning [`EOF`] when nothing is waiting.
    pub fn getch_raw(&self) -> i32 {
        self.getch().map_or(EOF, i32::from)
    }

    /// Reads a line terminated by a carriage return into `buf`.
    ///
    /// Spins until a CR arrives or `buf` is full. The CR is consumed but not stored, and the
    /// line is NUL terminated, so at most `buf.len() - 1` bytes are stored. A line longer than
    /// that is cut short; the rest stays queued for the next read. LF is ordinary data.
    ///
    /// Returns the number of bytes stored before the NUL.
    pub fn readln(&self, buf: &mut [u8]) -> usize {
        let limit = match buf.len().checked_sub(1) {
            Some(limit) => limit,
            None => return 0,
        };

        let mut count = 0;
        while count < limit {
            match self.rx.pop() {
                Some(b'\r') => break,
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => core::hint::spin_loop(),
            }
        }

        buf[count] = 0;
        count
    }

    /// Sends `data` to the host in packet sized chunks.
    ///
    /// Each chunk gets [`TX_TIMEOUT_TICKS`] to find the IN endpoint free. USB interrupts are
    /// masked while sending, but briefly unmasked on every retry so reception and bus events keep
    /// being serviced. On timeout the remaining chunks are abandoned and [`Error::Timeout`] is
    /// returned; how much of `data` reached the host is unknown.
    ///
    /// The USB interrupts are unmasked when this returns.
    pub fn send(&self, data: &[u8]) -> Result<()> {
        self.interrupts.disable();
        let result = self.send_chunks(data);
        self.interrupts.enable();
        result
    }

    fn send_chunks(&self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(usize::from(self.class.max_packet_size())) {
            let start = self.ticks.now();

            loop {
                match self.class.write_packet(chunk) {
                    Ok(_) => break,
                    Err(UsbError::WouldBlock) => {}
                    Err(err) => return Err(err.into()),
                }

                if self.ticks.elapsed_since(start) > TX_TIMEOUT_TICKS {
                    warn!("TX timeout with {=usize} bytes queued", data.len());
                    return Err(Error::Timeout);
                }

                // Let pending USB interrupts run.
                self.interrupts.enable();
                self.interrupts.disable();
            }
        }

        Ok(())
    }

    /// Called for each packet on the OUT endpoint, in interrupt context.
    fn receive_packet(&self) {
        self.interrupts.disable();

        let mut buf = [0u8; MAX_PACKET_SIZE as usize];
        match self.class.read_packet(&mut buf) {
            Ok(count) if count > 0 => {
                let packet = &buf[..count];

                // The echo is best effort; a busy IN endpoint loses it.
                self.class.write_packet(packet).ok();

                let mut dropped = 0usize;
                for &byte in packet {
                    if self.rx.push(byte) {
                        dropped += 1;
                    }
                }
                if dropped > 0 {
                    trace!("RX overflow, dropped {=usize}", dropped);
                }
            }
            _ => {}
        }

        self.interrupts.enable();
    }
}

/// Forces the host to re-enumerate by pulling the D+ pull-up control line low for a while.
fn trigger_rescan<P: OutputPin, T: Ticks>(pull_up: &mut P, ticks: &T) -> Result<()> {
    debug!("forcing re-enumeration");
    pull_up.set_low().map_err(|_| Error::Pin)?;
    ticks.wait(RESCAN_TICKS);
    pull_up.set_high().map_err(|_| Error::Pin)
}

impl<B, I, T> UsbClass<B> for &VirtualComPort<'_, B, I, T>
where
    B: UsbBus,
    I: UsbInterrupts,
    T: Ticks,
{
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        self.class.get_configuration_descriptors(writer)
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        self.class.control_in(xfer);
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        self.class.control_out(xfer);
    }

    fn endpoint_out(&mut self, addr: EndpointAddress) {
        if addr == self.class.read_address() {
            self.receive_packet();
        }
    }
}

/// The interrupt side of a [`VirtualComPort`].
///
/// Owns the USB device. Bind each USB vector to [`on_interrupt`](UsbInterruptHandler::on_interrupt);
/// every vector polls the device, which in turn delivers received packets and control requests
/// to the port.
///
/// ```no_run
/// # use usbd_vcom::{UsbInterruptHandler, Vector};
/// # fn handler<B: usb_device::bus::UsbBus, I: usbd_vcom::UsbInterrupts, T: usbd_vcom::Ticks>(
/// #     usb: &mut UsbInterruptHandler<'_, '_, B, I, T>) {
/// // #[interrupt] fn USB_LP_CAN_RX0() { ... }
/// usb.on_interrupt(Vector::LowPriority);
/// # }
/// ```
pub struct UsbInterruptHandler<'p, 'a, B: UsbBus, I, T> {
    device: UsbDevice<'a, B>,
    port: &'p VirtualComPort<'a, B, I, T>,
}

impl<'p, 'a, B, I, T> UsbInterruptHandler<'p, 'a, B, I, T>
where
    B: UsbBus,
    I: UsbInterrupts,
    T: Ticks,
{
    /// Services `vector`. Returns `true` if the port may have new data or state.
    pub fn on_interrupt(&mut self, vector: Vector) -> bool {
        match vector {
            Vector::Wakeup | Vector::HighPriority | Vector::LowPriority => self.poll(),
        }
    }

    /// Polls the USB device once.
    pub fn poll(&mut self) -> bool {
        let mut port = self.port;
        self.device.poll(&mut [&mut port])
    }

    pub fn state(&self) -> UsbDeviceState {
        self.device.state()
    }

    pub fn port(&self) -> &'p VirtualComPort<'a, B, I, T> {
        self.port
    }
}

/// Formatted output, sent with [`VirtualComPort::send`].
impl<B, I, T> fmt::Write for &VirtualComPort<'_, B, I, T>
where
    B: UsbBus,
    I: UsbInterrupts,
    T: Ticks,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.send(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

impl<B, I, T> embedded_hal::serial::Write<u8> for &VirtualComPort<'_, B, I, T>
where
    B: UsbBus,
    I: UsbInterrupts,
    T: Ticks,
{
    type Error = Error;

    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        self.send(core::slice::from_ref(&word))
            .map_err(nb::Error::Other)
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        // `send` returns once the data is handed to the endpoint.
        Ok(())
    }
}

impl<B, I, T> embedded_hal::blocking::serial::write::Default<u8> for &VirtualComPort<'_, B, I, T>
where
    B: UsbBus,
    I: UsbInterrupts,
    T: Ticks,
{
}

impl<B, I, T> embedded_hal::serial::Read<u8> for &VirtualComPort<'_, B, I, T>
where
    B: UsbBus,
    I: UsbInterrupts,
    T: Ticks,
{
    type Error = Error;

    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        self.getch().ok_or(nb::Error::WouldBlock)
    }
}
