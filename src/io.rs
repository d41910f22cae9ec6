use crate::interrupt::UsbInterrupts;
use crate::tick::Ticks;
use crate::transport::VirtualComPort;
use usb_device::bus::UsbBus;
use usb_device::UsbError;

#[derive(Debug)]
pub struct Error(crate::Error);

impl From<crate::Error> for Error {
    fn from(e: crate::Error) -> Self {
        Self(e)
    }
}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0 {
            crate::Error::Usb(UsbError::Unsupported) => embedded_io::ErrorKind::Unsupported,
            crate::Error::Usb(
                UsbError::BufferOverflow
                | UsbError::EndpointOverflow
                | UsbError::EndpointMemoryOverflow,
            ) => embedded_io::ErrorKind::OutOfMemory,
            crate::Error::Timeout => embedded_io::ErrorKind::TimedOut,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl<B: UsbBus, I: UsbInterrupts, T: Ticks> embedded_io::ErrorType
    for &VirtualComPort<'_, B, I, T>
{
    type Error = Error;
}

impl<B: UsbBus, I: UsbInterrupts, T: Ticks> embedded_io::Read for &VirtualComPort<'_, B, I, T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        // We are required by `embedded-io` to block until at least one byte is read.
        buf[0] = loop {
            match self.getch() {
                Some(byte) => break byte,
                None => core::hint::spin_loop(),
            }
        };

        let mut count = 1;
        while count < buf.len() {
            match self.getch() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }

        Ok(count)
    }
}

impl<B: UsbBus, I: UsbInterrupts, T: Ticks> embedded_io::ReadReady
    for &VirtualComPort<'_, B, I, T>
{
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(self.available() != 0)
    }
}

impl<B: UsbBus, I: UsbInterrupts, T: Ticks> embedded_io::Write for &VirtualComPort<'_, B, I, T> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.send(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
