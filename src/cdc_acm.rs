use usb_device::class_prelude::*;
use usb_device::control::{Recipient, Request, RequestType};
use usb_device::Result;

use crate::connection::{Connection, ConnectionState, ControlLineState};

/// This should be used as `device_class` when building the `UsbDevice`.
pub const USB_CLASS_CDC: u8 = 0x02;

const USB_CLASS_CDC_DATA: u8 = 0x0a;
const CDC_SUBCLASS_ACM: u8 = 0x02;
const CDC_PROTOCOL_AT: u8 = 0x01;

const CS_INTERFACE: u8 = 0x24;
const CDC_TYPE_HEADER: u8 = 0x00;
const CDC_TYPE_CALL_MANAGEMENT: u8 = 0x01;
const CDC_TYPE_ACM: u8 = 0x02;
const CDC_TYPE_UNION: u8 = 0x06;

pub const REQ_SET_LINE_CODING: u8 = 0x20;
pub const REQ_GET_LINE_CODING: u8 = 0x21;
pub const REQ_SET_CONTROL_LINE_STATE: u8 = 0x22;

/// Max packet size of the notification endpoint. Nothing is ever sent on it.
const NOTIFY_PACKET_SIZE: u16 = 16;
const NOTIFY_INTERVAL: u8 = 255;

/// Number of stop bits for LineCoding
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StopBits {
    /// 1 stop bit
    One = 0,

    /// 1.5 stop bits
    OnePointFive = 1,

    /// 2 stop bits
    Two = 2,
}

/// Parity for LineCoding
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParityType {
    None = 0,
    Odd = 1,
    Even = 2,
    Mark = 3,
    Space = 4,
}

/// Line coding parameters
///
/// This is provided by the host for specifying the standard UART parameters such as baud rate.
/// Can be ignored if you don't plan to interface with a physical UART, and this port never
/// applies what the host asks for: it always reports [`LINE_CODING`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineCoding {
    stop_bits: StopBits,
    data_bits: u8,
    parity_type: ParityType,
    data_rate: u32,
}

impl LineCoding {
    /// Size of the record on the wire.
    pub const SIZE: usize = 7;

    /// Gets the number of stop bits for UART communication.
    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }

    /// Gets the number of data bits for UART communication.
    pub fn data_bits(&self) -> u8 {
        self.data_bits
    }

    /// Gets the parity type for UART communication.
    pub fn parity_type(&self) -> ParityType {
        self.parity_type
    }

    /// Gets the data rate in bits per second for UART communication.
    pub fn data_rate(&self) -> u32 {
        self.data_rate
    }

    /// Wire format: dwDTERate (LE), bCharFormat, bParityType, bDataBits.
    pub const fn to_bytes(&self) -> [u8; Self::SIZE] {
        let rate = self.data_rate.to_le_bytes();
        [
            rate[0],
            rate[1],
            rate[2],
            rate[3],
            self.stop_bits as u8,
            self.parity_type as u8,
            self.data_bits,
        ]
    }
}

/// 115200 baud, 8 data bits, no parity, 1 stop bit.
pub const LINE_CODING: LineCoding = LineCoding {
    stop_bits: StopBits::One,
    data_bits: 8,
    parity_type: ParityType::None,
    data_rate: 115_200,
};

static LINE_CODING_BYTES: [u8; LineCoding::SIZE] = LINE_CODING.to_bytes();

/// What the class did with a control request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestOutcome {
    /// Accepted with no data to return.
    Handled,
    /// Accepted; send these bytes back in the data stage.
    Reply(&'static [u8]),
    /// Not supported, or malformed. The control pipe stalls.
    NotSupported,
}

/// Packet level implementation of a CDC-ACM serial port.
///
/// Owns the two interfaces and three endpoints of the port and answers its class requests. The
/// only state a request can change is the connection flag.
pub struct CdcAcmClass<'a, B: UsbBus> {
    comm_if: InterfaceNumber,
    comm_ep: EndpointIn<'a, B>,
    data_if: InterfaceNumber,
    read_ep: EndpointOut<'a, B>,
    write_ep: EndpointIn<'a, B>,
    connection: Connection,
}

impl<'a, B: UsbBus> CdcAcmClass<'a, B> {
    /// Creates a new CdcAcmClass with the provided UsbBus and max_packet_size in bytes. For
    /// full-speed devices, max_packet_size has to be one of 8, 16, 32 or 64.
    pub fn new(alloc: &'a UsbBusAllocator<B>, max_packet_size: u16) -> CdcAcmClass<'a, B> {
        CdcAcmClass {
            comm_if: alloc.interface(),
            comm_ep: alloc.interrupt(NOTIFY_PACKET_SIZE, NOTIFY_INTERVAL),
            data_if: alloc.interface(),
            read_ep: alloc.bulk(max_packet_size),
            write_ep: alloc.bulk(max_packet_size),
            connection: Connection::new(),
        }
    }

    /// Gets the maximum packet size in bytes.
    pub fn max_packet_size(&self) -> u16 {
        // The size is the same for both endpoints.
        self.read_ep.max_packet_size()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Writes a single packet into the IN endpoint.
    pub fn write_packet(&self, data: &[u8]) -> Result<usize> {
        self.write_ep.write(data)
    }

    /// Reads a single packet from the OUT endpoint.
    pub fn read_packet(&self, data: &mut [u8]) -> Result<usize> {
        self.read_ep.read(data)
    }

    pub(crate) fn read_address(&self) -> EndpointAddress {
        self.read_ep.address()
    }

    /// Class requests addressed to our communication interface.
    fn is_ours(&self, req: &Request) -> bool {
        req.request_type == RequestType::Class
            && req.recipient == Recipient::Interface
            && req.index == u8::from(self.comm_if) as u16
    }

    /// Dispatches a class request on its `bRequest` code. `data` is the OUT data stage, empty
    /// for IN requests.
    pub fn handle_request(&self, req: &Request, data: &[u8]) -> RequestOutcome {
        match req.request {
            REQ_SET_CONTROL_LINE_STATE => {
                self.connection
                    .update(ControlLineState::from_value(req.value));
                RequestOutcome::Handled
            }
            REQ_SET_LINE_CODING => {
                if data.len() < LineCoding::SIZE {
                    warn!("SET_LINE_CODING short payload {}", data.len());
                    return RequestOutcome::NotSupported;
                }
                // Accepted, but the line coding is fixed.
                RequestOutcome::Handled
            }
            REQ_GET_LINE_CODING => RequestOutcome::Reply(&LINE_CODING_BYTES),
            _ => {
                warn!("unsupported CDC request {=u8:#x}", req.request);
                RequestOutcome::NotSupported
            }
        }
    }

    pub fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> Result<()> {
        writer.interface(
            self.comm_if,
            USB_CLASS_CDC,
            CDC_SUBCLASS_ACM,
            CDC_PROTOCOL_AT,
        )?;

        writer.write(
            CS_INTERFACE,
            &[
                CDC_TYPE_HEADER, // bDescriptorSubtype
                0x10,
                0x01, // bcdCDC (1.10)
            ],
        )?;

        writer.write(
            CS_INTERFACE,
            &[
                CDC_TYPE_CALL_MANAGEMENT, // bDescriptorSubtype
                0x00,                     // bmCapabilities
                self.data_if.into(),      // bDataInterface
            ],
        )?;

        writer.write(
            CS_INTERFACE,
            &[
                CDC_TYPE_ACM, // bDescriptorSubtype
                0x00,         // bmCapabilities
            ],
        )?;

        writer.write(
            CS_INTERFACE,
            &[
                CDC_TYPE_UNION,      // bDescriptorSubtype
                self.comm_if.into(), // bControlInterface
                self.data_if.into(), // bSubordinateInterface
            ],
        )?;

        writer.endpoint(&self.comm_ep)?;

        writer.interface(self.data_if, USB_CLASS_CDC_DATA, 0x00, 0x00)?;

        writer.endpoint(&self.read_ep)?;
        writer.endpoint(&self.write_ep)?;

        Ok(())
    }

    pub fn control_in(&self, xfer: ControlIn<B>) {
        let req = *xfer.request();
        if !self.is_ours(&req) {
            return;
        }

        match self.handle_request(&req, &[]) {
            RequestOutcome::Reply(data) => xfer.accept_with_static(data).ok(),
            RequestOutcome::Handled => xfer.accept_with(&[]).ok(),
            RequestOutcome::NotSupported => xfer.reject().ok(),
        };
    }

    pub fn control_out(&self, xfer: ControlOut<B>) {
        let req = *xfer.request();
        if !self.is_ours(&req) {
            return;
        }

        match self.handle_request(&req, xfer.data()) {
            RequestOutcome::Handled => xfer.accept().ok(),
            RequestOutcome::Reply(_) | RequestOutcome::NotSupported => xfer.reject().ok(),
        };
    }
}
