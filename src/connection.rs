//! Host connection tracking driven by SET_CONTROL_LINE_STATE

use core::sync::atomic::{AtomicBool, Ordering};

/// The DTR and RTS bits a host sends with SET_CONTROL_LINE_STATE.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControlLineState {
    /// Data terminal ready, bit 0 of the request value
    pub dtr: bool,
    /// Request to send, bit 1 of the request value
    pub rts: bool,
}

impl ControlLineState {
    const DTR: u16 = 1 << 0;
    const RTS: u16 = 1 << 1;

    /// Decodes the `wValue` field of a SET_CONTROL_LINE_STATE request.
    pub const fn from_value(value: u16) -> Self {
        Self {
            dtr: value & Self::DTR != 0,
            rts: value & Self::RTS != 0,
        }
    }

    /// The state a port moves to when the host sends these lines.
    pub const fn connection(&self) -> ConnectionState {
        if self.dtr && self.rts {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    /// No terminal is attached, or it dropped DTR or RTS.
    #[default]
    Disconnected,
    /// A terminal asserted both DTR and RTS.
    Connected,
}

/// Connection flag shared between the control handler and foreground code.
pub(crate) struct Connection {
    connected: AtomicBool,
}

impl Connection {
    pub(crate) const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        if self.connected.load(Ordering::Acquire) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Applies new control lines, returning the resulting state.
    pub(crate) fn update(&self, lines: ControlLineState) -> ConnectionState {
        let next = lines.connection();
        let was = self
            .connected
            .swap(next == ConnectionState::Connected, Ordering::AcqRel);

        if was != (next == ConnectionState::Connected) {
            debug!("CONNECTION {} DTR={} RTS={}", next, lines.dtr, lines.rts);
        }

        next
    }
}
