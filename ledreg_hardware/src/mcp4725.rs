//! MCP4725 12-bit DAC driving the transistor gate.
//!
//! Writes use the two-byte fast mode. The DAC register readback doubles as the
//! sense sample, so the diagnostic voltage reflects what the part is actually
//! outputting.

use ledreg_traits::{BoxError, Dac, I2cBus, SenseInput};
use tracing::trace;

use crate::error::HwError;

pub const DEFAULT_ADDRESS: u8 = 0x60;
pub const MAX_CODE: u16 = 0x0FFF;

pub struct Mcp4725<B> {
    bus: B,
    address: u8,
}

impl<B: I2cBus> Mcp4725<B> {
    pub fn new(bus: B, address: u8) -> Self {
        Self { bus, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current DAC register contents (not the EEPROM power-on value).
    pub fn read_code(&mut self) -> Result<u16, HwError> {
        let mut buf = [0u8; 5];
        self.bus
            .read(self.address, &mut buf)
            .map_err(|e| HwError::Bus(e.to_string()))?;
        Ok(decode_readback(&buf))
    }
}

/// Fast-mode write frame: power-down bits zero, then D11..D0.
pub fn fast_write_frame(code: u16) -> [u8; 2] {
    [((code >> 8) & 0x0F) as u8, (code & 0xFF) as u8]
}

/// Readback layout: status, D11..D4, D3..D0 in the high nibble, EEPROM x2.
pub fn decode_readback(buf: &[u8; 5]) -> u16 {
    (u16::from(buf[1]) << 4) | (u16::from(buf[2]) >> 4)
}

impl<B: I2cBus> Dac for Mcp4725<B> {
    fn set_output(&mut self, value: u16) -> Result<(), BoxError> {
        if value > MAX_CODE {
            return Err(HwError::CodeOutOfRange {
                code: value,
                max: MAX_CODE,
            }
            .into());
        }
        trace!(code = value, "mcp4725 write");
        self.bus
            .write(self.address, &fast_write_frame(value))
            .map_err(|e| HwError::Bus(e.to_string()).into())
    }
}

impl<B: I2cBus> SenseInput for Mcp4725<B> {
    fn read_raw(&mut self) -> Result<u16, BoxError> {
        Ok(self.read_code()?)
    }
}
