//! `rppal` I2C master for Raspberry Pi class boards.

use ledreg_traits::{BoxError, I2cBus};
use rppal::i2c::I2c;

use crate::error::{HwError, Result};

pub struct LinuxI2c {
    i2c: I2c,
    selected: Option<u8>,
}

impl LinuxI2c {
    pub fn open(bus: u8) -> Result<Self> {
        let i2c = I2c::with_bus(bus).map_err(|e| HwError::Bus(format!("open i2c-{bus}: {e}")))?;
        Ok(Self {
            i2c,
            selected: None,
        })
    }

    fn select(&mut self, address: u8) -> Result<()> {
        if self.selected != Some(address) {
            self.i2c
                .set_slave_address(u16::from(address))
                .map_err(|e| HwError::Bus(e.to_string()))?;
            self.selected = Some(address);
        }
        Ok(())
    }
}

impl I2cBus for LinuxI2c {
    fn write(&mut self, address: u8, bytes: &[u8]) -> std::result::Result<(), BoxError> {
        self.select(address)?;
        self.i2c
            .write(bytes)
            .map_err(|_| HwError::NoDevice { address })?;
        Ok(())
    }

    fn read(&mut self, address: u8, buf: &mut [u8]) -> std::result::Result<(), BoxError> {
        self.select(address)?;
        self.i2c
            .read(buf)
            .map_err(|_| HwError::NoDevice { address })?;
        Ok(())
    }

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buf: &mut [u8],
    ) -> std::result::Result<(), BoxError> {
        self.select(address)?;
        self.i2c
            .write_read(bytes, buf)
            .map_err(|_| HwError::NoDevice { address })?;
        Ok(())
    }
}
