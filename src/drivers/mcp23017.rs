//! MCP23017 16-bit I²C GPIO expander.
//!
//! Only what the auxiliary loop needs: port A configured as outputs, port B
//! as inputs, and whole-port writes to the port A output register.  Register
//! addresses assume the power-on `IOCON.BANK = 0` layout.

use embedded_hal::i2c::{ErrorKind, I2c};
use log::{debug, info};

use crate::app::ports::BusExpanderPort;
use crate::error::BusError;

pub const REG_IODIRA: u8 = 0x00;
pub const REG_IODIRB: u8 = 0x01;
pub const REG_GPIOA: u8 = 0x12;

/// IODIR bit set = input.
const ALL_OUTPUTS: u8 = 0x00;
const ALL_INPUTS: u8 = 0xFF;

fn bus_error<E: embedded_hal::i2c::Error>(e: E) -> BusError {
    match e.kind() {
        ErrorKind::NoAcknowledge(_) => BusError::Nack,
        _ => BusError::Io,
    }
}

pub struct Mcp23017<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Mcp23017<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        self.i2c.write(self.address, &[register, value]).map_err(bus_error)
    }

    /// Port A all outputs, port B all inputs.
    pub fn init(&mut self) -> Result<(), BusError> {
        self.write_register(REG_IODIRA, ALL_OUTPUTS)?;
        self.write_register(REG_IODIRB, ALL_INPUTS)?;
        info!("MCP23017 @0x{:02X}: port A out, port B in", self.address);
        Ok(())
    }

    pub fn write_port_a(&mut self, value: u8) -> Result<(), BusError> {
        self.write_register(REG_GPIOA, value)
    }

    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> BusExpanderPort for Mcp23017<I2C> {
    fn write_outputs(&mut self, value: u8) -> Result<(), BusError> {
        self.write_port_a(value).inspect_err(|e| {
            debug!("MCP23017 @0x{:02X}: GPIOA write failed: {}", self.address, e);
        })
    }
}
