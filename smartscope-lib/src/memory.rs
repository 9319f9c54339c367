//! Register staging for the scope memories
//!
//! A `Memory` holds a shadow copy of every register of
//! one hardware memory. Settings are staged with `set`
//! and go out in one batch with `commit`, after which
//! the caller toggles the `SCOPE_UPDATE` strobe so the
//! FPGA applies the whole batch at once.
//!
//! Registers which have to act instantly (reset, force
//! trigger, acquisition start/stop) bypass the staging
//! with `write_immediate`.

use std::fmt;

use crate::constants::{
  FPGA_I2C_ADDRESS_SETTINGS,
  FPGA_I2C_ADDRESS_ROM,
};
use crate::errors::ScopeError;
use crate::interface::ScopeInterface;
use crate::protocol::Controller;
use crate::registers::{
  HardwareRevision,
  RegisterKey,
  RomRegister,
  SettingsRegister,
  address_table,
};
use crate::transport::Transport;

/// A single register and its staging state
#[derive(Debug, Clone, PartialEq)]
pub struct Register {
  pub address   : u32,
  pub name      : &'static str,
  pub max_value : u8,
  /// Last value known to be on the hardware
  committed     : u8,
  /// Next value to write
  shadow        : u8,
  dirty         : bool,
}

impl Register {

  pub fn new(address : u32, name : &'static str, max_value : u8) -> Self {
    Self {
      address,
      name,
      max_value,
      committed : 0,
      shadow    : 0,
      dirty     : false,
    }
  }

  pub fn get(&self) -> u8 {
    self.shadow
  }

  pub fn committed(&self) -> u8 {
    self.committed
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  fn stage(&mut self, value : u8) -> Result<(), ScopeError> {
    if value > self.max_value {
      error!("Value {} exceeds the maximum {} of register {}!", value, self.max_value, self.name);
      return Err(ScopeError::ValueOutOfRange);
    }
    self.shadow = value;
    self.dirty  = self.shadow != self.committed;
    Ok(())
  }

  fn mark_committed(&mut self, value : u8) {
    self.committed = value;
    self.shadow    = value;
    self.dirty     = false;
  }
}

impl fmt::Display for Register {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = format!("<Register {} [0x{:02x}] : {}", self.name, self.address, self.shadow);
    if self.dirty {
      repr += &format!(" (committed {})", self.committed);
    }
    write!(f, "{}>", repr)
  }
}

/// How the registers of a memory reach the hardware
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum WriteStrategy {
  /// Register `n` lives at `base + n` on the controller
  Direct { controller : Controller, base : u32 },
  /// Single bit registers. They are written as
  /// `(n << 1) | value` into the `update` register on the
  /// FPGA bus and read back from bit `n % 8` of the byte at
  /// `readback + n / 8`
  Strobe { update : u32, readback : u32 },
}

/// An ordered collection of registers bound to one controller
#[derive(Debug, Clone)]
pub struct Memory {
  pub name  : String,
  strategy  : WriteStrategy,
  writable  : bool,
  registers : Vec<Register>,
}

impl Memory {

  pub fn new(name : &str, strategy : WriteStrategy, registers : Vec<Register>) -> Self {
    Self {
      name      : String::from(name),
      strategy,
      writable  : true,
      registers,
    }
  }

  /// Build a memory from the address table of a
  /// hardware revision
  pub fn from_keys<K: RegisterKey>(name     : &str,
                                   strategy : WriteStrategy,
                                   revision : HardwareRevision) -> Self {
    let registers = address_table::<K>(revision).into_iter()
      .map(|(k, address)| Register::new(address, k.name(), k.max_value()))
      .collect();
    Self::new(name, strategy, registers)
  }

  /// The FPGA settings memory (bus 0x0C)
  pub fn fpga_settings(revision : HardwareRevision) -> Self {
    let strategy = WriteStrategy::Direct {
      controller : Controller::FpgaBus,
      base       : (FPGA_I2C_ADDRESS_SETTINGS as u32) << 8,
    };
    Self::from_keys::<SettingsRegister>("FpgaSettings", strategy, revision)
  }

  /// The FPGA strobes, written through `STROBE_UPDATE`
  /// and read back from the ROM
  pub fn fpga_strobes(revision : HardwareRevision) -> Result<Self, ScopeError> {
    let update = SettingsRegister::StrobeUpdate.address(revision).ok_or(ScopeError::UnknownRegister)?;
    let readback = RomRegister::Strobes.address(revision).ok_or(ScopeError::UnknownRegister)?;
    let strategy = WriteStrategy::Strobe {
      update   : ((FPGA_I2C_ADDRESS_SETTINGS as u32) << 8) + update,
      readback : ((FPGA_I2C_ADDRESS_ROM as u32) << 8) + readback,
    };
    Ok(Self::from_keys::<crate::registers::Strobe>("FpgaStrobes", strategy, revision))
  }

  /// The read only FPGA identification memory (bus 0x0D)
  pub fn fpga_rom(revision : HardwareRevision) -> Self {
    let strategy = WriteStrategy::Direct {
      controller : Controller::FpgaBus,
      base       : (FPGA_I2C_ADDRESS_ROM as u32) << 8,
    };
    let mut rom = Self::from_keys::<RomRegister>("FpgaRom", strategy, revision);
    rom.writable = false;
    rom
  }

  pub fn len(&self) -> usize {
    self.registers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.registers.is_empty()
  }

  pub fn registers(&self) -> &[Register] {
    &self.registers
  }

  fn index(&self, address : u32) -> Result<usize, ScopeError> {
    match self.registers.iter().position(|r| r.address == address) {
      Some(k) => Ok(k),
      None => {
        error!("There is no register at 0x{:02x} in {}!", address, self.name);
        Err(ScopeError::UnknownRegister)
      }
    }
  }

  /// Address of a register by name
  pub fn address_of(&self, name : &str) -> Result<u32, ScopeError> {
    match self.registers.iter().find(|r| r.name == name) {
      Some(r) => Ok(r.address),
      None => {
        error!("There is no register {} in {}!", name, self.name);
        Err(ScopeError::UnknownRegister)
      }
    }
  }

  pub fn register(&self, address : u32) -> Result<&Register, ScopeError> {
    let k = self.index(address)?;
    Ok(&self.registers[k])
  }

  /// Stage a value, it will be written on the next commit
  pub fn set(&mut self, address : u32, value : u8) -> Result<(), ScopeError> {
    if !self.writable {
      error!("{} is read only!", self.name);
      return Err(ScopeError::UnsupportedOperation);
    }
    let k = self.index(address)?;
    self.registers[k].stage(value)?;
    trace!("Staged {}", self.registers[k]);
    Ok(())
  }

  pub fn set_by_name(&mut self, name : &str, value : u8) -> Result<(), ScopeError> {
    let address = self.address_of(name)?;
    self.set(address, value)
  }

  /// The staged (shadow) value of a register
  pub fn get(&self, address : u32) -> Result<u8, ScopeError> {
    Ok(self.register(address)?.get())
  }

  pub fn get_by_name(&self, name : &str) -> Result<u8, ScopeError> {
    self.get(self.address_of(name)?)
  }

  pub fn dirty_count(&self) -> usize {
    self.registers.iter().filter(|r| r.dirty).count()
  }

  /// Put a single register value on the wire
  fn write_register<T: Transport>(&self,
                                  iface   : &mut ScopeInterface<T>,
                                  address : u32,
                                  value   : u8) -> Result<(), ScopeError> {
    match self.strategy {
      WriteStrategy::Direct { controller, base } => {
        iface.set_controller_register(controller, base + address, &[value])
      }
      WriteStrategy::Strobe { update, .. } => {
        let packed = ((address << 1) as u8) | (value & 0x1);
        iface.set_controller_register(Controller::FpgaBus, update, &[packed])
      }
    }
  }

  /// Write every dirty register in declaration order
  ///
  /// Returns the addresses of the written registers. A
  /// transport failure stops the commit right there,
  /// registers which were written before stay clean, the
  /// rest stays dirty.
  pub fn commit<T: Transport>(&mut self, iface : &mut ScopeInterface<T>) -> Result<Vec<u32>, ScopeError> {
    let mut written = Vec::<u32>::new();
    for k in 0..self.registers.len() {
      if !self.registers[k].dirty {
        continue;
      }
      let address = self.registers[k].address;
      let value   = self.registers[k].shadow;
      if let Err(err) = self.write_register(iface, address, value) {
        error!("Commit of {} aborted at {} after {} registers! {}",
               self.name, self.registers[k], written.len(), err);
        return Err(err);
      }
      self.registers[k].mark_committed(value);
      written.push(address);
    }
    if !written.is_empty() {
      debug!("Committed {} registers of {}", written.len(), self.name);
    }
    Ok(written)
  }

  /// Write a register right away, without staging
  pub fn write_immediate<T: Transport>(&mut self,
                                       iface   : &mut ScopeInterface<T>,
                                       address : u32,
                                       value   : u8) -> Result<(), ScopeError> {
    if !self.writable {
      error!("{} is read only!", self.name);
      return Err(ScopeError::UnsupportedOperation);
    }
    let k = self.index(address)?;
    if value > self.registers[k].max_value {
      error!("Value {} exceeds the maximum of register {}!", value, self.registers[k].name);
      return Err(ScopeError::ValueOutOfRange);
    }
    self.write_register(iface, address, value)?;
    self.registers[k].mark_committed(value);
    debug!("Wrote {} immediately", self.registers[k]);
    Ok(())
  }

  /// Fetch a register value from the hardware. The
  /// register is clean afterwards.
  pub fn read<T: Transport>(&mut self,
                            iface   : &mut ScopeInterface<T>,
                            address : u32) -> Result<u8, ScopeError> {
    let k = self.index(address)?;
    let value = match self.strategy {
      WriteStrategy::Direct { controller, base } => {
        let data = iface.get_controller_register(controller, base + address, 1)?;
        data[0]
      }
      WriteStrategy::Strobe { readback, .. } => {
        let data = iface.get_controller_register(Controller::FpgaBus, readback + address / 8, 1)?;
        (data[0] >> (address % 8)) & 0x1
      }
    };
    self.registers[k].mark_committed(value);
    Ok(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::errors::TransportError;
  use crate::registers::Strobe;
  use crate::transport::SimulatedTransport;

  fn settings() -> Memory {
    Memory::fpga_settings(HardwareRevision::Current)
  }

  #[test]
  fn set_marks_dirty_only_on_change() {
    let mut mem = settings();
    mem.set(4, 0).unwrap();
    assert_eq!(mem.dirty_count(), 0);
    mem.set(4, 100).unwrap();
    assert_eq!(mem.dirty_count(), 1);
    mem.set(4, 0).unwrap();
    assert_eq!(mem.dirty_count(), 0);
    assert_eq!(mem.get_by_name("CHA_YOFFSET_VOLTAGE").unwrap(), 0);
  }

  #[test]
  fn unknown_registers_are_rejected() {
    let mut mem = settings();
    assert_eq!(mem.set(99, 1), Err(ScopeError::UnknownRegister));
    assert_eq!(mem.set_by_name("TRIGGER_WIDTH", 1), Err(ScopeError::UnknownRegister));
  }

  #[test]
  fn strobes_are_single_bit() {
    let mut mem = Memory::fpga_strobes(HardwareRevision::Current).unwrap();
    let roll = Strobe::Roll.address(HardwareRevision::Current).unwrap();
    assert_eq!(mem.set(roll, 2), Err(ScopeError::ValueOutOfRange));
    assert_eq!(mem.dirty_count(), 0);
    mem.set(roll, 1).unwrap();
    assert_eq!(mem.dirty_count(), 1);
  }

  #[test]
  fn commit_writes_in_declaration_order() {
    let mut iface = ScopeInterface::new(SimulatedTransport::new());
    let mut mem = settings();
    mem.set(8, 3).unwrap();
    mem.set(3, 2).unwrap();
    mem.set(5, 1).unwrap();
    let written = mem.commit(&mut iface).unwrap();
    assert_eq!(written, vec![3, 5, 8]);
    assert_eq!(mem.dirty_count(), 0);
    assert_eq!(iface.transport().bus_register(0x0C, 8), 3);
    assert!(mem.commit(&mut iface).unwrap().is_empty());
  }

  #[test]
  fn failed_commit_keeps_the_rest_dirty() {
    let mut iface = ScopeInterface::new(SimulatedTransport::new());
    let mut mem = settings();
    mem.set(3, 1).unwrap();
    mem.set(4, 2).unwrap();
    mem.set(5, 3).unwrap();
    iface.transport_mut().fail_on_write(2, TransportError::Disconnected);
    assert_eq!(mem.commit(&mut iface),
               Err(ScopeError::TransportFailure(TransportError::Disconnected)));
    assert!(!mem.register(3).unwrap().is_dirty());
    assert!(mem.register(4).unwrap().is_dirty());
    assert!(mem.register(5).unwrap().is_dirty());
    assert_eq!(mem.commit(&mut iface).unwrap(), vec![4, 5]);
  }

  #[test]
  fn strobe_round_trip_through_rom() {
    let mut iface = ScopeInterface::new(SimulatedTransport::new());
    let mut mem = Memory::fpga_strobes(HardwareRevision::Current).unwrap();
    let la_channel = Strobe::LaChannel.address(HardwareRevision::Current).unwrap();
    mem.write_immediate(&mut iface, la_channel, 1).unwrap();
    let frames = iface.transport().control_frames();
    assert_eq!(frames[0].bytes, vec![0xC0, 10, 3, 0x18, 0, (22 << 1) | 1]);
    assert_eq!(mem.read(&mut iface, la_channel).unwrap(), 1);
  }

  #[test]
  fn rom_is_read_only() {
    let mut iface = ScopeInterface::new(SimulatedTransport::new());
    iface.transport_mut().set_bus_register(0x0D, 0, 2);
    let mut rom = Memory::fpga_rom(HardwareRevision::Current);
    assert_eq!(rom.set(0, 1), Err(ScopeError::UnsupportedOperation));
    assert_eq!(rom.read(&mut iface, 0).unwrap(), 2);
  }
}
