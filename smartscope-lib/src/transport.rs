//! The USB transport seam
//!
//! The physical USB primitives live outside of this
//! crate, they only have to implement `Transport`.
//! Every call blocks until the transfer is done, and
//! a transport must never be used from two threads at
//! the same time.
//!
//! `SimulatedTransport` plays the scope side of the
//! control protocol in memory. It is used by the tests
//! and for the dry runs of the command line tool.

use std::collections::HashMap;

use crate::constants::{
  HEADER_CMD_BYTE,
  HEADER_RESPONSE_BYTE,
  RESPONSE_FRAME_SIZE,
  FPGA_I2C_ADDRESS_SETTINGS,
  FPGA_I2C_ADDRESS_ROM,
};
use crate::errors::TransportError;
use crate::protocol::{
  PicCommand,
  to_hex,
};

/// Blocking byte transport to the scope
pub trait Transport {
  /// Send a command frame over the control endpoint
  fn write_control(&mut self, data : &[u8]) -> Result<(), TransportError>;
  /// Read a response frame from the control endpoint
  fn read_control(&mut self, buffer : &mut [u8]) -> Result<usize, TransportError>;
  /// Send a block of bytes over the bulk endpoint
  fn write_bulk(&mut self, data : &[u8]) -> Result<(), TransportError>;
  /// Discard whatever is waiting in the data pipe
  fn flush_data_pipe(&mut self) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
  fn write_control(&mut self, data : &[u8]) -> Result<(), TransportError> {
    (**self).write_control(data)
  }
  fn read_control(&mut self, buffer : &mut [u8]) -> Result<usize, TransportError> {
    (**self).read_control(buffer)
  }
  fn write_bulk(&mut self, data : &[u8]) -> Result<(), TransportError> {
    (**self).write_bulk(data)
  }
  fn flush_data_pipe(&mut self) -> Result<(), TransportError> {
    (**self).flush_data_pipe()
  }
}

/// What kind of transfer a recorded frame was
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameKind {
  Control,
  Bulk,
  Flush,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
  pub kind  : FrameKind,
  pub bytes : Vec<u8>,
}

/// The memory spaces behind the supervisor
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
enum Space {
  Pic,
  Eeprom,
  Flash,
  Bus(u8),
}

/// An in-memory scope
///
/// Writes are recorded and applied to simulated memory
/// spaces, reads are answered from them. Writing a
/// strobe through the settings register `STROBE_UPDATE`
/// (address 0) is mirrored into the `STROBES` bytes of
/// the FPGA rom (from address 7), the way the firmware
/// reports strobe states.
#[derive(Debug, Clone)]
pub struct SimulatedTransport {
  /// Every successful transfer, in order
  pub frames         : Vec<Frame>,
  /// Version bytes reported for PIC_VERSION
  pub pic_version    : [u8;3],
  memory             : HashMap<(Space, u32), u8>,
  bus_pointer        : HashMap<u8, u8>,
  stream             : Option<(u8, u8)>,
  pending            : Option<[u8;RESPONSE_FRAME_SIZE]>,
  n_writes           : usize,
  fail_on_write      : Option<(usize, TransportError)>,
}

impl SimulatedTransport {

  /// Address of the strobe update register in the settings memory
  pub const STROBE_UPDATE_REGISTER : u8 = 0;
  /// First rom byte which mirrors the strobes
  pub const STROBES_ROM_ADDRESS    : u8 = 7;

  pub fn new() -> Self {
    Self {
      frames         : Vec::<Frame>::new(),
      pic_version    : [0, 3, 1],
      memory         : HashMap::new(),
      bus_pointer    : HashMap::new(),
      stream         : None,
      pending        : None,
      n_writes       : 0,
      fail_on_write  : None,
    }
  }

  /// Let the n-th write from now on (control or bulk,
  /// counting from 1) fail with the given error
  pub fn fail_on_write(&mut self, n : usize, err : TransportError) {
    self.fail_on_write = Some((self.n_writes + n, err));
  }

  /// Forget about a scheduled failure
  pub fn clear_failure(&mut self) {
    self.fail_on_write = None;
  }

  pub fn control_frames(&self) -> Vec<&Frame> {
    self.frames.iter().filter(|f| f.kind == FrameKind::Control).collect()
  }

  pub fn bulk_frames(&self) -> Vec<&Frame> {
    self.frames.iter().filter(|f| f.kind == FrameKind::Bulk).collect()
  }

  pub fn clear_frames(&mut self) {
    self.frames.clear();
  }

  /// Preload a byte of a register on the FPGA bus
  pub fn set_bus_register(&mut self, bus_address : u8, reg : u8, value : u8) {
    self.memory.insert((Space::Bus(bus_address), reg as u32), value);
  }

  /// Current content of a register on the FPGA bus
  pub fn bus_register(&self, bus_address : u8, reg : u8) -> u8 {
    *self.memory.get(&(Space::Bus(bus_address), reg as u32)).unwrap_or(&0)
  }

  /// Current content of the program storage
  pub fn program_storage(&self, address : u32) -> u8 {
    *self.memory.get(&(Space::Flash, address)).unwrap_or(&0)
  }

  fn store(&mut self, space : Space, address : u32, data : &[u8]) {
    for (k, byte) in data.iter().enumerate() {
      self.memory.insert((space, address + k as u32), *byte);
    }
    if space == Space::Bus(FPGA_I2C_ADDRESS_SETTINGS)
      && address == Self::STROBE_UPDATE_REGISTER as u32
      && data.len() == 1 {
      self.mirror_strobe(data[0]);
    }
  }

  fn mirror_strobe(&mut self, packed : u8) {
    let strobe  = (packed >> 1) as u32;
    let value   = packed & 0x1;
    let rom_key = (Space::Bus(FPGA_I2C_ADDRESS_ROM), Self::STROBES_ROM_ADDRESS as u32 + strobe / 8);
    let mut byte = *self.memory.get(&rom_key).unwrap_or(&0);
    let mask = 1u8 << (strobe % 8);
    if value == 1 {
      byte |= mask;
    } else {
      byte &= !mask;
    }
    self.memory.insert(rom_key, byte);
  }

  fn respond(&mut self, op : u8, address : u8, length : u8, payload_offset : usize, data : &[u8]) {
    let mut frame = [0u8;RESPONSE_FRAME_SIZE];
    frame[0] = HEADER_RESPONSE_BYTE;
    frame[1] = op;
    frame[2] = address;
    frame[3] = length;
    for (k, byte) in data.iter().enumerate() {
      if payload_offset + k < RESPONSE_FRAME_SIZE {
        frame[payload_offset + k] = *byte;
      }
    }
    self.pending = Some(frame);
  }

  fn load(&self, space : Space, address : u32, length : usize) -> Vec<u8> {
    (0..length as u32).map(|k| *self.memory.get(&(space, address + k)).unwrap_or(&0)).collect()
  }

  /// Interprete a command frame the way the supervisor does
  fn execute(&mut self, data : &[u8]) {
    if data.len() < 2 || data[0] != HEADER_CMD_BYTE {
      warn!("Simulated scope received a frame without command marker {}", to_hex(data));
      return;
    }
    let op = data[1];
    let arg = |k : usize| -> u8 { *data.get(k).unwrap_or(&0) };
    match PicCommand::from_u8(op) {
      PicCommand::PicVersion => {
        let version = [self.pic_version[2], self.pic_version[1], self.pic_version[0]];
        self.respond(op, 0, 3, 4, &version);
      }
      PicCommand::PicWrite => {
        let len = arg(3) as usize;
        self.store(Space::Pic, arg(2) as u32, &data[4..(4 + len).min(data.len())]);
      }
      PicCommand::PicRead => {
        let bytes = self.load(Space::Pic, arg(2) as u32, arg(3) as usize);
        self.respond(op, arg(2), arg(3), 4, &bytes);
      }
      PicCommand::EepromWrite => {
        let len = arg(3) as usize;
        self.store(Space::Eeprom, arg(2) as u32, &data[4..(4 + len).min(data.len())]);
      }
      PicCommand::EepromRead => {
        let bytes = self.load(Space::Eeprom, arg(2) as u32, arg(3) as usize);
        self.respond(op, arg(2), arg(3), 4, &bytes);
      }
      PicCommand::FlashRomWrite => {
        let address = arg(2) as u32 | ((arg(4) as u32) << 8);
        let len = arg(3) as usize;
        self.store(Space::Flash, address, &data[5..(5 + len).min(data.len())]);
      }
      PicCommand::FlashRomRead => {
        let address = arg(2) as u32 | ((arg(4) as u32) << 8);
        let bytes = self.load(Space::Flash, address, arg(3) as usize);
        self.respond(op, arg(2), arg(3), 5, &bytes);
      }
      PicCommand::I2cWrite => {
        let bus = arg(3) >> 1;
        let reg = arg(4);
        let len = (arg(2) as usize).saturating_sub(2);
        self.bus_pointer.insert(bus, reg);
        if len > 0 {
          self.store(Space::Bus(bus), reg as u32, &data[5..(5 + len).min(data.len())]);
        }
      }
      PicCommand::I2cRead => {
        let bus = arg(2);
        let reg = *self.bus_pointer.get(&bus).unwrap_or(&0);
        let bytes = self.load(Space::Bus(bus), reg as u32, arg(3) as usize);
        self.respond(op, bus, arg(3), 4, &bytes);
      }
      PicCommand::I2cWriteStart => {
        self.stream = Some((arg(3) >> 1, arg(4)));
      }
      PicCommand::I2cWriteBulk => {
        let len = arg(2) as usize;
        match self.stream {
          None => warn!("Simulated scope received a stream body outside of a stream"),
          Some((bus, reg)) => {
            self.store(Space::Bus(bus), reg as u32, &data[3..(3 + len).min(data.len())]);
            self.stream = Some((bus, reg.wrapping_add(len as u8)));
          }
        }
      }
      PicCommand::I2cWriteStop => {
        self.stream = None;
      }
      _ => {
        trace!("Simulated scope ignores command {}", PicCommand::from_u8(op));
      }
    }
  }

  fn count_write(&mut self) -> Result<(), TransportError> {
    self.n_writes += 1;
    if let Some((n, err)) = self.fail_on_write {
      if n == self.n_writes {
        self.fail_on_write = None;
        return Err(err);
      }
    }
    Ok(())
  }
}

impl Default for SimulatedTransport {
  fn default() -> Self {
    Self::new()
  }
}

impl Transport for SimulatedTransport {

  fn write_control(&mut self, data : &[u8]) -> Result<(), TransportError> {
    self.count_write()?;
    trace!("[SimulatedTransport::write_control] => {}", to_hex(data));
    self.frames.push(Frame { kind : FrameKind::Control, bytes : data.to_vec() });
    self.execute(data);
    Ok(())
  }

  fn read_control(&mut self, buffer : &mut [u8]) -> Result<usize, TransportError> {
    match self.pending.take() {
      None => {
        error!("Nothing to read from the simulated scope!");
        Err(TransportError::Timeout)
      }
      Some(frame) => {
        let n = buffer.len().min(frame.len());
        buffer[..n].copy_from_slice(&frame[..n]);
        Ok(n)
      }
    }
  }

  fn write_bulk(&mut self, data : &[u8]) -> Result<(), TransportError> {
    self.count_write()?;
    self.frames.push(Frame { kind : FrameKind::Bulk, bytes : data.to_vec() });
    Ok(())
  }

  fn flush_data_pipe(&mut self) -> Result<(), TransportError> {
    self.frames.push(Frame { kind : FrameKind::Flush, bytes : Vec::<u8>::new() });
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scheduled_failure_hits_the_right_write() {
    let mut usb = SimulatedTransport::new();
    usb.fail_on_write(2, TransportError::Disconnected);
    assert!(usb.write_control(&[0xC0, 4]).is_ok());
    assert_eq!(usb.write_bulk(&[1, 2, 3]), Err(TransportError::Disconnected));
    assert!(usb.write_bulk(&[1, 2, 3]).is_ok());
    assert_eq!(usb.frames.len(), 2);
  }

  #[test]
  fn bus_pointer_is_latched_by_empty_write() {
    let mut usb = SimulatedTransport::new();
    usb.set_bus_register(0x0D, 3, 0x42);
    usb.write_control(&[0xC0, 10, 2, 0x1A, 3]).unwrap();
    usb.write_control(&[0xC0, 11, 0x0D, 1]).unwrap();
    let mut buffer = [0u8;16];
    assert_eq!(usb.read_control(&mut buffer), Ok(16));
    assert_eq!(buffer[0], HEADER_RESPONSE_BYTE);
    assert_eq!(buffer[4], 0x42);
  }

  #[test]
  fn strobes_are_mirrored_into_rom() {
    let mut usb = SimulatedTransport::new();
    // strobe 10 high
    usb.write_control(&[0xC0, 10, 3, 0x18, 0, (10 << 1) | 1]).unwrap();
    assert_eq!(usb.bus_register(0x0D, 8), 1 << 2);
    usb.write_control(&[0xC0, 10, 3, 0x18, 0, 10 << 1]).unwrap();
    assert_eq!(usb.bus_register(0x0D, 8), 0);
  }
}
