//! Command encoder for the SmartScope supervisor
//!
//! Every request to the scope is a control transfer which
//! starts with the command marker `0xC0`, followed by an
//! operation code. What comes after depends on the
//! controller which is addressed:
//!
//! | Controller        | Write header                              | Read header                    |
//! |-------------------|-------------------------------------------|--------------------------------|
//! | Supervisor        | C0, PIC_WRITE, addr, len                  | C0, PIC_READ, addr, len        |
//! | SettingsMemory    | C0, EEPROM_WRITE, addr, len               | C0, EEPROM_READ, addr, len     |
//! | ProgramStorage    | C0, FLASH_ROM_WRITE, addr_lo, len, addr_hi| C0, FLASH_ROM_READ, ... addr_hi|
//! | FpgaBus           | C0, I2C_WRITE, len+2, bus<<1, reg         | C0, I2C_READ, bus, len         |
//! | WaveformGenerator | C0, I2C_WRITE_START/BULK/STOP, ...        | write only                     |
//!
//! Payloads which do not fit into a single write are
//! split by `chunk`.
//!

use std::fmt;

use crate::constants::{
  HEADER_CMD_BYTE,
  FLASH_USER_ADDRESS_MASK,
  FPGA_I2C_ADDRESS_AWG,
  I2C_MAX_WRITE_LENGTH,
  I2C_MAX_WRITE_LENGTH_BULK,
  RESPONSE_FRAME_SIZE,
  RESPONSE_OFFSET,
  RESPONSE_OFFSET_PROGRAM_STORAGE,
};
use crate::errors::ScopeError;

/// Operation codes understood by the supervisor
/// firmware (byte 1 of each command)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum PicCommand {
  PicVersion       = 1,
  PicWrite         = 2,
  PicRead          = 3,
  PicReset         = 4,
  PicBootloader    = 5,
  EepromRead       = 6,
  EepromWrite      = 7,
  FlashRomRead     = 8,
  FlashRomWrite    = 9,
  I2cWrite         = 10,
  I2cRead          = 11,
  ProgramFpgaStart = 12,
  ProgramFpgaEnd   = 13,
  I2cWriteStart    = 14,
  I2cWriteBulk     = 15,
  I2cWriteStop     = 16,
  /// Not an operation code of the firmware
  Unknown          = 99,
}

impl PicCommand {

  pub fn to_u8(&self) -> u8 {
    *self as u8
  }

  pub fn from_u8(code : u8) -> Self {
    match code {
      1  => PicCommand::PicVersion,
      2  => PicCommand::PicWrite,
      3  => PicCommand::PicRead,
      4  => PicCommand::PicReset,
      5  => PicCommand::PicBootloader,
      6  => PicCommand::EepromRead,
      7  => PicCommand::EepromWrite,
      8  => PicCommand::FlashRomRead,
      9  => PicCommand::FlashRomWrite,
      10 => PicCommand::I2cWrite,
      11 => PicCommand::I2cRead,
      12 => PicCommand::ProgramFpgaStart,
      13 => PicCommand::ProgramFpgaEnd,
      14 => PicCommand::I2cWriteStart,
      15 => PicCommand::I2cWriteBulk,
      16 => PicCommand::I2cWriteStop,
      _  => PicCommand::Unknown,
    }
  }
}

impl fmt::Display for PicCommand {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<PicCommand: {:?} ({})>", self, self.to_u8())
  }
}

/// The addressable subsystems of the scope
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Controller {
  /// The supervisory microcontroller (PIC)
  Supervisor,
  /// EEPROM style configuration memory
  SettingsMemory,
  /// Flash rom with 16bit addressing
  ProgramStorage,
  /// Generic FPGA register bus. The address carries
  /// the bus address of the target in bits [14:8] and
  /// the register inside the target in bits [7:0]
  FpgaBus,
  /// The arbitrary waveform generator, a fixed bus
  /// address on the FPGA bus. Write only.
  WaveformGenerator,
}

/// What to do with a controller
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
  Read,
  Write,
  /// Start condition + total length of a streamed write
  WriteBegin,
  /// One payload chunk of a streamed write
  WriteBody,
  /// Stop condition of a streamed write
  WriteEnd,
}

impl fmt::Display for Controller {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<Controller: {:?}>", self)
  }
}

/// An encoded command header.
///
/// The bytes are fixed at construction, they are
/// only handed out as a slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandHeader {
  bytes : Vec<u8>,
}

impl CommandHeader {

  fn new(bytes : Vec<u8>) -> Self {
    Self {
      bytes
    }
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  /// The supervisor operation code (byte 1)
  pub fn command(&self) -> PicCommand {
    PicCommand::from_u8(self.bytes[1])
  }

  /// Header followed by payload, ready for the wire
  pub fn frame(&self, payload : &[u8]) -> Vec<u8> {
    let mut frame = Vec::<u8>::with_capacity(self.bytes.len() + payload.len());
    frame.extend_from_slice(&self.bytes);
    frame.extend_from_slice(payload);
    frame
  }
}

impl fmt::Display for CommandHeader {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<CommandHeader: {}>", to_hex(&self.bytes))
  }
}

/// One piece of a (possibly split) write, header and
/// the slice of the payload which goes with it
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<'a> {
  pub operation : Operation,
  pub address   : u32,
  pub header    : CommandHeader,
  pub payload   : &'a [u8],
}

impl Chunk<'_> {
  pub fn frame(&self) -> Vec<u8> {
    self.header.frame(self.payload)
  }
}

/// Space separated hex representation, used for logging
pub fn to_hex(bytes : &[u8]) -> String {
  bytes.iter()
       .map(|b| format!("{:02x}", b))
       .collect::<Vec<String>>()
       .join(" ")
}

/// Header for a generic FPGA bus operation
///
/// # Arguments
///
/// * bus_address : 7bit address of the bus target
/// * op          : Read or Write
/// * reg_address : register inside the target
/// * length      : payload length
fn i2c_header(bus_address : u8,
              op          : Operation,
              reg_address : u8,
              length      : usize) -> Result<CommandHeader, ScopeError> {
  match op {
    Operation::Write => {
      // data + bus address + register address
      Ok(CommandHeader::new(vec![HEADER_CMD_BYTE,
                                 PicCommand::I2cWrite.to_u8(),
                                 (length + 2) as u8,
                                 bus_address << 1,
                                 reg_address]))
    }
    Operation::Read => {
      Ok(CommandHeader::new(vec![HEADER_CMD_BYTE,
                                 PicCommand::I2cRead.to_u8(),
                                 bus_address,
                                 length as u8]))
    }
    _ => {
      error!("Operation {:?} is not supported by the generic bus header!", op);
      Err(ScopeError::UnsupportedOperation)
    }
  }
}

impl Controller {

  /// The largest payload a single command of this
  /// operation can carry
  pub fn max_length(&self, op : Operation) -> usize {
    match op {
      Operation::Read       => RESPONSE_FRAME_SIZE - self.response_offset(),
      Operation::Write      => I2C_MAX_WRITE_LENGTH,
      Operation::WriteBody  => I2C_MAX_WRITE_LENGTH_BULK,
      // the stream is bounded by its bodies only
      Operation::WriteBegin => usize::MAX,
      Operation::WriteEnd   => 0,
    }
  }

  /// Number of leading bytes of a read response which
  /// are protocol overhead
  pub fn response_offset(&self) -> usize {
    match self {
      Controller::ProgramStorage => RESPONSE_OFFSET_PROGRAM_STORAGE,
      _                          => RESPONSE_OFFSET
    }
  }

  fn check_address(&self, address : u32, length : usize) -> Result<(), ScopeError> {
    let in_range = match self {
      Controller::Supervisor
      | Controller::SettingsMemory
      | Controller::WaveformGenerator => address <= 0xFF,
      // the last byte of the access may sit at the user mask
      Controller::ProgramStorage      => address as u64 + length as u64 <= FLASH_USER_ADDRESS_MASK as u64 + 1,
      Controller::FpgaBus             => address <= 0x7FFF,
    };
    if !in_range {
      error!("Access of {} bytes at 0x{:04x} is out of range for {}!", length, address, self);
      return Err(ScopeError::OutOfRange);
    }
    Ok(())
  }

  /// Build the command header for an operation
  ///
  /// # Arguments
  ///
  /// * op      : what to do
  /// * address : register/memory address. For the FpgaBus
  ///             this includes the bus address in the
  ///             upper bits
  /// * length  : payload length (for WriteBegin the total
  ///             length of the streamed write)
  pub fn encode(&self,
                op      : Operation,
                address : u32,
                length  : usize) -> Result<CommandHeader, ScopeError> {
    if length > self.max_length(op) {
      error!("Length {} exceeds the limit of {} for {:?} on {}!", length, self.max_length(op), op, self);
      return Err(ScopeError::OutOfRange);
    }
    self.check_address(address, length)?;
    let header = match (*self, op) {
      (Controller::Supervisor, Operation::Write) => {
        CommandHeader::new(vec![HEADER_CMD_BYTE, PicCommand::PicWrite.to_u8(), address as u8, length as u8])
      }
      (Controller::Supervisor, Operation::Read) => {
        CommandHeader::new(vec![HEADER_CMD_BYTE, PicCommand::PicRead.to_u8(), address as u8, length as u8])
      }
      (Controller::SettingsMemory, Operation::Write) => {
        CommandHeader::new(vec![HEADER_CMD_BYTE, PicCommand::EepromWrite.to_u8(), address as u8, length as u8])
      }
      (Controller::SettingsMemory, Operation::Read) => {
        CommandHeader::new(vec![HEADER_CMD_BYTE, PicCommand::EepromRead.to_u8(), address as u8, length as u8])
      }
      (Controller::ProgramStorage, Operation::Write) => {
        CommandHeader::new(vec![HEADER_CMD_BYTE,
                                PicCommand::FlashRomWrite.to_u8(),
                                address as u8,
                                length as u8,
                                (address >> 8) as u8])
      }
      (Controller::ProgramStorage, Operation::Read) => {
        CommandHeader::new(vec![HEADER_CMD_BYTE,
                                PicCommand::FlashRomRead.to_u8(),
                                address as u8,
                                length as u8,
                                (address >> 8) as u8])
      }
      (Controller::FpgaBus, Operation::Write)
      | (Controller::FpgaBus, Operation::Read) => {
        let bus_address = ((address >> 8) & 0x7F) as u8;
        let reg_address = (address & 0xFF) as u8;
        i2c_header(bus_address, op, reg_address, length)?
      }
      (Controller::WaveformGenerator, Operation::Write) => {
        i2c_header(FPGA_I2C_ADDRESS_AWG, op, address as u8, length)?
      }
      (Controller::WaveformGenerator, Operation::WriteBegin) => {
        CommandHeader::new(vec![HEADER_CMD_BYTE,
                                PicCommand::I2cWriteStart.to_u8(),
                                // length + 2 address bytes, truncated to one byte
                                // on the wire, the firmware only counts bodies
                                length.wrapping_add(2) as u8,
                                FPGA_I2C_ADDRESS_AWG << 1,
                                address as u8])
      }
      (Controller::WaveformGenerator, Operation::WriteBody) => {
        CommandHeader::new(vec![HEADER_CMD_BYTE, PicCommand::I2cWriteBulk.to_u8(), length as u8])
      }
      (Controller::WaveformGenerator, Operation::WriteEnd) => {
        CommandHeader::new(vec![HEADER_CMD_BYTE, PicCommand::I2cWriteStop.to_u8(), length as u8])
      }
      (Controller::WaveformGenerator, Operation::Read) => {
        error!("The waveform generator can not be read out!");
        return Err(ScopeError::UnsupportedOperation);
      }
      _ => {
        error!("{:?} is only available for the waveform generator, not {}!", op, self);
        return Err(ScopeError::UnsupportedOperation);
      }
    };
    trace!("[Controller::encode] => {:?} {:?} 0x{:04x} len {} : {}", self, op, address, length, header);
    Ok(header)
  }

  /// Split a write into commands which each respect
  /// the single write limit of the controller.
  ///
  /// Payloads up to `I2C_MAX_WRITE_LENGTH` go out as a
  /// single write. Larger payloads are cut into plain
  /// writes at increasing addresses, except for the
  /// waveform generator, where they are wrapped into
  /// one begin/body/end bus transaction.
  ///
  /// All headers are built before anything is returned,
  /// so an out of range chunk rejects the whole write.
  pub fn chunk<'a>(&self,
                   op      : Operation,
                   address : u32,
                   payload : &'a [u8]) -> Result<Vec<Chunk<'a>>, ScopeError> {
    if op != Operation::Write {
      error!("Only plain writes can be chunked, not {:?}!", op);
      return Err(ScopeError::UnsupportedOperation);
    }
    let mut chunks = Vec::<Chunk<'a>>::new();
    if payload.len() <= I2C_MAX_WRITE_LENGTH {
      chunks.push(Chunk {
        operation : Operation::Write,
        address   : address,
        header    : self.encode(Operation::Write, address, payload.len())?,
        payload   : payload,
      });
      return Ok(chunks);
    }
    match self {
      Controller::WaveformGenerator => {
        chunks.push(Chunk {
          operation : Operation::WriteBegin,
          address   : address,
          header    : self.encode(Operation::WriteBegin, address, payload.len())?,
          payload   : &[],
        });
        for body in payload.chunks(I2C_MAX_WRITE_LENGTH_BULK) {
          chunks.push(Chunk {
            operation : Operation::WriteBody,
            address   : address,
            header    : self.encode(Operation::WriteBody, address, body.len())?,
            payload   : body,
          });
        }
        chunks.push(Chunk {
          operation : Operation::WriteEnd,
          address   : address,
          header    : self.encode(Operation::WriteEnd, address, 0)?,
          payload   : &[],
        });
      }
      _ => {
        let mut offset = 0usize;
        for part in payload.chunks(I2C_MAX_WRITE_LENGTH) {
          let part_address = address + offset as u32;
          chunks.push(Chunk {
            operation : Operation::Write,
            address   : part_address,
            header    : self.encode(Operation::Write, part_address, part.len())?,
            payload   : part,
          });
          offset += part.len();
        }
      }
    }
    debug!("Split {} bytes for {} into {} commands", payload.len(), self, chunks.len());
    Ok(chunks)
  }

  /// Strip the protocol overhead of a read response
  ///
  /// # Arguments
  ///
  /// * frame  : the complete response frame
  /// * length : number of requested payload bytes
  pub fn response_payload<'a>(&self,
                              frame  : &'a [u8],
                              length : usize) -> Result<&'a [u8], ScopeError> {
    let offset = self.response_offset();
    if offset + length > frame.len() {
      error!("Response frame of {} bytes can not hold {} bytes of payload!", frame.len(), length);
      return Err(ScopeError::OutOfRange);
    }
    Ok(&frame[offset..offset + length])
  }
}

/// Build the header for a single command
///
/// See `Controller::encode`
pub fn encode(controller : Controller,
              op         : Operation,
              address    : u32,
              length     : usize) -> Result<CommandHeader, ScopeError> {
  controller.encode(op, address, length)
}

/// Split a payload into single commands
///
/// See `Controller::chunk`
pub fn chunk(controller : Controller,
             op         : Operation,
             address    : u32,
             payload    : &[u8]) -> Result<Vec<Chunk<'_>>, ScopeError> {
  controller.chunk(op, address, payload)
}

/// Header of a plain supervisor command without
/// address or payload
pub fn command(cmd : PicCommand) -> CommandHeader {
  CommandHeader::new(vec![HEADER_CMD_BYTE, cmd.to_u8()])
}

/// Header of the start-programming command, which
/// announces the number of bitstream packets
pub fn program_fpga_start(n_packets : u16) -> CommandHeader {
  CommandHeader::new(vec![HEADER_CMD_BYTE,
                          PicCommand::ProgramFpgaStart.to_u8(),
                          (n_packets >> 8) as u8,
                          n_packets as u8])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn supervisor_and_eeprom_headers() {
    let h = encode(Controller::Supervisor, Operation::Write, 0x12, 3).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 2, 0x12, 3]);
    let h = encode(Controller::Supervisor, Operation::Read, 0x12, 3).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 3, 0x12, 3]);
    let h = encode(Controller::SettingsMemory, Operation::Write, 0x40, 8).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 7, 0x40, 8]);
    let h = encode(Controller::SettingsMemory, Operation::Read, 0x40, 8).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 6, 0x40, 8]);
  }

  #[test]
  fn program_storage_carries_high_address_byte() {
    let h = encode(Controller::ProgramStorage, Operation::Write, 0x0A31, 4).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 9, 0x31, 4, 0x0A]);
    let h = encode(Controller::ProgramStorage, Operation::Read, 0x0A31, 4).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 8, 0x31, 4, 0x0A]);
    assert_eq!(h.command(), PicCommand::FlashRomRead);
  }

  #[test]
  fn program_storage_boundary() {
    let mask = FLASH_USER_ADDRESS_MASK;
    assert!(encode(Controller::ProgramStorage, Operation::Write, mask - 3, 4).is_ok());
    assert_eq!(encode(Controller::ProgramStorage, Operation::Write, mask - 2, 4),
               Err(ScopeError::OutOfRange));
    assert!(encode(Controller::ProgramStorage, Operation::Read, mask, 1).is_ok());
    assert_eq!(encode(Controller::ProgramStorage, Operation::Read, mask, 2),
               Err(ScopeError::OutOfRange));
  }

  #[test]
  fn fpga_bus_splits_the_address() {
    let h = encode(Controller::FpgaBus, Operation::Write, 0x0C07, 2).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 10, 4, 0x18, 0x07]);
    let h = encode(Controller::FpgaBus, Operation::Read, 0x0D03, 5).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 11, 0x0D, 5]);
    assert_eq!(encode(Controller::FpgaBus, Operation::Write, 0x8000, 1),
               Err(ScopeError::OutOfRange));
  }

  #[test]
  fn waveform_generator_headers() {
    let h = encode(Controller::WaveformGenerator, Operation::WriteBegin, 0x00, 100).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 14, 102, 0x1C, 0x00]);
    let h = encode(Controller::WaveformGenerator, Operation::WriteBegin, 0x00, 2048).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 14, 0x02, 0x1C, 0x00]);
    let h = encode(Controller::WaveformGenerator, Operation::WriteBody, 0x00, 29).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 15, 29]);
    let h = encode(Controller::WaveformGenerator, Operation::WriteEnd, 0x00, 0).unwrap();
    assert_eq!(h.as_bytes(), &[0xC0, 16, 0]);
    assert_eq!(encode(Controller::WaveformGenerator, Operation::Read, 0, 1),
               Err(ScopeError::UnsupportedOperation));
    assert_eq!(encode(Controller::FpgaBus, Operation::WriteBody, 0, 1),
               Err(ScopeError::UnsupportedOperation));
  }

  #[test]
  fn oversized_headers_are_rejected() {
    assert_eq!(encode(Controller::Supervisor, Operation::Write, 0, I2C_MAX_WRITE_LENGTH + 1),
               Err(ScopeError::OutOfRange));
    assert_eq!(encode(Controller::WaveformGenerator, Operation::WriteBody, 0, I2C_MAX_WRITE_LENGTH_BULK + 1),
               Err(ScopeError::OutOfRange));
    assert_eq!(encode(Controller::Supervisor, Operation::Read, 0, 13),
               Err(ScopeError::OutOfRange));
    assert!(encode(Controller::Supervisor, Operation::Read, 0, 12).is_ok());
    assert!(encode(Controller::ProgramStorage, Operation::Read, 0, 11).is_ok());
    assert_eq!(encode(Controller::ProgramStorage, Operation::Read, 0, 12),
               Err(ScopeError::OutOfRange));
  }

  #[test]
  fn plain_chunks_advance_the_address() {
    let payload : Vec<u8> = (0..60).collect();
    let chunks = chunk(Controller::FpgaBus, Operation::Write, 0x0C10, &payload).unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].address, 0x0C10);
    assert_eq!(chunks[1].address, 0x0C10 + 27);
    assert_eq!(chunks[2].address, 0x0C10 + 54);
    assert_eq!(chunks[2].payload.len(), 6);
    assert!(chunks.iter().all(|c| c.operation == Operation::Write));
    assert_eq!(&chunks[1].frame()[..5], &[0xC0u8, 10, 29, 0x18, 0x10 + 27]);
  }

  #[test]
  fn small_payload_is_a_single_write() {
    let payload = [1u8, 2, 3];
    let chunks = chunk(Controller::WaveformGenerator, Operation::Write, 0x04, &payload).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].frame(), vec![0xC0, 10, 5, 0x1C, 0x04, 1, 2, 3]);
  }

  #[test]
  fn chunking_rejects_storage_overrun_as_a_whole() {
    let payload = vec![0u8; 40];
    assert_eq!(chunk(Controller::ProgramStorage, Operation::Write, FLASH_USER_ADDRESS_MASK - 30, &payload),
               Err(ScopeError::OutOfRange));
  }

  #[test]
  fn response_payload_is_stripped() {
    let frame : Vec<u8> = (0..16).collect();
    assert_eq!(Controller::FpgaBus.response_payload(&frame, 3).unwrap(), &[4, 5, 6]);
    assert_eq!(Controller::ProgramStorage.response_payload(&frame, 3).unwrap(), &[5, 6, 7]);
    assert_eq!(Controller::ProgramStorage.response_payload(&frame, 12),
               Err(ScopeError::OutOfRange));
  }

  #[test]
  fn program_fpga_start_is_big_endian() {
    assert_eq!(program_fpga_start(0x1234).as_bytes(), &[0xC0, 12, 0x12, 0x34]);
    assert_eq!(command(PicCommand::ProgramFpgaEnd).as_bytes(), &[0xC0, 13]);
  }
}
