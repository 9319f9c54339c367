//! Controller level access to the scope
//!
//! `ScopeInterface` owns the `Transport` and turns
//! register reads/writes on one of the controllers into
//! framed commands. All access to a device goes through
//! one `ScopeInterface`, every call takes `&mut self`.

use crate::constants::{
  HEADER_RESPONSE_BYTE,
  RESPONSE_FRAME_SIZE,
};
use crate::errors::{
  ScopeError,
  TransportError,
};
use crate::protocol::{
  CommandHeader,
  Controller,
  Operation,
  PicCommand,
  command,
  to_hex,
};
use crate::transport::Transport;

pub struct ScopeInterface<T: Transport> {
  transport : T,
}

impl<T: Transport> ScopeInterface<T> {

  pub fn new(transport : T) -> Self {
    Self {
      transport
    }
  }

  pub fn transport(&self) -> &T {
    &self.transport
  }

  pub fn transport_mut(&mut self) -> &mut T {
    &mut self.transport
  }

  pub fn into_inner(self) -> T {
    self.transport
  }

  /// Read the fixed size response frame and check
  /// the response marker
  fn read_response(&mut self) -> Result<[u8;RESPONSE_FRAME_SIZE], ScopeError> {
    let mut frame = [0u8;RESPONSE_FRAME_SIZE];
    let n = self.transport.read_control(&mut frame)?;
    trace!("[ScopeInterface::read_response] <= {}", to_hex(&frame[..n]));
    if n < RESPONSE_FRAME_SIZE {
      error!("Got only {} bytes of a {} byte response frame!", n, RESPONSE_FRAME_SIZE);
      return Err(ScopeError::from(TransportError::ShortRead));
    }
    if frame[0] != HEADER_RESPONSE_BYTE {
      error!("Response starts with {:02x}, expected {:02x}!", frame[0], HEADER_RESPONSE_BYTE);
      return Err(ScopeError::from(TransportError::UnexpectedResponse));
    }
    Ok(frame)
  }

  /// Read a number of bytes from a controller
  ///
  /// For the FPGA bus the register pointer is set first
  /// with an empty write to the same address.
  ///
  /// # Arguments
  ///
  /// * ctrl    : the controller to read from
  /// * address : first address to read
  /// * length  : number of bytes. Has to fit into the
  ///             response frame after the protocol overhead
  pub fn get_controller_register(&mut self,
                                 ctrl    : Controller,
                                 address : u32,
                                 length  : usize) -> Result<Vec<u8>, ScopeError> {
    // build everything before a single byte is sent
    let read_header = ctrl.encode(Operation::Read, address, length)?;
    if ctrl == Controller::FpgaBus {
      let pointer = ctrl.encode(Operation::Write, address, 0)?;
      self.transport.write_control(pointer.as_bytes())?;
    }
    self.transport.write_control(read_header.as_bytes())?;
    let frame = self.read_response()?;
    let payload = ctrl.response_payload(&frame, length)?;
    debug!("Read {} bytes at 0x{:04x} from {}", length, address, ctrl);
    Ok(payload.to_vec())
  }

  /// Write a payload to a controller, split into
  /// as many commands as the controller requires
  pub fn set_controller_register(&mut self,
                                 ctrl    : Controller,
                                 address : u32,
                                 data    : &[u8]) -> Result<(), ScopeError> {
    let chunks = ctrl.chunk(Operation::Write, address, data)?;
    for c in chunks.iter() {
      let frame = c.frame();
      trace!("[ScopeInterface::set_controller_register] => {}", to_hex(&frame));
      self.transport.write_control(&frame)?;
    }
    debug!("Wrote {} bytes at 0x{:04x} to {}", data.len(), address, ctrl);
    Ok(())
  }

  /// Send a plain command without arguments
  pub fn send_command(&mut self, cmd : PicCommand) -> Result<(), ScopeError> {
    self.send_header(&command(cmd))
  }

  /// Send a prepared command header as it is
  pub fn send_header(&mut self, header : &CommandHeader) -> Result<(), ScopeError> {
    trace!("[ScopeInterface::send_header] => {}", header);
    self.transport.write_control(header.as_bytes())?;
    Ok(())
  }

  /// The firmware version of the supervisor
  /// (major, minor, patch)
  pub fn pic_firmware_version(&mut self) -> Result<[u8;3], ScopeError> {
    self.send_command(PicCommand::PicVersion)?;
    let frame = self.read_response()?;
    let version = [frame[6], frame[5], frame[4]];
    info!("PIC firmware version {}.{}.{}", version[0], version[1], version[2]);
    Ok(version)
  }

  /// Reset the supervisor. The device will disconnect.
  pub fn reset(&mut self) -> Result<(), ScopeError> {
    info!("Resetting the scope!");
    self.send_command(PicCommand::PicReset)
  }

  /// Restart the supervisor into its bootloader
  pub fn load_bootloader(&mut self) -> Result<(), ScopeError> {
    info!("Rebooting the scope into the bootloader!");
    self.send_command(PicCommand::PicBootloader)
  }

  pub fn write_bulk(&mut self, data : &[u8]) -> Result<(), ScopeError> {
    self.transport.write_bulk(data)?;
    Ok(())
  }

  pub fn flush_data_pipe(&mut self) -> Result<(), ScopeError> {
    self.transport.flush_data_pipe()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transport::{
    SimulatedTransport,
    FrameKind,
  };

  #[test]
  fn fpga_read_sets_the_pointer_first() {
    let mut usb = SimulatedTransport::new();
    usb.set_bus_register(0x0D, 2, 0xAB);
    usb.set_bus_register(0x0D, 3, 0xCD);
    let mut scope = ScopeInterface::new(usb);
    let data = scope.get_controller_register(Controller::FpgaBus, 0x0D02, 2).unwrap();
    assert_eq!(data, vec![0xAB, 0xCD]);
    let frames = scope.transport().control_frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].bytes, vec![0xC0, 10, 2, 0x1A, 0x02]);
    assert_eq!(frames[1].bytes, vec![0xC0, 11, 0x0D, 2]);
  }

  #[test]
  fn writes_go_out_chunked() {
    let mut scope = ScopeInterface::new(SimulatedTransport::new());
    let payload : Vec<u8> = (0..40).collect();
    scope.set_controller_register(Controller::FpgaBus, 0x0C00, &payload).unwrap();
    assert_eq!(scope.transport().control_frames().len(), 2);
    assert_eq!(scope.transport().bus_register(0x0C, 39), 39);
    assert!(scope.transport().frames.iter().all(|f| f.kind == FrameKind::Control));
  }

  #[test]
  fn program_storage_round_trip() {
    let mut scope = ScopeInterface::new(SimulatedTransport::new());
    scope.set_controller_register(Controller::ProgramStorage, 0x0210, &[9, 8, 7]).unwrap();
    let data = scope.get_controller_register(Controller::ProgramStorage, 0x0210, 3).unwrap();
    assert_eq!(data, vec![9, 8, 7]);
  }

  #[test]
  fn out_of_range_reads_send_nothing() {
    let mut scope = ScopeInterface::new(SimulatedTransport::new());
    assert_eq!(scope.get_controller_register(Controller::FpgaBus, 0x0D00, 13),
               Err(ScopeError::OutOfRange));
    assert_eq!(scope.get_controller_register(Controller::WaveformGenerator, 0, 1),
               Err(ScopeError::UnsupportedOperation));
    assert!(scope.transport().frames.is_empty());
  }

  #[test]
  fn missing_response_is_a_transport_failure() {
    let mut scope = ScopeInterface::new(SimulatedTransport::new());
    scope.send_command(PicCommand::PicReset).unwrap();
    let mut buffer = [0u8;16];
    assert_eq!(scope.transport_mut().read_control(&mut buffer),
               Err(TransportError::Timeout));
  }

  #[test]
  fn pic_version_is_reversed() {
    let mut usb = SimulatedTransport::new();
    usb.pic_version = [1, 2, 3];
    let mut scope = ScopeInterface::new(usb);
    assert_eq!(scope.pic_firmware_version().unwrap(), [1, 2, 3]);
  }
}
