//! Reprogramming of the FPGA
//!
//! The bitstream goes over the bulk endpoint, bracketed
//! by the PROGRAM_FPGA_START and PROGRAM_FPGA_END commands:
//!
//! 1. start command with the number of 32 byte packets
//!    (bitstream + padding)
//! 2. wait for the INIT line of the FPGA, then flush
//!    the data pipe
//! 3. the bitstream in blocks of 64 packets
//! 4. padding packets of 0xFF which keep the configuration
//!    clock running
//! 5. end command, flush the data pipe
//!
//! Every failure aborts the sequence. The FPGA is in an
//! undefined state then, and flashing has to start over.

use std::fmt;
use std::thread;
use std::time::{
  Duration,
  Instant,
};

use serde::{
  Deserialize,
  Serialize,
};

use crate::constants::{
  FLASH_FILLER_BYTE,
  FLASH_PACKETS_PER_COMMAND,
  FLASH_PACKET_SIZE,
  FLASH_PADDING_PACKETS,
  FLASH_READY_DELAY_MS,
};
use crate::errors::ScopeError;
use crate::interface::ScopeInterface;
use crate::protocol::{
  PicCommand,
  command,
  program_fpga_start,
};
use crate::transport::Transport;

/// Packet layout of a flash sequence
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashSettings {
  pub packet_size         : usize,
  pub packets_per_command : usize,
  pub padding_packets     : usize,
  pub ready_delay_ms      : u64,
}

impl FlashSettings {
  pub fn new() -> Self {
    Self {
      packet_size         : FLASH_PACKET_SIZE,
      packets_per_command : FLASH_PACKETS_PER_COMMAND,
      padding_packets     : FLASH_PADDING_PACKETS,
      ready_delay_ms      : FLASH_READY_DELAY_MS,
    }
  }
}

impl Default for FlashSettings {
  fn default() -> Self {
    Self::new()
  }
}

/// What went over the wire during a flash sequence
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FlashReport {
  pub image_bytes     : usize,
  /// Packets announced in the start command
  pub total_packets   : u16,
  pub data_packets    : usize,
  pub padding_packets : usize,
  pub bulk_transfers  : usize,
  pub elapsed         : Duration,
}

impl fmt::Display for FlashReport {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut repr = String::from("<FlashReport:");
    repr += &(format!("\n  image bytes     : {}", self.image_bytes));
    repr += &(format!("\n  total packets   : {}", self.total_packets));
    repr += &(format!("\n  data packets    : {}", self.data_packets));
    repr += &(format!("\n  padding packets : {}", self.padding_packets));
    repr += &(format!("\n  bulk transfers  : {}", self.bulk_transfers));
    repr += &(format!("\n  elapsed         : {:.3} s>", self.elapsed.as_secs_f64()));
    write!(f, "{}", repr)
  }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FlashSequencer {
  pub settings : FlashSettings,
}

impl FlashSequencer {

  pub fn new(settings : FlashSettings) -> Self {
    Self {
      settings
    }
  }

  /// Number of packets the bitstream occupies, without padding
  pub fn data_packets(&self, image_len : usize) -> usize {
    if self.settings.packet_size == 0 {
      return 0;
    }
    (image_len + self.settings.packet_size - 1) / self.settings.packet_size
  }

  /// The packet count announced in the start command
  pub fn packet_count(&self, image_len : usize) -> Result<u16, ScopeError> {
    if image_len == 0 {
      error!("Refusing to flash an empty image!");
      return Err(ScopeError::InvalidConfiguration);
    }
    if self.settings.packet_size == 0 || self.settings.packets_per_command == 0 {
      error!("Flash packet layout {:?} is not valid!", self.settings);
      return Err(ScopeError::InvalidConfiguration);
    }
    let total = self.data_packets(image_len) + self.settings.padding_packets;
    match u16::try_from(total) {
      Ok(n) => Ok(n),
      Err(_) => {
        error!("Image of {} bytes needs {} packets, which does not fit into the start command!",
               image_len, total);
        Err(ScopeError::InvalidConfiguration)
      }
    }
  }

  pub fn flash<T: Transport>(&self,
                             iface : &mut ScopeInterface<T>,
                             image : &[u8]) -> Result<FlashReport, ScopeError> {
    self.flash_with_progress(iface, image, |_, _| {})
  }

  /// Run the flash sequence
  ///
  /// # Arguments
  ///
  /// * iface    : the scope
  /// * image    : the FPGA bitstream
  /// * progress : called with (bytes sent, image bytes)
  ///              after every bulk transfer of the bitstream
  pub fn flash_with_progress<T, F>(&self,
                                   iface        : &mut ScopeInterface<T>,
                                   image        : &[u8],
                                   mut progress : F) -> Result<FlashReport, ScopeError>
    where T: Transport,
          F: FnMut(usize, usize) {
    let total_packets = self.packet_count(image.len())?;
    let start = Instant::now();
    info!("Flashing FPGA with {} bytes ({} packets)", image.len(), total_packets);

    iface.send_header(&program_fpga_start(total_packets))?;
    // the INIT line needs time to rise, bytes sent earlier are lost
    thread::sleep(Duration::from_millis(self.settings.ready_delay_ms));
    iface.flush_data_pipe()?;

    let mut bulk_transfers = 0usize;
    let mut sent = 0usize;
    let block_size = self.settings.packet_size * self.settings.packets_per_command;
    for block in image.chunks(block_size) {
      if let Err(err) = iface.write_bulk(block) {
        error!("Flashing aborted after {} of {} bytes! {}", sent, image.len(), err);
        return Err(err);
      }
      sent += block.len();
      bulk_transfers += 1;
      progress(sent, image.len());
    }
    trace!("Bitstream sent in {} bulk transfers", bulk_transfers);

    let filler = vec![FLASH_FILLER_BYTE; self.settings.packet_size];
    for k in 0..self.settings.padding_packets {
      if let Err(err) = iface.write_bulk(&filler) {
        error!("Flashing aborted at padding packet {}! {}", k, err);
        return Err(err);
      }
      bulk_transfers += 1;
    }

    iface.send_header(&command(PicCommand::ProgramFpgaEnd))?;
    iface.flush_data_pipe()?;

    let report = FlashReport {
      image_bytes     : image.len(),
      total_packets,
      data_packets    : self.data_packets(image.len()),
      padding_packets : self.settings.padding_packets,
      bulk_transfers,
      elapsed         : start.elapsed(),
    };
    info!("FPGA flashed in {:.3} s", report.elapsed.as_secs_f64());
    Ok(report)
  }
}

impl Default for FlashSequencer {
  fn default() -> Self {
    Self::new(FlashSettings::new())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::errors::TransportError;
  use crate::transport::{
    FrameKind,
    SimulatedTransport,
  };

  #[test]
  fn packet_count_rounds_up() {
    let seq = FlashSequencer::default();
    assert_eq!(seq.packet_count(1).unwrap(), 1 + 256);
    assert_eq!(seq.packet_count(32).unwrap(), 1 + 256);
    assert_eq!(seq.packet_count(33).unwrap(), 2 + 256);
    assert_eq!(seq.packet_count(0), Err(ScopeError::InvalidConfiguration));
    assert_eq!(seq.packet_count(32 * 70000), Err(ScopeError::InvalidConfiguration));
  }

  #[test]
  fn sequence_is_bracketed() {
    let mut iface = ScopeInterface::new(SimulatedTransport::new());
    let mut seq = FlashSequencer::default();
    seq.settings.ready_delay_ms = 1;
    let image = vec![0x5Au8; 5000];
    let report = seq.flash(&mut iface, &image).unwrap();
    let frames = &iface.transport().frames;
    assert_eq!(frames[0].kind, FrameKind::Control);
    // 5000 bytes = 157 packets
    assert_eq!(frames[0].bytes, vec![0xC0, 12, 0x01, 0x9D]);
    assert_eq!(frames[1].kind, FrameKind::Flush);
    let n = frames.len();
    assert_eq!(frames[n - 2].bytes, vec![0xC0, 13]);
    assert_eq!(frames[n - 1].kind, FrameKind::Flush);
    // 2048 + 2048 + 904
    assert_eq!(report.bulk_transfers, 3 + 256);
    assert_eq!(report.data_packets, 157);
    assert_eq!(iface.transport().bulk_frames()[2].bytes.len(), 904);
  }

  #[test]
  fn failure_aborts_the_sequence() {
    let mut iface = ScopeInterface::new(SimulatedTransport::new());
    let mut seq = FlashSequencer::default();
    seq.settings.ready_delay_ms = 0;
    // start command, then the first bulk transfer fails
    iface.transport_mut().fail_on_write(2, TransportError::Io);
    let image = vec![0u8; 100];
    assert_eq!(seq.flash(&mut iface, &image),
               Err(ScopeError::TransportFailure(TransportError::Io)));
    assert!(iface.transport().bulk_frames().is_empty());
    assert!(!iface.transport().control_frames().iter().any(|f| f.bytes == vec![0xC0, 13]));
  }

  #[test]
  fn progress_reaches_the_image_size() {
    let mut iface = ScopeInterface::new(SimulatedTransport::new());
    let mut seq = FlashSequencer::default();
    seq.settings.ready_delay_ms = 0;
    let image = vec![1u8; 4097];
    let mut calls = Vec::<usize>::new();
    seq.flash_with_progress(&mut iface, &image, |sent, _| calls.push(sent)).unwrap();
    assert_eq!(calls, vec![2048, 4096, 4097]);
  }
}
