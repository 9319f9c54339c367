//! # smartscope-lib
//!
//! Control plane of the SmartScope USB oscilloscope.
//!
//! * `protocol`    - command headers and chunking for the
//!                   controllers behind the supervisor (PIC)
//! * `transport`   - the USB seam, and a simulated device
//! * `interface`   - controller register access over a transport
//! * `registers`   - FPGA register maps for both hardware revisions
//! * `memory`      - staged register memories with batched commit
//! * `calibration` - gain stages, volt/byte and time conversions
//! * `control`     - scope configuration on top of the memories
//! * `flash`       - FPGA bitstream upload
//! * `settings`    - configuration files
//!
//! A session against the simulated device:
//!
//! ```
//! use smartscope_lib::{
//!   AnalogChannel,
//!   ScopeConfig,
//!   ScopeControl,
//!   SimulatedTransport,
//! };
//!
//! let mut scope = ScopeControl::open(SimulatedTransport::new(), &ScopeConfig::new()).unwrap();
//! scope.set_vertical_range(AnalogChannel::A, -0.5, 0.5).unwrap();
//! assert!(scope.commit_settings().unwrap() > 0);
//! ```

pub mod constants;
pub mod errors;
pub mod protocol;
pub mod transport;
pub mod interface;
pub mod registers;
pub mod memory;
pub mod calibration;
pub mod control;
pub mod flash;
pub mod settings;

#[macro_use] extern crate log;
extern crate env_logger;

use std::io::Write;

use colored::{
  Colorize,
  ColoredString,
};
use log::Level;

pub use errors::{
  ScopeError,
  TransportError,
};
pub use protocol::{
  Controller,
  Operation,
  PicCommand,
};
pub use transport::{
  SimulatedTransport,
  Transport,
};
pub use interface::ScopeInterface;
pub use registers::HardwareRevision;
pub use memory::Memory;
pub use calibration::{
  AnalogChannel,
  CalibrationTable,
  GainStage,
  ProbeDivision,
};
pub use control::ScopeControl;
pub use flash::{
  FlashReport,
  FlashSequencer,
};
pub use settings::ScopeConfig;

/// Severity tag of a log line, colored by level
pub fn color_log(level : &Level) -> ColoredString {
  match level {
    Level::Error => String::from(" ERROR!").red(),
    Level::Warn  => String::from(" WARN  ").yellow(),
    Level::Info  => String::from(" Info  ").green(),
    Level::Debug => String::from(" debug ").blue(),
    Level::Trace => String::from(" trace ").cyan(),
  }
}

/// Install env_logger for the scope tools, lines read
/// `[LEVEL][module:line] message`. The level filter comes
/// from `RUST_LOG`.
pub fn init_env_logger() {
  env_logger::builder()
    .format(|buf, record| {
      writeln!(buf, "[{}][{}:{}] {}",
               color_log(&record.level()),
               record.module_path().unwrap_or("?"),
               record.line().unwrap_or(0),
               record.args())
    }).init();
}
