//! Offline command tool for the SmartScope
//!
//! Runs the control plane against the simulated scope,
//! to inspect what goes over the wire for a command, a
//! vertical range or an FPGA bitstream before trying it
//! on hardware.

#[macro_use] extern crate log;

use std::path::PathBuf;
use std::process::exit;

use chrono::Utc;
use clap::{
  Args,
  Parser,
  Subcommand,
  ValueEnum,
};
use colored::Colorize;
use indicatif::{
  ProgressBar,
  ProgressStyle,
};

use smartscope_lib::{
  AnalogChannel,
  Controller,
  FlashSequencer,
  HardwareRevision,
  Operation,
  ProbeDivision,
  ScopeConfig,
  ScopeControl,
  ScopeInterface,
  SimulatedTransport,
  init_env_logger,
};
use smartscope_lib::protocol::{
  chunk,
  to_hex,
};
use smartscope_lib::registers::{
  RegisterKey,
  RomRegister,
  SettingsRegister,
  Strobe,
  address_table,
};

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum)]
enum ControllerArg {
  Supervisor,
  Eeprom,
  Flash,
  Fpga,
  Awg,
}

impl From<ControllerArg> for Controller {
  fn from(arg : ControllerArg) -> Self {
    match arg {
      ControllerArg::Supervisor => Controller::Supervisor,
      ControllerArg::Eeprom     => Controller::SettingsMemory,
      ControllerArg::Flash      => Controller::ProgramStorage,
      ControllerArg::Fpga       => Controller::FpgaBus,
      ControllerArg::Awg        => Controller::WaveformGenerator,
    }
  }
}

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum)]
enum ChannelArg {
  A,
  B,
}

impl From<ChannelArg> for AnalogChannel {
  fn from(arg : ChannelArg) -> Self {
    match arg {
      ChannelArg::A => AnalogChannel::A,
      ChannelArg::B => AnalogChannel::B,
    }
  }
}

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum)]
enum ProbeArg {
  X1,
  X10,
  X100,
}

impl From<ProbeArg> for ProbeDivision {
  fn from(arg : ProbeArg) -> Self {
    match arg {
      ProbeArg::X1   => ProbeDivision::X1,
      ProbeArg::X10  => ProbeDivision::X10,
      ProbeArg::X100 => ProbeDivision::X100,
    }
  }
}

#[derive(Debug, Copy, Clone, PartialEq, ValueEnum)]
enum RevisionArg {
  Legacy,
  Current,
}

impl From<RevisionArg> for HardwareRevision {
  fn from(arg : RevisionArg) -> Self {
    match arg {
      RevisionArg::Legacy  => HardwareRevision::Legacy,
      RevisionArg::Current => HardwareRevision::Current,
    }
  }
}

#[derive(Debug, Args, PartialEq)]
struct EncodeCmd {
  /// Controller to address
  #[arg(value_enum, required = true)]
  controller : ControllerArg,
  /// Register/memory address, e.g. 0x0C08
  #[arg(required = true, value_parser = parse_address)]
  address    : u32,
  /// Read this many bytes instead of writing
  #[arg(short, long)]
  read       : Option<usize>,
  /// Bytes to write, as hex (e.g. 0a0b0c)
  #[arg(short, long, default_value = "")]
  data       : String,
}

#[derive(Debug, Args, PartialEq)]
struct RegistersCmd {
  #[arg(value_enum, default_value_t = RevisionArg::Current)]
  revision : RevisionArg,
}

#[derive(Debug, Args, PartialEq)]
struct RangeCmd {
  #[arg(value_enum, required = true)]
  channel : ChannelArg,
  /// Lower end of the window (V)
  #[arg(required = true, allow_hyphen_values = true)]
  min     : f64,
  /// Upper end of the window (V)
  #[arg(required = true, allow_hyphen_values = true)]
  max     : f64,
  #[arg(short, long, value_enum, default_value_t = ProbeArg::X1)]
  probe   : ProbeArg,
  /// Y-offset (V)
  #[arg(short, long, default_value_t = 0.0, allow_hyphen_values = true)]
  offset  : f64,
}

#[derive(Debug, Args, PartialEq)]
struct FlashCmd {
  /// FPGA bitstream
  #[arg(required = true)]
  image : PathBuf,
}

#[derive(Debug, Args, PartialEq)]
struct ConfigCmd {
  /// Output file
  #[arg(default_value = "smartscope-config.toml")]
  output : String,
  /// Write json instead of toml
  #[arg(long, default_value_t = false)]
  json   : bool,
}

#[derive(Debug, Subcommand, PartialEq)]
enum Command {
  /// Show the command frames for a controller access
  Encode(EncodeCmd),
  /// Print the FPGA register maps
  Registers(RegistersCmd),
  /// Select a vertical range and show the register writes
  Range(RangeCmd),
  /// Dry run of the FPGA flash sequence
  Flash(FlashCmd),
  /// Write a config file with the defaults
  Config(ConfigCmd),
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
  /// A toml config file
  #[arg(short, long)]
  config  : Option<String>,
  #[command(subcommand)]
  command : Command,
}

fn parse_address(arg : &str) -> Result<u32, String> {
  let parsed = match arg.strip_prefix("0x") {
    Some(hex) => u32::from_str_radix(hex, 16),
    None      => arg.parse::<u32>(),
  };
  parsed.map_err(|err| format!("{} is not an address! {}", arg, err))
}

fn parse_hex(arg : &str) -> Option<Vec<u8>> {
  if !arg.is_ascii() || arg.len() % 2 != 0 {
    return None;
  }
  (0..arg.len()).step_by(2)
                .map(|k| u8::from_str_radix(&arg[k..k+2], 16).ok())
                .collect()
}

fn encode(cmd : &EncodeCmd) {
  let controller = Controller::from(cmd.controller);
  if let Some(length) = cmd.read {
    match controller.encode(Operation::Read, cmd.address, length) {
      Err(err) => {
        error!("Can not encode the read! {}", err);
        exit(1);
      }
      Ok(header) => println!("{} {}", "=>".green(), to_hex(header.as_bytes())),
    }
    return;
  }
  let payload = match parse_hex(&cmd.data) {
    Some(p) => p,
    None => {
      error!("{} is not a hex string!", cmd.data);
      exit(1);
    }
  };
  match chunk(controller, Operation::Write, cmd.address, &payload) {
    Err(err) => {
      error!("Can not encode the write! {}", err);
      exit(1);
    }
    Ok(chunks) => {
      for c in chunks.iter() {
        println!("{} [{:?}] {}", "=>".green(), c.operation, to_hex(&c.frame()));
      }
    }
  }
}

fn print_table<K: RegisterKey>(title : &str, revision : HardwareRevision) {
  println!("{}", title.bold());
  for (key, address) in address_table::<K>(revision) {
    println!("  0x{:02x} {:>3} {}", address, address, key.name());
  }
}

fn registers(cmd : &RegistersCmd) {
  let revision = HardwareRevision::from(cmd.revision);
  println!("== {} ==", revision);
  print_table::<SettingsRegister>("settings (bus 0x0C)", revision);
  print_table::<Strobe>("strobes", revision);
  print_table::<RomRegister>("rom (bus 0x0D)", revision);
}

fn range(cmd : &RangeCmd, config : &ScopeConfig) {
  let channel = AnalogChannel::from(cmd.channel);
  let mut scope = match ScopeControl::open(SimulatedTransport::new(), config) {
    Ok(s) => s,
    Err(err) => {
      error!("Unable to open the simulated scope! {}", err);
      exit(1);
    }
  };
  let result = scope.set_probe_division(channel, ProbeDivision::from(cmd.probe))
    .and_then(|_| scope.set_vertical_range(channel, cmd.min, cmd.max))
    .and_then(|_| scope.set_y_offset(channel, cmd.offset))
    .and_then(|_| scope.commit_settings());
  match result {
    Err(err) => {
      error!("Range selection failed! {}", err);
      exit(1);
    }
    Ok(written) => {
      let settings = scope.channel(channel);
      println!("{} {}", channel, settings.stage());
      println!("  {}", settings.coefficients());
      println!("  y-offset {:.4} V", settings.y_offset);
      println!("  {} registers written:", written);
      for frame in scope.iface.transport().control_frames() {
        println!("  {} {}", "=>".green(), to_hex(&frame.bytes));
      }
    }
  }
}

fn flash(cmd : &FlashCmd, config : &ScopeConfig) {
  let image = match std::fs::read(&cmd.image) {
    Ok(bytes) => bytes,
    Err(err) => {
      error!("Unable to read {}! {}", cmd.image.display(), err);
      exit(1);
    }
  };
  let sequencer = FlashSequencer::new(config.flash_settings());
  let mut iface = ScopeInterface::new(SimulatedTransport::new());
  let template = "[{elapsed_precise}] {prefix} {msg} {bar:60.blue/grey} {bytes:>7}/{total_bytes:7}";
  let bar = ProgressBar::new(image.len() as u64);
  match ProgressStyle::with_template(template) {
    Ok(style) => bar.set_style(style),
    Err(err)  => warn!("Can not use the progress bar template! {}", err),
  }
  bar.set_message("Flashing..");
  println!("{} Flashing {} ({} bytes)", Utc::now().to_rfc2822(), cmd.image.display(), image.len());
  let result = sequencer.flash_with_progress(&mut iface, &image, |sent, _| bar.set_position(sent as u64));
  bar.finish();
  match result {
    Err(err) => {
      error!("Flashing failed! {}", err);
      exit(1);
    }
    Ok(report) => {
      println!("{}", report);
      println!("{} control frames, {} bulk frames",
               iface.transport().control_frames().len(),
               iface.transport().bulk_frames().len());
    }
  }
}

fn main() {
  init_env_logger();
  let cli = Cli::parse();

  let config = match &cli.config {
    None => ScopeConfig::new(),
    Some(filename) => {
      match ScopeConfig::from_toml(filename.clone()) {
        Ok(c) => {
          info!("Loaded config {}", filename);
          c
        }
        Err(err) => {
          error!("Unable to load config {}! {}", filename, err);
          exit(1);
        }
      }
    }
  };

  match &cli.command {
    Command::Encode(cmd)    => encode(cmd),
    Command::Registers(cmd) => registers(cmd),
    Command::Range(cmd)     => range(cmd, &config),
    Command::Flash(cmd)     => flash(cmd, &config),
    Command::Config(cmd)    => {
      if cmd.json {
        config.to_json(cmd.output.clone());
      } else {
        config.to_toml(cmd.output.clone());
      }
    }
  }
}
