//! Scope configuration on top of the register model
//!
//! `ScopeControl` keeps the FPGA memories and the
//! calibrated channel settings of one device together.
//! Setters stage register values, nothing reaches the
//! hardware before `commit_settings`, which writes all
//! dirty registers and then toggles the `SCOPE_UPDATE`
//! strobe so the FPGA applies the batch at once.
//!
//! Exceptions are the acquisition commands (run, stop,
//! force trigger), which go out immediately.
//!
//! Callers which share a `ScopeControl` between threads
//! have to hold a lock around stage + commit.

use std::fmt;

use crate::calibration::{
  AnalogChannel,
  CalibrationTable,
  ChannelSettings,
  GainStage,
  ProbeDivision,
  TimeBase,
};
use crate::constants::N_DIGITAL_CHANNELS;
use crate::errors::ScopeError;
use crate::interface::ScopeInterface;
use crate::memory::Memory;
use crate::registers::{
  HardwareRevision,
  RegisterKey,
  RomRegister,
  SettingsRegister,
  Strobe,
};
use crate::settings::ScopeConfig;
use crate::transport::Transport;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TriggerDirection {
  Rising  = 0,
  Falling = 1,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquisitionMode {
  Normal = 0,
  Auto   = 1,
  Single = 2,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Coupling {
  Ac,
  Dc,
}

/// Condition of a single logic analyser channel
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DigitalTriggerValue {
  Low,
  High,
  Rising,
  Falling,
  DontCare,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AnalogTrigger {
  pub channel   : AnalogChannel,
  pub direction : TriggerDirection,
  /// Level in volts
  pub level     : f64,
}

impl AnalogTrigger {
  pub fn new() -> Self {
    Self {
      channel   : AnalogChannel::A,
      direction : TriggerDirection::Rising,
      level     : 0.0,
    }
  }
}

impl Default for AnalogTrigger {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquisitionState {
  Idle,
  Armed,
  /// Stop was requested, the device may still deliver
  /// an acquisition
  StopPending,
}

impl fmt::Display for AcquisitionState {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<AcquisitionState: {:?}>", self)
  }
}

pub struct ScopeControl<T: Transport> {
  pub iface         : ScopeInterface<T>,
  revision          : HardwareRevision,
  settings          : Memory,
  strobes           : Memory,
  rom               : Memory,
  table             : CalibrationTable,
  timebase          : TimeBase,
  channels          : [ChannelSettings;2],
  trigger           : AnalogTrigger,
  trigger_threshold : f64,
  holdoff           : f64,
  chunky            : bool,
  state             : AcquisitionState,
}

impl<T: Transport> ScopeControl<T> {

  pub fn new(iface    : ScopeInterface<T>,
             revision : HardwareRevision,
             table    : CalibrationTable,
             timebase : TimeBase) -> Result<Self, ScopeError> {
    let channels = [ChannelSettings::new(AnalogChannel::A, &table),
                    ChannelSettings::new(AnalogChannel::B, &table)];
    info!("Scope session with {}", revision);
    Ok(Self {
      iface,
      revision,
      settings          : Memory::fpga_settings(revision),
      strobes           : Memory::fpga_strobes(revision)?,
      rom               : Memory::fpga_rom(revision),
      table,
      timebase,
      channels,
      trigger           : AnalogTrigger::new(),
      trigger_threshold : 0.0,
      holdoff           : 0.0,
      chunky            : false,
      state             : AcquisitionState::Idle,
    })
  }

  /// Start a session from a config. Unless the config
  /// forces a revision, it is detected from the FPGA rom.
  pub fn open(transport : T, config : &ScopeConfig) -> Result<Self, ScopeError> {
    let mut iface = ScopeInterface::new(transport);
    let revision = match config.interface.hardware_revision {
      Some(rev) => {
        info!("Using the configured {}", rev);
        rev
      }
      None => {
        // the rom layout is the same for all revisions
        let mut rom = Memory::fpga_rom(HardwareRevision::Current);
        let address = RomRegister::FwMsb.address(HardwareRevision::Current).ok_or(ScopeError::UnknownRegister)?;
        let major = rom.read(&mut iface, address)?;
        let rev = HardwareRevision::detect(major);
        info!("FPGA firmware major version {} => {}", major, rev);
        rev
      }
    };
    Self::new(iface, revision, config.calibration_table()?, config.time_base())
  }

  pub fn revision(&self) -> HardwareRevision {
    self.revision
  }

  pub fn settings(&self) -> &Memory {
    &self.settings
  }

  pub fn strobes(&self) -> &Memory {
    &self.strobes
  }

  pub fn channel(&self, ch : AnalogChannel) -> &ChannelSettings {
    &self.channels[ch.index()]
  }

  pub fn calibration_table(&self) -> &CalibrationTable {
    &self.table
  }

  pub fn state(&self) -> AcquisitionState {
    self.state
  }

  /// Address of a settings register in this revision
  fn register_address(&self, key : SettingsRegister) -> Result<u32, ScopeError> {
    match key.address(self.revision) {
      Some(a) => Ok(a),
      None => {
        error!("{} does not exist in {}!", key.name(), self.revision);
        Err(ScopeError::UnknownRegister)
      }
    }
  }

  /// Address of a strobe in this revision
  fn strobe_address(&self, key : Strobe) -> Result<u32, ScopeError> {
    match key.address(self.revision) {
      Some(a) => Ok(a),
      None => {
        error!("{} does not exist in {}!", key.name(), self.revision);
        Err(ScopeError::UnknownRegister)
      }
    }
  }

  fn set_reg(&mut self, key : SettingsRegister, value : u8) -> Result<(), ScopeError> {
    let address = self.register_address(key)?;
    self.settings.set(address, value)
  }

  fn get_reg(&self, key : SettingsRegister) -> Result<u8, ScopeError> {
    self.settings.get(self.register_address(key)?)
  }

  fn set_strobe(&mut self, key : Strobe, value : bool) -> Result<(), ScopeError> {
    let address = self.strobe_address(key)?;
    self.strobes.set(address, value as u8)
  }

  fn get_strobe(&self, key : Strobe) -> Result<bool, ScopeError> {
    Ok(self.strobes.get(self.strobe_address(key)?)? == 1)
  }

  fn strobe_now(&mut self, key : Strobe, value : bool) -> Result<(), ScopeError> {
    let address = self.strobe_address(key)?;
    self.strobes.write_immediate(&mut self.iface, address, value as u8)
  }

  fn offset_register(ch : AnalogChannel) -> SettingsRegister {
    match ch {
      AnalogChannel::A => SettingsRegister::ChaYOffset,
      AnalogChannel::B => SettingsRegister::ChbYOffset,
    }
  }

  //========== vertical ==========

  /// Select the gain stage for a voltage window and
  /// re-apply the y-offset (and the trigger, if it is on
  /// this channel) with the new coefficients
  ///
  /// # Arguments
  ///
  /// * ch  : analog channel
  /// * min : lower end of the window in volts (at the probe)
  /// * max : upper end of the window in volts (at the probe)
  pub fn set_vertical_range(&mut self,
                            ch  : AnalogChannel,
                            min : f64,
                            max : f64) -> Result<GainStage, ScopeError> {
    let div_mul = self.register_address(SettingsRegister::DividerMultiplier)?;
    // a rejected range leaves the channel untouched
    let mut channel = self.channels[ch.index()].clone();
    let stage = channel.select_range(&self.table, min, max)?;
    let packed = stage.pack(ch, self.settings.get(div_mul)?);
    self.settings.set(div_mul, packed)?;
    self.channels[ch.index()] = channel;
    debug!("{} range [{}, {}] V => {}", ch, min, max, stage);

    let offset = self.channels[ch.index()].y_offset;
    let value  = self.set_y_offset(ch, offset)?;
    self.channels[ch.index()].y_offset = self.channels[ch.index()].byte_to_voltage(value);
    if self.trigger.channel == ch {
      self.set_trigger_analog(self.trigger)?;
    }
    Ok(stage)
  }

  /// Change the probe attenuation, the vertical range is
  /// selected again for the stored window
  pub fn set_probe_division(&mut self, ch : AnalogChannel, probe : ProbeDivision) -> Result<GainStage, ScopeError> {
    self.channels[ch.index()].set_probe(probe);
    let (min, max) = self.channels[ch.index()].range();
    self.set_vertical_range(ch, min, max)
  }

  /// Stage the y-offset of a channel, returns the
  /// register value
  pub fn set_y_offset(&mut self, ch : AnalogChannel, volts : f64) -> Result<u8, ScopeError> {
    let value = self.channels[ch.index()].voltage_to_byte(volts);
    self.set_reg(Self::offset_register(ch), value)?;
    self.channels[ch.index()].y_offset = volts;
    debug!("Y-offset of {} set to {} V = {}", ch, volts, value);
    Ok(value)
  }

  /// The y-offset in volts as it is staged in the register
  pub fn y_offset(&self, ch : AnalogChannel) -> Result<f64, ScopeError> {
    let value = self.get_reg(Self::offset_register(ch))?;
    Ok(self.channels[ch.index()].byte_to_voltage(value))
  }

  /// The staged y-offset relative to the mid range
  /// register value, as the legacy front end reports it
  pub fn legacy_y_offset(&self, ch : AnalogChannel) -> Result<f64, ScopeError> {
    let value = self.get_reg(Self::offset_register(ch))?;
    Ok(self.channels[ch.index()].legacy_byte_to_voltage(value))
  }

  pub fn set_coupling(&mut self, ch : AnalogChannel, coupling : Coupling) -> Result<(), ScopeError> {
    let key = match ch {
      AnalogChannel::A => Strobe::ChaDcCoupling,
      AnalogChannel::B => Strobe::ChbDcCoupling,
    };
    debug!("Set {:?} coupling for {}", coupling, ch);
    self.set_strobe(key, coupling == Coupling::Dc)
  }

  pub fn coupling(&self, ch : AnalogChannel) -> Result<Coupling, ScopeError> {
    let key = match ch {
      AnalogChannel::A => Strobe::ChaDcCoupling,
      AnalogChannel::B => Strobe::ChbDcCoupling,
    };
    if self.get_strobe(key)? {
      Ok(Coupling::Dc)
    } else {
      Ok(Coupling::Ac)
    }
  }

  //========== trigger ==========

  /// Stage level, channel and direction of the analog trigger
  pub fn set_trigger_analog(&mut self, trigger : AnalogTrigger) -> Result<(), ScopeError> {
    let mode_address = self.register_address(SettingsRegister::TriggerMode)?;
    let level_address = self.register_address(SettingsRegister::TriggerLevel)?;
    let offset_byte = self.get_reg(Self::offset_register(trigger.channel))?;
    let level = self.channels[trigger.channel.index()].trigger_level_byte(trigger.level, offset_byte);
    let mut mode = self.settings.get(mode_address)?;
    mode = (mode & 0xF3) | ((trigger.channel.index() as u8) << 2);
    mode = (mode & 0xCF) | (((trigger.direction as u8) << 4) & 0x30);
    self.settings.set(level_address, level)?;
    self.settings.set(mode_address, mode)?;
    self.trigger = trigger;
    debug!("Trigger on {} {:?} at {} V ({})", trigger.channel, trigger.direction, trigger.level, level);
    Ok(())
  }

  pub fn trigger(&self) -> AnalogTrigger {
    self.trigger
  }

  pub fn set_trigger_channel(&mut self, ch : AnalogChannel) -> Result<(), ScopeError> {
    let mut trigger = self.trigger;
    trigger.channel = ch;
    self.set_trigger_analog(trigger)
  }

  pub fn set_trigger_direction(&mut self, direction : TriggerDirection) -> Result<(), ScopeError> {
    let mut trigger = self.trigger;
    trigger.direction = direction;
    self.set_trigger_analog(trigger)
  }

  /// The trigger channel as staged in the trigger mode register
  pub fn trigger_channel(&self) -> Result<AnalogChannel, ScopeError> {
    let mode = self.get_reg(SettingsRegister::TriggerMode)?;
    match (mode & 0x0C) >> 2 {
      0 => Ok(AnalogChannel::A),
      1 => Ok(AnalogChannel::B),
      other => {
        error!("Trigger mode register points to channel {}!", other);
        Err(ScopeError::InvalidConfiguration)
      }
    }
  }

  /// Stage the logic analyser trigger. The analog trigger
  /// is moved to channel A, rising, 0V, since the logic
  /// analyser data comes through channel A.
  pub fn set_trigger_digital(&mut self,
                             condition : &[DigitalTriggerValue;N_DIGITAL_CHANNELS]) -> Result<(), ScopeError> {
    let mask = |value : DigitalTriggerValue| -> u8 {
      condition.iter()
               .enumerate()
               .filter(|(_, c)| **c == value)
               .fold(0u8, |m, (k, _)| m | (1 << k))
    };
    // resolve all addresses first
    let rising  = self.register_address(SettingsRegister::DigitalTriggerRising)?;
    let falling = self.register_address(SettingsRegister::DigitalTriggerFalling)?;
    let high    = self.register_address(SettingsRegister::DigitalTriggerHigh)?;
    let low     = self.register_address(SettingsRegister::DigitalTriggerLow)?;
    self.settings.set(rising,  mask(DigitalTriggerValue::Rising))?;
    self.settings.set(falling, mask(DigitalTriggerValue::Falling))?;
    self.settings.set(high,    mask(DigitalTriggerValue::High))?;
    self.settings.set(low,     mask(DigitalTriggerValue::Low))?;
    self.set_trigger_analog(AnalogTrigger {
      channel   : AnalogChannel::A,
      direction : TriggerDirection::Rising,
      level     : 0.0,
    })
  }

  /// Accepted but not applied, the hardware does not
  /// support a trigger threshold yet
  pub fn set_trigger_threshold(&mut self, volts : f64) {
    warn!("Trigger threshold is not implemented! Storing {} V without effect", volts);
    self.trigger_threshold = volts;
  }

  pub fn trigger_threshold(&self) -> f64 {
    self.trigger_threshold
  }

  /// Minimum trigger pulse width in samples. The legacy
  /// layout has a single byte for it, the current one
  /// three.
  pub fn set_trigger_width(&mut self, width : u32) -> Result<(), ScopeError> {
    match self.revision {
      HardwareRevision::Legacy => {
        if width > u8::MAX as u32 {
          error!("Trigger width {} does not fit into TRIGGER_WIDTH!", width);
          return Err(ScopeError::ValueOutOfRange);
        }
        self.set_reg(SettingsRegister::TriggerWidth, width as u8)
      }
      HardwareRevision::Current => {
        if width > 0x00FF_FFFF {
          error!("Trigger width {} does not fit into TRIGGER_PW_MIN!", width);
          return Err(ScopeError::ValueOutOfRange);
        }
        let bytes = width.to_le_bytes();
        for (k, key) in SettingsRegister::TRIGGER_PW_MIN.iter().enumerate() {
          self.set_reg(*key, bytes[k])?;
        }
        Ok(())
      }
    }
  }

  pub fn set_acquisition_mode(&mut self, mode : AcquisitionMode) -> Result<(), ScopeError> {
    let address = self.register_address(SettingsRegister::TriggerMode)?;
    let value = (self.settings.get(address)? & 0x3F) | (((mode as u8) << 6) & 0xC0);
    self.settings.set(address, value)
  }

  //========== horizontal ==========

  /// Current input decimation, 0 for the legacy layout
  pub fn decimation(&self) -> u8 {
    match SettingsRegister::InputDecimation.address(self.revision) {
      Some(a) => self.settings.get(a).unwrap_or(0),
      None    => 0
    }
  }

  /// Stage the decimation for a time range (s) and
  /// re-apply the hold-off. Returns the decimation.
  ///
  /// Nothing is staged if the stored hold-off does not
  /// fit the registers at the new decimation.
  pub fn set_time_range(&mut self, time_range : f64) -> Result<u8, ScopeError> {
    let address    = self.register_address(SettingsRegister::InputDecimation)?;
    let decimation = self.timebase.decimation_for(time_range);
    let bytes      = self.timebase.holdoff_bytes(self.holdoff, decimation)?;
    let holdoff    = self.holdoff_addresses()?;
    self.settings.set(address, decimation)?;
    for k in 0..4 {
      self.settings.set(holdoff[k], bytes[k])?;
    }
    self.chunky = self.timebase.is_chunky(decimation);
    debug!("Time range {} s => decimation {}, hold-off {:?}", time_range, decimation, bytes);
    Ok(decimation)
  }

  pub fn time_range(&self) -> f64 {
    self.timebase.time_range(self.decimation())
  }

  pub fn samples_to_time(&self, samples : usize) -> f64 {
    self.timebase.samples_to_time(samples, self.decimation())
  }

  /// Acquisitions arrive in chunks at large decimations
  pub fn chunky_acquisitions(&self) -> bool {
    self.chunky
  }

  /// Stage the hold-off (s) for the current decimation
  pub fn set_trigger_holdoff(&mut self, holdoff : f64) -> Result<(), ScopeError> {
    let bytes     = self.timebase.holdoff_bytes(holdoff, self.decimation())?;
    let addresses = self.holdoff_addresses()?;
    for k in 0..4 {
      self.settings.set(addresses[k], bytes[k])?;
    }
    self.holdoff = holdoff;
    debug!("Trigger hold-off {} us = {:?}", holdoff * 1e6, bytes);
    Ok(())
  }

  fn holdoff_addresses(&self) -> Result<[u32;4], ScopeError> {
    let mut addresses = [0u32;4];
    for (k, key) in SettingsRegister::TRIGGER_HOLDOFF.iter().enumerate() {
      addresses[k] = self.register_address(*key)?;
    }
    Ok(addresses)
  }

  pub fn holdoff(&self) -> f64 {
    self.holdoff
  }

  pub fn can_roll(&self) -> bool {
    self.timebase.is_chunky(self.decimation())
  }

  pub fn set_rolling(&mut self, enable : bool) -> Result<(), ScopeError> {
    self.set_strobe(Strobe::Roll, enable)
  }

  /// Rolling is only in effect with chunky acquisitions
  pub fn rolling(&self) -> Result<bool, ScopeError> {
    Ok(self.can_roll() && self.get_strobe(Strobe::Roll)?)
  }

  //========== logic analyser ==========

  /// The logic analyser and the generator share the
  /// data path, enabling one turns off the other
  pub fn set_logic_analyser(&mut self, enable : bool) -> Result<(), ScopeError> {
    self.set_strobe(Strobe::LaEnable, enable)?;
    if enable {
      self.set_strobe(Strobe::GeneratorToAwg, false)?;
    }
    Ok(())
  }

  pub fn set_logic_analyser_channel(&mut self, ch : AnalogChannel) -> Result<(), ScopeError> {
    self.set_strobe(Strobe::LaChannel, ch == AnalogChannel::B)
  }

  //========== acquisition ==========

  pub fn run(&mut self) -> Result<(), ScopeError> {
    self.strobe_now(Strobe::AcqStart, true)?;
    self.state = AcquisitionState::Armed;
    info!("Acquisition started");
    Ok(())
  }

  /// Request the acquisition to stop. The device confirms
  /// later, see `acknowledge_stop`.
  pub fn stop(&mut self) -> Result<(), ScopeError> {
    self.strobe_now(Strobe::AcqStop, true)?;
    if self.state == AcquisitionState::Armed {
      self.state = AcquisitionState::StopPending;
    }
    info!("Acquisition stop requested, {}", self.state);
    Ok(())
  }

  /// The device delivered its last acquisition
  pub fn acknowledge_stop(&mut self) {
    if self.state == AcquisitionState::StopPending {
      self.state = AcquisitionState::Idle;
    }
  }

  pub fn running(&self) -> bool {
    self.state == AcquisitionState::Armed
  }

  pub fn stop_pending(&self) -> bool {
    self.state == AcquisitionState::StopPending
  }

  pub fn force_trigger(&mut self) -> Result<(), ScopeError> {
    debug!("Forcing a trigger");
    self.strobe_now(Strobe::ForceTrigger, true)
  }

  /// Write every staged change to the scope and latch it
  /// with the SCOPE_UPDATE strobe. Returns the number of
  /// registers written.
  pub fn commit_settings(&mut self) -> Result<usize, ScopeError> {
    let mut written = self.settings.commit(&mut self.iface)?.len();
    written += self.strobes.commit(&mut self.iface)?.len();
    if written > 0 {
      self.strobe_now(Strobe::ScopeUpdate, false)?;
      self.strobe_now(Strobe::ScopeUpdate, true)?;
      debug!("Committed {} registers", written);
    }
    Ok(written)
  }

  //========== identification ==========

  /// The git hash of the FPGA firmware
  pub fn fpga_firmware_version(&mut self) -> Result<u32, ScopeError> {
    let mut bytes = [0u8;4];
    let keys = [RomRegister::FwGit0, RomRegister::FwGit1, RomRegister::FwGit2, RomRegister::FwGit3];
    for (k, key) in keys.iter().enumerate() {
      let address = key.address(self.revision).ok_or(ScopeError::UnknownRegister)?;
      bytes[k] = self.rom.read(&mut self.iface, address)?;
    }
    Ok(u32::from_le_bytes(bytes))
  }

  /// Major and minor version of the FPGA firmware
  pub fn fpga_firmware_release(&mut self) -> Result<(u8, u8), ScopeError> {
    let msb = RomRegister::FwMsb.address(self.revision).ok_or(ScopeError::UnknownRegister)?;
    let lsb = RomRegister::FwLsb.address(self.revision).ok_or(ScopeError::UnknownRegister)?;
    Ok((self.rom.read(&mut self.iface, msb)?, self.rom.read(&mut self.iface, lsb)?))
  }

  pub fn pic_firmware_version(&mut self) -> Result<[u8;3], ScopeError> {
    self.iface.pic_firmware_version()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::errors::TransportError;
  use crate::transport::SimulatedTransport;

  fn scope(revision : HardwareRevision) -> ScopeControl<SimulatedTransport> {
    ScopeControl::new(ScopeInterface::new(SimulatedTransport::new()),
                      revision,
                      CalibrationTable::new(),
                      TimeBase::new()).unwrap()
  }

  #[test]
  fn nothing_is_written_before_commit() {
    let mut s = scope(HardwareRevision::Current);
    s.set_vertical_range(AnalogChannel::A, -0.1, 0.1).unwrap();
    assert!(s.iface.transport().frames.is_empty());
    assert!(s.settings().dirty_count() > 0);
  }

  #[test]
  fn commit_latches_with_the_update_strobe() {
    let mut s = scope(HardwareRevision::Current);
    s.set_y_offset(AnalogChannel::B, 0.1).unwrap();
    let written = s.commit_settings().unwrap();
    assert_eq!(written, 1);
    let frames = s.iface.transport().control_frames();
    assert_eq!(frames.len(), 3);
    // SCOPE_UPDATE (5) low, then high
    assert_eq!(frames[1].bytes, vec![0xC0, 10, 3, 0x18, 0, 5 << 1]);
    assert_eq!(frames[2].bytes, vec![0xC0, 10, 3, 0x18, 0, (5 << 1) | 1]);
    s.iface.transport_mut().clear_frames();
    assert_eq!(s.commit_settings().unwrap(), 0);
    assert!(s.iface.transport().frames.is_empty());
  }

  #[test]
  fn range_change_reapplies_offset_and_trigger() {
    let mut s = scope(HardwareRevision::Current);
    s.set_trigger_analog(AnalogTrigger { channel : AnalogChannel::A,
                                         direction : TriggerDirection::Falling,
                                         level : 0.05 }).unwrap();
    let level_before = s.settings().get(7).unwrap();
    s.set_vertical_range(AnalogChannel::A, -0.1, 0.1).unwrap();
    assert_eq!(s.channel(AnalogChannel::A).stage(), GainStage::narrowest());
    // div index 0, mul index 2
    assert_eq!(s.settings().get(3).unwrap() & 0x0F, 0b1000);
    assert_ne!(s.settings().get(7).unwrap(), level_before);
    assert_eq!(s.settings().get(8).unwrap() & 0x30, 0x10);
  }

  #[test]
  fn rejected_range_changes_nothing() {
    let mut s = scope(HardwareRevision::Current);
    let before = s.channel(AnalogChannel::B).clone();
    assert_eq!(s.set_vertical_range(AnalogChannel::B, 0.5, -0.5),
               Err(ScopeError::InvalidConfiguration));
    assert_eq!(s.channel(AnalogChannel::B), &before);
    assert_eq!(s.settings().dirty_count(), 0);
  }

  #[test]
  fn probe_division_reselects_the_stage() {
    let mut s = scope(HardwareRevision::Current);
    s.set_vertical_range(AnalogChannel::A, -0.1, 0.1).unwrap();
    let stage = s.set_probe_division(AnalogChannel::A, ProbeDivision::X10).unwrap();
    // 0.1V at a x10 probe is 0.01V at the input
    assert_eq!(stage, GainStage::narrowest());
    let stage = s.set_probe_division(AnalogChannel::A, ProbeDivision::X1).unwrap();
    assert_eq!(stage, GainStage::narrowest());
    s.set_vertical_range(AnalogChannel::A, -1.0, 1.0).unwrap();
    let wide = s.channel(AnalogChannel::A).stage();
    let narrow = s.set_probe_division(AnalogChannel::A, ProbeDivision::X100).unwrap();
    assert_eq!(narrow, GainStage::narrowest());
    assert_ne!(wide, narrow);
  }

  #[test]
  fn digital_trigger_masks() {
    let mut s = scope(HardwareRevision::Current);
    let mut condition = [DigitalTriggerValue::DontCare;N_DIGITAL_CHANNELS];
    condition[0] = DigitalTriggerValue::Rising;
    condition[3] = DigitalTriggerValue::Rising;
    condition[5] = DigitalTriggerValue::Low;
    s.set_trigger_digital(&condition).unwrap();
    assert_eq!(s.settings().get(29).unwrap(), 0b0000_1001);
    assert_eq!(s.settings().get(30).unwrap(), 0);
    assert_eq!(s.settings().get(32).unwrap(), 0b0010_0000);
    assert_eq!(s.trigger_channel().unwrap(), AnalogChannel::A);
    assert_eq!(s.trigger().direction, TriggerDirection::Rising);
  }

  #[test]
  fn trigger_threshold_is_inert() {
    let mut s = scope(HardwareRevision::Legacy);
    s.set_trigger_threshold(0.3);
    assert_eq!(s.trigger_threshold(), 0.3);
    assert_eq!(s.settings().dirty_count(), 0);
  }

  #[test]
  fn time_range_and_holdoff() {
    let mut s = scope(HardwareRevision::Current);
    s.set_trigger_holdoff(1e-3).unwrap();
    assert_eq!(s.settings().get(17).unwrap(), 0xA0);
    let d = s.set_time_range(20.48e-6 * 200.0).unwrap();
    assert_eq!(d, 8);
    assert!(s.chunky_acquisitions());
    assert!(s.can_roll());
    // hold-off follows the decimation
    let samples = (1e-3_f64 / (10e-9 * 256.0)).round() as u32;
    assert_eq!(s.settings().get(17).unwrap(), samples.to_le_bytes()[0]);
    s.set_rolling(true).unwrap();
    assert!(s.rolling().unwrap());
    s.set_trigger_holdoff(0.0).unwrap();
    for a in 17..=20 {
      assert_eq!(s.settings().get(a).unwrap(), 0);
    }
  }

  #[test]
  fn legacy_layout() {
    let mut s = scope(HardwareRevision::Legacy);
    assert_eq!(s.set_time_range(1e-3), Err(ScopeError::UnknownRegister));
    assert_eq!(s.set_rolling(true), Err(ScopeError::UnknownRegister));
    s.set_trigger_width(12).unwrap();
    assert_eq!(s.settings().get(23).unwrap(), 12);
    assert_eq!(s.set_trigger_width(300), Err(ScopeError::ValueOutOfRange));
    s.set_acquisition_mode(AcquisitionMode::Single).unwrap();
    assert_eq!(s.settings().get(22).unwrap() >> 6, 2);
  }

  #[test]
  fn legacy_offset_is_stable_across_range_calls() {
    let mut s = scope(HardwareRevision::Legacy);
    s.set_vertical_range(AnalogChannel::A, -1.0, 1.0).unwrap();
    s.commit_settings().unwrap();
    let byte   = s.settings().get(8).unwrap();
    let offset = s.channel(AnalogChannel::A).y_offset;
    for _ in 0..3 {
      s.set_vertical_range(AnalogChannel::A, -1.0, 1.0).unwrap();
      assert_eq!(s.settings().get(8).unwrap(), byte);
      assert_eq!(s.channel(AnalogChannel::A).y_offset, offset);
      assert_eq!(s.settings().dirty_count(), 0);
    }
    assert_eq!(s.y_offset(AnalogChannel::A).unwrap(), offset);
    let legacy = s.channel(AnalogChannel::A).legacy_byte_to_voltage(byte);
    assert_eq!(s.legacy_y_offset(AnalogChannel::A).unwrap(), legacy);
  }

  #[test]
  fn time_range_rejected_by_the_holdoff_stages_nothing() {
    let mut s = scope(HardwareRevision::Current);
    assert_eq!(s.set_time_range(1.0).unwrap(), 9);
    s.set_trigger_holdoff(50.0).unwrap();
    s.commit_settings().unwrap();
    // 50 s at full rate does not fit 32 bit
    assert_eq!(s.set_time_range(1e-6), Err(ScopeError::InvalidConfiguration));
    assert_eq!(s.settings().dirty_count(), 0);
    assert_eq!(s.settings().get(15).unwrap(), 9);
    assert_eq!(s.decimation(), 9);
    assert!(s.chunky_acquisitions());
    assert_eq!(s.holdoff(), 50.0);
  }

  #[test]
  fn acquisition_state_machine() {
    let mut s = scope(HardwareRevision::Current);
    assert_eq!(s.state(), AcquisitionState::Idle);
    s.run().unwrap();
    assert!(s.running());
    s.stop().unwrap();
    assert!(s.stop_pending());
    assert!(!s.running());
    s.acknowledge_stop();
    assert_eq!(s.state(), AcquisitionState::Idle);
    let frames = s.iface.transport().control_frames();
    assert_eq!(frames[0].bytes[5], (10 << 1) | 1);
    assert_eq!(frames[1].bytes[5], (11 << 1) | 1);
  }

  #[test]
  fn failed_run_keeps_the_state() {
    let mut s = scope(HardwareRevision::Current);
    s.iface.transport_mut().fail_on_write(1, TransportError::Timeout);
    assert!(s.run().is_err());
    assert_eq!(s.state(), AcquisitionState::Idle);
  }

  #[test]
  fn logic_analyser_disables_the_generator() {
    let mut s = scope(HardwareRevision::Current);
    s.set_logic_analyser(true).unwrap();
    assert_eq!(s.strobes().get(3).unwrap(), 1);
    assert_eq!(s.strobes().get(2).unwrap(), 0);
    s.set_logic_analyser_channel(AnalogChannel::B).unwrap();
    s.set_coupling(AnalogChannel::A, Coupling::Dc).unwrap();
    assert_eq!(s.coupling(AnalogChannel::A).unwrap(), Coupling::Dc);
    assert_eq!(s.coupling(AnalogChannel::B).unwrap(), Coupling::Ac);
  }

  #[test]
  fn open_detects_the_revision() {
    let mut usb = SimulatedTransport::new();
    usb.set_bus_register(0x0D, 0, 1);
    let s = ScopeControl::open(usb, &ScopeConfig::new()).unwrap();
    assert_eq!(s.revision(), HardwareRevision::Legacy);
    let mut config = ScopeConfig::new();
    config.interface.hardware_revision = Some(HardwareRevision::Current);
    let s = ScopeControl::open(SimulatedTransport::new(), &config).unwrap();
    assert_eq!(s.revision(), HardwareRevision::Current);
  }

  #[test]
  fn firmware_version_from_rom() {
    let mut usb = SimulatedTransport::new();
    for (k, b) in [0xEFu8, 0xBE, 0xAD, 0xDE].iter().enumerate() {
      usb.set_bus_register(0x0D, 2 + k as u8, *b);
    }
    usb.set_bus_register(0x0D, 0, 3);
    usb.set_bus_register(0x0D, 1, 7);
    let mut s = ScopeControl::new(ScopeInterface::new(usb),
                                  HardwareRevision::Current,
                                  CalibrationTable::new(),
                                  TimeBase::new()).unwrap();
    assert_eq!(s.fpga_firmware_version().unwrap(), 0xDEADBEEF);
    assert_eq!(s.fpga_firmware_release().unwrap(), (3, 7));
  }
}
