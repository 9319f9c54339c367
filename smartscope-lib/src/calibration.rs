//! Calibration and unit conversion
//!
//! The analog front end of each channel has a gain stage,
//! made of a divider (1, 6, 36) and a multiplier (1.1, 2, 3).
//! For every channel and gain stage there is a set of
//! calibration coefficients (gain, slope, intercept), which
//! translate between volts and the raw bytes of the y-offset
//! and trigger level registers.
//!
//! The ADC code 127 is the zero volt reference of all
//! conversions.
//!
//! Time conversions live in `TimeBase`.

use std::collections::HashMap;
use std::fmt;

use serde::{
  Deserialize,
  Serialize,
};

use crate::constants::{
  ADC_MIDSCALE,
  BASE_SAMPLE_PERIOD,
  BASE_VOLTAGE_MAX,
  BASE_VOLTAGE_MIN,
  DEFAULT_CALIB_GAIN,
  DEFAULT_CALIB_INTERCEPT,
  DEFAULT_CALIB_SLOPE,
  INPUT_DECIMATION_MAX,
  INPUT_DECIMATION_MIN_FOR_ROLLING_MODE,
  N_ANALOG_CHANNELS,
  NUMBER_OF_SAMPLES,
  VALID_DIVIDERS,
  VALID_MULTIPLIERS,
  YOFFSET_BYTE_MAX,
  YOFFSET_BYTE_MIN,
};
use crate::errors::ScopeError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalogChannel {
  A,
  B,
}

impl AnalogChannel {

  pub const ALL : [AnalogChannel;N_ANALOG_CHANNELS] = [AnalogChannel::A, AnalogChannel::B];

  /// 0 for channel A, 1 for channel B
  pub fn index(&self) -> usize {
    match self {
      AnalogChannel::A => 0,
      AnalogChannel::B => 1,
    }
  }
}

impl fmt::Display for AnalogChannel {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "Ch{:?}", self)
  }
}

/// Attenuation of the probe connected to a channel
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeDivision {
  X1,
  X10,
  X100,
}

impl ProbeDivision {
  pub fn factor(&self) -> f64 {
    match self {
      ProbeDivision::X1   => 1.0,
      ProbeDivision::X10  => 10.0,
      ProbeDivision::X100 => 100.0,
    }
  }
}

impl Default for ProbeDivision {
  fn default() -> Self {
    ProbeDivision::X1
  }
}

/// The coefficients for one channel at one gain stage
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationCoefficients {
  pub gain      : f64,
  pub slope     : f64,
  pub intercept : f64,
}

impl CalibrationCoefficients {

  pub fn new(gain : f64, slope : f64, intercept : f64) -> Self {
    Self {
      gain,
      slope,
      intercept,
    }
  }

  /// The built-in coefficients of a gain stage, the
  /// divider 1 / multiplier 1 set scaled with the
  /// stage's divider / multiplier
  pub fn nominal(stage : GainStage) -> Self {
    let scale = stage.divider() / stage.multiplier();
    Self {
      gain      : DEFAULT_CALIB_GAIN * scale,
      slope     : DEFAULT_CALIB_SLOPE * scale,
      intercept : DEFAULT_CALIB_INTERCEPT * scale,
    }
  }

  /// Offset register value which puts 0V at the middle
  /// of the legacy ADC range
  pub fn midrange(&self) -> i32 {
    ((0.0 - 128.0 * self.gain - self.intercept) / self.slope) as i32
  }
}

impl fmt::Display for CalibrationCoefficients {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<CalibrationCoefficients: gain {:.6}, slope {:.6}, intercept {:.6}>",
           self.gain, self.slope, self.intercept)
  }
}

/// One divider/multiplier combination, stored as
/// indices into `VALID_DIVIDERS` and `VALID_MULTIPLIERS`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GainStage {
  divider_index    : usize,
  multiplier_index : usize,
}

impl GainStage {

  /// Narrowest input window (smallest divider, largest multiplier)
  pub fn narrowest() -> Self {
    Self::candidates()[0]
  }

  /// Widest input window (largest divider, smallest multiplier)
  pub fn widest() -> Self {
    Self::candidates()[VALID_DIVIDERS.len() * VALID_MULTIPLIERS.len() - 1]
  }

  /// Look up a gain stage by its nominal values
  pub fn from_values(divider : f64, multiplier : f64) -> Result<Self, ScopeError> {
    let divider_index = VALID_DIVIDERS.iter().position(|d| *d == divider);
    let multiplier_index = VALID_MULTIPLIERS.iter().position(|m| *m == multiplier);
    match (divider_index, multiplier_index) {
      (Some(divider_index), Some(multiplier_index)) => {
        Ok(Self {divider_index, multiplier_index})
      }
      _ => {
        error!("There is no gain stage with divider {} and multiplier {}! Valid dividers {:?}, valid multipliers {:?}",
               divider, multiplier, VALID_DIVIDERS, VALID_MULTIPLIERS);
        Err(ScopeError::InvalidConfiguration)
      }
    }
  }

  /// All stages in the order range selection tries them,
  /// dividers ascending and within a divider the
  /// multipliers descending, so from the narrowest to the
  /// widest input window
  pub fn candidates() -> Vec<GainStage> {
    let n_mul = VALID_MULTIPLIERS.len();
    (0..VALID_DIVIDERS.len() * n_mul)
      .map(|i| GainStage {
        divider_index    : i / n_mul,
        multiplier_index : n_mul - (i % n_mul) - 1,
      })
      .collect()
  }

  pub fn divider(&self) -> f64 {
    VALID_DIVIDERS[self.divider_index]
  }

  pub fn multiplier(&self) -> f64 {
    VALID_MULTIPLIERS[self.multiplier_index]
  }

  pub fn divider_index(&self) -> usize {
    self.divider_index
  }

  pub fn multiplier_index(&self) -> usize {
    self.multiplier_index
  }

  /// Does the window [min, max] (at the device, after
  /// probe scaling) fit strictly into the base window
  /// scaled by this stage
  pub fn fits(&self, base : &VoltageWindow, min : f64, max : f64) -> bool {
    let scale = self.divider() / self.multiplier();
    max < base.max * scale && min > base.min * scale
  }

  /// Place this stage into the shared divider/multiplier
  /// register. Each channel owns a nibble at bit
  /// `4 * channel`, divider index in bits [1:0] and
  /// multiplier index in bits [3:2].
  pub fn pack(&self, channel : AnalogChannel, register : u8) -> u8 {
    let shift = 4 * channel.index();
    let nibble = (self.divider_index as u8 & 0x3) | ((self.multiplier_index as u8 & 0x3) << 2);
    (register & !(0xF << shift)) | (nibble << shift)
  }
}

impl fmt::Display for GainStage {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<GainStage: div {} mul {}>", self.divider(), self.multiplier())
  }
}

/// Input window in volts of the ADC for divider 1 /
/// multiplier 1
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoltageWindow {
  pub min : f64,
  pub max : f64,
}

impl Default for VoltageWindow {
  fn default() -> Self {
    Self {
      min : BASE_VOLTAGE_MIN,
      max : BASE_VOLTAGE_MAX,
    }
  }
}

/// Coefficients for each channel and gain stage
#[derive(Debug, Clone)]
pub struct CalibrationTable {
  pub base_window   : VoltageWindow,
  /// Allowed values of the y-offset registers (min, max)
  pub offset_window : (u8, u8),
  entries           : HashMap<(AnalogChannel, GainStage), CalibrationCoefficients>,
}

impl CalibrationTable {

  /// The built-in table, see `CalibrationCoefficients::nominal`
  pub fn new() -> Self {
    let mut entries = HashMap::new();
    for ch in AnalogChannel::ALL {
      for stage in GainStage::candidates() {
        entries.insert((ch, stage), CalibrationCoefficients::nominal(stage));
      }
    }
    Self {
      base_window   : VoltageWindow::default(),
      offset_window : (YOFFSET_BYTE_MIN, YOFFSET_BYTE_MAX),
      entries,
    }
  }

  /// Replace the coefficients of one channel and gain stage
  pub fn set(&mut self,
             channel      : AnalogChannel,
             stage        : GainStage,
             coefficients : CalibrationCoefficients) {
    self.entries.insert((channel, stage), coefficients);
  }

  pub fn get(&self, channel : AnalogChannel, stage : GainStage) -> CalibrationCoefficients {
    match self.entries.get(&(channel, stage)) {
      Some(c) => *c,
      None    => CalibrationCoefficients::nominal(stage)
    }
  }
}

impl Default for CalibrationTable {
  fn default() -> Self {
    Self::new()
  }
}

/// A gain stage together with the coefficients which
/// belong to it. Only `CalibrationTable::calibrated` hands
/// these out, so stage and coefficients can not go out of
/// sync.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CalibratedStage {
  stage        : GainStage,
  coefficients : CalibrationCoefficients,
}

impl CalibratedStage {

  pub fn stage(&self) -> GainStage {
    self.stage
  }

  pub fn coefficients(&self) -> CalibrationCoefficients {
    self.coefficients
  }
}

impl CalibrationTable {

  pub fn calibrated(&self, channel : AnalogChannel, stage : GainStage) -> CalibratedStage {
    CalibratedStage {
      stage,
      coefficients : self.get(channel, stage),
    }
  }
}

/// Vertical settings of an analog channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSettings {
  pub channel   : AnalogChannel,
  active        : CalibratedStage,
  /// Requested vertical range (min, max) in volts
  range         : (f64, f64),
  /// Requested y-offset in volts
  pub y_offset  : f64,
  probe         : ProbeDivision,
  offset_window : (u8, u8),
}

impl ChannelSettings {

  /// Start out with the widest gain stage
  pub fn new(channel : AnalogChannel, table : &CalibrationTable) -> Self {
    let stage = GainStage::widest();
    let scale = stage.divider() / stage.multiplier();
    Self {
      channel,
      active        : table.calibrated(channel, stage),
      range         : (table.base_window.min * scale, table.base_window.max * scale),
      y_offset      : 0.0,
      probe         : ProbeDivision::X1,
      offset_window : table.offset_window,
    }
  }

  pub fn stage(&self) -> GainStage {
    self.active.stage
  }

  pub fn coefficients(&self) -> CalibrationCoefficients {
    self.active.coefficients
  }

  pub fn range(&self) -> (f64, f64) {
    self.range
  }

  pub fn probe(&self) -> ProbeDivision {
    self.probe
  }

  pub fn set_probe(&mut self, probe : ProbeDivision) {
    self.probe = probe;
  }

  /// Switch gain stage and coefficients in one go
  pub fn set_stage(&mut self, active : CalibratedStage) {
    debug!("{} switches to {} {}", self.channel, active.stage, active.coefficients);
    self.active = active;
  }

  fn to_device(&self, volts : f64) -> f64 {
    volts / self.probe.factor()
  }

  fn to_host(&self, volts : f64) -> f64 {
    volts * self.probe.factor()
  }

  /// Convert an offset in volts into the y-offset
  /// register value, clamped to the offset window
  pub fn voltage_to_byte(&self, volts : f64) -> u8 {
    let c = &self.active.coefficients;
    let raw = (-(self.to_device(volts) + c.intercept + c.gain * ADC_MIDSCALE) / c.slope).round();
    let (lo, hi) = self.offset_window;
    if raw.is_nan() {
      warn!("Offset of {} V for {} can not be converted, using {}", volts, self.channel, lo);
      return lo;
    }
    raw.clamp(lo as f64, hi as f64) as u8
  }

  /// The offset in volts a y-offset register value stands for
  pub fn byte_to_voltage(&self, value : u8) -> f64 {
    let c = &self.active.coefficients;
    self.to_host(-(value as f64 * c.slope + c.intercept + c.gain * ADC_MIDSCALE))
  }

  /// Offset voltage of the legacy hardware, relative to
  /// the mid range register value
  pub fn legacy_byte_to_voltage(&self, value : u8) -> f64 {
    let c = &self.active.coefficients;
    self.to_host((value as i32 - c.midrange()) as f64 * c.slope)
  }

  /// Trigger level register value for a level in volts.
  /// The trigger compares after the offset, so the offset
  /// contribution is taken out first.
  ///
  /// # Arguments
  ///
  /// * volts       : trigger level
  /// * offset_byte : the y-offset register value of this channel
  pub fn trigger_level_byte(&self, volts : f64, offset_byte : u8) -> u8 {
    let c = &self.active.coefficients;
    let level = (self.to_device(volts) - offset_byte as f64 * c.slope - c.intercept) / c.gain;
    if level.is_nan() {
      return 0;
    }
    level.clamp(0.0, 255.0) as u8
  }

  /// Find the first gain stage which can take the
  /// requested window and switch to it.
  ///
  /// If no stage fits, the widest one is used.
  ///
  /// # Arguments
  ///
  /// * table : calibration table for the coefficients
  /// * min   : lower end of the window in volts
  /// * max   : upper end of the window in volts
  pub fn select_range(&mut self,
                      table : &CalibrationTable,
                      min   : f64,
                      max   : f64) -> Result<GainStage, ScopeError> {
    if min.is_nan() || max.is_nan() || min >= max {
      error!("Vertical range [{}, {}] for {} is not valid!", min, max, self.channel);
      return Err(ScopeError::InvalidConfiguration);
    }
    let dev_min = self.to_device(min);
    let dev_max = self.to_device(max);
    let stage = match GainStage::candidates().into_iter()
                                 .find(|s| s.fits(&table.base_window, dev_min, dev_max)) {
      Some(s) => s,
      None => {
        warn!("Range [{}, {}] V exceeds every gain stage of {}, using the widest", min, max, self.channel);
        GainStage::widest()
      }
    };
    self.range = (min, max);
    self.set_stage(table.calibrated(self.channel, stage));
    Ok(stage)
  }
}

/// Conversions between time and the decimation/hold-off
/// registers
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
  pub base_sample_period : f64,
  pub n_samples          : usize,
  pub max_decimation     : u8,
  pub rolling_decimation : u8,
}

impl TimeBase {

  pub fn new() -> Self {
    Self {
      base_sample_period : BASE_SAMPLE_PERIOD,
      n_samples          : NUMBER_OF_SAMPLES,
      max_decimation     : INPUT_DECIMATION_MAX,
      rolling_decimation : INPUT_DECIMATION_MIN_FOR_ROLLING_MODE,
    }
  }

  /// Time range of an acquisition without decimation
  pub fn default_time_range(&self) -> f64 {
    self.base_sample_period * self.n_samples as f64
  }

  pub fn time_range(&self, decimation : u8) -> f64 {
    self.default_time_range() * 2f64.powi(decimation as i32)
  }

  pub fn samples_to_time(&self, samples : usize, decimation : u8) -> f64 {
    samples as f64 * self.base_sample_period * 2f64.powi(decimation as i32)
  }

  /// Smallest decimation whose time range covers the request
  pub fn decimation_for(&self, time_range : f64) -> u8 {
    let ratio = time_range / self.default_time_range();
    if !(ratio > 1.0) {
      return 0;
    }
    let d = ratio.log2().ceil();
    if d >= self.max_decimation as f64 {
      self.max_decimation
    } else {
      d as u8
    }
  }

  /// Acquisitions come in chunks from this decimation on
  pub fn is_chunky(&self, decimation : u8) -> bool {
    decimation >= self.rolling_decimation
  }

  /// Number of samples for a hold-off time
  pub fn holdoff_samples(&self, holdoff : f64, decimation : u8) -> Result<u32, ScopeError> {
    if holdoff.is_nan() || holdoff < 0.0 {
      error!("Hold-off of {} s is not valid!", holdoff);
      return Err(ScopeError::InvalidConfiguration);
    }
    let samples = (holdoff / (self.base_sample_period * 2f64.powi(decimation as i32))).round();
    if samples > u32::MAX as f64 {
      error!("Hold-off of {} s does not fit into the hold-off registers!", holdoff);
      return Err(ScopeError::InvalidConfiguration);
    }
    Ok(samples as u32)
  }

  /// The four hold-off register bytes, least significant first
  pub fn holdoff_bytes(&self, holdoff : f64, decimation : u8) -> Result<[u8;4], ScopeError> {
    Ok(self.holdoff_samples(holdoff, decimation)?.to_le_bytes())
  }
}

impl Default for TimeBase {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn candidates_go_from_narrow_to_wide() {
    let candidates = GainStage::candidates();
    assert_eq!(candidates.len(), 9);
    assert_eq!(candidates[0].divider(), 1.0);
    assert_eq!(candidates[0].multiplier(), 3.0);
    assert_eq!(candidates[1].multiplier(), 2.0);
    assert_eq!(candidates[3].divider(), 6.0);
    let spans : Vec<f64> = candidates.iter().map(|s| s.divider() / s.multiplier()).collect();
    for k in 1..spans.len() {
      assert!(spans[k] > spans[k-1]);
    }
  }

  #[test]
  fn zero_volt_offset_is_near_the_nominal_byte() {
    let table = CalibrationTable::new();
    let ch = ChannelSettings::new(AnalogChannel::A, &table);
    assert_eq!(ch.voltage_to_byte(0.0), 105);
  }

  #[test]
  fn offset_bytes_are_clamped() {
    let table = CalibrationTable::new();
    let ch = ChannelSettings::new(AnalogChannel::B, &table);
    assert_eq!(ch.voltage_to_byte(1e6), YOFFSET_BYTE_MAX);
    assert_eq!(ch.voltage_to_byte(-1e6), YOFFSET_BYTE_MIN);
    assert_eq!(ch.voltage_to_byte(f64::NAN), YOFFSET_BYTE_MIN);
  }

  #[test]
  fn probe_scales_the_voltage() {
    let table = CalibrationTable::new();
    let mut ch = ChannelSettings::new(AnalogChannel::A, &table);
    let v1 = ch.byte_to_voltage(120);
    ch.set_probe(ProbeDivision::X10);
    let v10 = ch.byte_to_voltage(120);
    assert!((v10 - 10.0 * v1).abs() < 1e-9);
  }

  #[test]
  fn select_range_takes_the_first_fit() {
    let table = CalibrationTable::new();
    let mut ch = ChannelSettings::new(AnalogChannel::A, &table);
    // fits div 1 / mul 3 (+-0.21V)
    assert_eq!(ch.select_range(&table, -0.1, 0.1).unwrap(), GainStage::narrowest());
    // needs div 1 / mul 2
    let stage = ch.select_range(&table, -0.25, 0.25).unwrap();
    assert_eq!((stage.divider(), stage.multiplier()), (1.0, 2.0));
    assert_eq!(ch.coefficients(), table.get(AnalogChannel::A, stage));
    assert_eq!(ch.range(), (-0.25, 0.25));
  }

  #[test]
  fn select_range_falls_back_to_the_widest() {
    let table = CalibrationTable::new();
    let mut ch = ChannelSettings::new(AnalogChannel::A, &table);
    assert_eq!(ch.select_range(&table, -100.0, 100.0).unwrap(), GainStage::widest());
    assert_eq!(ch.select_range(&table, 1.0, 1.0), Err(ScopeError::InvalidConfiguration));
    assert_eq!(ch.select_range(&table, f64::NAN, 1.0), Err(ScopeError::InvalidConfiguration));
    assert_eq!(ch.range(), (-100.0, 100.0));
  }

  #[test]
  fn overridden_coefficients_follow_the_stage() {
    let mut table = CalibrationTable::new();
    let stage = GainStage::from_values(6.0, 2.0).unwrap();
    let custom = CalibrationCoefficients::new(0.01, -0.01, -0.5);
    table.set(AnalogChannel::B, stage, custom);
    let mut ch = ChannelSettings::new(AnalogChannel::B, &table);
    ch.select_range(&table, -1.5, 1.5).unwrap();
    assert_eq!(ch.stage(), stage);
    assert_eq!(ch.coefficients(), custom);
    assert_eq!(GainStage::from_values(10.0, 2.0), Err(ScopeError::InvalidConfiguration));
  }

  #[test]
  fn gain_stage_packing() {
    let stage = GainStage::from_values(36.0, 2.0).unwrap();
    assert_eq!(stage.pack(AnalogChannel::A, 0x00), 0b0110);
    assert_eq!(stage.pack(AnalogChannel::B, 0x0F), 0x6F);
    assert_eq!(GainStage::narrowest().pack(AnalogChannel::B, 0xFF), 0x8F);
  }

  #[test]
  fn midrange_constant() {
    let c = CalibrationCoefficients::new(0.0051, -0.0029, -0.3432);
    // (-0.6528 + 0.3432) / -0.0029 = 106.75..
    assert_eq!(c.midrange(), 106);
  }

  #[test]
  fn decimation_for_time_range() {
    let tb = TimeBase::new();
    let default = tb.default_time_range();
    assert_eq!(tb.decimation_for(default / 2.0), 0);
    assert_eq!(tb.decimation_for(default), 0);
    assert_eq!(tb.decimation_for(default * 1.5), 1);
    assert_eq!(tb.decimation_for(default * 4.0), 2);
    assert_eq!(tb.decimation_for(default * 1e6), INPUT_DECIMATION_MAX);
    assert!(tb.is_chunky(7));
    assert!(!tb.is_chunky(6));
  }

  #[test]
  fn holdoff_encoding() {
    let tb = TimeBase::new();
    for d in 0..=INPUT_DECIMATION_MAX {
      assert_eq!(tb.holdoff_bytes(0.0, d).unwrap(), [0, 0, 0, 0]);
    }
    // 1ms at 10ns = 100000 samples = 0x0186A0
    assert_eq!(tb.holdoff_bytes(1e-3, 0).unwrap(), [0xA0, 0x86, 0x01, 0x00]);
    assert_eq!(tb.holdoff_samples(1e-3, 1).unwrap(), 50000);
    assert_eq!(tb.holdoff_samples(-1.0, 0), Err(ScopeError::InvalidConfiguration));
  }
}
