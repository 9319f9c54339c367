//! Configuration of the scope session
//!
//! All sections have defaults which match the hardware,
//! so a config file only needs to carry what differs.
//! Write the defaults with `ScopeConfig::new().to_toml(..)`
//! to get a template.

use std::fmt;
use std::fs::{
  self,
  File,
};
use std::io::Write;

use serde::{
  Deserialize,
  Serialize,
};

use crate::calibration::{
  AnalogChannel,
  CalibrationCoefficients,
  CalibrationTable,
  GainStage,
  TimeBase,
  VoltageWindow,
};
use crate::constants::{
  BASE_SAMPLE_PERIOD,
  BASE_VOLTAGE_MAX,
  BASE_VOLTAGE_MIN,
  FLASH_PACKETS_PER_COMMAND,
  FLASH_PACKET_SIZE,
  FLASH_PADDING_PACKETS,
  FLASH_READY_DELAY_MS,
  INPUT_DECIMATION_MAX,
  INPUT_DECIMATION_MIN_FOR_ROLLING_MODE,
  NUMBER_OF_SAMPLES,
  YOFFSET_BYTE_MAX,
  YOFFSET_BYTE_MIN,
};
use crate::errors::ScopeError;
use crate::flash::FlashSettings;
use crate::registers::HardwareRevision;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceSettings {
  /// Packets of the FPGA bitstream per bulk transfer
  pub bulk_packets_per_command : usize,
  /// Skip the detection through the FPGA rom and
  /// use this register layout
  pub hardware_revision        : Option<HardwareRevision>,
}

impl InterfaceSettings {
  pub fn new() -> Self {
    Self {
      bulk_packets_per_command : FLASH_PACKETS_PER_COMMAND,
      hardware_revision        : None,
    }
  }
}

impl Default for InterfaceSettings {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlashConfig {
  pub packet_size     : usize,
  pub padding_packets : usize,
  /// Wait after the start command (ms)
  pub ready_delay_ms  : u64,
}

impl FlashConfig {
  pub fn new() -> Self {
    Self {
      packet_size     : FLASH_PACKET_SIZE,
      padding_packets : FLASH_PADDING_PACKETS,
      ready_delay_ms  : FLASH_READY_DELAY_MS,
    }
  }
}

impl Default for FlashConfig {
  fn default() -> Self {
    Self::new()
  }
}

/// Measured coefficients for one channel and gain stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientOverride {
  pub channel    : AnalogChannel,
  pub divider    : f64,
  pub multiplier : f64,
  pub gain       : f64,
  pub slope      : f64,
  pub intercept  : f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
  /// ADC input window (V) for divider 1 / multiplier 1
  pub base_voltage_min : f64,
  pub base_voltage_max : f64,
  pub yoffset_byte_min : u8,
  pub yoffset_byte_max : u8,
  pub overrides        : Vec<CoefficientOverride>,
}

impl CalibrationSettings {
  pub fn new() -> Self {
    Self {
      base_voltage_min : BASE_VOLTAGE_MIN,
      base_voltage_max : BASE_VOLTAGE_MAX,
      yoffset_byte_min : YOFFSET_BYTE_MIN,
      yoffset_byte_max : YOFFSET_BYTE_MAX,
      overrides        : Vec::<CoefficientOverride>::new(),
    }
  }
}

impl Default for CalibrationSettings {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
  /// Sample period without decimation (s)
  pub base_sample_period : f64,
  pub n_samples          : usize,
  pub max_decimation     : u8,
  pub rolling_decimation : u8,
}

impl AcquisitionSettings {
  pub fn new() -> Self {
    Self {
      base_sample_period : BASE_SAMPLE_PERIOD,
      n_samples          : NUMBER_OF_SAMPLES,
      max_decimation     : INPUT_DECIMATION_MAX,
      rolling_decimation : INPUT_DECIMATION_MIN_FOR_ROLLING_MODE,
    }
  }
}

impl Default for AcquisitionSettings {
  fn default() -> Self {
    Self::new()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
  pub interface   : InterfaceSettings,
  pub flash       : FlashConfig,
  pub calibration : CalibrationSettings,
  pub acquisition : AcquisitionSettings,
}

impl ScopeConfig {

  pub fn new() -> Self {
    Self {
      interface   : InterfaceSettings::new(),
      flash       : FlashConfig::new(),
      calibration : CalibrationSettings::new(),
      acquisition : AcquisitionSettings::new(),
    }
  }

  /// The packet layout for the flash sequencer
  pub fn flash_settings(&self) -> FlashSettings {
    FlashSettings {
      packet_size         : self.flash.packet_size,
      packets_per_command : self.interface.bulk_packets_per_command,
      padding_packets     : self.flash.padding_packets,
      ready_delay_ms      : self.flash.ready_delay_ms,
    }
  }

  pub fn time_base(&self) -> TimeBase {
    TimeBase {
      base_sample_period : self.acquisition.base_sample_period,
      n_samples          : self.acquisition.n_samples,
      max_decimation     : self.acquisition.max_decimation,
      rolling_decimation : self.acquisition.rolling_decimation,
    }
  }

  /// The built-in calibration table with the overrides
  /// of this config applied
  pub fn calibration_table(&self) -> Result<CalibrationTable, ScopeError> {
    let cal = &self.calibration;
    if cal.base_voltage_min >= cal.base_voltage_max || cal.yoffset_byte_min > cal.yoffset_byte_max {
      error!("Calibration windows in the config are not valid! {:?}", cal);
      return Err(ScopeError::InvalidConfiguration);
    }
    let mut table = CalibrationTable::new();
    table.base_window = VoltageWindow {
      min : cal.base_voltage_min,
      max : cal.base_voltage_max,
    };
    table.offset_window = (cal.yoffset_byte_min, cal.yoffset_byte_max);
    for o in cal.overrides.iter() {
      let stage = GainStage::from_values(o.divider, o.multiplier)?;
      table.set(o.channel, stage, CalibrationCoefficients::new(o.gain, o.slope, o.intercept));
      debug!("Calibration override for {} at {}", o.channel, stage);
    }
    Ok(table)
  }

  /// Save the config as toml. A `.toml` suffix is
  /// appended if missing, failures are only logged.
  pub fn to_toml(&self, filename : String) {
    let filename = with_suffix(filename, "toml");
    match toml::to_string_pretty(self) {
      Err(err)     => error!("Scope config can not be rendered as toml! {}", err),
      Ok(rendered) => save(&filename, &rendered),
    }
  }

  /// Same as `to_toml`, but json
  pub fn to_json(&self, filename : String) {
    let filename = with_suffix(filename, "json");
    match serde_json::to_string_pretty(self) {
      Err(err)     => error!("Scope config can not be rendered as json! {}", err),
      Ok(rendered) => save(&filename, &rendered),
    }
  }

  /// Load a config file. Sections and fields which are
  /// not in the file keep their defaults.
  pub fn from_toml(filename : String) -> Result<ScopeConfig, ScopeError> {
    let content = match fs::read_to_string(&filename) {
      Ok(content) => content,
      Err(err) => {
        error!("Can not read scope config {}! {}", filename, err);
        return Err(ScopeError::SettingsDecoding);
      }
    };
    toml::from_str(&content).map_err(|err| {
      error!("{} is not a valid scope config! {}", filename, err);
      ScopeError::SettingsDecoding
    })
  }
}

fn with_suffix(filename : String, suffix : &str) -> String {
  if filename.ends_with(&format!(".{}", suffix)) {
    filename
  } else {
    format!("{}.{}", filename, suffix)
  }
}

fn save(filename : &str, rendered : &str) {
  let result = File::create(filename).and_then(|mut file| file.write_all(rendered.as_bytes()));
  match result {
    Err(err) => error!("Saving scope config to {} failed! {}", filename, err),
    Ok(_)    => info!("Saved scope config to {}", filename),
  }
}

impl fmt::Display for ScopeConfig {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match toml::to_string(self) {
      Ok(rendered) => write!(f, "<ScopeConfig :\n{}>", rendered),
      Err(_)       => write!(f, "<ScopeConfig : not representable as toml>"),
    }
  }
}

impl Default for ScopeConfig {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_takes_defaults() {
    let config : ScopeConfig = toml::from_str("[flash]\nready_delay_ms = 25\n").unwrap();
    assert_eq!(config.flash.ready_delay_ms, 25);
    assert_eq!(config.flash.packet_size, FLASH_PACKET_SIZE);
    assert_eq!(config.interface, InterfaceSettings::new());
    assert_eq!(config.flash_settings().packets_per_command, FLASH_PACKETS_PER_COMMAND);
  }

  #[test]
  fn overrides_end_up_in_the_table() {
    let mut config = ScopeConfig::new();
    config.calibration.overrides.push(CoefficientOverride {
      channel    : AnalogChannel::B,
      divider    : 36.0,
      multiplier : 1.1,
      gain       : 0.2,
      slope      : -0.1,
      intercept  : -11.0,
    });
    let table = config.calibration_table().unwrap();
    let stage = GainStage::widest();
    assert_eq!(table.get(AnalogChannel::B, stage).gain, 0.2);
    assert_ne!(table.get(AnalogChannel::A, stage).gain, 0.2);
  }

  #[test]
  fn bad_overrides_are_rejected() {
    let mut config = ScopeConfig::new();
    config.calibration.overrides.push(CoefficientOverride {
      channel    : AnalogChannel::A,
      divider    : 5.0,
      multiplier : 1.1,
      gain       : 0.2,
      slope      : -0.1,
      intercept  : -11.0,
    });
    assert_eq!(config.calibration_table().err(), Some(ScopeError::InvalidConfiguration));
    config.calibration.overrides.clear();
    config.calibration.base_voltage_min = 1.0;
    assert_eq!(config.calibration_table().err(), Some(ScopeError::InvalidConfiguration));
  }

  #[test]
  fn suffix_is_appended_once() {
    assert_eq!(with_suffix(String::from("scope"), "toml"), "scope.toml");
    assert_eq!(with_suffix(String::from("scope.toml"), "toml"), "scope.toml");
    assert_eq!(with_suffix(String::from("scope.toml"), "json"), "scope.toml.json");
  }

  #[test]
  fn forced_revision_round_trips() {
    let mut config = ScopeConfig::new();
    config.interface.hardware_revision = Some(HardwareRevision::Legacy);
    let text = toml::to_string(&config).unwrap();
    let back : ScopeConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, config);
  }
}
