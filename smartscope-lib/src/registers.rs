//! FPGA register maps of the SmartScope
//!
//! There are two generations of the FPGA firmware with
//! different layouts of the settings and strobe memories.
//! The read only memory (ROM) is the same in both.
//! The logical registers are the union of both
//! generations, `address` resolves them for a
//! `HardwareRevision` and returns `None` if a register
//! does not exist in that generation.
//!
//! Register addresses are relative to their memory. On
//! the FPGA bus, the settings live at bus address 0x0C,
//! the ROM at 0x0D (see `constants`).

use std::fmt;

use serde::{
  Deserialize,
  Serialize,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareRevision {
  /// First generation FPGA layout
  Legacy,
  Current,
}

impl HardwareRevision {

  /// FPGA firmware major versions below this one
  /// use the legacy layout
  pub const FIRST_CURRENT_MAJOR : u8 = 2;

  /// Decide on the register layout from the FPGA
  /// firmware major version (ROM `FW_MSB`)
  pub fn detect(fw_major : u8) -> Self {
    if fw_major < Self::FIRST_CURRENT_MAJOR {
      HardwareRevision::Legacy
    } else {
      HardwareRevision::Current
    }
  }
}

impl fmt::Display for HardwareRevision {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<HardwareRevision: {:?}>", self)
  }
}

/// A logical register which can be resolved
/// to an address for each hardware revision
pub trait RegisterKey : Copy + fmt::Debug + 'static {
  fn address(&self, revision : HardwareRevision) -> Option<u32>;
  fn name(&self) -> &'static str;
  /// Largest value the register can hold
  fn max_value(&self) -> u8;
  /// All keys of this memory, in declaration order
  fn all() -> &'static [Self];
}

/// The byte registers of the FPGA settings memory
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SettingsRegister {
  StrobeUpdate,
  SpiAddress,
  SpiWriteValue,
  DividerMultiplier,
  ChaYOffset,
  ChbYOffset,
  TriggerPwm,
  TriggerLevel,
  TriggerMode,
  TriggerPwMinB0,
  TriggerPwMinB1,
  TriggerPwMinB2,
  TriggerPwMaxB0,
  TriggerPwMaxB1,
  TriggerPwMaxB2,
  InputDecimation,
  AcquisitionDepth,
  TriggerHoldoffB0,
  TriggerHoldoffB1,
  TriggerHoldoffB2,
  TriggerHoldoffB3,
  ViewDecimation,
  ViewOffsetB0,
  ViewOffsetB1,
  ViewOffsetB2,
  ViewAcquisitions,
  ViewBursts,
  ViewExcessB0,
  ViewExcessB1,
  DigitalTriggerRising,
  DigitalTriggerFalling,
  DigitalTriggerHigh,
  DigitalTriggerLow,
  DigitalOut,
  GeneratorDecimationB0,
  GeneratorDecimationB1,
  GeneratorDecimationB2,
  GeneratorDecimationB3,
  GeneratorSamplesB0,
  GeneratorSamplesB1,
  // legacy only
  SampleClockDividerB0,
  SampleClockDividerB1,
  AwgDebug,
  AcquisitionMultiplePower,
  TriggerThreshold,
  TriggerWidth,
}

impl SettingsRegister {

  pub const ALL : [SettingsRegister;46] = [
    SettingsRegister::StrobeUpdate,
    SettingsRegister::SpiAddress,
    SettingsRegister::SpiWriteValue,
    SettingsRegister::DividerMultiplier,
    SettingsRegister::ChaYOffset,
    SettingsRegister::ChbYOffset,
    SettingsRegister::TriggerPwm,
    SettingsRegister::TriggerLevel,
    SettingsRegister::TriggerMode,
    SettingsRegister::TriggerPwMinB0,
    SettingsRegister::TriggerPwMinB1,
    SettingsRegister::TriggerPwMinB2,
    SettingsRegister::TriggerPwMaxB0,
    SettingsRegister::TriggerPwMaxB1,
    SettingsRegister::TriggerPwMaxB2,
    SettingsRegister::InputDecimation,
    SettingsRegister::AcquisitionDepth,
    SettingsRegister::TriggerHoldoffB0,
    SettingsRegister::TriggerHoldoffB1,
    SettingsRegister::TriggerHoldoffB2,
    SettingsRegister::TriggerHoldoffB3,
    SettingsRegister::ViewDecimation,
    SettingsRegister::ViewOffsetB0,
    SettingsRegister::ViewOffsetB1,
    SettingsRegister::ViewOffsetB2,
    SettingsRegister::ViewAcquisitions,
    SettingsRegister::ViewBursts,
    SettingsRegister::ViewExcessB0,
    SettingsRegister::ViewExcessB1,
    SettingsRegister::DigitalTriggerRising,
    SettingsRegister::DigitalTriggerFalling,
    SettingsRegister::DigitalTriggerHigh,
    SettingsRegister::DigitalTriggerLow,
    SettingsRegister::DigitalOut,
    SettingsRegister::GeneratorDecimationB0,
    SettingsRegister::GeneratorDecimationB1,
    SettingsRegister::GeneratorDecimationB2,
    SettingsRegister::GeneratorDecimationB3,
    SettingsRegister::GeneratorSamplesB0,
    SettingsRegister::GeneratorSamplesB1,
    SettingsRegister::SampleClockDividerB0,
    SettingsRegister::SampleClockDividerB1,
    SettingsRegister::AwgDebug,
    SettingsRegister::AcquisitionMultiplePower,
    SettingsRegister::TriggerThreshold,
    SettingsRegister::TriggerWidth,
  ];

  /// The four hold-off bytes, least significant first
  pub const TRIGGER_HOLDOFF : [SettingsRegister;4] = [
    SettingsRegister::TriggerHoldoffB0,
    SettingsRegister::TriggerHoldoffB1,
    SettingsRegister::TriggerHoldoffB2,
    SettingsRegister::TriggerHoldoffB3,
  ];

  /// Minimum trigger pulse width, least significant first
  pub const TRIGGER_PW_MIN : [SettingsRegister;3] = [
    SettingsRegister::TriggerPwMinB0,
    SettingsRegister::TriggerPwMinB1,
    SettingsRegister::TriggerPwMinB2,
  ];

  fn current_address(&self) -> Option<u32> {
    let addr = match self {
      SettingsRegister::StrobeUpdate          => 0,
      SettingsRegister::SpiAddress            => 1,
      SettingsRegister::SpiWriteValue         => 2,
      SettingsRegister::DividerMultiplier     => 3,
      SettingsRegister::ChaYOffset            => 4,
      SettingsRegister::ChbYOffset            => 5,
      SettingsRegister::TriggerPwm            => 6,
      SettingsRegister::TriggerLevel          => 7,
      SettingsRegister::TriggerMode           => 8,
      SettingsRegister::TriggerPwMinB0        => 9,
      SettingsRegister::TriggerPwMinB1        => 10,
      SettingsRegister::TriggerPwMinB2        => 11,
      SettingsRegister::TriggerPwMaxB0        => 12,
      SettingsRegister::TriggerPwMaxB1        => 13,
      SettingsRegister::TriggerPwMaxB2        => 14,
      SettingsRegister::InputDecimation       => 15,
      SettingsRegister::AcquisitionDepth      => 16,
      SettingsRegister::TriggerHoldoffB0      => 17,
      SettingsRegister::TriggerHoldoffB1      => 18,
      SettingsRegister::TriggerHoldoffB2      => 19,
      SettingsRegister::TriggerHoldoffB3      => 20,
      SettingsRegister::ViewDecimation        => 21,
      SettingsRegister::ViewOffsetB0          => 22,
      SettingsRegister::ViewOffsetB1          => 23,
      SettingsRegister::ViewOffsetB2          => 24,
      SettingsRegister::ViewAcquisitions      => 25,
      SettingsRegister::ViewBursts            => 26,
      SettingsRegister::ViewExcessB0          => 27,
      SettingsRegister::ViewExcessB1          => 28,
      SettingsRegister::DigitalTriggerRising  => 29,
      SettingsRegister::DigitalTriggerFalling => 30,
      SettingsRegister::DigitalTriggerHigh    => 31,
      SettingsRegister::DigitalTriggerLow     => 32,
      SettingsRegister::DigitalOut            => 33,
      SettingsRegister::GeneratorDecimationB0 => 34,
      SettingsRegister::GeneratorDecimationB1 => 35,
      SettingsRegister::GeneratorDecimationB2 => 36,
      SettingsRegister::GeneratorDecimationB3 => 37,
      SettingsRegister::GeneratorSamplesB0    => 38,
      SettingsRegister::GeneratorSamplesB1    => 39,
      _ => {return None;}
    };
    Some(addr)
  }

  fn legacy_address(&self) -> Option<u32> {
    let addr = match self {
      SettingsRegister::StrobeUpdate             => 0,
      SettingsRegister::SpiAddress               => 1,
      SettingsRegister::SpiWriteValue            => 2,
      SettingsRegister::TriggerLevel             => 3,
      SettingsRegister::TriggerHoldoffB0         => 4,
      SettingsRegister::TriggerHoldoffB1         => 5,
      SettingsRegister::SampleClockDividerB0     => 6,
      SettingsRegister::SampleClockDividerB1     => 7,
      SettingsRegister::ChaYOffset               => 8,
      SettingsRegister::ChbYOffset               => 9,
      SettingsRegister::DividerMultiplier        => 10,
      SettingsRegister::DigitalOut               => 11,
      SettingsRegister::TriggerPwm               => 12,
      SettingsRegister::ViewDecimation           => 13,
      SettingsRegister::ViewOffsetB0             => 14,
      SettingsRegister::ViewAcquisitions         => 15,
      SettingsRegister::ViewBursts               => 16,
      SettingsRegister::AwgDebug                 => 17,
      SettingsRegister::AcquisitionMultiplePower => 18,
      SettingsRegister::TriggerThreshold         => 19,
      SettingsRegister::TriggerHoldoffB2         => 20,
      SettingsRegister::TriggerHoldoffB3         => 21,
      SettingsRegister::TriggerMode              => 22,
      SettingsRegister::TriggerWidth             => 23,
      _ => {return None;}
    };
    Some(addr)
  }
}

impl RegisterKey for SettingsRegister {

  fn address(&self, revision : HardwareRevision) -> Option<u32> {
    match revision {
      HardwareRevision::Legacy  => self.legacy_address(),
      HardwareRevision::Current => self.current_address(),
    }
  }

  fn name(&self) -> &'static str {
    match self {
      SettingsRegister::StrobeUpdate             => "STROBE_UPDATE",
      SettingsRegister::SpiAddress               => "SPI_ADDRESS",
      SettingsRegister::SpiWriteValue            => "SPI_WRITE_VALUE",
      SettingsRegister::DividerMultiplier        => "DIVIDER_MULTIPLIER",
      SettingsRegister::ChaYOffset               => "CHA_YOFFSET_VOLTAGE",
      SettingsRegister::ChbYOffset               => "CHB_YOFFSET_VOLTAGE",
      SettingsRegister::TriggerPwm               => "TRIGGER_PWM",
      SettingsRegister::TriggerLevel             => "TRIGGER_LEVEL",
      SettingsRegister::TriggerMode              => "TRIGGER_MODE",
      SettingsRegister::TriggerPwMinB0           => "TRIGGER_PW_MIN_B0",
      SettingsRegister::TriggerPwMinB1           => "TRIGGER_PW_MIN_B1",
      SettingsRegister::TriggerPwMinB2           => "TRIGGER_PW_MIN_B2",
      SettingsRegister::TriggerPwMaxB0           => "TRIGGER_PW_MAX_B0",
      SettingsRegister::TriggerPwMaxB1           => "TRIGGER_PW_MAX_B1",
      SettingsRegister::TriggerPwMaxB2           => "TRIGGER_PW_MAX_B2",
      SettingsRegister::InputDecimation          => "INPUT_DECIMATION",
      SettingsRegister::AcquisitionDepth         => "ACQUISITION_DEPTH",
      SettingsRegister::TriggerHoldoffB0         => "TRIGGERHOLDOFF_B0",
      SettingsRegister::TriggerHoldoffB1         => "TRIGGERHOLDOFF_B1",
      SettingsRegister::TriggerHoldoffB2         => "TRIGGERHOLDOFF_B2",
      SettingsRegister::TriggerHoldoffB3         => "TRIGGERHOLDOFF_B3",
      SettingsRegister::ViewDecimation           => "VIEW_DECIMATION",
      SettingsRegister::ViewOffsetB0             => "VIEW_OFFSET_B0",
      SettingsRegister::ViewOffsetB1             => "VIEW_OFFSET_B1",
      SettingsRegister::ViewOffsetB2             => "VIEW_OFFSET_B2",
      SettingsRegister::ViewAcquisitions         => "VIEW_ACQUISITIONS",
      SettingsRegister::ViewBursts               => "VIEW_BURSTS",
      SettingsRegister::ViewExcessB0             => "VIEW_EXCESS_B0",
      SettingsRegister::ViewExcessB1             => "VIEW_EXCESS_B1",
      SettingsRegister::DigitalTriggerRising     => "DIGITAL_TRIGGER_RISING",
      SettingsRegister::DigitalTriggerFalling    => "DIGITAL_TRIGGER_FALLING",
      SettingsRegister::DigitalTriggerHigh       => "DIGITAL_TRIGGER_HIGH",
      SettingsRegister::DigitalTriggerLow        => "DIGITAL_TRIGGER_LOW",
      SettingsRegister::DigitalOut               => "DIGITAL_OUT",
      SettingsRegister::GeneratorDecimationB0    => "GENERATOR_DECIMATION_B0",
      SettingsRegister::GeneratorDecimationB1    => "GENERATOR_DECIMATION_B1",
      SettingsRegister::GeneratorDecimationB2    => "GENERATOR_DECIMATION_B2",
      SettingsRegister::GeneratorDecimationB3    => "GENERATOR_DECIMATION_B3",
      SettingsRegister::GeneratorSamplesB0       => "GENERATOR_SAMPLES_B0",
      SettingsRegister::GeneratorSamplesB1       => "GENERATOR_SAMPLES_B1",
      SettingsRegister::SampleClockDividerB0     => "SAMPLECLOCKDIVIDER_B0",
      SettingsRegister::SampleClockDividerB1     => "SAMPLECLOCKDIVIDER_B1",
      SettingsRegister::AwgDebug                 => "AWG_DEBUG",
      SettingsRegister::AcquisitionMultiplePower => "ACQUISITION_MULTIPLE_POWER",
      SettingsRegister::TriggerThreshold         => "TRIGGER_THRESHOLD",
      SettingsRegister::TriggerWidth             => "TRIGGER_WIDTH",
    }
  }

  fn max_value(&self) -> u8 {
    u8::MAX
  }

  fn all() -> &'static [Self] {
    &Self::ALL
  }
}

/// The single bit registers ("strobes") of the FPGA
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Strobe {
  GlobalReset,
  InitSpiTransfer,
  /// AWG_ENABLE in the legacy layout
  GeneratorToAwg,
  LaEnable,
  ScopeEnable,
  ScopeUpdate,
  ForceTrigger,
  ViewUpdate,
  ViewSendOverview,
  ViewSendPartial,
  AcqStart,
  AcqStop,
  ChaDcCoupling,
  ChbDcCoupling,
  EnableAdc,
  OverflowDetect,
  EnableNeg,
  EnableRam,
  Dout3V5V,
  EnOpampB,
  GeneratorToDigital,
  Roll,
  LaChannel,
  // legacy only
  DebugPic,
  DebugRam,
  AwgDebug,
  DigiDebug,
}

impl Strobe {

  pub const ALL : [Strobe;27] = [
    Strobe::GlobalReset,
    Strobe::InitSpiTransfer,
    Strobe::GeneratorToAwg,
    Strobe::LaEnable,
    Strobe::ScopeEnable,
    Strobe::ScopeUpdate,
    Strobe::ForceTrigger,
    Strobe::ViewUpdate,
    Strobe::ViewSendOverview,
    Strobe::ViewSendPartial,
    Strobe::AcqStart,
    Strobe::AcqStop,
    Strobe::ChaDcCoupling,
    Strobe::ChbDcCoupling,
    Strobe::EnableAdc,
    Strobe::OverflowDetect,
    Strobe::EnableNeg,
    Strobe::EnableRam,
    Strobe::Dout3V5V,
    Strobe::EnOpampB,
    Strobe::GeneratorToDigital,
    Strobe::Roll,
    Strobe::LaChannel,
    Strobe::DebugPic,
    Strobe::DebugRam,
    Strobe::AwgDebug,
    Strobe::DigiDebug,
  ];
}

impl RegisterKey for Strobe {

  fn address(&self, revision : HardwareRevision) -> Option<u32> {
    let addr = match (revision, self) {
      (_, Strobe::GlobalReset)                                 => 0,
      (_, Strobe::InitSpiTransfer)                             => 1,
      (_, Strobe::GeneratorToAwg)                              => 2,
      (_, Strobe::LaEnable)                                    => 3,
      (_, Strobe::ScopeEnable)                                 => 4,
      (_, Strobe::ScopeUpdate)                                 => 5,
      (_, Strobe::ForceTrigger)                                => 6,
      (HardwareRevision::Current, Strobe::ViewUpdate)          => 7,
      (HardwareRevision::Current, Strobe::ViewSendOverview)    => 8,
      (HardwareRevision::Current, Strobe::ViewSendPartial)     => 9,
      (HardwareRevision::Current, Strobe::AcqStart)            => 10,
      (HardwareRevision::Current, Strobe::AcqStop)             => 11,
      (HardwareRevision::Current, Strobe::ChaDcCoupling)       => 12,
      (HardwareRevision::Current, Strobe::ChbDcCoupling)       => 13,
      (HardwareRevision::Current, Strobe::EnableAdc)           => 14,
      (HardwareRevision::Current, Strobe::OverflowDetect)      => 15,
      (HardwareRevision::Current, Strobe::EnableNeg)           => 16,
      (HardwareRevision::Current, Strobe::EnableRam)           => 17,
      (HardwareRevision::Current, Strobe::Dout3V5V)            => 18,
      (HardwareRevision::Current, Strobe::EnOpampB)            => 19,
      (HardwareRevision::Current, Strobe::GeneratorToDigital)  => 20,
      (HardwareRevision::Current, Strobe::Roll)                => 21,
      (HardwareRevision::Current, Strobe::LaChannel)           => 22,
      (HardwareRevision::Legacy,  Strobe::AcqStart)            => 9,
      (HardwareRevision::Legacy,  Strobe::AcqStop)             => 10,
      (HardwareRevision::Legacy,  Strobe::ChaDcCoupling)       => 13,
      (HardwareRevision::Legacy,  Strobe::ChbDcCoupling)       => 14,
      (HardwareRevision::Legacy,  Strobe::EnableAdc)           => 15,
      (HardwareRevision::Legacy,  Strobe::OverflowDetect)      => 16,
      (HardwareRevision::Legacy,  Strobe::EnableNeg)           => 17,
      (HardwareRevision::Legacy,  Strobe::EnableRam)           => 19,
      (HardwareRevision::Legacy,  Strobe::DebugPic)            => 20,
      (HardwareRevision::Legacy,  Strobe::DebugRam)            => 21,
      (HardwareRevision::Legacy,  Strobe::Dout3V5V)            => 22,
      (HardwareRevision::Legacy,  Strobe::EnOpampB)            => 23,
      (HardwareRevision::Legacy,  Strobe::AwgDebug)            => 24,
      (HardwareRevision::Legacy,  Strobe::DigiDebug)           => 25,
      _ => {return None;}
    };
    Some(addr)
  }

  fn name(&self) -> &'static str {
    match self {
      Strobe::GlobalReset        => "GLOBAL_RESET",
      Strobe::InitSpiTransfer    => "INIT_SPI_TRANSFER",
      Strobe::GeneratorToAwg     => "GENERATOR_TO_AWG",
      Strobe::LaEnable           => "LA_ENABLE",
      Strobe::ScopeEnable        => "SCOPE_ENABLE",
      Strobe::ScopeUpdate        => "SCOPE_UPDATE",
      Strobe::ForceTrigger       => "FORCE_TRIGGER",
      Strobe::ViewUpdate         => "VIEW_UPDATE",
      Strobe::ViewSendOverview   => "VIEW_SEND_OVERVIEW",
      Strobe::ViewSendPartial    => "VIEW_SEND_PARTIAL",
      Strobe::AcqStart           => "ACQ_START",
      Strobe::AcqStop            => "ACQ_STOP",
      Strobe::ChaDcCoupling      => "CHA_DCCOUPLING",
      Strobe::ChbDcCoupling      => "CHB_DCCOUPLING",
      Strobe::EnableAdc          => "ENABLE_ADC",
      Strobe::OverflowDetect     => "OVERFLOW_DETECT",
      Strobe::EnableNeg          => "ENABLE_NEG",
      Strobe::EnableRam          => "ENABLE_RAM",
      Strobe::Dout3V5V           => "DOUT_3V_5V",
      Strobe::EnOpampB           => "EN_OPAMP_B",
      Strobe::GeneratorToDigital => "GENERATOR_TO_DIGITAL",
      Strobe::Roll               => "ROLL",
      Strobe::LaChannel          => "LA_CHANNEL",
      Strobe::DebugPic           => "DEBUG_PIC",
      Strobe::DebugRam           => "DEBUG_RAM",
      Strobe::AwgDebug           => "AWG_DEBUG",
      Strobe::DigiDebug          => "DIGI_DEBUG",
    }
  }

  fn max_value(&self) -> u8 {
    1
  }

  fn all() -> &'static [Self] {
    &Self::ALL
  }
}

/// The read only identification memory of the FPGA
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RomRegister {
  FwMsb,
  FwLsb,
  FwGit0,
  FwGit1,
  FwGit2,
  FwGit3,
  SpiReceivedValue,
  /// First of the bytes which mirror the strobe states
  Strobes,
}

impl RomRegister {
  pub const ALL : [RomRegister;8] = [
    RomRegister::FwMsb,
    RomRegister::FwLsb,
    RomRegister::FwGit0,
    RomRegister::FwGit1,
    RomRegister::FwGit2,
    RomRegister::FwGit3,
    RomRegister::SpiReceivedValue,
    RomRegister::Strobes,
  ];
}

impl RegisterKey for RomRegister {

  fn address(&self, _revision : HardwareRevision) -> Option<u32> {
    Some(*self as u32)
  }

  fn name(&self) -> &'static str {
    match self {
      RomRegister::FwMsb            => "FW_MSB",
      RomRegister::FwLsb            => "FW_LSB",
      RomRegister::FwGit0           => "FW_GIT0",
      RomRegister::FwGit1           => "FW_GIT1",
      RomRegister::FwGit2           => "FW_GIT2",
      RomRegister::FwGit3           => "FW_GIT3",
      RomRegister::SpiReceivedValue => "SPI_RECEIVED_VALUE",
      RomRegister::Strobes          => "STROBES",
    }
  }

  fn max_value(&self) -> u8 {
    u8::MAX
  }

  fn all() -> &'static [Self] {
    &Self::ALL
  }
}

/// All registers of a memory which exist in a revision,
/// as (key, address) sorted by address
pub fn address_table<K: RegisterKey>(revision : HardwareRevision) -> Vec<(K, u32)> {
  let mut table : Vec<(K, u32)> = K::all().iter()
    .filter_map(|k| k.address(revision).map(|a| (*k, a)))
    .collect();
  table.sort_by_key(|(_, a)| *a);
  table
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  fn addresses_are_unique<K: RegisterKey>(revision : HardwareRevision) {
    let table = address_table::<K>(revision);
    let unique : HashSet<u32> = table.iter().map(|(_, a)| *a).collect();
    assert_eq!(unique.len(), table.len());
  }

  #[test]
  fn tables_have_unique_addresses() {
    for rev in [HardwareRevision::Legacy, HardwareRevision::Current] {
      addresses_are_unique::<SettingsRegister>(rev);
      addresses_are_unique::<Strobe>(rev);
      addresses_are_unique::<RomRegister>(rev);
    }
  }

  #[test]
  fn table_sizes() {
    assert_eq!(address_table::<SettingsRegister>(HardwareRevision::Current).len(), 40);
    assert_eq!(address_table::<SettingsRegister>(HardwareRevision::Legacy).len(), 24);
    assert_eq!(address_table::<Strobe>(HardwareRevision::Current).len(), 23);
    assert_eq!(address_table::<Strobe>(HardwareRevision::Legacy).len(), 21);
    assert_eq!(address_table::<RomRegister>(HardwareRevision::Legacy).len(), 8);
  }

  #[test]
  fn generations_differ() {
    assert_eq!(SettingsRegister::TriggerMode.address(HardwareRevision::Current), Some(8));
    assert_eq!(SettingsRegister::TriggerMode.address(HardwareRevision::Legacy), Some(22));
    assert_eq!(SettingsRegister::InputDecimation.address(HardwareRevision::Legacy), None);
    assert_eq!(SettingsRegister::TriggerWidth.address(HardwareRevision::Current), None);
    assert_eq!(Strobe::AcqStart.address(HardwareRevision::Legacy), Some(9));
    assert_eq!(Strobe::Roll.address(HardwareRevision::Legacy), None);
    assert_eq!(RomRegister::Strobes.address(HardwareRevision::Current), Some(7));
  }

  #[test]
  fn revision_detection() {
    assert_eq!(HardwareRevision::detect(1), HardwareRevision::Legacy);
    assert_eq!(HardwareRevision::detect(2), HardwareRevision::Current);
  }
}
