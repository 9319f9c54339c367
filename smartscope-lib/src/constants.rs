//! Global constants for the SmartScope control plane
//!
//! Wire protocol constants are fixed by the supervisor
//! firmware. Calibration and timing constants are the
//! built-in defaults, most of them can be overridden
//! through the `ScopeConfig`.
//!

//========== USB command protocol ==========

/// First byte of every command sent to the supervisor
/// (C0 as in Command)
pub const HEADER_CMD_BYTE      : u8 = 0xC0;

/// First byte of every response frame
/// (AD as in Answer Dude)
pub const HEADER_RESPONSE_BYTE : u8 = 0xAD;

/// Read responses always come back in a frame of this size
pub const RESPONSE_FRAME_SIZE  : usize = 16;

/// Payload offset in a read response for all controllers
/// but the program storage
pub const RESPONSE_OFFSET      : usize = 4;

/// The program storage echoes its high address byte,
/// so the payload starts one byte later
pub const RESPONSE_OFFSET_PROGRAM_STORAGE : usize = 5;

/// Highest user address of the program storage (flash rom)
pub const FLASH_USER_ADDRESS_MASK : u32 = 0x0FFF;

/// Maximum payload of a single plain write (L1)
pub const I2C_MAX_WRITE_LENGTH      : usize = 27;

/// Maximum payload of a single streaming body packet (L2)
pub const I2C_MAX_WRITE_LENGTH_BULK : usize = 29;

/// Bus address of the FPGA settings registers
pub const FPGA_I2C_ADDRESS_SETTINGS : u8 = 0x0C;
/// Bus address of the FPGA read only memory
pub const FPGA_I2C_ADDRESS_ROM      : u8 = 0x0D;
/// Bus address of the waveform generator behind the FPGA
pub const FPGA_I2C_ADDRESS_AWG      : u8 = 0x0E;

//========== FPGA flashing ==========

/// Size of a single bitstream packet in bytes
pub const FLASH_PACKET_SIZE         : usize = 32;
/// Number of packets bundled into one bulk transfer
pub const FLASH_PACKETS_PER_COMMAND : usize = 64;
/// Filler packets which keep the configuration clock
/// running after the bitstream (2048 clock cycles)
pub const FLASH_PADDING_PACKETS     : usize = 2048 / 8;
/// Filler byte of the padding packets
pub const FLASH_FILLER_BYTE         : u8 = 0xFF;
/// Time the INIT line of the FPGA needs to rise
/// after the start command, in milliseconds
pub const FLASH_READY_DELAY_MS      : u64 = 10;

//========== analog front end ==========

/// Number of analog channels
pub const N_ANALOG_CHANNELS  : usize = 2;
/// Number of digital (logic analyser) channels
pub const N_DIGITAL_CHANNELS : usize = 8;

/// Nominal gain stage dividers, ascending
pub const VALID_DIVIDERS    : [f64;3] = [1.0, 6.0, 36.0];
/// Nominal gain stage multipliers, ascending
pub const VALID_MULTIPLIERS : [f64;3] = [1.1, 2.0, 3.0];

/// ADC input window (in V) for divider 1 / multiplier 1
pub const BASE_VOLTAGE_MIN  : f64 = -0.6345;
pub const BASE_VOLTAGE_MAX  : f64 = 0.6769;

/// ADC code used as the zero volt reference
pub const ADC_MIDSCALE      : f64 = 127.0;

/// Allowed window for the y-offset register
pub const YOFFSET_BYTE_MIN  : u8 = 10;
pub const YOFFSET_BYTE_MAX  : u8 = 200;

/// Nominal calibration coefficients (gain, slope, intercept)
/// for divider 1 / multiplier 1. Other stages scale these
/// with divider/multiplier.
pub const DEFAULT_CALIB_GAIN      : f64 = 0.0051;
pub const DEFAULT_CALIB_SLOPE     : f64 = -0.0029;
pub const DEFAULT_CALIB_INTERCEPT : f64 = -0.3432;

//========== timing ==========

/// Sample period without decimation (100 MS/s)
pub const BASE_SAMPLE_PERIOD   : f64 = 10e-9;
/// Number of samples in one acquisition
pub const NUMBER_OF_SAMPLES    : usize = 2048;
/// Largest value of the input decimation register
pub const INPUT_DECIMATION_MAX : u8 = 9;
/// From this decimation on acquisitions come in chunks
/// and rolling mode becomes available
pub const INPUT_DECIMATION_MIN_FOR_ROLLING_MODE : u8 = 7;
