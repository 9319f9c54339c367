//! Error types of the SmartScope control plane
//!
//! `TransportError` is what the USB transport reports,
//! `ScopeError` is what the command, register, calibration
//! and flash layers hand back to the caller.

use std::error::Error;
use std::fmt;

/// Failures reported by a `Transport`
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TransportError {
  Timeout,
  Disconnected,
  /// Fewer bytes than requested came back
  ShortRead,
  /// The response frame does not carry the response marker
  UnexpectedResponse,
  Io,
}

impl TransportError {
  pub fn to_string(&self) -> String {
    match self {
      TransportError::Timeout            => {return String::from("Timeout");},
      TransportError::Disconnected       => {return String::from("Disconnected");},
      TransportError::ShortRead          => {return String::from("ShortRead");},
      TransportError::UnexpectedResponse => {return String::from("UnexpectedResponse");},
      TransportError::Io                 => {return String::from("Io");},
    }
  }
}

impl fmt::Display for TransportError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "<TransportError: {}>", self.to_string())
  }
}

impl Error for TransportError {
}

/*************************************/

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ScopeError {
  /// I/O level failure, never retried by this crate
  TransportFailure(TransportError),
  /// address + length outside of a controller's window
  OutOfRange,
  /// A register value larger than the register's maximum
  ValueOutOfRange,
  /// A request which can not be realized by the hardware,
  /// e.g. an unknown gain stage or an empty firmware image
  InvalidConfiguration,
  /// The register does not exist in this hardware revision
  UnknownRegister,
  /// The controller does not support the operation
  UnsupportedOperation,
  SettingsDecoding,
}

impl fmt::Display for ScopeError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let repr : String;
    match self {
      ScopeError::TransportFailure(err) => {repr = format!("TransportFailure ({})", err.to_string());},
      ScopeError::OutOfRange            => {repr = String::from("OutOfRange");},
      ScopeError::ValueOutOfRange       => {repr = String::from("ValueOutOfRange");},
      ScopeError::InvalidConfiguration  => {repr = String::from("InvalidConfiguration");},
      ScopeError::UnknownRegister       => {repr = String::from("UnknownRegister");},
      ScopeError::UnsupportedOperation  => {repr = String::from("UnsupportedOperation");},
      ScopeError::SettingsDecoding      => {repr = String::from("SettingsDecoding");},
    }
    write!(f, "<ScopeError: {}>", repr)
  }
}

impl Error for ScopeError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      ScopeError::TransportFailure(err) => Some(err),
      _ => None
    }
  }
}

impl From<TransportError> for ScopeError {
  fn from(err : TransportError) -> Self {
    ScopeError::TransportFailure(err)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transport_errors_lift_into_scope_errors() {
    let err : ScopeError = TransportError::Timeout.into();
    assert_eq!(err, ScopeError::TransportFailure(TransportError::Timeout));
    assert!(err.source().is_some());
    assert!(format!("{}", err).starts_with("<ScopeError: TransportFailure"));
  }
}
