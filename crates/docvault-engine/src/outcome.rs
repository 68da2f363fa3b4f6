//! The `(success, message, payload)` result handed to the application
//! layer.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
  pub success:  bool,
  pub message:  String,
  /// Best-effort steps that failed while the operation as a whole succeeded.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub warnings: Vec<String>,
  pub payload:  Option<T>,
}

impl<T> Outcome<T> {
  pub fn ok(message: impl Into<String>, payload: T) -> Self {
    Self {
      success:  true,
      message:  message.into(),
      warnings: Vec::new(),
      payload:  Some(payload),
    }
  }

  pub fn failed(message: impl Into<String>) -> Self {
    Self {
      success:  false,
      message:  message.into(),
      warnings: Vec::new(),
      payload:  None,
    }
  }

  /// Attach warnings. When there are any, they are appended to the message.
  pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
    if !warnings.is_empty() {
      self.message = format!("{} (with warnings: {})", self.message, warnings.join("; "));
    }
    self.warnings = warnings;
    self
  }

  pub fn into_result(self) -> Result<T, String> {
    match (self.success, self.payload) {
      (true, Some(payload)) => Ok(payload),
      _ => Err(self.message),
    }
  }
}
