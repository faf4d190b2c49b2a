//! Error types for the gatehouse runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the gate, the request executor, and the session pool.
#[derive(Debug, Error)]
pub enum Error {
	/// Invalid configuration or an unsupported request shape.
	///
	/// Raised before any network activity and never retried.
	#[error("Configuration error: {0}")]
	Configuration(String),

	/// The caller cancelled while waiting for a request slot.
	#[error("Admission cancelled while waiting for a request slot")]
	AdmissionCancelled,

	/// The caller cancelled an admitted request; no further attempts were made.
	#[error("Request cancelled after {attempts} attempt(s)")]
	Cancelled { attempts: u32 },

	/// No response was received on the final attempt.
	#[error("Request failed: {message}")]
	Transport {
		message: String,
		/// Status of the most recent attempt that produced a response, or 0.
		status: u16,
		attempts: u32,
	},

	/// A response was received but its status marks it as a failure.
	#[error("Request failed with status: {status}")]
	Status { status: u16, body: Vec<u8>, attempts: u32 },

	/// Operation on a session that is no longer open.
	#[error("Session closed: {address}")]
	SessionClosed { address: String },

	/// The duplex handshake failed.
	#[error("Failed to dial {address}: {message}")]
	Dial { address: String, message: String },

	/// Response body did not decode into the requested type.
	#[error("Failed to decode response body: {0}")]
	Decode(#[source] serde_json::Error),

	/// Request payload or outbound message could not be encoded.
	#[error("Failed to encode payload: {0}")]
	Encode(#[from] serde_json::Error),

	/// A background task ended abnormally.
	#[error("Task failed: {0}")]
	Task(String),
}

impl Error {
	/// Status code carried by the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Error::Transport { status, .. } if *status != 0 => Some(*status),
			Error::Status { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Number of attempts made before the error was returned.
	pub fn attempts(&self) -> Option<u32> {
		match self {
			Error::Cancelled { attempts } | Error::Transport { attempts, .. } | Error::Status { attempts, .. } => {
				Some(*attempts)
			}
			_ => None,
		}
	}

	pub fn is_transport(&self) -> bool {
		matches!(self, Error::Transport { .. })
	}

	pub fn is_status(&self) -> bool {
		matches!(self, Error::Status { .. })
	}

	pub fn is_session_closed(&self) -> bool {
		matches!(self, Error::SessionClosed { .. })
	}

	/// True for caller-initiated aborts, whether before or after admission.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Error::AdmissionCancelled | Error::Cancelled { .. })
	}

	pub fn is_configuration(&self) -> bool {
		matches!(self, Error::Configuration(_))
	}

	/// Whether a caller-level retry could plausibly succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Error::Transport { .. } | Error::Dial { .. } => true,
			Error::Status { status, .. } => *status == 429 || *status >= 500,
			_ => false,
		}
	}

	/// Response body of a status error, lossily decoded as UTF-8.
	pub fn body_text(&self) -> Option<String> {
		match self {
			Error::Status { body, .. } => Some(String::from_utf8_lossy(body).into_owned()),
			_ => None,
		}
	}
}

impl From<gatehouse_protocol::UnsupportedMethod> for Error {
	fn from(err: gatehouse_protocol::UnsupportedMethod) -> Self {
		Error::Configuration(err.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn transport_without_response_has_no_status() {
		let err = Error::Transport {
			message: "connection refused".into(),
			status: 0,
			attempts: 4,
		};
		assert_eq!(err.status(), None);
		assert_eq!(err.attempts(), Some(4));
		assert!(err.is_transport());
	}

	#[test]
	fn status_error_exposes_code_and_body() {
		let err = Error::Status {
			status: 404,
			body: b"missing".to_vec(),
			attempts: 1,
		};
		assert_eq!(err.status(), Some(404));
		assert_eq!(err.body_text().as_deref(), Some("missing"));
		assert_eq!(err.to_string(), "Request failed with status: 404");
		assert!(!err.is_retryable());
	}

	#[test]
	fn server_side_failures_are_retryable() {
		let busy = Error::Status {
			status: 503,
			body: Vec::new(),
			attempts: 4,
		};
		assert!(busy.is_retryable());
		assert!(!Error::AdmissionCancelled.is_retryable());
		assert!(!Error::SessionClosed { address: "wss://a".into() }.is_retryable());
	}

	#[test]
	fn unsupported_method_is_configuration() {
		let err: Error = "PATCH".parse::<gatehouse_protocol::Method>().unwrap_err().into();
		assert!(err.is_configuration());
		assert!(err.to_string().contains("PATCH"));
	}
}
