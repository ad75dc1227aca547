//! Observability helpers: flow spans, flow outcome counters, and subscriber setup.
//!
//! Flows run inside spans named `strava_gateway.flow` carrying `flow` and `stage` fields. With
//! the `metrics` feature enabled, every attempt/success/failure also increments the
//! `strava_gateway_flow_total` counter labeled by `flow` + `outcome`.

mod metrics;
mod subscriber;
mod tracing;

pub use metrics::*;
pub use subscriber::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Token freshness check, including a refresh exchange when the token is stale.
	Refresh,
	/// Request forwarded to the upstream API.
	Forward,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::Forward => "forward",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
