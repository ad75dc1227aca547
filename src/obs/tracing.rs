// crates.io
use tracing::{Instrument, Span, instrument::Instrumented};
// self
use crate::{_prelude::*, obs::FlowKind};

/// Span wrapper used by gateway flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	span: Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		Self { span: tracing::info_span!("strava_gateway.flow", flow = kind.as_str(), stage) }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}

#[cfg(test)]
mod tests {
	// self
	use crate::obs::{FlowKind, FlowSpan};

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
