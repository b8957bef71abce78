use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("inception.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("inception.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("inception.client.request_duration_seconds");

pub(crate) static STREAM_CHUNKS: Counter = Counter::new("inception.stream.chunks");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("inception.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("inception.stream.bytes");

pub(crate) static SESSION_TURNS: Counter = Counter::new("inception.session.turns");
pub(crate) static SESSION_INTERRUPTS: Counter = Counter::new("inception.session.interrupts");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_CHUNKS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);

    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSION_INTERRUPTS);
}
