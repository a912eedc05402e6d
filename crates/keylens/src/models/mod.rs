pub mod ask_envelope;

pub use ask_envelope::{
    ASK_ENVELOPE_SCHEMA_VERSION, Envelope, EnvelopeCommandFailure, EnvelopeError, EnvelopeMeta,
    EnvelopeWarning,
};
