//! Broadcasting one message to many recipients over a mail transport.

mod cancellation;
mod classifier;
mod compose;
mod dispatcher;
mod message;
mod outcome;
mod transport;

pub mod errors;

pub use cancellation::{cancellation, CancelHandle, CancelToken};
pub use classifier::{classify, FailureKind, AUTH_REMEDIATION};
pub use compose::{
    estimate_send_time, ComposeWarning, ComposedBroadcast, Draft, DraftError, DraftErrors,
    MAX_BODY_LENGTH, MAX_CONCURRENCY, MAX_SUBJECT_LENGTH, MIN_BODY_LENGTH, MIN_CONCURRENCY,
    MIN_SUBJECT_LENGTH,
};
pub use dispatcher::{DispatchJob, Dispatcher, DEFAULT_CONCURRENCY};
pub use message::Message;
pub use outcome::{DispatchOutcome, FailedRecipient};
pub use transport::Transport;
