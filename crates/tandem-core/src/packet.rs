//! Stamping new local events.
//!
//! The payload is validated before the clock is touched, so a rejected
//! payload never consumes a timestamp.

use tandem_types::{Event, InvalidPayloadError, Payload};

use crate::clock::{ClockError, HybridClock, WallClock};

/// Why a local event could not be created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreateEventError {
    /// The payload does not satisfy its kind's constraints.
    #[error(transparent)]
    Payload(#[from] InvalidPayloadError),

    /// The clock has no timestamp left to issue.
    #[error(transparent)]
    Clock(#[from] ClockError),
}

/// Create a local event: validate, stamp with `increment()`, attribute to
/// the clock's node.
///
/// # Errors
///
/// Returns [`CreateEventError::Payload`] if the payload is invalid and
/// [`CreateEventError::Clock`] if the clock is exhausted. The clock is
/// left unchanged in both cases.
pub fn create_event<W: WallClock>(
    payload: Payload,
    clock: &mut HybridClock<W>,
) -> Result<Event, CreateEventError> {
    payload.validate()?;
    let timestamp = clock.increment()?;
    Ok(Event::new(payload, timestamp)?)
}
