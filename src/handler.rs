//! Handler contracts and the pluggable error sink.

use tracing::{error, warn};

/// Failure raised out of a user handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Broadcast consumer callback: sees every published event in sequence order.
///
/// `end_of_batch` marks the last event of a contiguously-available run from
/// one barrier wait - the natural point to flush downstream work.
pub trait EventHandler<E>: Send {
    fn on_event(
        &mut self,
        event: &E,
        sequence: i64,
        end_of_batch: bool,
    ) -> Result<(), HandlerError>;

    /// Called once before the processor starts delivering.
    fn on_start(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Called once as the processor exits its run loop.
    fn on_shutdown(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Work-queue consumer callback: each sequence reaches exactly one worker.
pub trait WorkHandler<E>: Send {
    fn on_event(&mut self, event: &E, sequence: i64) -> Result<(), HandlerError>;

    fn on_start(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_shutdown(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Sink for failures escaping handler callbacks.
///
/// Sinks may inspect the failed sequence and a snapshot of the event; they
/// must not touch ring state.
pub trait ErrorSink<E>: Send {
    /// Decide the processor's fate after `on_event` failed: `Ok` resumes
    /// delivery past the offending sequence, `Err` terminates the run loop.
    fn handle_event_error(
        &self,
        error: HandlerError,
        sequence: i64,
        event: Option<&E>,
    ) -> Result<(), HandlerError>;

    fn handle_on_start_error(&self, error: HandlerError);

    fn handle_on_shutdown_error(&self, error: HandlerError);
}

/// Default sink: report and terminate the processor.
#[derive(Debug, Default)]
pub struct FatalErrorSink;

impl<E> ErrorSink<E> for FatalErrorSink {
    fn handle_event_error(
        &self,
        error: HandlerError,
        sequence: i64,
        _event: Option<&E>,
    ) -> Result<(), HandlerError> {
        error!(sequence, %error, "event handler failed");
        Err(error)
    }

    fn handle_on_start_error(&self, error: HandlerError) {
        error!(%error, "handler failed in on_start");
    }

    fn handle_on_shutdown_error(&self, error: HandlerError) {
        error!(%error, "handler failed in on_shutdown");
    }
}

/// Absorbing sink: report and keep the processor running.
#[derive(Debug, Default)]
pub struct AbsorbErrorSink;

impl<E> ErrorSink<E> for AbsorbErrorSink {
    fn handle_event_error(
        &self,
        error: HandlerError,
        sequence: i64,
        _event: Option<&E>,
    ) -> Result<(), HandlerError> {
        warn!(sequence, %error, "event handler failed; continuing");
        Ok(())
    }

    fn handle_on_start_error(&self, error: HandlerError) {
        warn!(%error, "handler failed in on_start");
    }

    fn handle_on_shutdown_error(&self, error: HandlerError) {
        warn!(%error, "handler failed in on_shutdown");
    }
}
