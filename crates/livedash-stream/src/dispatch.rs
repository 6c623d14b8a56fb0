//! Frame decoding and routing to subscriber callbacks.

use std::fmt;

use livedash_core::event::{CompletionEvent, LogEvent, StreamEvent, decode_frame};
use livedash_core::types::{SequenceClock, Sequenced};

pub type CompletionHandler = Box<dyn FnMut(Sequenced<CompletionEvent>) + Send>;
pub type LogHandler = Box<dyn FnMut(Sequenced<LogEvent>) + Send>;

/// Result of dispatching one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Decoded and handed to the matching callback.
    Delivered(&'static str),
    /// Decoded, but no callback is registered for this kind. Not buffered.
    NoSubscriber(&'static str),
    /// Decoding failed; the frame was logged and dropped.
    Dropped,
}

/// Routes decoded [`StreamEvent`]s to at most one callback per kind.
///
/// Both slots are optional. Frames are dispatched synchronously in arrival
/// order; a frame that fails to decode is dropped without affecting later
/// frames.
#[derive(Default)]
pub struct Dispatcher {
    on_completion: Option<CompletionHandler>,
    on_log: Option<LogHandler>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("on_completion", &self.on_completion.is_some())
            .field("on_log", &self.on_log.is_some())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_completion(
        mut self,
        handler: impl FnMut(Sequenced<CompletionEvent>) + Send + 'static,
    ) -> Self {
        self.on_completion = Some(Box::new(handler));
        self
    }

    pub fn on_log(mut self, handler: impl FnMut(Sequenced<LogEvent>) + Send + 'static) -> Self {
        self.on_log = Some(Box::new(handler));
        self
    }

    /// Decode a raw text frame, stamp it with the next sequence from
    /// `clock`, and route it.
    pub fn dispatch(&mut self, frame: &str, clock: &SequenceClock) -> DispatchOutcome {
        match decode_frame(frame) {
            Ok(event) => self.dispatch_event(Sequenced::new(clock.next(), event)),
            Err(e) => {
                tracing::warn!(frame_len = frame.len(), "dropping undecodable frame: {e}");
                DispatchOutcome::Dropped
            }
        }
    }

    /// Route an already decoded event.
    pub fn dispatch_event(&mut self, event: Sequenced<StreamEvent>) -> DispatchOutcome {
        let Sequenced { seq, event } = event;
        let kind = event.kind();
        let delivered = match event {
            StreamEvent::Completion(completion) => match self.on_completion.as_mut() {
                Some(handler) => {
                    handler(Sequenced::new(seq, completion));
                    true
                }
                None => false,
            },
            StreamEvent::Log(log) => match self.on_log.as_mut() {
                Some(handler) => {
                    handler(Sequenced::new(seq, log));
                    true
                }
                None => false,
            },
        };

        if delivered {
            DispatchOutcome::Delivered(kind)
        } else {
            tracing::debug!(kind, seq, "no subscriber for event, dropping");
            DispatchOutcome::NoSubscriber(kind)
        }
    }
}
