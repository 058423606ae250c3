//! Fire-and-forget notifications from the engine to any number of observers.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_channel::{Sender, TrySendError};

/// Events emitted while the engine works
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputerEvent {
    /// Human readable status line
    Message(String),
    /// Inclusive range of the upcoming progress values
    ProgressRange { start: usize, end: usize },
    Progress(usize),
}

type Listener = Arc<dyn Fn(&ComputerEvent) + Send + Sync>;

/// Fans events out to subscribed callbacks and channels.
#[derive(Clone, Default)]
pub struct Notifier {
    listeners: Vec<Listener>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&ComputerEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Forward every event into a channel, events are dropped while the channel is full.
    pub fn subscribe_channel(&mut self, sender: Sender<ComputerEvent>) {
        self.subscribe(move |event| match sender.try_send(event.clone()) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => log::trace!("dropping event, receiver is full"),
        });
    }

    pub fn emit(&self, event: ComputerEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(ComputerEvent::Message(text.into()));
    }

    pub fn progress(&self, value: usize) {
        self.emit(ComputerEvent::Progress(value));
    }

    pub fn progress_range(&self, start: usize, end: usize) {
        self.emit(ComputerEvent::ProgressRange { start, end });
    }
}

/// Cooperative cancellation flag shared between the compute loop and its controllers.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request the running computation to stop after its current unit of work
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn start(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
