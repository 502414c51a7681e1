//! Channel Utilities
//!
//! Channel aliases and constructors for the four message flows, plus a
//! non-blocking send for UI callers and atomic channel statistics.

use crate::channel::communication::{AppEvent, Command, Effect};
use crate::config::ChannelConfig;
use crate::protocol::events::RawEngineEvent;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    ChannelFull,
    ChannelClosed,
    ReceiverDropped,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::ChannelFull => write!(f, "Channel buffer is full"),
            ChannelError::ChannelClosed => write!(f, "Channel is closed"),
            ChannelError::ReceiverDropped => write!(f, "Channel receiver was dropped"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<ChannelError> for crate::errors::EngageError {
    fn from(error: ChannelError) -> Self {
        crate::errors::EngageError::channel_error(error.to_string())
    }
}

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;
pub type EventSender = mpsc::Sender<RawEngineEvent>;
pub type EventReceiver = mpsc::Receiver<RawEngineEvent>;
pub type EffectSender = broadcast::Sender<Effect>;
pub type EffectReceiver = broadcast::Receiver<Effect>;
pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create bounded command channel (UI → Core Logic)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size)
}

/// Create bounded event channel (Engine → Core Logic)
pub fn create_event_channel(config: &ChannelConfig) -> (EventSender, EventReceiver) {
    mpsc::channel(config.event_buffer_size)
}

/// Create broadcast effect channel (Core Logic → Engine tasks)
///
/// Engine tasks get their own receivers through [`create_effect_receiver`].
pub fn create_effect_channel(config: &ChannelConfig) -> (EffectSender, EffectReceiver) {
    broadcast::channel(config.effect_buffer_size)
}

/// Subscribe a new effect receiver
pub fn create_effect_receiver(effect_sender: &EffectSender) -> EffectReceiver {
    effect_sender.subscribe()
}

/// Create bounded app event channel (Core Logic → UI)
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    mpsc::channel(config.app_event_buffer_size)
}

// ----------------------------------------------------------------------------
// Non-blocking Send Utilities
// ----------------------------------------------------------------------------

/// Non-blocking send for UI callers that must never wait on the core
pub trait NonBlockingSend<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError>;
}

impl<T> NonBlockingSend<T> for mpsc::Sender<T> {
    fn try_send_non_blocking(&self, message: T) -> Result<(), ChannelError> {
        self.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChannelError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => ChannelError::ChannelClosed,
        })
    }
}

// ----------------------------------------------------------------------------
// Channel Health Monitoring
// ----------------------------------------------------------------------------

/// Channel utilization statistics
#[derive(Debug)]
pub struct ChannelStats {
    pub channel_type: &'static str,
    pub buffer_size: usize,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    // percentage * 100
    current_utilization: AtomicU32,
}

impl ChannelStats {
    pub fn new(channel_type: &'static str, buffer_size: usize) -> Self {
        Self {
            channel_type,
            buffer_size,
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            current_utilization: AtomicU32::new(0),
        }
    }

    pub fn record_send_success(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// `current_size` is the number of items currently buffered
    pub fn update_utilization(&self, current_size: usize) {
        let utilization = if self.buffer_size == 0 {
            0
        } else {
            (current_size.min(self.buffer_size) * 10_000 / self.buffer_size) as u32
        };
        self.current_utilization.store(utilization, Ordering::Relaxed);
    }

    pub fn drop_rate(&self) -> f32 {
        let sent = self.messages_sent.load(Ordering::Relaxed);
        let dropped = self.messages_dropped.load(Ordering::Relaxed);

        if sent + dropped == 0 {
            0.0
        } else {
            dropped as f32 / (sent + dropped) as f32
        }
    }

    /// Fraction of the buffer in use, `0.0..=1.0`
    pub fn current_utilization(&self) -> f32 {
        self.current_utilization.load(Ordering::Relaxed) as f32 / 10_000.0
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }
}

impl Clone for ChannelStats {
    fn clone(&self) -> Self {
        Self {
            channel_type: self.channel_type,
            buffer_size: self.buffer_size,
            messages_sent: AtomicU64::new(self.messages_sent.load(Ordering::Relaxed)),
            messages_dropped: AtomicU64::new(self.messages_dropped.load(Ordering::Relaxed)),
            current_utilization: AtomicU32::new(self.current_utilization.load(Ordering::Relaxed)),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
