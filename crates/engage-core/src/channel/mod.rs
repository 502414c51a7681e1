//! Channel Module
//!
//! Channel infrastructure between the UI, the core logic task and the engine:
//! - `communication`: commands, effects, app events and their supporting types
//! - `utils`: channel aliases, constructors and statistics

pub mod communication;
pub mod utils;

pub use communication::{
    AppEvent, Command, Connectivity, Effect, GroupSnapshot, SelectionView, SessionStatusReport, TimelineQuery,
};

pub use crate::config::ChannelConfig;

pub use utils::{
    create_app_event_channel, create_command_channel, create_effect_channel, create_effect_receiver,
    create_event_channel, AppEventReceiver, AppEventSender, ChannelError, ChannelStats, CommandReceiver,
    CommandSender, EffectReceiver, EffectSender, EventReceiver, EventSender, NonBlockingSend,
};
