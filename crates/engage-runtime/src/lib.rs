//! Engage Runtime
//!
//! The session runtime for the Engage push-to-talk core:
//! - `CoreLogicTask`: the single task owning all session state
//! - Group, connection, presence and transmit managers
//! - The periodic health check and multicast failover notices
//! - `SessionView`: a lock-free read side for UI threads
//! - `EngineTask`: the seam to the engine, with an in-process loopback engine
//!
//! `engage-core` provides the data model and channel protocol; this crate
//! drives it.

pub mod builder;
pub mod engine;
pub mod health;
pub mod logic;
pub mod managers;
pub mod view;

pub use builder::{create_test_runtime, RuntimeBuilder, RuntimeHandle};
pub use engine::{EffectLog, EngineTask, LoopbackEngine};
pub use health::{HealthMonitor, HealthStats};
pub use logic::{CoreLogicTask, CoreStats, SessionState};
pub use managers::*;
pub use view::SessionView;

// Re-export core types for convenience
pub use engage_core::{
    channel::{
        create_app_event_channel, create_command_channel, create_effect_channel, create_effect_receiver,
        create_event_channel, AppEvent, AppEventReceiver, AppEventSender, ChannelError, ChannelStats, Command,
        CommandReceiver, CommandSender, Effect, EffectReceiver, EffectSender, EventReceiver, EventSender,
        NonBlockingSend,
    },
    EngageError, EngageResult, GroupId, NodeId,
};
