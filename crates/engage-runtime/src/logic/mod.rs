//! Core Logic Module
//!
//! The core logic task owns every session table and processes commands,
//! engine events and health ticks one at a time:
//! - `state`: session state and statistics
//! - `handlers`: command and engine event handlers
//! - `task`: the task loop and its output dispatch
//!
//! Handlers never touch channels. They return the engine effects and app
//! events to send, and the task sends them after refreshing the read-side view.

pub mod handlers;
pub mod state;
pub mod task;

pub use handlers::{CommandHandlers, EventHandlers, HandlerOutput};
pub use state::{CoreStats, SessionState};
pub use task::CoreLogicTask;
