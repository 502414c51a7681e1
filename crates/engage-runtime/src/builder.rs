//! Runtime Builder API
//!
//! Provides a builder-style API for consumers (CLI, UI shells and tests) to
//! register engine tasks and get command, event and view handles.

use crate::engine::EngineTask;
use crate::logic::{CoreLogicTask, SessionState};
use crate::view::SessionView;
use engage_core::{
    channel::{
        create_app_event_channel, create_command_channel, create_effect_channel, create_effect_receiver,
        create_event_channel, AppEventReceiver, CommandSender, EventSender,
    },
    config::EngineConfig,
    types::{NodeId, SystemTimeSource, TimeSource},
    Command, EngageError, EngageResult,
};
use std::sync::Arc;
use tokio::{task::JoinHandle, time::Duration};
use tracing::{info, warn};

/// Time allowed for the core logic task to wind down on shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

pub struct RuntimeBuilder {
    node_id: NodeId,
    config: EngineConfig,
    time_source: Arc<dyn TimeSource>,
    engines: Vec<Box<dyn EngineTask>>,
}

impl RuntimeBuilder {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            config: EngineConfig::default(),
            time_source: Arc::new(SystemTimeSource),
            engines: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used for failover thresholds, presence timestamps and uptime
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn add_engine(mut self, engine: Box<dyn EngineTask>) -> Self {
        self.engines.push(engine);
        self
    }

    /// Validate the configuration, wire the channels and spawn every task
    pub async fn build_and_start(self) -> EngageResult<RuntimeHandle> {
        self.config.validate().map_err(EngageError::config_error)?;
        info!(node_id = %self.node_id, engines = self.engines.len(), "Building Engage runtime");

        let channel_config = self.config.channels.clone();
        let (command_sender, command_receiver) = create_command_channel(&channel_config);
        let (app_event_sender, app_event_receiver) = create_app_event_channel(&channel_config);
        let (event_sender, event_receiver) = create_event_channel(&channel_config);
        let (effect_sender, _effect_receiver) = create_effect_channel(&channel_config);

        let mut engine_handles = Vec::new();
        for mut engine in self.engines {
            engine.attach_channels(event_sender.clone(), create_effect_receiver(&effect_sender))?;
            let name = engine.name();
            engine_handles.push(tokio::spawn(async move {
                let result = engine.run().await;
                if let Err(e) = &result {
                    warn!(engine = name, "Engine task failed: {}", e);
                }
                result
            }));
        }

        let view = SessionView::new();
        let state = SessionState::new(self.node_id.clone(), self.config.into_shared(), self.time_source);
        let mut core = CoreLogicTask::new(
            state,
            &command_sender,
            command_receiver,
            event_receiver,
            effect_sender,
            app_event_sender,
            view.clone(),
        );
        let core_handle = tokio::spawn(async move { core.run().await });

        info!("Engage runtime started");
        Ok(RuntimeHandle {
            node_id: self.node_id,
            command_sender,
            event_sender,
            app_event_receiver: Some(app_event_receiver),
            view,
            core_handle: Some(core_handle),
            engine_handles,
            running: true,
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Handle to a running Engage runtime
pub struct RuntimeHandle {
    node_id: NodeId,
    command_sender: CommandSender,
    event_sender: EventSender,
    app_event_receiver: Option<AppEventReceiver>,
    view: SessionView,
    core_handle: Option<JoinHandle<EngageResult<()>>>,
    engine_handles: Vec<JoinHandle<EngageResult<()>>>,
    running: bool,
}

impl RuntimeHandle {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn command_sender(&self) -> CommandSender {
        self.command_sender.clone()
    }

    /// Sender for raw engine reports, for engines living outside the runtime
    pub fn event_sender(&self) -> EventSender {
        self.event_sender.clone()
    }

    /// Take the app event receiver (can only be called once)
    pub fn take_app_event_receiver(&mut self) -> Option<AppEventReceiver> {
        self.app_event_receiver.take()
    }

    /// Read-side view of the session, safe to query from any thread
    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub async fn send_command(&self, command: Command) -> EngageResult<()> {
        self.command_sender
            .send(command)
            .await
            .map_err(|_| EngageError::channel_error("Failed to send command to runtime"))
    }

    pub fn is_running(&self) -> bool {
        self.running && self.core_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the core logic task to complete
    pub async fn wait(&mut self) -> EngageResult<()> {
        match self.core_handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| EngageError::channel_error(format!("Core logic task panicked: {}", e)))?,
            None => Ok(()),
        }
    }

    /// Shutdown the runtime gracefully
    pub async fn shutdown(&mut self) -> EngageResult<()> {
        info!("Shutting down Engage runtime");
        let _ = self.send_command(Command::Shutdown).await;

        if let Some(handle) = self.core_handle.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                warn!("Core logic task did not stop in time");
            }
        }

        for handle in &self.engine_handles {
            handle.abort();
        }

        self.running = false;
        info!("Engage runtime shut down");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Runtime with testing configuration and no engine attached
pub async fn create_test_runtime(node_id: NodeId) -> EngageResult<RuntimeHandle> {
    RuntimeBuilder::new(node_id)
        .with_config(EngineConfig::testing())
        .build_and_start()
        .await
}
