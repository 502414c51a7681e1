//! Centralized Configuration Management
//!
//! Application-level settings for the group communication core. Mission
//! content (groups, rallypoints) lives in [`crate::mission`]; this module holds
//! the device-side knobs that shape how a mission is run.

use crate::types::UiMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default multicast failover enablement when the mission defers to the app
pub const DEF_MULTICAST_FAILOVER_ENABLED: bool = true;
/// Default seconds of multicast loss before failing over to a rallypoint
pub const DEF_MULTICAST_FAILOVER_THRESHOLD_SECS: u64 = 10;
/// Unmute delay after a grant tone starts playing
pub const TX_UNMUTE_DELAY_MS_AFTER_GRANT_TONE: u64 = 120;

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the channels between the UI, core logic and engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Buffer size for Command channels (UI → Core Logic)
    pub command_buffer_size: usize,
    /// Buffer size for engine Event channels (Engine → Core Logic)
    pub event_buffer_size: usize,
    /// Buffer size for Effect channels (Core Logic → Engine)
    pub effect_buffer_size: usize,
    /// Buffer size for AppEvent channels (Core Logic → UI)
    pub app_event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,   // PTT and selection commands are infrequent
            event_buffer_size: 128,    // presence storms are bursty
            effect_buffer_size: 64,
            app_event_buffer_size: 64,
        }
    }
}

impl ChannelConfig {
    /// Create configuration for high-memory environments
    pub fn high_memory() -> Self {
        Self {
            command_buffer_size: 100,
            event_buffer_size: 512,
            effect_buffer_size: 128,
            app_event_buffer_size: 256,
        }
    }

    /// Create configuration for low-memory environments
    pub fn low_memory() -> Self {
        Self {
            command_buffer_size: 10,
            event_buffer_size: 32,
            effect_buffer_size: 25,
            app_event_buffer_size: 32,
        }
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            event_buffer_size: 100,
            effect_buffer_size: 100,
            app_event_buffer_size: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Health Check Configuration
// ----------------------------------------------------------------------------

/// Periodic connectivity inspection of joined groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    /// Delay before the first tick
    pub initial_delay_ms: u64,
    /// Interval between ticks
    pub interval_ms: u64,
    /// Minimum time between two network-degraded alerts
    pub min_alert_interval_ms: u64,
    /// Whether network-degraded alerts are emitted at all
    pub notify_on_network_error: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2_000,
            interval_ms: 2_000,
            min_alert_interval_ms: 10_000,
            notify_on_network_error: true,
        }
    }
}

impl HealthCheckConfig {
    /// Fast ticks for tests
    pub fn testing() -> Self {
        Self {
            initial_delay_ms: 10,
            interval_ms: 20,
            min_alert_interval_ms: 200,
            notify_on_network_error: true,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

// ----------------------------------------------------------------------------
// Multicast Failover Configuration
// ----------------------------------------------------------------------------

/// Application-level multicast failover setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MulticastFailoverConfig {
    pub enabled: bool,
    pub threshold_secs: u64,
}

impl Default for MulticastFailoverConfig {
    fn default() -> Self {
        Self {
            enabled: DEF_MULTICAST_FAILOVER_ENABLED,
            threshold_secs: DEF_MULTICAST_FAILOVER_THRESHOLD_SECS,
        }
    }
}

impl MulticastFailoverConfig {
    pub fn threshold_ms(&self) -> u64 {
        self.threshold_secs.saturating_mul(1_000)
    }
}

// ----------------------------------------------------------------------------
// Transmit Configuration
// ----------------------------------------------------------------------------

/// Settings that shape begin-transmit requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransmitConfig {
    /// Single or multi group view
    pub ui_mode: UiMode,
    /// Overrides per-request priority when greater than zero
    pub priority_tx_level: u8,
    /// Priority used when no override is active
    pub default_priority: u8,
    /// Flags used when no override is active
    pub default_flags: u32,
    /// Alias announced with transmissions
    pub user_alias: Option<String>,
    /// Whether a local grant tone plays before audio is unmuted
    pub grant_tone_enabled: bool,
    /// Delay between grant and unmute when the tone plays
    pub unmute_delay_ms: u64,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            ui_mode: UiMode::Single,
            priority_tx_level: 0,
            default_priority: 0,
            default_flags: 0,
            user_alias: None,
            grant_tone_enabled: true,
            unmute_delay_ms: TX_UNMUTE_DELAY_MS_AFTER_GRANT_TONE,
        }
    }
}

impl TransmitConfig {
    pub fn unmute_delay(&self) -> Duration {
        Duration::from_millis(self.unmute_delay_ms)
    }
}

// ----------------------------------------------------------------------------
// Presence Configuration
// ----------------------------------------------------------------------------

/// Presence table behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Emit join notifications for nodes other than ourselves
    pub notify_on_node_join: bool,
    /// Emit leave notifications for nodes other than ourselves
    pub notify_on_node_leave: bool,
    /// Upper bound on tracked nodes; discoveries beyond it are dropped
    pub max_tracked_nodes: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            notify_on_node_join: true,
            notify_on_node_leave: true,
            max_tracked_nodes: 4096,
        }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Master configuration struct that consolidates all core configurations
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    pub channels: ChannelConfig,
    pub health: HealthCheckConfig,
    pub failover: MulticastFailoverConfig,
    pub transmit: TransmitConfig,
    pub presence: PresenceConfig,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            channels: ChannelConfig::testing(),
            health: HealthCheckConfig::testing(),
            failover: MulticastFailoverConfig::default(),
            transmit: TransmitConfig {
                grant_tone_enabled: false,
                ..TransmitConfig::default()
            },
            presence: PresenceConfig::default(),
        }
    }

    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_health(mut self, health: HealthCheckConfig) -> Self {
        self.health = health;
        self
    }

    pub fn with_failover(mut self, failover: MulticastFailoverConfig) -> Self {
        self.failover = failover;
        self
    }

    pub fn with_transmit(mut self, transmit: TransmitConfig) -> Self {
        self.transmit = transmit;
        self
    }

    pub fn with_presence(mut self, presence: PresenceConfig) -> Self {
        self.presence = presence;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), String> {
        if self.channels.command_buffer_size == 0 {
            return Err("Command buffer size cannot be zero".into());
        }
        if self.channels.event_buffer_size == 0 {
            return Err("Event buffer size cannot be zero".into());
        }
        if self.channels.effect_buffer_size == 0 {
            return Err("Effect buffer size cannot be zero".into());
        }
        if self.channels.app_event_buffer_size == 0 {
            return Err("App event buffer size cannot be zero".into());
        }

        if self.health.interval_ms == 0 {
            return Err("Health check interval cannot be zero".into());
        }
        if self.health.min_alert_interval_ms < self.health.interval_ms {
            return Err("Minimum alert interval cannot be shorter than the health check interval".into());
        }

        if self.failover.enabled && self.failover.threshold_secs == 0 {
            return Err("Multicast failover threshold must be at least one second".into());
        }

        if self.presence.max_tracked_nodes == 0 {
            return Err("Max tracked nodes cannot be zero".into());
        }

        Ok(())
    }

    pub fn into_shared(self) -> SharedEngineConfig {
        Arc::new(self)
    }
}

// ----------------------------------------------------------------------------
// Configuration Presets
// ----------------------------------------------------------------------------

/// Predefined configuration presets for common use cases
pub struct ConfigPresets;

impl ConfigPresets {
    /// Development configuration (fast health checks, no grant tone)
    pub fn development() -> EngineConfig {
        EngineConfig {
            health: HealthCheckConfig {
                initial_delay_ms: 500,
                interval_ms: 1_000,
                ..HealthCheckConfig::default()
            },
            transmit: TransmitConfig {
                grant_tone_enabled: false,
                ..TransmitConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    /// Production configuration
    pub fn production() -> EngineConfig {
        EngineConfig::default()
    }

    /// Testing configuration (large buffers, millisecond health ticks)
    pub fn testing() -> EngineConfig {
        EngineConfig::testing()
    }

    /// Embedded configuration (minimal buffers)
    pub fn embedded() -> EngineConfig {
        EngineConfig {
            channels: ChannelConfig::low_memory(),
            presence: PresenceConfig {
                max_tracked_nodes: 256,
                ..PresenceConfig::default()
            },
            ..EngineConfig::default()
        }
    }
}

/// Arc-wrapped EngineConfig for sharing across tasks
pub type SharedEngineConfig = Arc<EngineConfig>;

/// Arc-wrapped ChannelConfig
pub type SharedChannelConfig = Arc<ChannelConfig>;

// ----------------------------------------------------------------------------
// Configuration Builder Pattern
// ----------------------------------------------------------------------------

/// Builder for EngineConfig with validation on build
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    channels: Option<ChannelConfig>,
    health: Option<HealthCheckConfig>,
    failover: Option<MulticastFailoverConfig>,
    transmit: Option<TransmitConfig>,
    presence: Option<PresenceConfig>,
}

/// Error type for configuration building
#[derive(Debug, Clone)]
pub struct ConfigBuilderError {
    pub message: String,
}

impl core::fmt::Display for ConfigBuilderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Configuration builder error: {}", self.message)
    }
}

impl std::error::Error for ConfigBuilderError {}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channels(mut self, config: ChannelConfig) -> Self {
        self.channels = Some(config);
        self
    }

    pub fn health(mut self, config: HealthCheckConfig) -> Self {
        self.health = Some(config);
        self
    }

    pub fn failover(mut self, config: MulticastFailoverConfig) -> Self {
        self.failover = Some(config);
        self
    }

    pub fn transmit(mut self, config: TransmitConfig) -> Self {
        self.transmit = Some(config);
        self
    }

    pub fn presence(mut self, config: PresenceConfig) -> Self {
        self.presence = Some(config);
        self
    }

    /// Set the UI mode without replacing the rest of the transmit settings
    pub fn ui_mode(mut self, mode: UiMode) -> Self {
        let mut transmit = self.transmit.take().unwrap_or_default();
        transmit.ui_mode = mode;
        self.transmit = Some(transmit);
        self
    }

    /// Use testing preset as base (can be further customized)
    pub fn testing(self) -> Self {
        let preset = EngineConfig::testing();
        Self {
            channels: Some(preset.channels),
            health: Some(preset.health),
            failover: Some(preset.failover),
            transmit: Some(preset.transmit),
            presence: Some(preset.presence),
        }
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<EngineConfig, ConfigBuilderError> {
        let config = self.build_unchecked();
        config
            .validate()
            .map_err(|message| ConfigBuilderError { message })?;
        Ok(config)
    }

    /// Build the configuration without validation
    pub fn build_unchecked(self) -> EngineConfig {
        EngineConfig {
            channels: self.channels.unwrap_or_default(),
            health: self.health.unwrap_or_default(),
            failover: self.failover.unwrap_or_default(),
            transmit: self.transmit.unwrap_or_default(),
            presence: self.presence.unwrap_or_default(),
        }
    }
}
