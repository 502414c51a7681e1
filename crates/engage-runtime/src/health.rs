//! Periodic session health check
//!
//! On every tick the monitor looks for groups that are created and joined but
//! have no connectivity at all. Alerts are debounced: a second alert is held
//! back until the minimum alert interval has passed, however many ticks see
//! the problem in between.

use crate::managers::{ConnectionManager, GroupManager};
use engage_core::{channel::AppEvent, config::HealthCheckConfig, types::GroupId, types::Timestamp};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct HealthMonitor {
    config: HealthCheckConfig,
    last_alert: Option<Timestamp>,
    stats: HealthStats,
}

impl HealthMonitor {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            last_alert: None,
            stats: HealthStats::default(),
        }
    }

    pub fn config(&self) -> &HealthCheckConfig {
        &self.config
    }

    /// Joined groups with neither multicast nor relay connectivity
    pub fn degraded_groups(groups: &GroupManager, connections: &ConnectionManager) -> Vec<GroupId> {
        groups
            .group_ids()
            .into_iter()
            .filter(|id| {
                groups.runtime(id).is_some_and(|r| r.created() && r.joined())
                    && !connections.is_connected_in_some_way(id)
            })
            .collect()
    }

    /// Run one health check
    pub fn check(&mut self, groups: &GroupManager, connections: &ConnectionManager, now: Timestamp) -> Option<AppEvent> {
        self.stats.checks += 1;
        if !self.config.notify_on_network_error {
            return None;
        }

        let degraded = Self::degraded_groups(groups, connections);
        if degraded.is_empty() {
            return None;
        }

        let due = self
            .last_alert
            .map_or(true, |last| now.duration_since(last) >= self.config.min_alert_interval_ms);
        if !due {
            self.stats.alerts_suppressed += 1;
            debug!(groups = degraded.len(), "Network still degraded; alert suppressed");
            return None;
        }

        self.last_alert = Some(now);
        self.stats.alerts += 1;
        warn!(groups = degraded.len(), "Joined groups have no connectivity");
        Some(AppEvent::NetworkDegraded { group_ids: degraded })
    }

    pub fn stats(&self) -> &HealthStats {
        &self.stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthStats {
    pub checks: u64,
    pub alerts: u64,
    pub alerts_suppressed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_core::{
        config::MulticastFailoverConfig,
        mission::{GroupDescriptor, MissionConfiguration},
        transport::{ConnectionDetail, ConnectionEventKind, ConnectionType},
        types::GroupType,
    };

    fn joined_group() -> (GroupManager, ConnectionManager, GroupId) {
        let id = GroupId::new("{a}");
        let mut mission = MissionConfiguration::new("{m}", "Test");
        mission
            .push_group(GroupDescriptor::new("{a}", GroupType::Audio, "Alpha").with_multicast("239.1.1.1", 8000))
            .unwrap();
        let mut groups = GroupManager::new();
        groups.apply_mission(mission);
        groups.create(&id, MulticastFailoverConfig::default(), None).unwrap();
        groups.on_created(&id).unwrap();
        groups.join(&id).unwrap();
        groups.on_joined(&id).unwrap();

        let mut connections = ConnectionManager::new();
        connections.on_created(&id);
        (groups, connections, id)
    }

    #[test]
    fn test_alert_once_per_interval() {
        let (groups, connections, id) = joined_group();
        let mut monitor = HealthMonitor::new(HealthCheckConfig::default());

        let alerts: Vec<AppEvent> = (0..20u64)
            .filter_map(|tick| monitor.check(&groups, &connections, Timestamp::new(tick * 2_000)))
            .collect();

        // Ticks every 2 s over 40 s with a 10 s minimum interval
        assert_eq!(alerts.len(), 4);
        assert_eq!(alerts[0], AppEvent::NetworkDegraded { group_ids: vec![id] });
        assert_eq!(monitor.stats().checks, 20);
        assert_eq!(monitor.stats().alerts_suppressed, 16);
    }

    #[test]
    fn test_connected_groups_are_healthy() {
        let (groups, mut connections, id) = joined_group();
        connections.apply(
            &id,
            ConnectionEventKind::Connected,
            Some(&ConnectionDetail::new("{a}", ConnectionType::Rallypoint, false)),
            Timestamp::new(0),
        );
        let mut monitor = HealthMonitor::new(HealthCheckConfig::default());
        assert!(monitor.check(&groups, &connections, Timestamp::new(0)).is_none());
    }

    #[test]
    fn test_alerts_can_be_disabled() {
        let (groups, connections, _) = joined_group();
        let mut monitor = HealthMonitor::new(HealthCheckConfig {
            notify_on_network_error: false,
            ..HealthCheckConfig::default()
        });
        assert!(monitor.check(&groups, &connections, Timestamp::new(0)).is_none());
    }
}
