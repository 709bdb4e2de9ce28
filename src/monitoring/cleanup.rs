// src/monitoring/cleanup.rs
//! Reservation expiry and history pruning

use crate::allocation::ReservationStatus;
use crate::events::EventKind;
use crate::manager::state::EngineState;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

/// Outcome of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Pending reservations cancelled with reason `"expired"`
    pub cancelled: usize,

    /// Confirmed reservations that were never activated
    pub expired: usize,

    /// Usage samples dropped by the retention window
    pub pruned_samples: usize,
}

impl EngineState {
    pub fn run_cleanup_at(&mut self, now: DateTime<Utc>) -> CleanupReport {
        let mut report = CleanupReport::default();

        let mut stale: Vec<_> = self
            .reservations
            .values()
            .filter(|r| r.is_expired_at(now))
            .filter(|r| {
                matches!(r.status, ReservationStatus::Pending | ReservationStatus::Confirmed)
            })
            .map(|r| (r.id.clone(), r.status))
            .collect();
        stale.sort_by(|a, b| a.0.cmp(&b.0));

        for (reservation_id, status) in stale {
            match status {
                ReservationStatus::Pending => {
                    match self.withdraw_reservation(&reservation_id, "expired") {
                        Ok(()) => report.cancelled += 1,
                        Err(e) => warn!("Failed to cancel expired reservation {}: {}", reservation_id, e),
                    }
                }
                _ => {
                    self.expire_reservation(&reservation_id);
                    report.expired += 1;
                }
            }
        }

        let cutoff = now - Duration::hours(self.settings.usage_retention_hours);
        for history in self.usage_history.values_mut() {
            let before = history.len();
            history.retain(|s| s.timestamp >= cutoff);
            report.pruned_samples += before - history.len();
        }
        self.usage_history.retain(|_, history| !history.is_empty());

        if report.cancelled + report.expired > 0 {
            info!(
                "Cleanup: {} pending reservation(s) cancelled, {} confirmed reservation(s) expired",
                report.cancelled, report.expired
            );
        }
        debug!("Cleanup pruned {} usage sample(s)", report.pruned_samples);
        metrics::counter!("resource_engine_reservations_expired_total")
            .increment((report.cancelled + report.expired) as u64);

        self.place_waiting_reservations();
        report
    }

    pub fn run_cleanup(&mut self) -> CleanupReport {
        self.run_cleanup_at(Utc::now())
    }

    /// Confirmed but never activated: release the hold on the resource
    fn expire_reservation(&mut self, reservation_id: &str) {
        let resource_id = match self.reservations.get_mut(reservation_id) {
            Some(reservation) => {
                reservation.status = ReservationStatus::Expired;
                reservation.resource_id.clone()
            }
            None => return,
        };

        if let Some(resource_id) = resource_id.filter(|id| self.resources.contains(id)) {
            if let Ok(resource) = self.resources.get_mut(&resource_id) {
                resource.detach_reservation(reservation_id);
            }
            if let Err(e) = self.refresh_resource(&resource_id) {
                warn!("Failed to refresh {} after expiry: {}", resource_id, e);
            }
        }

        debug!("Reservation {} expired before activation", reservation_id);
        self.emit(EventKind::ReservationExpired {
            reservation_id: reservation_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::RequestOptions;
    use crate::resources::{
        ResourceLimits, ResourceRequirements, ResourceSpec, ResourceType, UsageSnapshot, GIB,
    };
    use crate::utils::config::EngineSettings;

    fn state() -> (EngineState, String) {
        let mut state = EngineState::new(EngineSettings::default());
        let id = state
            .register_resource(ResourceSpec::new(
                ResourceType::Compute,
                "node",
                ResourceLimits::new(4.0, 8 * GIB),
            ))
            .unwrap();
        (state, id)
    }

    #[test]
    fn test_waiting_reservation_expires() {
        let (mut state, _) = state();
        let rsv = state
            .request_resources(
                "agent",
                ResourceRequirements::new().cpu(16.0),
                RequestOptions::new()
                    .wait_for_capacity()
                    .timeout(std::time::Duration::from_millis(100)),
            )
            .unwrap();

        // Not yet expired
        assert_eq!(state.run_cleanup().cancelled, 0);
        assert_eq!(state.reservations[&rsv].status, ReservationStatus::Pending);

        let report = state.run_cleanup_at(Utc::now() + Duration::seconds(1));
        assert_eq!(report.cancelled, 1);

        let reservation = &state.reservations[&rsv];
        assert_eq!(reservation.status, ReservationStatus::Cancelled);
        assert_eq!(reservation.cancel_reason.as_deref(), Some("expired"));
    }

    #[test]
    fn test_unactivated_reservation_expires_and_detaches() {
        let (mut state, id) = state();
        let rsv = state
            .request_resources(
                "agent",
                ResourceRequirements::new().cpu(1.0),
                RequestOptions::new()
                    .manual_activation()
                    .timeout(std::time::Duration::from_secs(5)),
            )
            .unwrap();
        assert_eq!(state.resources.get(&id).unwrap().reservations.len(), 1);

        let report = state.run_cleanup_at(Utc::now() + Duration::seconds(10));
        assert_eq!(report.expired, 1);
        assert_eq!(state.reservations[&rsv].status, ReservationStatus::Expired);
        assert!(state.resources.get(&id).unwrap().reservations.is_empty());
        assert!(state.activate_reservation(&rsv).unwrap_err().is_state());
    }

    #[test]
    fn test_active_reservations_are_untouched() {
        let (mut state, _) = state();
        let rsv = state
            .request_resources(
                "agent",
                ResourceRequirements::new().cpu(1.0),
                RequestOptions::new().timeout(std::time::Duration::from_millis(1)),
            )
            .unwrap();

        let report = state.run_cleanup_at(Utc::now() + Duration::seconds(10));
        assert_eq!(report, CleanupReport::default());
        assert_eq!(state.reservations[&rsv].status, ReservationStatus::Active);
    }

    #[test]
    fn test_old_samples_are_pruned() {
        let (mut state, id) = state();
        let now = Utc::now();
        state
            .update_resource_usage(&id, UsageSnapshot::new(10.0, GIB).at(now - Duration::hours(30)))
            .unwrap();
        state
            .update_resource_usage(&id, UsageSnapshot::new(20.0, GIB).at(now - Duration::hours(1)))
            .unwrap();

        let report = state.run_cleanup_at(now);
        assert_eq!(report.pruned_samples, 1);

        let history = state.get_usage_history(&id, None).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].cpu_percent, 20.0);
    }
}
