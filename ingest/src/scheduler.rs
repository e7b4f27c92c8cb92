//! Operational scheduler: trading-hours and maintenance-window aware task
//! gating, per `spec.md` §4.11.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Timelike, Utc};
use ingest_types::{MaintenanceWindow, SchedulerConfig};

/// Classification of an operation requesting permission to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    HealthCheck,
    CredentialRefresh,
    Maintenance,
    IntegrityCheck,
    IndexRebuild,
    CacheRefresh,
    Backfill,
    Reporting,
    Other(ResourceProfile),
}

impl OperationKind {
    const fn always_allowed(self) -> bool {
        matches!(self, Self::HealthCheck | Self::CredentialRefresh)
    }

    const fn trading_hours_sensitive(self) -> bool {
        matches!(self, Self::Maintenance | Self::IntegrityCheck | Self::IndexRebuild | Self::CacheRefresh)
    }

    /// Stable name used to match a maintenance window's `allowed_ops` list.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::HealthCheck => "healthCheck",
            Self::CredentialRefresh => "credentialRefresh",
            Self::Maintenance => "maintenance",
            Self::IntegrityCheck => "integrityCheck",
            Self::IndexRebuild => "indexRebuild",
            Self::CacheRefresh => "cacheRefresh",
            Self::Backfill => "backfill",
            Self::Reporting => "reporting",
            Self::Other(_) => "other",
        }
    }
}

/// Resource cost profile for operations not covered by the named kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceProfile {
    Light,
    Network,
    CpuAndIo,
}

impl ResourceProfile {
    const fn is_heavy(self) -> bool {
        matches!(self, Self::Network | Self::CpuAndIo)
    }
}

/// Result of a scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerDecision {
    Allowed,
    Denied { suggested_delay: std::time::Duration },
}

/// One of the three named parts of a trading day, or outside any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    PreMarket,
    Regular,
    PostMarket,
    Closed,
}

/// Trading-hours and maintenance-window aware operation gate.
pub struct OperationalScheduler {
    cfg: SchedulerConfig,
}

impl OperationalScheduler {
    #[must_use]
    pub const fn new(cfg: SchedulerConfig) -> Self {
        Self { cfg }
    }

    fn minute_of_day(now: DateTime<Utc>) -> u16 {
        u16::try_from(now.hour() * 60 + now.minute()).unwrap_or(u16::MAX)
    }

    fn is_trading_weekday(&self, now: DateTime<Utc>) -> bool {
        let weekday = now.weekday().num_days_from_sunday();
        self.cfg.trading_weekdays.iter().any(|&d| u32::from(d) == weekday)
    }

    fn session_phase(&self, now: DateTime<Utc>) -> SessionPhase {
        if !self.is_trading_weekday(now) {
            return SessionPhase::Closed;
        }
        let minute = Self::minute_of_day(now);
        if minute >= self.cfg.session_open_minute && minute < self.cfg.session_close_minute {
            SessionPhase::Regular
        } else if minute >= self.cfg.premarket_open_minute && minute < self.cfg.session_open_minute {
            SessionPhase::PreMarket
        } else if minute >= self.cfg.session_close_minute && minute < self.cfg.postmarket_close_minute {
            SessionPhase::PostMarket
        } else {
            SessionPhase::Closed
        }
    }

    fn active_maintenance_window(&self, now: DateTime<Utc>, op: OperationKind) -> Option<&MaintenanceWindow> {
        let weekday = now.weekday().num_days_from_sunday();
        let minute = Self::minute_of_day(now);
        self.cfg.maintenance_windows.iter().find(|w| {
            u32::from(w.weekday) == weekday
                && minute >= w.start_minute
                && minute < w.start_minute.saturating_add(w.duration_minutes)
                && w.allowed_ops.as_ref().is_none_or(|allowed| allowed.iter().any(|name| name == op.name()))
        })
    }

    /// Decide whether `op` may run at `now`.
    #[must_use]
    pub fn check(&self, op: OperationKind, now: DateTime<Utc>) -> SchedulerDecision {
        if op.always_allowed() {
            return SchedulerDecision::Allowed;
        }

        let phase = self.session_phase(now);

        if op.trading_hours_sensitive() {
            if phase == SessionPhase::Regular {
                let close_minute = self.cfg.session_close_minute;
                let minutes_left = close_minute.saturating_sub(Self::minute_of_day(now));
                return SchedulerDecision::Denied { suggested_delay: std::time::Duration::from_secs(u64::from(minutes_left) * 60) };
            }
            if self.active_maintenance_window(now, op).is_some() {
                return SchedulerDecision::Allowed;
            }
            if phase == SessionPhase::Closed {
                return SchedulerDecision::Allowed;
            }
            return SchedulerDecision::Denied { suggested_delay: std::time::Duration::from_secs(30 * 60) };
        }

        if matches!(op, OperationKind::Backfill | OperationKind::Reporting) {
            return if phase == SessionPhase::Closed {
                SchedulerDecision::Allowed
            } else {
                SchedulerDecision::Denied { suggested_delay: std::time::Duration::from_secs(30 * 60) }
            };
        }

        if let OperationKind::Other(profile) = op {
            if phase == SessionPhase::Regular && profile.is_heavy() {
                return SchedulerDecision::Denied { suggested_delay: std::time::Duration::from_secs(30 * 60) };
            }
        }

        SchedulerDecision::Allowed
    }

    /// Walk forward up to 7 days looking for a pre-market, post-market, or
    /// non-trading-day gap at least `min_duration` long, starting from `from`.
    #[must_use]
    pub fn find_next_available_slot(&self, min_duration: std::time::Duration, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let min_minutes = u16::try_from(min_duration.as_secs() / 60).unwrap_or(u16::MAX);
        let mut cursor = from;
        let horizon = from + ChronoDuration::days(7);

        while cursor < horizon {
            if !self.is_trading_weekday(cursor) {
                return Some(cursor);
            }
            let minute = Self::minute_of_day(cursor);
            if minute < self.cfg.premarket_open_minute {
                let gap = self.cfg.premarket_open_minute - minute;
                if gap >= min_minutes {
                    return Some(cursor);
                }
            } else if minute < self.cfg.session_open_minute && self.cfg.session_open_minute - minute >= min_minutes {
                return Some(cursor);
            } else if minute >= self.cfg.session_close_minute
                && minute < self.cfg.postmarket_close_minute
                && self.cfg.postmarket_close_minute - minute >= min_minutes
            {
                return Some(cursor);
            } else if minute >= self.cfg.postmarket_close_minute {
                return Some(cursor);
            }
            cursor += ChronoDuration::minutes(1);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scheduler() -> OperationalScheduler {
        OperationalScheduler::new(SchedulerConfig::default())
    }

    fn at(hour: u32, minute: u32, weekday_offset: u32) -> DateTime<Utc> {
        // 2026-03-02 is a Monday.
        Utc.with_ymd_and_hms(2026, 3, 2 + weekday_offset, hour, minute, 0).unwrap()
    }

    #[test]
    fn health_check_is_always_allowed_even_mid_session() {
        let sched = scheduler();
        assert_eq!(sched.check(OperationKind::HealthCheck, at(10, 0, 0)), SchedulerDecision::Allowed);
    }

    #[test]
    fn maintenance_is_denied_with_time_until_close_during_session() {
        let sched = scheduler();
        let decision = sched.check(OperationKind::Maintenance, at(10, 0, 0));
        match decision {
            SchedulerDecision::Denied { suggested_delay } => assert_eq!(suggested_delay, std::time::Duration::from_secs(6 * 3600)),
            SchedulerDecision::Allowed => panic!("expected denial during regular session"),
        }
    }

    #[test]
    fn maintenance_is_allowed_inside_a_registered_window() {
        let mut cfg = SchedulerConfig::default();
        cfg.maintenance_windows.push(MaintenanceWindow {
            name: "sunday-rebuild".to_string(),
            weekday: 0,
            start_minute: 2 * 60,
            duration_minutes: 60,
            allowed_ops: None,
        });
        let sched = OperationalScheduler::new(cfg);
        // 2026-03-01 is a Sunday.
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 2, 30, 0).unwrap();
        assert_eq!(sched.check(OperationKind::IndexRebuild, now), SchedulerDecision::Allowed);
    }

    #[test]
    fn maintenance_window_allow_list_excludes_unlisted_ops() {
        let mut cfg = SchedulerConfig::default();
        // Monday pre-market window, only indexRebuild may run in it.
        cfg.maintenance_windows.push(MaintenanceWindow {
            name: "monday-premarket-rebuild".to_string(),
            weekday: 1,
            start_minute: 4 * 60,
            duration_minutes: 60,
            allowed_ops: Some(vec!["indexRebuild".to_string()]),
        });
        let sched = OperationalScheduler::new(cfg);
        let now = at(4, 30, 0);
        assert_eq!(sched.check(OperationKind::IndexRebuild, now), SchedulerDecision::Allowed);
        assert_eq!(
            sched.check(OperationKind::CacheRefresh, now),
            SchedulerDecision::Denied { suggested_delay: std::time::Duration::from_secs(30 * 60) }
        );
    }

    #[test]
    fn heavy_resource_profile_denied_during_session_with_30min_delay() {
        let sched = scheduler();
        let decision = sched.check(OperationKind::Other(ResourceProfile::Network), at(10, 0, 0));
        assert_eq!(decision, SchedulerDecision::Denied { suggested_delay: std::time::Duration::from_secs(30 * 60) });
    }

    #[test]
    fn backfill_allowed_outside_trading_hours() {
        let sched = scheduler();
        assert_eq!(sched.check(OperationKind::Backfill, at(22, 0, 0)), SchedulerDecision::Allowed);
    }

    #[test]
    fn find_next_available_slot_returns_a_premarket_or_weekend_gap() {
        let sched = scheduler();
        let from = at(10, 0, 0);
        let slot = sched.find_next_available_slot(std::time::Duration::from_secs(3600), from);
        assert!(slot.is_some());
        assert!(slot.unwrap() > from);
    }
}
