// Copyright 2024
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::Deserialize;

/// Observable configuration of the scheduling optimizer (spec.md §6,
/// "Configuration"). Passed into the [`crate::orchestrator::Orchestrator`] as
/// a frozen struct rather than looked up piecemeal from a global config
/// service, per spec.md §9.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Back-off delays, in seconds, indexed by `min(RescheduleCounter,
    /// len-1)`.
    pub reschedule_delays: Vec<u64>,
    /// Job types exempt from the "all requested sites banned" hold.
    pub excluded_on_hold_job_types: Vec<String>,
    /// Default hold duration, in seconds, used when no explicit delay
    /// applies (e.g. the "sites are inactive or banned" hold).
    pub hold_time_secs: u64,
    pub staging_status: String,
    pub staging_minor_status_pending: String,
    pub staging_minor_status_sent: String,
    pub input_data_agent: String,
    pub restrict_data_stage: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reschedule_delays: vec![60, 180, 300, 600],
            excluded_on_hold_job_types: Vec::new(),
            hold_time_secs: 300,
            staging_status: "Staging".to_owned(),
            staging_minor_status_pending: "Request To Be Sent".to_owned(),
            staging_minor_status_sent: "Request Sent".to_owned(),
            input_data_agent: "InputData".to_owned(),
            restrict_data_stage: false,
        }
    }
}

impl SchedulerConfig {
    /// The delay applied for a given `RescheduleCounter`, per spec.md §4.I
    /// step 1: `delays[min(counter, len-1)]`.
    pub fn reschedule_delay(&self, counter: u32) -> u64 {
        let idx = (counter as usize).min(self.reschedule_delays.len().saturating_sub(1));
        self.reschedule_delays
            .get(idx)
            .copied()
            .unwrap_or(self.hold_time_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_defaults() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.reschedule_delays, vec![60, 180, 300, 600]);
        assert_eq!(cfg.hold_time_secs, 300);
        assert_eq!(cfg.staging_status, "Staging");
        assert!(!cfg.restrict_data_stage);
    }

    #[test]
    fn reschedule_delay_clamps_to_last_entry() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.reschedule_delay(0), 60);
        assert_eq!(cfg.reschedule_delay(2), 300);
        assert_eq!(cfg.reschedule_delay(10), 600);
    }

    #[test]
    fn reschedule_delay_falls_back_when_table_overridden_empty() {
        let cfg = SchedulerConfig {
            reschedule_delays: vec![],
            ..SchedulerConfig::default()
        };
        assert_eq!(cfg.reschedule_delay(3), cfg.hold_time_secs);
    }
}
