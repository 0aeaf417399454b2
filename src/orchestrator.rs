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

//! Component I: sequences A-H behind a single `optimize_job` entry point
//! (spec.md §4.I).

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use tracing::info;

use crate::clock::Clock;
use crate::collaborators::{
    JobDb, JobState, Operations, OptimizerParamStore, Registry, SiteCatalog, StagingCatalog,
    StorageElementCatalog, StorageManagerClient, TaskQueueForwarder,
};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulingError};
use crate::model::Outcome;
use crate::{dispatcher, intersector, requirements, shared_se, site_filter, staging, stage_request, summarizer};

const STAGE_ALLOWED_PROPERTY: &str = "STAGE_ALLOWED";

/// Holds the collaborator handles for one scheduling core. Cheap to clone
/// (everything behind an `Arc`); construct once per host process and call
/// [`Orchestrator::optimize_job`] once per job.
#[derive(Clone)]
pub struct Orchestrator {
    pub config: SchedulerConfig,
    pub job_db: Arc<dyn JobDb>,
    pub operations: Arc<dyn Operations>,
    pub registry: Arc<dyn Registry>,
    pub staging_catalog: Arc<dyn StagingCatalog>,
    pub site_catalog: Arc<dyn SiteCatalog>,
    pub se_catalog: Arc<dyn StorageElementCatalog>,
    pub stager: Arc<dyn StorageManagerClient>,
    pub param_store: Arc<dyn OptimizerParamStore>,
    pub forwarder: Arc<dyn TaskQueueForwarder>,
    pub clock: Arc<dyn Clock>,
}

impl Orchestrator {
    /// Runs the full 20-step sequence of spec.md §4.I for one job.
    pub async fn optimize_job(&self, job: &dyn JobState, rng: &mut impl Rng) -> Result<Outcome> {
        // Step 1: reschedule back-off.
        let attrs = job
            .get_attributes(&["RescheduleCounter", "RescheduleTime"])
            .await?;
        let counter: u32 = attrs
            .get("RescheduleCounter")
            .ok_or(SchedulingError::InvalidRescheduleCounter)?
            .parse()
            .map_err(|_| SchedulingError::InvalidRescheduleCounter)?;
        if counter > 0 {
            let delay = self.config.reschedule_delay(counter);
            if let Some(reschedule_time) = attrs
                .get("RescheduleTime")
                .and_then(|raw| parse_reschedule_time(raw))
            {
                let waited = (self.clock.now() - reschedule_time).num_seconds().max(0) as u64;
                if waited < delay {
                    let message = format!("On Hold: after rescheduling {counter}");
                    info!(%message, "holding job for reschedule back-off");
                    return Ok(Outcome::Hold {
                        message,
                        delay_secs: delay - waited,
                    });
                }
            }
        }

        // Step 2: requirements.
        let manifest = job.get_manifest().await?;
        let (user_sites, user_banned_sites) = requirements::extract(&manifest)?;

        // Step 3: JobType.
        let job_type = job
            .get_attribute("JobType")
            .await
            .map_err(|_| SchedulingError::MissingJobType)?;

        // Step 4: WMS banned sites.
        let wms_banned_sites = self
            .job_db
            .banned_sites()
            .await
            .map_err(|_| SchedulingError::BannedSitesUnavailable)?;

        // Step 5: user-requested sites all banned.
        if !user_sites.is_empty() && !self.config.excluded_on_hold_job_types.contains(&job_type) {
            let active = site_filter::apply(&user_sites, Some(&wms_banned_sites));
            if active.is_empty() {
                let message = if user_sites.len() > 1 {
                    format!("Requested sites {} are inactive", user_sites.join(","))
                } else {
                    format!("Requested site {} is inactive", user_sites[0])
                };
                info!(%message, "holding job: all requested sites inactive or banned");
                return Ok(Outcome::Hold {
                    message,
                    delay_secs: self.config.hold_time_secs,
                });
            }
        }

        // Step 6: no input data.
        let input_data = job
            .get_input_data()
            .await
            .map_err(|_| SchedulingError::InputDataUnavailable)?;
        if input_data.is_empty() {
            return self.send_to_tq(job, &user_sites, &user_banned_sites).await;
        }

        // Step 7: production-job shortcut.
        let data_processing_job_types = self.operations.data_processing_job_types().await?;
        if data_processing_job_types.contains(&job_type) {
            let owner = job.get_attribute("Owner").await?;
            let owner_group = job.get_attribute("OwnerGroup").await?;
            return match self
                .staging_catalog
                .files_to_stage(&input_data, &owner, &owner_group)
                .await
            {
                Err(e) => {
                    let message = e.to_string();
                    info!(%message, "holding job: getFilesToStage failed");
                    Ok(Outcome::Hold {
                        message,
                        delay_secs: self.config.hold_time_secs,
                    })
                }
                Ok(reply) if reply.offline_lfns.is_empty() => {
                    self.send_to_tq(job, &user_sites, &user_banned_sites).await
                }
                Ok(reply) => {
                    if !self.check_stage_allowed(job).await? {
                        return Err(SchedulingError::StageNotAllowed);
                    }
                    dispatcher::dispatch_offline(job, &*self.stager, &self.config, reply.offline_lfns)
                        .await?;
                    Ok(Outcome::Staged)
                }
            };
        }

        // Step 8: user job with input data; load the optimizer record.
        let mut opdata = self
            .param_store
            .retrieve(&self.config.input_data_agent)
            .await
            .map_err(|_| SchedulingError::OptimizerParamUnavailable)?
            .ok_or(SchedulingError::NoSiteCandidates)?;

        // Step 9: intersect. A present-but-empty `SiteCandidates` map falls
        // through to the intersection and fails here, not at step 8 (spec.md
        // §9 "missing vs. empty SiteCandidates").
        let id_sites = intersector::intersect(&opdata.site_candidates, &user_sites, &user_banned_sites);
        if id_sites.is_empty() {
            return Err(SchedulingError::ImpossibleInputDataSiteRequirement);
        }

        // Step 10: drop incomplete-input sites.
        let id_sites: std::collections::BTreeMap<_, _> = id_sites
            .into_iter()
            .filter(|(_, record)| record.has_all_input(input_data.len()))
            .collect();
        if id_sites.is_empty() {
            return Err(SchedulingError::IncompleteSiteCandidates);
        }

        // Step 11: staging resolver.
        let (stage_required, candidate_sites) = staging::resolve(input_data.len(), &id_sites, rng);
        if candidate_sites.is_empty() {
            return Err(SchedulingError::NoDestinationSites);
        }

        // Step 12: filter against WMS-banned sites.
        let stage_sites = site_filter::apply(&candidate_sites, Some(&wms_banned_sites));
        if stage_sites.is_empty() {
            let message = format!("Sites {} are inactive or banned", candidate_sites.join(", "));
            info!(%message, "holding job: no active stage-candidate sites");
            return Ok(Outcome::Hold {
                message,
                delay_secs: self.config.hold_time_secs,
            });
        }

        // Step 13: no staging needed, forward with the pre-filter candidates.
        if !stage_required {
            return self.send_to_tq(job, &candidate_sites, &user_banned_sites).await;
        }

        // Step 14: restricted staging gate.
        if self.config.restrict_data_stage && !self.check_stage_allowed(job).await? {
            return Err(SchedulingError::StageNotAllowed);
        }

        // Step 15: pick the stage site, mark it as staged-as-if-done.
        let stage_site = stage_sites[0].clone();
        if let Some(record) = opdata.site_candidates.get_mut(&stage_site) {
            record.disk += record.tape;
            record.tape = 0;
        }

        // Step 16: build the stage request.
        let vo = manifest.get_scalar("VirtualOrganization").unwrap_or_default();
        let stage_lfns = stage_request::build(&stage_site, &opdata, &vo, &*self.site_catalog, &*self.se_catalog)
            .await?;

        // Step 17: dispatch.
        let stage_lfns =
            dispatcher::dispatch(job, &*self.stager, &self.config, stage_lfns).await?;

        // Step 18: propagate to shared SEs at sibling sites.
        shared_se::update(
            &stage_site,
            &stage_lfns,
            &mut opdata,
            &*self.site_catalog,
            &*self.se_catalog,
            &vo,
        )
        .await;

        // Step 19: persist.
        self.param_store
            .store(&self.config.input_data_agent, &opdata)
            .await
            .map_err(|_| SchedulingError::OptimizerParamUnavailable)?;

        // Step 20: assign site.
        let site_attr = summarizer::summarize(&stage_sites, &*self.site_catalog).await;
        job.set_attribute("Site", &site_attr).await?;

        Ok(Outcome::Staged)
    }

    /// `__sendToTQ`: writes `JobRequirements`, assigns `Site`, and forwards to
    /// the task queue.
    async fn send_to_tq(&self, job: &dyn JobState, sites: &[String], banned_sites: &[String]) -> Result<Outcome> {
        let mut manifest = job.get_manifest().await?;
        requirements::write_job_requirements(&mut manifest, sites, banned_sites);
        job.set_manifest(manifest).await?;

        let site_attr = summarizer::summarize(sites, &*self.site_catalog).await;
        job.set_attribute("Site", &site_attr).await?;

        self.forwarder.set_next_optimizer(job.job_id()).await?;
        Ok(Outcome::Forward)
    }

    /// `__checkStageAllowed`: whether the job owner's group carries
    /// `STAGE_ALLOWED`.
    async fn check_stage_allowed(&self, job: &dyn JobState) -> Result<bool> {
        let group = job.get_attribute("OwnerGroup").await?;
        let properties = self.registry.properties_for_group(&group).await?;
        Ok(properties.contains(STAGE_ALLOWED_PROPERTY))
    }
}

/// Parses a `RescheduleTime` attribute value in the source system's
/// `"%Y-%m-%d %H:%M:%S"` format. A missing or unparsable value is treated as
/// "no prior reschedule time recorded": the back-off check is skipped rather
/// than failing the job, since spec.md's error table has no failure mode for
/// this case.
fn parse_reschedule_time(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Manifest, OptimizerRecord};
    use crate::testing::{
        replica_locations, site_candidates, FakeClock, FakeJobDb, FakeOperations,
        FakeOptimizerParamStore, FakeRegistry, FakeSiteCatalog, FakeStagingCatalog,
        FakeStorageElementCatalog, InMemoryJobState, RecordingForwarder, RecordingStager,
    };
    use assert_matches::assert_matches;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{HashMap, HashSet};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn base_orchestrator() -> Orchestrator {
        Orchestrator {
            config: SchedulerConfig::default(),
            job_db: Arc::new(FakeJobDb::default()),
            operations: Arc::new(FakeOperations::default()),
            registry: Arc::new(FakeRegistry::default()),
            staging_catalog: Arc::new(FakeStagingCatalog::default()),
            site_catalog: Arc::new(FakeSiteCatalog::default()),
            se_catalog: Arc::new(FakeStorageElementCatalog::default()),
            stager: Arc::new(RecordingStager::succeeding("rid")),
            param_store: Arc::new(FakeOptimizerParamStore::empty()),
            forwarder: Arc::new(RecordingForwarder::default()),
            clock: Arc::new(FakeClock(Utc::now())),
        }
    }

    fn job_with(job_type: &str, sites: &[&str], input_data: Vec<String>) -> InMemoryJobState {
        let mut manifest = Manifest::default();
        if !sites.is_empty() {
            manifest.set_list_option("Site", sites.iter().map(|s| s.to_string()).collect());
        }
        InMemoryJobState::new(1)
            .with_attribute("RescheduleCounter", "0")
            .with_attribute("JobType", job_type)
            .with_attribute("Owner", "alice")
            .with_attribute("OwnerGroup", "alice_group")
            .with_manifest(manifest)
            .with_input_data(input_data)
    }

    // S1 - no input data, two requested sites, one WMS-banned: forward with
    // the pre-filter user sites.
    #[tokio::test]
    async fn s1_no_input_data_forwards_with_unfiltered_sites() {
        let mut orch = base_orchestrator();
        orch.job_db = Arc::new(FakeJobDb {
            banned: vec!["DESY".to_owned()],
        });
        let job = job_with("User", &["CERN", "DESY"], vec![]);

        let outcome = orch.optimize_job(&job, &mut rng()).await.unwrap();
        assert_eq!(outcome, Outcome::Forward);

        let manifest = job.manifest_snapshot();
        let section = manifest.get_section("JobRequirements").unwrap();
        assert_eq!(section.get_option("Sites"), Some("CERN, DESY"));
    }

    // S2 - all requested sites banned: hold.
    #[tokio::test]
    async fn s2_all_requested_sites_banned_holds() {
        let mut orch = base_orchestrator();
        orch.job_db = Arc::new(FakeJobDb {
            banned: vec!["A".to_owned()],
        });
        let job = job_with("User", &["A"], vec!["L".to_owned()]);

        let outcome = orch.optimize_job(&job, &mut rng()).await.unwrap();
        match outcome {
            Outcome::Hold { message, delay_secs } => {
                assert_eq!(message, "Requested site A is inactive");
                assert_eq!(delay_secs, orch.config.hold_time_secs);
            }
            other => panic!("expected Hold, got {other:?}"),
        }
    }

    // S3 - user job, disk replicas already complete at more than one site:
    // forward without staging.
    #[tokio::test]
    async fn s3_disk_complete_sites_forward_without_staging() {
        let orch_base = base_orchestrator();
        let record = OptimizerRecord {
            site_candidates: site_candidates(&[("X", 2, 0), ("Y", 1, 1)]),
            replica_locations: replica_locations(&[]),
        };
        let orch = Orchestrator {
            param_store: Arc::new(FakeOptimizerParamStore::with_record(record)),
            ..orch_base
        };
        let job = job_with("User", &["X", "Y"], vec!["L1".to_owned(), "L2".to_owned()]);

        let outcome = orch.optimize_job(&job, &mut rng()).await.unwrap();
        assert_eq!(outcome, Outcome::Forward);
        assert_eq!(job.get_attribute_value("Site"), Some("X".to_owned()));
    }

    // S4 - staging required, single tape SE: status transitions, parameter,
    // persisted record with disk/tape flipped at the stage site.
    #[tokio::test]
    async fn s4_staging_required_dispatches_and_persists() {
        let orch_base = base_orchestrator();
        let record = OptimizerRecord {
            site_candidates: site_candidates(&[("X", 0, 1)]),
            replica_locations: replica_locations(&[("L", &["SE1"])]),
        };
        let param_store = Arc::new(FakeOptimizerParamStore::with_record(record));
        let orch = Orchestrator {
            param_store: param_store.clone(),
            site_catalog: Arc::new(FakeSiteCatalog {
                ses_by_site: HashMap::from([("X".to_owned(), vec!["SE1".to_owned()])]),
                tier_by_site: HashMap::new(),
            }),
            se_catalog: Arc::new(FakeStorageElementCatalog {
                statuses: HashMap::from([(
                    "SE1".to_owned(),
                    crate::model::StorageEndpointStatus {
                        read: true,
                        write: true,
                        disk_se: false,
                        tape_se: true,
                    },
                )]),
            }),
            ..orch_base
        };
        let job = job_with("User", &["X"], vec!["L".to_owned()]);

        let outcome = orch.optimize_job(&job, &mut rng()).await.unwrap();
        assert_eq!(outcome, Outcome::Staged);

        let statuses = job.status_history();
        assert_eq!(statuses[0].1, "Request To Be Sent");
        assert_eq!(statuses[1].1, "Request Sent");
        assert_eq!(job.get_parameter("StageRequest"), Some("rid".to_owned()));

        let persisted = param_store.stored.lock().unwrap().last().unwrap().clone();
        let x = persisted.site_candidates["X"];
        assert_eq!((x.disk, x.tape), (1, 0));
    }

    #[tokio::test]
    async fn reschedule_back_off_holds_until_delay_elapses() {
        let now = Utc::now();
        let mut orch = base_orchestrator();
        orch.clock = Arc::new(FakeClock(now));
        let job = job_with("User", &[], vec![])
            .with_attribute("RescheduleCounter", "1")
            .with_attribute("RescheduleTime", &now.format("%Y-%m-%d %H:%M:%S").to_string());

        let outcome = orch.optimize_job(&job, &mut rng()).await.unwrap();
        match outcome {
            Outcome::Hold { message, delay_secs } => {
                assert_eq!(message, "On Hold: after rescheduling 1");
                assert_eq!(delay_secs, orch.config.reschedule_delay(1));
            }
            other => panic!("expected Hold, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reschedule_back_off_proceeds_once_delay_has_elapsed() {
        let now = Utc::now();
        let past = now - chrono::Duration::seconds(10_000);
        let mut orch = base_orchestrator();
        orch.clock = Arc::new(FakeClock(now));
        let job = job_with("User", &[], vec![])
            .with_attribute("RescheduleCounter", "1")
            .with_attribute("RescheduleTime", &past.format("%Y-%m-%d %H:%M:%S").to_string());

        let outcome = orch.optimize_job(&job, &mut rng()).await.unwrap();
        assert_eq!(outcome, Outcome::Forward);
    }

    #[tokio::test]
    async fn non_integer_reschedule_counter_fails() {
        let orch = base_orchestrator();
        let job = job_with("User", &[], vec![]).with_attribute("RescheduleCounter", "not-a-number");

        let err = orch.optimize_job(&job, &mut rng()).await.unwrap_err();
        assert_matches!(err, SchedulingError::InvalidRescheduleCounter);
    }

    #[tokio::test]
    async fn missing_job_type_fails() {
        let orch = base_orchestrator();
        let job = InMemoryJobState::new(1).with_attribute("RescheduleCounter", "0");

        let err = orch.optimize_job(&job, &mut rng()).await.unwrap_err();
        assert_matches!(err, SchedulingError::MissingJobType);
    }

    #[tokio::test]
    async fn production_job_with_offline_lfns_stages_via_flat_list() {
        let mut orch = base_orchestrator();
        orch.operations = Arc::new(FakeOperations {
            data_processing_job_types: vec!["MCSimulation".to_owned()],
        });
        orch.staging_catalog = Arc::new(FakeStagingCatalog {
            offline_lfns: vec!["L1".to_owned(), "L2".to_owned()],
        });
        orch.registry = Arc::new(FakeRegistry {
            properties_by_group: HashMap::from([(
                "alice_group".to_owned(),
                HashSet::from(["STAGE_ALLOWED".to_owned()]),
            )]),
        });
        let stager = Arc::new(RecordingStager::succeeding("rid-prod"));
        orch.stager = stager.clone();
        let job = job_with("MCSimulation", &[], vec!["L1".to_owned(), "L2".to_owned()]);

        let outcome = orch.optimize_job(&job, &mut rng()).await.unwrap();
        assert_eq!(outcome, Outcome::Staged);
        assert_eq!(
            *stager.sent_offline.lock().unwrap(),
            vec![vec!["L1".to_owned(), "L2".to_owned()]]
        );
    }

    #[tokio::test]
    async fn production_job_stage_not_allowed_fails() {
        let mut orch = base_orchestrator();
        orch.operations = Arc::new(FakeOperations {
            data_processing_job_types: vec!["MCSimulation".to_owned()],
        });
        orch.staging_catalog = Arc::new(FakeStagingCatalog {
            offline_lfns: vec!["L1".to_owned()],
        });
        let job = job_with("MCSimulation", &[], vec!["L1".to_owned()]);

        let err = orch.optimize_job(&job, &mut rng()).await.unwrap_err();
        assert_matches!(err, SchedulingError::StageNotAllowed);
    }

    #[tokio::test]
    async fn production_job_with_no_offline_lfns_forwards() {
        let mut orch = base_orchestrator();
        orch.operations = Arc::new(FakeOperations {
            data_processing_job_types: vec!["MCSimulation".to_owned()],
        });
        let job = job_with("MCSimulation", &[], vec!["L1".to_owned()]);

        let outcome = orch.optimize_job(&job, &mut rng()).await.unwrap();
        assert_eq!(outcome, Outcome::Forward);
    }

    #[tokio::test]
    async fn no_site_candidates_record_fails() {
        let orch = base_orchestrator();
        let job = job_with("User", &[], vec!["L".to_owned()]);

        let err = orch.optimize_job(&job, &mut rng()).await.unwrap_err();
        assert_matches!(err, SchedulingError::NoSiteCandidates);
    }

    #[tokio::test]
    async fn impossible_input_data_site_requirement_fails() {
        let orch_base = base_orchestrator();
        let record = OptimizerRecord {
            site_candidates: site_candidates(&[("Y", 1, 0)]),
            replica_locations: replica_locations(&[]),
        };
        let orch = Orchestrator {
            param_store: Arc::new(FakeOptimizerParamStore::with_record(record)),
            ..orch_base
        };
        let job = job_with("User", &["X"], vec!["L".to_owned()]);

        let err = orch.optimize_job(&job, &mut rng()).await.unwrap_err();
        assert_matches!(err, SchedulingError::ImpossibleInputDataSiteRequirement);
    }

    #[tokio::test]
    async fn incomplete_site_candidates_fails() {
        let orch_base = base_orchestrator();
        let record = OptimizerRecord {
            site_candidates: site_candidates(&[("X", 1, 0)]),
            replica_locations: replica_locations(&[]),
        };
        let orch = Orchestrator {
            param_store: Arc::new(FakeOptimizerParamStore::with_record(record)),
            ..orch_base
        };
        let job = job_with("User", &["X"], vec!["L1".to_owned(), "L2".to_owned()]);

        let err = orch.optimize_job(&job, &mut rng()).await.unwrap_err();
        assert_matches!(err, SchedulingError::IncompleteSiteCandidates);
    }

    #[tokio::test]
    async fn stage_candidates_all_banned_holds() {
        let orch_base = base_orchestrator();
        let record = OptimizerRecord {
            site_candidates: site_candidates(&[("X", 0, 1)]),
            replica_locations: replica_locations(&[("L", &["SE1"])]),
        };
        let orch = Orchestrator {
            param_store: Arc::new(FakeOptimizerParamStore::with_record(record)),
            job_db: Arc::new(FakeJobDb {
                banned: vec!["X".to_owned()],
            }),
            ..orch_base
        };
        // No explicit user site constraint, so step 5 ("requested sites
        // banned") does not fire; only the later stage-candidate filter
        // (step 12) sees the ban.
        let job = job_with("User", &[], vec!["L".to_owned()]);

        let outcome = orch.optimize_job(&job, &mut rng()).await.unwrap();
        match outcome {
            Outcome::Hold { message, .. } => {
                assert_eq!(message, "Sites X are inactive or banned");
            }
            other => panic!("expected Hold, got {other:?}"),
        }
    }
}
