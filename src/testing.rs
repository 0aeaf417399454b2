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

//! In-memory fakes for every collaborator trait in [`crate::collaborators`],
//! shared by this crate's unit tests and the `tests/scenarios.rs`
//! integration tests. Not meant to model any real host; just enough state
//! to observe what the orchestrator did.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::collaborators::{
    JobDb, JobState, Operations, Registry, SiteCatalog, StagingCatalog, StorageElementCatalog,
    StorageManagerClient, TaskQueueForwarder,
};
use crate::error::{Result, SchedulingError};
use crate::model::{FilesToStageReply, Manifest, StageRequest, StorageEndpointStatus};

/// A `Clock` fixed at construction, for deterministic reschedule-backoff
/// tests.
pub struct FakeClock(pub DateTime<Utc>);

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// An in-memory `JobState`: attributes, manifest and input data are seeded
/// up front; status/parameter/attribute writes are recorded for assertions.
pub struct InMemoryJobState {
    job_id: u64,
    attributes: Mutex<HashMap<String, String>>,
    manifest: Mutex<Manifest>,
    input_data: Mutex<Vec<String>>,
    status_history: Mutex<Vec<(String, String)>>,
}

impl InMemoryJobState {
    pub fn new(job_id: u64) -> Self {
        Self {
            job_id,
            attributes: Mutex::new(HashMap::new()),
            manifest: Mutex::new(Manifest::default()),
            input_data: Mutex::new(Vec::new()),
            status_history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_attribute(self, key: &str, value: &str) -> Self {
        self.attributes
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_manifest(self, manifest: Manifest) -> Self {
        *self.manifest.lock().unwrap() = manifest;
        self
    }

    pub fn with_input_data(self, lfns: Vec<String>) -> Self {
        *self.input_data.lock().unwrap() = lfns;
        self
    }

    pub fn status_history(&self) -> Vec<(String, String)> {
        self.status_history.lock().unwrap().clone()
    }

    pub fn get_parameter(&self, key: &str) -> Option<String> {
        self.attributes.lock().unwrap().get(key).cloned()
    }

    pub fn get_attribute_value(&self, key: &str) -> Option<String> {
        self.attributes.lock().unwrap().get(key).cloned()
    }

    pub fn manifest_snapshot(&self) -> Manifest {
        self.manifest.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobState for InMemoryJobState {
    fn job_id(&self) -> u64 {
        self.job_id
    }

    async fn get_attributes(&self, keys: &[&str]) -> Result<HashMap<String, String>> {
        let attrs = self.attributes.lock().unwrap();
        Ok(keys
            .iter()
            .filter_map(|k| attrs.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn get_attribute(&self, key: &str) -> Result<String> {
        self.attributes
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| SchedulingError::Collaborator(format!("no such attribute {key}")))
    }

    async fn set_attribute(&self, key: &str, value: &str) -> Result<()> {
        self.attributes
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn set_status(&self, major: &str, minor: &str, _app_status: &str, _source: &str) -> Result<()> {
        self.status_history
            .lock()
            .unwrap()
            .push((major.to_owned(), minor.to_owned()));
        Ok(())
    }

    async fn set_app_status(&self, message: &str, _source: &str) -> Result<()> {
        self.attributes
            .lock()
            .unwrap()
            .insert("ApplicationStatus".to_owned(), message.to_owned());
        Ok(())
    }

    async fn set_parameter(&self, key: &str, value: &str) -> Result<()> {
        self.attributes
            .lock()
            .unwrap()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn get_manifest(&self) -> Result<Manifest> {
        Ok(self.manifest.lock().unwrap().clone())
    }

    async fn set_manifest(&self, manifest: Manifest) -> Result<()> {
        *self.manifest.lock().unwrap() = manifest;
        Ok(())
    }

    async fn get_input_data(&self) -> Result<Vec<String>> {
        Ok(self.input_data.lock().unwrap().clone())
    }
}

/// `JobDB.getSiteMask('Banned')` fake.
#[derive(Default)]
pub struct FakeJobDb {
    pub banned: Vec<String>,
}

#[async_trait]
impl JobDb for FakeJobDb {
    async fn banned_sites(&self) -> Result<Vec<String>> {
        Ok(self.banned.clone())
    }
}

/// `Operations().getValue('Transformations/DataProcessing', [])` fake.
#[derive(Default)]
pub struct FakeOperations {
    pub data_processing_job_types: Vec<String>,
}

#[async_trait]
impl Operations for FakeOperations {
    async fn data_processing_job_types(&self) -> Result<Vec<String>> {
        Ok(self.data_processing_job_types.clone())
    }
}

/// `Registry.getPropertiesForGroup` fake.
#[derive(Default)]
pub struct FakeRegistry {
    pub properties_by_group: HashMap<String, HashSet<String>>,
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn properties_for_group(&self, group: &str) -> Result<HashSet<String>> {
        Ok(self.properties_by_group.get(group).cloned().unwrap_or_default())
    }
}

/// `getFilesToStage` fake.
#[derive(Default)]
pub struct FakeStagingCatalog {
    pub offline_lfns: Vec<String>,
}

#[async_trait]
impl StagingCatalog for FakeStagingCatalog {
    async fn files_to_stage(
        &self,
        _input_data: &[String],
        _proxy_user_name: &str,
        _proxy_user_group: &str,
    ) -> Result<FilesToStageReply> {
        Ok(FilesToStageReply {
            offline_lfns: self.offline_lfns.clone(),
        })
    }
}

/// `getSEsForSite`/`getSiteTier` fake.
#[derive(Default)]
pub struct FakeSiteCatalog {
    pub ses_by_site: HashMap<String, Vec<String>>,
    pub tier_by_site: HashMap<String, u32>,
}

#[async_trait]
impl SiteCatalog for FakeSiteCatalog {
    async fn ses_for_site(&self, site: &str) -> Result<Vec<String>> {
        Ok(self.ses_by_site.get(site).cloned().unwrap_or_default())
    }

    async fn site_tier(&self, site: &str) -> Result<u32> {
        self.tier_by_site
            .get(site)
            .copied()
            .ok_or_else(|| SchedulingError::Collaborator(format!("unknown tier for {site}")))
    }
}

/// `StorageElement(name, vo).getStatus()` fake.
#[derive(Default)]
pub struct FakeStorageElementCatalog {
    pub statuses: HashMap<String, StorageEndpointStatus>,
}

#[async_trait]
impl StorageElementCatalog for FakeStorageElementCatalog {
    async fn status(&self, se_name: &str, _vo: &str) -> Result<StorageEndpointStatus> {
        self.statuses
            .get(se_name)
            .copied()
            .ok_or_else(|| SchedulingError::Collaborator(format!("unknown SE {se_name}")))
    }
}

/// `StorageManagerClient.setRequest` fake, either always succeeding with a
/// fixed request id or always failing.
pub struct RecordingStager {
    request_id: Option<String>,
    pub sent: Mutex<Vec<StageRequest>>,
    pub sent_offline: Mutex<Vec<Vec<String>>>,
}

impl RecordingStager {
    pub fn succeeding(request_id: &str) -> Self {
        Self {
            request_id: Some(request_id.to_owned()),
            sent: Mutex::new(Vec::new()),
            sent_offline: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            request_id: None,
            sent: Mutex::new(Vec::new()),
            sent_offline: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StorageManagerClient for RecordingStager {
    async fn set_request(
        &self,
        stage_lfns: &StageRequest,
        _system: &str,
        _callback: &str,
        _job_id: u64,
    ) -> Result<String> {
        self.sent.lock().unwrap().push(stage_lfns.clone());
        self.request_id
            .clone()
            .ok_or_else(|| SchedulingError::Collaborator("stager unavailable".to_owned()))
    }

    async fn stage_offline_lfns(
        &self,
        lfns: &[String],
        _system: &str,
        _callback: &str,
        _job_id: u64,
    ) -> Result<String> {
        self.sent_offline.lock().unwrap().push(lfns.to_vec());
        self.request_id
            .clone()
            .ok_or_else(|| SchedulingError::Collaborator("stager unavailable".to_owned()))
    }
}

/// `setNextOptimizer` fake; records which job ids were forwarded.
#[derive(Default)]
pub struct RecordingForwarder {
    pub forwarded: Mutex<Vec<u64>>,
}

#[async_trait]
impl TaskQueueForwarder for RecordingForwarder {
    async fn set_next_optimizer(&self, job_id: u64) -> Result<()> {
        self.forwarded.lock().unwrap().push(job_id);
        Ok(())
    }
}

/// `retrieveOptimizerParam`/`storeOptimizerParam` fake, scoped to a single
/// `InputData` record.
pub struct FakeOptimizerParamStore {
    record: Mutex<Option<crate::model::OptimizerRecord>>,
    pub stored: Mutex<Vec<crate::model::OptimizerRecord>>,
}

impl FakeOptimizerParamStore {
    pub fn with_record(record: crate::model::OptimizerRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
            stored: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self {
            record: Mutex::new(None),
            stored: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl crate::collaborators::OptimizerParamStore for FakeOptimizerParamStore {
    async fn retrieve(&self, _name: &str) -> Result<Option<crate::model::OptimizerRecord>> {
        Ok(self.record.lock().unwrap().clone())
    }

    async fn store(&self, _name: &str, record: &crate::model::OptimizerRecord) -> Result<()> {
        *self.record.lock().unwrap() = Some(record.clone());
        self.stored.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Convenience builder for an `OptimizerRecord`'s `SiteCandidates` map.
pub fn site_candidates(
    entries: &[(&str, u32, u32)],
) -> BTreeMap<crate::model::Site, crate::model::SiteReplicaRecord> {
    entries
        .iter()
        .map(|(site, disk, tape)| {
            (
                site.to_string(),
                crate::model::SiteReplicaRecord::new(*disk, *tape),
            )
        })
        .collect()
}

/// Convenience builder for `OptimizerRecord.replica_locations` from
/// `(lfn, [se, ...])` pairs.
pub fn replica_locations(
    entries: &[(&str, &[&str])],
) -> BTreeMap<crate::model::Lfn, std::collections::BTreeSet<crate::model::SeName>> {
    entries
        .iter()
        .map(|(lfn, ses)| {
            (
                lfn.to_string(),
                ses.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}
