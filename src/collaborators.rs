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

//! External collaborator contracts (spec.md §6). The core treats the
//! surrounding optimizer-executor framework, job database, storage manager
//! and configuration service as black boxes reached only through these
//! traits, so the scheduling algorithm itself stays host-agnostic and
//! testable with in-memory fakes.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{FilesToStageReply, Manifest, OptimizerRecord, StageRequest, StorageEndpointStatus};

/// A job's mutable, persisted state: attributes, manifest, input data and
/// the status/parameter writes the optimizer makes.
#[async_trait]
pub trait JobState: Send + Sync {
    fn job_id(&self) -> u64;
    async fn get_attributes(&self, keys: &[&str]) -> Result<HashMap<String, String>>;
    async fn get_attribute(&self, key: &str) -> Result<String>;
    async fn set_attribute(&self, key: &str, value: &str) -> Result<()>;
    async fn set_status(&self, major: &str, minor: &str, app_status: &str, source: &str) -> Result<()>;
    async fn set_app_status(&self, message: &str, source: &str) -> Result<()>;
    async fn set_parameter(&self, key: &str, value: &str) -> Result<()>;
    async fn get_manifest(&self) -> Result<Manifest>;
    /// Persists a manifest mutated by the optimizer. The source system
    /// mutates a shared manifest object in place; this crate returns
    /// `Manifest` by value from `get_manifest`, so callers must write it
    /// back explicitly (spec.md §9).
    async fn set_manifest(&self, manifest: Manifest) -> Result<()>;
    async fn get_input_data(&self) -> Result<Vec<String>>;
}

/// `JobDB.getSiteMask('Banned')`.
#[async_trait]
pub trait JobDb: Send + Sync {
    async fn banned_sites(&self) -> Result<Vec<String>>;
}

/// `Operations().getValue('Transformations/DataProcessing', default)`.
#[async_trait]
pub trait Operations: Send + Sync {
    async fn data_processing_job_types(&self) -> Result<Vec<String>>;
}

/// `Registry.getPropertiesForGroup(group)`.
#[async_trait]
pub trait Registry: Send + Sync {
    async fn properties_for_group(&self, group: &str) -> Result<HashSet<String>>;
}

/// `getFilesToStage(inputData, proxyUserName, proxyUserGroup)`.
#[async_trait]
pub trait StagingCatalog: Send + Sync {
    async fn files_to_stage(
        &self,
        input_data: &[String],
        proxy_user_name: &str,
        proxy_user_group: &str,
    ) -> Result<FilesToStageReply>;
}

/// `getSEsForSite(site)` and `getSiteTier(site)` — both come from the same
/// site-topology service in the source system.
#[async_trait]
pub trait SiteCatalog: Send + Sync {
    async fn ses_for_site(&self, site: &str) -> Result<Vec<String>>;
    async fn site_tier(&self, site: &str) -> Result<u32>;
}

/// `StorageElement(seName, vo).getStatus()`.
#[async_trait]
pub trait StorageElementCatalog: Send + Sync {
    async fn status(&self, se_name: &str, vo: &str) -> Result<StorageEndpointStatus>;
}

/// `StorageManagerClient.setRequest(...)`. The production-job shortcut
/// (spec.md §4.I step 7) calls this with a flat LFN list rather than the
/// SE-keyed map the main path (§4.F) builds — the source passes either shape
/// to the same Python call untyped; `stage_offline_lfns` keeps that second
/// shape honest at the Rust boundary instead of forcing it into a
/// `StageRequest` under a made-up SE key.
#[async_trait]
pub trait StorageManagerClient: Send + Sync {
    async fn set_request(
        &self,
        stage_lfns: &StageRequest,
        system: &str,
        callback: &str,
        job_id: u64,
    ) -> Result<String>;

    async fn stage_offline_lfns(
        &self,
        lfns: &[String],
        system: &str,
        callback: &str,
        job_id: u64,
    ) -> Result<String>;
}

/// `retrieveOptimizerParam`/`storeOptimizerParam` scoped to the `InputData`
/// optimizer record this core reads and rewrites.
#[async_trait]
pub trait OptimizerParamStore: Send + Sync {
    async fn retrieve(&self, name: &str) -> Result<Option<OptimizerRecord>>;
    async fn store(&self, name: &str, record: &OptimizerRecord) -> Result<()>;
}

/// `setNextOptimizer(jobState)` — the task-queue hand-off.
#[async_trait]
pub trait TaskQueueForwarder: Send + Sync {
    async fn set_next_optimizer(&self, job_id: u64) -> Result<()>;
}
