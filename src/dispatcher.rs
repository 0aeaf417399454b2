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

//! Component F: sends the stage request, updates job status, records the
//! request id (spec.md §4.F).

use thiserror_ext::AsReport;
use tracing::{error, info};

use crate::collaborators::{JobState, StorageManagerClient};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulingError};
use crate::model::StageRequest;

const CALLBACK: &str = "updateJobFromStager@WorkloadManagement/JobStateUpdate";
const SYSTEM: &str = "WorkloadManagement";

/// Dispatches `stage_lfns`, transitioning status
/// `(StagingStatus, "Request To Be Sent")` -> `(StagingStatus, "Request
/// Sent")` around the `StorageManagerClient` call, and stores the returned
/// request id as the `StageRequest` job parameter in between (spec.md §5
/// ordering constraint).
pub async fn dispatch(
    job: &dyn JobState,
    stager: &dyn StorageManagerClient,
    config: &SchedulerConfig,
    stage_lfns: StageRequest,
) -> Result<StageRequest> {
    job.set_status(&config.staging_status, &config.staging_minor_status_pending, "", "JobScheduling")
        .await?;

    let job_id = job.job_id();
    let rid = stager
        .set_request(&stage_lfns, SYSTEM, CALLBACK, job_id)
        .await
        .map_err(|e| {
            error!(error = %e.as_report(), "could not send stage request");
            SchedulingError::StageRequestFailed
        })?;

    info!(request_id = %rid, "stage request sent");
    job.set_parameter("StageRequest", &rid).await?;

    job.set_status(&config.staging_status, &config.staging_minor_status_sent, "", "JobScheduling")
        .await?;

    Ok(stage_lfns)
}

/// Same status-transition/parameter-write wrapping as [`dispatch`], for the
/// production-job shortcut's flat-LFN-list call shape (spec.md §4.I step 7).
pub async fn dispatch_offline(
    job: &dyn JobState,
    stager: &dyn StorageManagerClient,
    config: &SchedulerConfig,
    lfns: Vec<String>,
) -> Result<Vec<String>> {
    job.set_status(&config.staging_status, &config.staging_minor_status_pending, "", "JobScheduling")
        .await?;

    let job_id = job.job_id();
    let rid = stager
        .stage_offline_lfns(&lfns, SYSTEM, CALLBACK, job_id)
        .await
        .map_err(|e| {
            error!(error = %e.as_report(), "could not send offline stage request");
            SchedulingError::StageRequestFailed
        })?;

    info!(request_id = %rid, "offline stage request sent");
    job.set_parameter("StageRequest", &rid).await?;

    job.set_status(&config.staging_status, &config.staging_minor_status_sent, "", "JobScheduling")
        .await?;

    Ok(lfns)
}
