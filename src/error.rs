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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulingError>;

/// Failure outcome of a scheduling decision. Every variant here is a "Fail"
/// per the Forward/Hold/Fail outcome space: the job is marked failed with
/// this message, never retried by this optimizer.
#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("RescheduleCounter has to be an integer")]
    InvalidRescheduleCounter,

    #[error("Could not retrieve job type")]
    MissingJobType,

    #[error("Cannot retrieve banned sites from JobDB")]
    BannedSitesUnavailable,

    #[error("Impossible site requirement")]
    ImpossibleSiteRequirement,

    #[error("Failed to get input data from JobDB")]
    InputDataUnavailable,

    #[error("No possible site candidates")]
    NoSiteCandidates,

    #[error("Impossible InputData * Site requirements")]
    ImpossibleInputDataSiteRequirement,

    #[error("Site candidates do not have all the input data")]
    IncompleteSiteCandidates,

    #[error("No destination sites available")]
    NoDestinationSites,

    #[error("Stage not allowed")]
    StageNotAllowed,

    #[error("Cannot retrieve SE status")]
    SeStatusUnavailable,

    #[error("No Local SEs for site {0}")]
    NoLocalSes(String),

    #[error("Cannot find tape replicas")]
    NoTapeReplicas,

    #[error("Problem sending staging request")]
    StageRequestFailed,

    #[error("Could not determine SEs for site {0}")]
    SeLookupFailed(String),

    #[error("Could not retrieve input data info")]
    OptimizerParamUnavailable,

    #[error("Could not retrieve manifest: {0}")]
    ManifestUnavailable(String),

    /// Catch-all for a collaborator I/O failure whose message should be
    /// propagated to the caller verbatim (spec.md §7: "Collaborator I/O
    /// failure ... Fail, propagating message").
    #[error("{0}")]
    Collaborator(String),
}
