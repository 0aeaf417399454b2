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

//! Per-job scheduling optimizer for a distributed workload-management
//! pipeline: given a job's requested sites and input data, decides whether
//! to forward the job to the task queue, stage missing replicas first, or
//! hold it for a back-off period.
//!
//! [`orchestrator::Orchestrator::optimize_job`] is the entry point; it
//! sequences the individual components (`site_filter`, `requirements`,
//! `intersector`, `staging`, `stage_request`, `dispatcher`, `shared_se`,
//! `summarizer`) against the collaborator traits in [`collaborators`].

pub mod clock;
pub mod collaborators;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod intersector;
pub mod model;
pub mod orchestrator;
pub mod requirements;
pub mod shared_se;
pub mod site_filter;
pub mod stage_request;
pub mod staging;
pub mod summarizer;

pub mod testing;

pub use clock::{Clock, SystemClock};
pub use config::SchedulerConfig;
pub use error::{Result, SchedulingError};
pub use model::Outcome;
pub use orchestrator::Orchestrator;
