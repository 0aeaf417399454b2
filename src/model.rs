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

//! Per-job data model (spec.md §3). All of these are transient, built fresh
//! for the duration of one [`crate::orchestrator::Orchestrator::optimize_job`]
//! call; only `JobState` writes (through the collaborator traits) persist.

use std::collections::{BTreeMap, BTreeSet};

pub type Site = String;
pub type Lfn = String;
pub type SeName = String;

/// Per-site replica counts for the job's input data.
///
/// Invariant: `0 <= disk + tape <= input_len`, checked wherever a record is
/// constructed from collaborator input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SiteReplicaRecord {
    pub disk: u32,
    pub tape: u32,
}

impl SiteReplicaRecord {
    pub fn new(disk: u32, tape: u32) -> Self {
        Self { disk, tape }
    }

    /// True iff every input LFN has a replica (disk or tape) at this site.
    pub fn has_all_input(&self, input_len: usize) -> bool {
        (self.disk + self.tape) as usize == input_len
    }
}

/// The `InputData` optimizer record consumed from an earlier pipeline stage
/// (spec.md §3 "OptimizerRecord"). The historical
/// `Value.Value.Successful` nesting from the source system is flattened into
/// `replica_locations` once, at ingest (spec.md §9).
#[derive(Debug, Clone, Default)]
pub struct OptimizerRecord {
    pub site_candidates: BTreeMap<Site, SiteReplicaRecord>,
    pub replica_locations: BTreeMap<Lfn, BTreeSet<SeName>>,
}

/// Runtime status of a storage endpoint (spec.md §3 "StorageEndpoint").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageEndpointStatus {
    pub read: bool,
    pub write: bool,
    pub disk_se: bool,
    pub tape_se: bool,
}

impl StorageEndpointStatus {
    pub fn is_tape_read(&self) -> bool {
        self.read && self.tape_se
    }

    pub fn is_disk_read(&self) -> bool {
        self.read && self.disk_se
    }
}

/// SE -> ordered LFN list to stage. After [`crate::stage_request::build`]
/// runs, every LFN appears in exactly one SE's list and every SE's list is
/// non-empty.
pub type StageRequest = BTreeMap<SeName, Vec<Lfn>>;

/// A named, ordered set of string options: one level of the job manifest's
/// tree of sections (spec.md §3 "Manifest").
#[derive(Debug, Clone, Default)]
pub struct Section {
    options: Vec<(String, String)>,
}

impl Section {
    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(existing) = self.options.iter_mut().find(|(k, _)| *k == name) {
            existing.1 = value;
        } else {
            self.options.push((name, value));
        }
    }

    pub fn get_option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// The job's structured config document (spec.md §3). Returned by value from
/// `JobState::get_manifest`; mutations must be written back explicitly via
/// `JobState::set_manifest` (spec.md §9, "Manifest persistence").
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    sections: BTreeMap<String, Section>,
    /// Top-level free-form options, e.g. `Site`, `BannedSites`,
    /// `VirtualOrganization`, and whatever else the job description set.
    options: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    pub fn set_list_option(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.options.insert(name.into(), values);
    }

    /// `getOption(name, default=[])`. Manifest list options are stored
    /// pre-split; callers needing a scalar use [`Manifest::get_scalar`].
    pub fn get_list(&self, name: &str) -> Vec<String> {
        self.options.get(name).cloned().unwrap_or_default()
    }

    pub fn get_scalar(&self, name: &str) -> Option<String> {
        self.options.get(name).and_then(|v| v.first().cloned())
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    pub fn get_section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn get_or_create_section(&mut self, name: &str) -> &mut Section {
        self.sections.entry(name.to_owned()).or_default()
    }
}

/// Reply from the production-job staging shortcut collaborator
/// (`getFilesToStage`, spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct FilesToStageReply {
    pub offline_lfns: Vec<Lfn>,
}

/// The outcomes of a single scheduling decision observable to the host
/// (spec.md §7). `Fail` is represented as `Err(SchedulingError)` rather than
/// as a variant here (spec.md §9's "tagged variant" design note).
///
/// `Forward` and `Staged` are both successes but are not the same thing: the
/// source only calls `setNextOptimizer` from `__sendToTQ`, never after
/// issuing a stage request (`JobScheduling.py` lines 134-135, 224) — staging
/// leaves the job at this stage pending a stager callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The job was handed off to the task queue stage.
    Forward,
    /// A stage request was issued; the job stays here until the stager
    /// callback re-triggers scheduling.
    Staged,
    /// The job was frozen for `delay` with the given operator-visible
    /// message.
    Hold { message: String, delay_secs: u64 },
}
