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

//! Component E: builds the minimal SE -> LFN-list stage request
//! (spec.md §4.E).

use std::collections::{BTreeMap, BTreeSet, HashSet};

use thiserror_ext::AsReport;
use tracing::warn;

use crate::collaborators::{SiteCatalog, StorageElementCatalog};
use crate::error::{Result, SchedulingError};
use crate::model::{Lfn, OptimizerRecord, SeName, Site, StageRequest};

/// Resolves `stage_site`'s local SEs, classifies them tape/disk-read, and
/// builds the over-replicated stage request before minimization.
pub async fn build(
    stage_site: &Site,
    opdata: &OptimizerRecord,
    vo: &str,
    site_catalog: &dyn SiteCatalog,
    se_catalog: &dyn StorageElementCatalog,
) -> Result<StageRequest> {
    let site_ses = site_catalog.ses_for_site(stage_site).await.map_err(|e| {
        warn!(error = %e.as_report(), site = %stage_site, "failed to resolve SEs for stage site");
        SchedulingError::SeLookupFailed(stage_site.clone())
    })?;

    let mut tape_ses: HashSet<SeName> = HashSet::new();
    let mut disk_ses: HashSet<SeName> = HashSet::new();
    for se_name in &site_ses {
        let status = se_catalog.status(se_name, vo).await.map_err(|e| {
            warn!(error = %e.as_report(), se = %se_name, "failed to retrieve SE status");
            SchedulingError::SeStatusUnavailable
        })?;
        if status.is_tape_read() {
            tape_ses.insert(se_name.clone());
        }
        if status.is_disk_read() {
            disk_ses.insert(se_name.clone());
        }
    }

    if tape_ses.is_empty() {
        return Err(SchedulingError::NoLocalSes(stage_site.clone()));
    }

    let (mut stage_lfns, lfn_order) = collect_candidates(&opdata.replica_locations, &tape_ses, &disk_ses);

    if stage_lfns.is_empty() {
        return Err(SchedulingError::NoTapeReplicas);
    }

    minimize(&mut stage_lfns, &lfn_order);

    Ok(stage_lfns)
}

/// For each LFN, skip it entirely if any replica is already on disk at the
/// stage site; otherwise stage it from every tape SE it has a replica on
/// (over-replicated; [`minimize`] collapses this to one SE per LFN).
fn collect_candidates(
    replica_locations: &BTreeMap<Lfn, BTreeSet<SeName>>,
    tape_ses: &HashSet<SeName>,
    disk_ses: &HashSet<SeName>,
) -> (StageRequest, Vec<Lfn>) {
    let mut stage_lfns: StageRequest = BTreeMap::new();
    let mut lfn_order = Vec::new();

    for (lfn, replicas) in replica_locations {
        if replicas.iter().any(|se| disk_ses.contains(se)) {
            continue;
        }
        let se_stage: Vec<&SeName> = replicas.iter().filter(|se| tape_ses.contains(*se)).collect();
        if se_stage.is_empty() {
            continue;
        }
        for se in se_stage {
            stage_lfns.entry(se.clone()).or_default().push(lfn.clone());
        }
        lfn_order.push(lfn.clone());
    }

    (stage_lfns, lfn_order)
}

/// Collapses each LFN down to exactly one staging SE, preferring the SE
/// with the most LFNs queued so requests batch onto as few endpoints as
/// possible (spec.md §4.E step 7). Ties in list length break on ascending SE
/// name (the lower-named SE visited, and so kept, first), matching the
/// source's `reversed(sorted(...))` over `(len, name)` tuples: reversing a
/// tuple sort ordered first by `len` ascending then `name` ascending yields
/// descending `len` but ascending `name` within a length tie.
fn minimize(stage_lfns: &mut StageRequest, lfn_order: &[Lfn]) {
    for lfn in lfn_order {
        let mut sorted_ses: Vec<SeName> = stage_lfns.keys().cloned().collect();
        sorted_ses.sort_by(|a, b| {
            let len_a = stage_lfns[a].len();
            let len_b = stage_lfns[b].len();
            len_b.cmp(&len_a).then_with(|| a.cmp(b))
        });

        let mut found = false;
        for se in &sorted_ses {
            let Some(list) = stage_lfns.get_mut(se) else {
                continue;
            };
            if list.iter().any(|l| l == lfn) {
                if found {
                    list.retain(|l| l != lfn);
                } else {
                    found = true;
                }
            }
            if stage_lfns.get(se).map(Vec::is_empty).unwrap_or(false) {
                stage_lfns.remove(se);
            }
        }
    }
}
