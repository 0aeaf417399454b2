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

//! Component G: after staging, promotes replicas at sibling sites that
//! share a staged SE from tape to disk (spec.md §4.G).

use std::collections::{HashMap, HashSet};

use thiserror_ext::AsReport;
use tracing::warn;

use crate::collaborators::{SiteCatalog, StorageElementCatalog};
use crate::model::{OptimizerRecord, SeName, Site, StageRequest};

/// Mutates `opdata.site_candidates` in place. A site whose SE lookup fails
/// is skipped (best-effort, matching the source); an SE whose status
/// lookup fails is skipped individually, with the per-site SE-status cache
/// shared across sites to avoid redundant queries.
pub async fn update(
    stage_site: &Site,
    staged_lfns: &StageRequest,
    opdata: &mut OptimizerRecord,
    site_catalog: &dyn SiteCatalog,
    se_catalog: &dyn StorageElementCatalog,
    vo: &str,
) {
    let site_names: Vec<Site> = opdata.site_candidates.keys().cloned().collect();
    let mut se_status_cache: HashMap<SeName, crate::model::StorageEndpointStatus> = HashMap::new();

    for site_name in site_names {
        if &site_name == stage_site {
            continue;
        }

        let close_ses = match site_catalog.ses_for_site(&site_name).await {
            Ok(ses) => ses,
            Err(e) => {
                warn!(error = %e.as_report(), site = %site_name, "skipping site: SE lookup failed");
                continue;
            }
        };
        let close_ses_set: HashSet<SeName> = close_ses.into_iter().collect();

        let mut disk_ses: HashSet<SeName> = HashSet::new();
        for se_name in &close_ses_set {
            let status = match se_status_cache.get(se_name) {
                Some(status) => *status,
                None => match se_catalog.status(se_name, vo).await {
                    Ok(status) => {
                        se_status_cache.insert(se_name.clone(), status);
                        status
                    }
                    Err(e) => {
                        warn!(error = %e.as_report(), se = %se_name, "skipping SE: status lookup failed");
                        continue;
                    }
                },
            };
            if status.is_disk_read() {
                disk_ses.insert(se_name.clone());
            }
        }

        for (se_name, lfns) in staged_lfns {
            if !close_ses_set.contains(se_name) {
                continue;
            }
            for lfn in lfns {
                let Some(replicas) = opdata.replica_locations.get(lfn) else {
                    continue;
                };
                let already_on_disk = replicas.iter().any(|se| disk_ses.contains(se));
                if already_on_disk {
                    continue;
                }
                if let Some(record) = opdata.site_candidates.get_mut(&site_name) {
                    record.disk += 1;
                    record.tape = record.tape.saturating_sub(1);
                }
            }
        }
    }
}
