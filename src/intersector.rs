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

//! Component C: intersects input-data site candidates with the user's
//! requested sites and banned sites (spec.md §4.C).

use std::collections::BTreeMap;

use crate::model::{Site, SiteReplicaRecord};

/// `siteCandidates = (keys(SiteCandidates) ∩ userSites) ∖ userBannedSites`,
/// with an empty `user_sites` treated as the universe. Only the replica
/// records of the surviving sites are copied into the result; the
/// orchestrator drops the incomplete-input ones afterwards (spec.md §4.I
/// step 10).
pub fn intersect(
    site_candidates: &BTreeMap<Site, SiteReplicaRecord>,
    user_sites: &[String],
    user_banned_sites: &[String],
) -> BTreeMap<Site, SiteReplicaRecord> {
    let user_sites_set: Option<std::collections::HashSet<&str>> = if user_sites.is_empty() {
        None
    } else {
        Some(user_sites.iter().map(String::as_str).collect())
    };
    let banned: std::collections::HashSet<&str> =
        user_banned_sites.iter().map(String::as_str).collect();

    site_candidates
        .iter()
        .filter(|(site, _)| {
            user_sites_set
                .as_ref()
                .map(|set| set.contains(site.as_str()))
                .unwrap_or(true)
        })
        .filter(|(site, _)| !banned.contains(site.as_str()))
        .map(|(site, record)| (site.clone(), *record))
        .collect()
}
