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

//! Component B: reads the job manifest and produces `(userSites,
//! userBannedSites)` (spec.md §4.B), plus the `JobRequirements` manifest
//! section writer used on the forward-to-TQ path (spec.md §6 "Persisted
//! mutations").

use crate::error::{Result, SchedulingError};
use crate::model::Manifest;
use crate::site_filter;

/// `__getSitesRequired`. Returns the banned-filtered `Site` list (empty
/// means "no constraint") and the raw `BannedSites`/`BannedSite` list.
pub fn extract(manifest: &Manifest) -> Result<(Vec<String>, Vec<String>)> {
    let mut banned = manifest.get_list("BannedSites");
    if banned.is_empty() {
        banned = manifest.get_list("BannedSite");
    }

    let mut sites: Vec<String> = manifest
        .get_list("Site")
        .into_iter()
        .filter(|s| {
            let stripped = s.trim().to_lowercase();
            stripped != "any" && !stripped.is_empty()
        })
        .collect();

    if !sites.is_empty() {
        sites = site_filter::apply(&sites, Some(&banned));
        if sites.is_empty() {
            return Err(SchedulingError::ImpossibleSiteRequirement);
        }
    }

    Ok((sites, banned))
}

/// Keys the source system accepts in singular or plural form on the job
/// manifest, translated to their `JobRequirements` destination key
/// (spec.md §6, §9 "JobRequirements translation table").
const TRANSLATED_KEYS: &[(&str, &str)] = &[
    ("SubmitPools", "SubmitPools"),
    ("SubmitPool", "SubmitPools"),
    ("GridMiddleware", "GridMiddleware"),
    ("PilotTypes", "PilotTypes"),
    ("PilotType", "PilotTypes"),
    ("JobType", "JobTypes"),
    ("GridRequiredCEs", "GridCEs"),
    ("GridCE", "GridCEs"),
    ("Tags", "Tags"),
];

/// Writes the `JobRequirements` section used by the matching/task-queue
/// stage: `Sites`, `BannedSites`, and the translated plural-keyed copies.
/// Mirrors `__sendToTQ`'s manifest-editing half (the TQ hand-off call
/// itself is the orchestrator's job).
pub fn write_job_requirements(manifest: &mut Manifest, sites: &[String], banned_sites: &[String]) {
    // Pre-read whichever source manifest keys are already translated so we
    // don't borrow `manifest` both mutably and immutably at once.
    let translated: Vec<(&str, String)> = TRANSLATED_KEYS
        .iter()
        .filter_map(|(src, dest)| {
            let values = manifest.get_list(src);
            if values.is_empty() {
                None
            } else {
                Some((*dest, values.join(", ")))
            }
        })
        .collect();

    let section = manifest.get_or_create_section("JobRequirements");
    if !sites.is_empty() {
        section.set_option("Sites", sites.join(", "));
    }
    if !banned_sites.is_empty() {
        section.set_option("BannedSites", banned_sites.join(", "));
    }
    for (dest, joined) in translated {
        section.set_option(dest, joined);
    }
}
