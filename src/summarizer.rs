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

//! Component H: reduces the final site list to `"ANY"` / a single site /
//! a tier group / `"Multiple"` (spec.md §4.H).

use thiserror_ext::AsReport;
use tracing::warn;

use crate::collaborators::SiteCatalog;
use crate::model::Site;

/// Computes the value to write to the job's `Site` attribute.
pub async fn summarize(sites: &[Site], site_catalog: &dyn SiteCatalog) -> String {
    match sites {
        [] => "ANY".to_owned(),
        [only] => only.clone(),
        many => {
            let mut tier_level: Option<u32> = None;
            let mut tier_sites: Vec<&Site> = Vec::new();

            for site in many {
                let tier = match site_catalog.site_tier(site).await {
                    Ok(tier) => tier,
                    Err(e) => {
                        warn!(error = %e.as_report(), site = %site, "cannot get tier for site");
                        continue;
                    }
                };
                // Legacy hack: a bare T0 mixed with T1s should still read
                // as "multiple" rather than collapsing to a T0 group.
                let tier = if tier == 0 { 1 } else { tier };

                match tier_level {
                    None => {
                        tier_level = Some(tier);
                        tier_sites = vec![site];
                    }
                    Some(level) if tier < level => {
                        tier_level = Some(tier);
                        tier_sites = vec![site];
                    }
                    Some(level) if tier == level => {
                        tier_sites.push(site);
                    }
                    _ => {}
                }
            }

            match tier_sites.as_slice() {
                [single] => format!("Group.{}", strip_leading_token(single)),
                _ => "Multiple".to_owned(),
            }
        }
    }
}

/// `"LCG.CERN.ch".split(".")[1:]` joined back with `.` -> `"CERN.ch"`.
fn strip_leading_token(site: &str) -> String {
    match site.split_once('.') {
        Some((_, rest)) => rest.to_owned(),
        None => site.to_owned(),
    }
}
