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

//! Component D: decides whether staging is required and picks the
//! candidate stage sites (spec.md §4.D).

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::model::{Site, SiteReplicaRecord};

/// Returns `(stage_required, candidate_sites)`.
///
/// If any site already has every input LFN on disk, staging is unnecessary
/// and those disk-complete sites are returned as-is (order unspecified).
/// Otherwise every site tied for the most on-disk replicas is a staging
/// candidate, shuffled uniformly at random when there's more than one
/// (spec.md §9: the RNG is injected so tests are deterministic).
pub fn resolve(
    input_len: usize,
    id_sites: &BTreeMap<Site, SiteReplicaRecord>,
    rng: &mut impl Rng,
) -> (bool, Vec<Site>) {
    let disk_sites: Vec<Site> = id_sites
        .iter()
        .filter(|(_, record)| record.has_all_input(input_len))
        .map(|(site, _)| site.clone())
        .collect();

    if !disk_sites.is_empty() {
        return (false, disk_sites);
    }

    let max_on_disk = id_sites.values().map(|r| r.disk).max().unwrap_or(0);
    let mut best_sites: Vec<Site> = id_sites
        .iter()
        .filter(|(_, record)| record.disk == max_on_disk)
        .map(|(site, _)| site.clone())
        .collect();

    if best_sites.len() > 1 {
        best_sites.shuffle(rng);
    }

    (true, best_sites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn disk_complete_site_needs_no_staging() {
        let sites = BTreeMap::from([
            ("X".to_owned(), SiteReplicaRecord::new(2, 0)),
            ("Y".to_owned(), SiteReplicaRecord::new(1, 1)),
        ]);
        let (required, candidates) = resolve(2, &sites, &mut rng());
        assert!(!required);
        assert_eq!(candidates, vec!["X".to_owned()]);
    }

    #[test]
    fn no_disk_complete_site_requires_staging_from_best_disk_count() {
        let sites = BTreeMap::from([
            ("X".to_owned(), SiteReplicaRecord::new(0, 1)),
            ("Y".to_owned(), SiteReplicaRecord::new(1, 0)),
        ]);
        let (required, mut candidates) = resolve(1, &sites, &mut rng());
        assert!(required);
        candidates.sort();
        assert_eq!(candidates, vec!["Y".to_owned()]);
    }

    #[test]
    fn ties_for_best_disk_count_are_all_returned() {
        let sites = BTreeMap::from([
            ("X".to_owned(), SiteReplicaRecord::new(1, 1)),
            ("Y".to_owned(), SiteReplicaRecord::new(1, 1)),
            ("Z".to_owned(), SiteReplicaRecord::new(0, 2)),
        ]);
        let (required, mut candidates) = resolve(2, &sites, &mut rng());
        assert!(required);
        candidates.sort();
        assert_eq!(candidates, vec!["X".to_owned(), "Y".to_owned()]);
    }

    #[test]
    fn single_best_site_is_not_shuffled_away() {
        let sites = BTreeMap::from([("X".to_owned(), SiteReplicaRecord::new(0, 1))]);
        let (required, candidates) = resolve(1, &sites, &mut rng());
        assert!(required);
        assert_eq!(candidates, vec!["X".to_owned()]);
    }
}
