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

//! Component A: set-difference of candidate sites against a banned set
//! (spec.md §4.A).

use std::collections::HashSet;

/// Returns `sites` minus `banned`. An empty or absent `banned` list is a
/// no-op. Output order is unspecified (the source returns a set turned back
/// into a list).
pub fn apply(sites: &[String], banned: Option<&[String]>) -> Vec<String> {
    if sites.is_empty() {
        return Vec::new();
    }
    let Some(banned) = banned else {
        return sites.to_vec();
    };
    if banned.is_empty() {
        return sites.to_vec();
    }
    let banned: HashSet<&str> = banned.iter().map(String::as_str).collect();
    sites
        .iter()
        .filter(|s| !banned.contains(s.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_banned_list_is_passthrough() {
        let sites = vec!["A".to_owned(), "B".to_owned()];
        assert_eq!(apply(&sites, None), sites);
    }

    #[test]
    fn empty_banned_list_is_passthrough() {
        let sites = vec!["A".to_owned()];
        assert_eq!(apply(&sites, Some(&[])), sites);
    }

    #[test]
    fn removes_banned_entries() {
        let sites = vec!["A".to_owned(), "B".to_owned(), "C".to_owned()];
        let banned = vec!["B".to_owned()];
        let mut out = apply(&sites, Some(&banned));
        out.sort();
        assert_eq!(out, vec!["A".to_owned(), "C".to_owned()]);
    }

    #[test]
    fn banning_everything_yields_empty() {
        let sites = vec!["A".to_owned()];
        let banned = vec!["A".to_owned()];
        assert!(apply(&sites, Some(&banned)).is_empty());
    }

    #[test]
    fn empty_sites_short_circuits() {
        assert!(apply(&[], Some(&["A".to_owned()])).is_empty());
    }
}
