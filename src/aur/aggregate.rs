/*
 * aurb - A small Arch User Repository client.
 * Copyright (C) 2025  aurb contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Search aggregation: search every term, look up each candidate in
//! parallel, then filter and merge.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{PackageSummary, RemoteIndex, SearchCandidate};
use crate::error::{AurbError, AurbResult};

/// Packages that survived every filter, plus bookkeeping about the ones
/// that did not
#[derive(Debug, Default)]
pub struct AggregateResult {
    pub packages: Vec<PackageSummary>,
    /// Candidates whose info lookup failed
    pub skipped: usize,
    /// Candidates dropped because an official repository has them
    pub official: usize,
}

impl AggregateResult {
    pub fn count(&self) -> usize {
        self.packages.len()
    }

    /// Packages ordered by name, for display
    pub fn sorted_by_name(&self) -> Vec<&PackageSummary> {
        let mut sorted: Vec<_> = self.packages.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
    }
}

/// Search for `terms`, fetch details for every candidate, and keep the
/// packages that are not in an official repository and whose name or
/// description literally contains one of the terms.
///
/// A failing search term only aborts the call when no term succeeded; the
/// error of the last failing term is returned in that case. Failing detail
/// lookups never abort and are counted in [`AggregateResult::skipped`].
pub async fn search_and_filter<I, F>(
    index: Arc<I>,
    terms: &[String],
    concurrency: usize,
    official_check: F,
) -> AurbResult<AggregateResult>
where
    I: RemoteIndex + ?Sized + 'static,
    F: Fn(&str) -> bool,
{
    let candidates = collect_candidates(index.as_ref(), terms).await?;
    debug!(count = candidates.len(), "looking up search candidates");

    let names: Vec<String> = candidates.into_iter().map(|c| c.name).collect();
    let lookups = lookup_all(index, names.clone(), concurrency).await;

    let mut result = AggregateResult::default();
    for (name, lookup) in names.iter().zip(lookups) {
        let pkg = match lookup {
            Some(Ok(pkg)) => pkg,
            Some(Err(e)) => {
                debug!(package = %name, error = %e, "skipping candidate");
                result.skipped += 1;
                continue;
            }
            None => {
                result.skipped += 1;
                continue;
            }
        };

        if official_check(&pkg.name) {
            debug!(package = %pkg.name, "available from an official repository");
            result.official += 1;
            continue;
        }

        if pkg.matches_any(terms) {
            result.packages.push(pkg);
        }
    }

    Ok(result)
}

/// Run the search step for every term and merge the candidates, keeping
/// the first occurrence of each identifier.
async fn collect_candidates<I>(index: &I, terms: &[String]) -> AurbResult<Vec<SearchCandidate>>
where
    I: RemoteIndex + ?Sized,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    let mut last_error = None;
    let mut succeeded = 0usize;

    for term in terms {
        match index.search(term).await {
            Ok(found) => {
                succeeded += 1;
                for candidate in found {
                    if seen.insert(candidate.id.clone()) {
                        merged.push(candidate);
                    }
                }
            }
            Err(e) => {
                debug!(term = %term, error = %e, "search failed");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if succeeded == 0 => Err(e),
        _ => Ok(merged),
    }
}

/// Look up every identifier with at most `concurrency` requests in flight.
/// The output lines up with the input; `None` marks a lookup task that
/// died before reporting back.
pub(crate) async fn lookup_all<I>(
    index: Arc<I>,
    identifiers: Vec<String>,
    concurrency: usize,
) -> Vec<Option<AurbResult<PackageSummary>>>
where
    I: RemoteIndex + ?Sized + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set: JoinSet<(usize, AurbResult<PackageSummary>)> = JoinSet::new();

    let total = identifiers.len();
    for (slot, identifier) in identifiers.into_iter().enumerate() {
        let index = index.clone();
        let semaphore = semaphore.clone();

        join_set.spawn(async move {
            let result = match semaphore.acquire().await {
                Ok(_permit) => index.info(&identifier).await,
                Err(_) => Err(AurbError::Interrupted),
            };
            (slot, result)
        });
    }

    let mut results: Vec<Option<AurbResult<PackageSummary>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((slot, result)) => results[slot] = Some(result),
            Err(e) => warn!("lookup task failed: {}", e),
        }
    }

    results
}
