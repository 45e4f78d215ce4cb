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

//! Upgrade detection for installed AUR packages.

use std::sync::Arc;
use tracing::debug;

use super::aggregate::lookup_all;
use super::RemoteIndex;
use crate::version::VersionNumber;

/// An installed package as reported by `pacman -Qm`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

impl InstalledPackage {
    /// Parse a "name version" line
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let name = parts.next()?;
        let version = parts.next()?;
        Some(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// Parse "name version" lines, ignoring blank and incomplete ones
pub fn parse_installed(text: &str) -> Vec<InstalledPackage> {
    text.lines().filter_map(InstalledPackage::parse).collect()
}

/// A package with a newer version in the AUR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgrade {
    pub name: String,
    pub local_version: String,
    pub remote_version: String,
}

#[derive(Debug, Default)]
pub struct UpgradeReport {
    /// In the same order as the installed list
    pub upgrades: Vec<Upgrade>,
    /// Packages with no usable AUR counterpart
    pub skipped: usize,
    /// Packages skipped because an official repository has them
    pub official: usize,
}

impl UpgradeReport {
    pub fn names(&self) -> Vec<&str> {
        self.upgrades.iter().map(|u| u.name.as_str()).collect()
    }
}

/// Report every installed package whose AUR version is strictly newer than
/// the installed one. Packages found in an official repository are not
/// looked up; packages the AUR does not know are skipped.
pub async fn check_upgrades<I, F>(
    index: Arc<I>,
    installed: &[InstalledPackage],
    concurrency: usize,
    official_check: F,
) -> UpgradeReport
where
    I: RemoteIndex + ?Sized + 'static,
    F: Fn(&str) -> bool,
{
    let mut report = UpgradeReport::default();

    let mut pending = Vec::new();
    for pkg in installed {
        if official_check(&pkg.name) {
            report.official += 1;
        } else {
            pending.push(pkg);
        }
    }

    let names: Vec<String> = pending.iter().map(|p| p.name.clone()).collect();
    let lookups = lookup_all(index, names, concurrency).await;

    for (local, lookup) in pending.into_iter().zip(lookups) {
        let remote = match lookup {
            Some(Ok(remote)) => remote,
            Some(Err(e)) => {
                debug!(package = %local.name, error = %e, "no AUR counterpart");
                report.skipped += 1;
                continue;
            }
            None => {
                report.skipped += 1;
                continue;
            }
        };

        let local_version = VersionNumber::parse(&local.version);
        let remote_version = VersionNumber::parse(&remote.version);
        if local_version < remote_version {
            report.upgrades.push(Upgrade {
                name: local.name.clone(),
                local_version: local.version.clone(),
                remote_version: remote.version,
            });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aur::testing::FakeIndex;

    fn installed(lines: &str) -> Vec<InstalledPackage> {
        parse_installed(lines)
    }

    #[test]
    fn test_parse_installed() {
        let parsed = parse_installed("aurb 0.0.0.0\n\n  yay 12.3.5-1  \nbroken-line\n");
        assert_eq!(
            parsed,
            vec![
                InstalledPackage {
                    name: "aurb".to_string(),
                    version: "0.0.0.0".to_string()
                },
                InstalledPackage {
                    name: "yay".to_string(),
                    version: "12.3.5-1".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_older_local_version_is_reported() {
        let index = Arc::new(FakeIndex::new().with_package("aurb", "0.8.2.1", ""));

        let report = check_upgrades(index, &installed("aurb 0.0.0.0"), 4, |_| false).await;
        assert_eq!(report.names(), vec!["aurb"]);
        assert_eq!(report.upgrades[0].remote_version, "0.8.2.1");
    }

    #[tokio::test]
    async fn test_newer_or_equal_local_version_is_not_reported() {
        let index = Arc::new(
            FakeIndex::new()
                .with_package("aurb", "0.8.2.1", "")
                .with_package("same", "1.0-1", ""),
        );

        let report = check_upgrades(
            index,
            &installed("aurb 0.9.9.9\nsame 1.0-1"),
            4,
            |_| false,
        )
        .await;
        assert!(report.upgrades.is_empty());
        assert_eq!(report.skipped, 0);
    }

    #[tokio::test]
    async fn test_official_packages_are_never_looked_up() {
        let index = Arc::new(FakeIndex::new().with_package("firefox", "999.0", ""));

        let report =
            check_upgrades(index.clone(), &installed("firefox 1.0"), 4, |n| n == "firefox").await;
        assert!(report.upgrades.is_empty());
        assert_eq!(report.official, 1);
        assert_eq!(
            index.info_calls.load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_failures_are_isolated_per_package() {
        let index = Arc::new(
            FakeIndex::new()
                .with_package("one", "2.0", "")
                .with_package("two", "2.0", "")
                .with_package("three", "2.0", "")
                .with_broken("two"),
        );

        let report = check_upgrades(
            index,
            &installed("one 1.0\ntwo 1.0\ngone 1.0\nthree 1.0"),
            2,
            |_| false,
        )
        .await;

        assert_eq!(report.names(), vec!["one", "three"]);
        assert_eq!(report.skipped, 2);
    }
}
