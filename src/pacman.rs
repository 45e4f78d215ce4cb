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

//! Read-only view of the local pacman directories, and the hand-off to
//! pacman for packages the official repositories already provide.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::aur::{parse_installed, InstalledPackage};
use crate::config::PacmanConfig;
use crate::error::{AurbError, AurbResult};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Existence checks against the sync databases and the local package directory
#[derive(Debug, Clone)]
pub struct RepoIndex {
    sync_dir: PathBuf,
    repos: Vec<String>,
    local_dir: PathBuf,
    official: OnceLock<Vec<String>>,
}

impl RepoIndex {
    pub fn new(sync_dir: impl Into<PathBuf>, repos: Vec<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            sync_dir: sync_dir.into(),
            repos,
            local_dir: local_dir.into(),
            official: OnceLock::new(),
        }
    }

    pub fn from_config(config: &PacmanConfig) -> Self {
        Self::new(&config.sync_dir, config.repos.clone(), &config.local_dir)
    }

    /// True if any configured official repository has an entry for `name`.
    /// The sync databases are read once, on first use.
    pub fn in_official(&self, name: &str) -> bool {
        let entries = self.official.get_or_init(|| {
            self.repos
                .iter()
                .flat_map(|repo| sync_entries(&self.sync_dir, repo))
                .collect()
        });
        entries.iter().any(|entry| matches_package(entry, name))
    }

    /// True if the local package database has an entry for `name`
    pub fn is_installed(&self, name: &str) -> bool {
        dir_entries(&self.local_dir)
            .iter()
            .any(|entry| matches_package(entry, name))
    }
}

/// Entries are named `<name>-<version>-<rel>`. Only the `<name>-` prefix is
/// checked, so `foo` also matches an entry for `foo-docs`.
fn matches_package(entry: &str, name: &str) -> bool {
    entry
        .strip_prefix(name)
        .map_or(false, |rest| rest.starts_with('-'))
}

/// Package entries of one sync repository: the `<repo>.db` archive, or an
/// unpacked `<repo>/` directory when no archive exists.
fn sync_entries(sync_dir: &Path, repo: &str) -> Vec<String> {
    let db = sync_dir.join(format!("{}.db", repo));
    if db.is_file() {
        return match db_entries(&db) {
            Ok(entries) => {
                debug!(repo, count = entries.len(), "read sync database");
                entries
            }
            Err(e) => {
                warn!("cannot read sync database {}: {}", db.display(), e);
                Vec::new()
            }
        };
    }
    dir_entries(&sync_dir.join(repo))
}

/// Top-level directory names inside a sync database archive. Databases are
/// tarballs, gzip-compressed unless repo-add was told otherwise.
fn db_entries(db: &Path) -> AurbResult<Vec<String>> {
    let mut reader = BufReader::new(
        File::open(db).map_err(|e| AurbError::filesystem(db, "cannot open sync database", e))?,
    );

    let gzipped = reader
        .fill_buf()
        .map_err(|e| AurbError::filesystem(db, "cannot read sync database", e))?
        .starts_with(&GZIP_MAGIC);

    if gzipped {
        archive_entries(db, tar::Archive::new(GzDecoder::new(reader)))
    } else {
        archive_entries(db, tar::Archive::new(reader))
    }
}

fn archive_entries<R: Read>(db: &Path, mut archive: tar::Archive<R>) -> AurbResult<Vec<String>> {
    let malformed = |e: std::io::Error| AurbError::filesystem(db, "malformed sync database", e);

    let mut names = Vec::new();
    for entry in archive.entries().map_err(malformed)? {
        let entry = entry.map_err(malformed)?;
        let path = entry.path().map_err(malformed)?;
        if let Some(first) = path.components().next() {
            names.push(first.as_os_str().to_string_lossy().into_owned());
        }
    }
    // `<pkg>/` and `<pkg>/desc` arrive next to each other.
    names.dedup();
    Ok(names)
}

/// A missing or unreadable directory has no entries.
fn dir_entries(dir: &Path) -> Vec<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// Installed packages that no sync database provides (`pacman -Qm`)
pub fn foreign_packages() -> AurbResult<Vec<InstalledPackage>> {
    let pacman = which::which("pacman")
        .map_err(|_| AurbError::configuration("pacman not found in PATH"))?;

    let output = Command::new(&pacman)
        .arg("-Qm")
        .output()
        .map_err(|e| AurbError::filesystem(&pacman, "failed to run pacman -Qm", e))?;

    // pacman exits 1 silently when there are no foreign packages at all.
    let nothing_foreign = output.stdout.is_empty() && output.stderr.is_empty();
    if !output.status.success() && !nothing_foreign {
        return Err(AurbError::configuration(format!(
            "pacman -Qm failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let packages = parse_installed(&String::from_utf8_lossy(&output.stdout));
    debug!(count = packages.len(), "foreign packages");
    Ok(packages)
}

/// Install `name` with the configured system package manager command.
/// Inherits the terminal so pacman can prompt.
pub fn install_from_repos(command: &[String], name: &str) -> AurbResult<ExitStatus> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| AurbError::configuration("install command is empty"))?;

    let program = which::which(program)
        .map_err(|_| AurbError::configuration(format!("{} not found in PATH", program)))?;

    debug!(program = %program.display(), ?args, package = name, "handing off to package manager");
    Command::new(&program)
        .args(args)
        .arg(name)
        .status()
        .map_err(|e| AurbError::filesystem(&program, "failed to start package manager", e))
}
