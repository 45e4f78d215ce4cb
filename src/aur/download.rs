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

//! Snapshot download and extraction.

use console::style;
use flate2::read::GzDecoder;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::PackageSummary;
use crate::error::{AurbError, AurbResult};

/// Fetches snapshot tarballs into a destination directory and unpacks them
pub struct Downloader {
    client: reqwest::Client,
    snapshot_url: String,
    dest: PathBuf,
}

impl Downloader {
    /// `snapshot_url` must contain a `{name}` placeholder for the package base
    pub fn new(client: reqwest::Client, snapshot_url: impl Into<String>, dest: impl Into<PathBuf>) -> Self {
        Self {
            client,
            snapshot_url: snapshot_url.into(),
            dest: dest.into(),
        }
    }

    /// Fail if the destination already has an entry called `name`
    pub fn ensure_absent(&self, name: &str) -> AurbResult<()> {
        let path = self.dest.join(name);
        if path.exists() {
            return Err(AurbError::AlreadyExists { path });
        }
        Ok(())
    }

    /// Download and unpack the snapshot for `pkg`. Returns the directory the
    /// sources were unpacked into.
    pub async fn fetch(&self, pkg: &PackageSummary) -> AurbResult<PathBuf> {
        self.ensure_absent(&pkg.name)?;
        if pkg.base() != pkg.name {
            self.ensure_absent(pkg.base())?;
        }

        let tarball = format!("{}.tar.gz", pkg.base());
        self.ensure_absent(&tarball)?;

        let url = pkg.snapshot_url(&self.snapshot_url);
        let tarball_path = self.dest.join(tarball);

        println!("   {} downloading {} snapshot...", style("->").blue(), style(pkg.base()).cyan());
        debug!(%url, "fetching snapshot");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AurbError::from_reqwest(&url, e))?;

        if !response.status().is_success() {
            return Err(AurbError::transport(url, format!("HTTP {}", response.status())));
        }

        let total_size = response.content_length().unwrap_or(0);
        let pb = if total_size > 0 {
            let pb = ProgressBar::new(total_size);
            if let Ok(bar_style) = ProgressStyle::default_bar()
                .template("   {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
            {
                pb.set_style(bar_style.progress_chars("=>-"));
            }
            Some(pb)
        } else {
            None
        };

        let mut data = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AurbError::from_reqwest(&url, e))?;
            data.extend_from_slice(&chunk);
            if let Some(ref pb) = pb {
                pb.set_position(data.len() as u64);
            }
        }

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        fs::write(&tarball_path, &data)
            .map_err(|e| AurbError::filesystem(&tarball_path, "cannot write snapshot", e))?;

        println!("   {} extracting archive...", style("->").blue());
        let unpacked = unpack(&tarball_path, &self.dest);
        if let Err(e) = fs::remove_file(&tarball_path) {
            warn!("cannot remove {}: {}", tarball_path.display(), e);
        }
        unpacked?;

        info!(package = %pkg.name, bytes = data.len(), "snapshot unpacked");

        Ok(self.dest.join(pkg.base()))
    }
}

/// Extract a gzip-compressed tarball into `dest`
pub fn unpack(archive: &Path, dest: &Path) -> AurbResult<()> {
    let file = File::open(archive)
        .map_err(|e| AurbError::filesystem(archive, "cannot open archive", e))?;

    tar::Archive::new(GzDecoder::new(file))
        .unpack(dest)
        .map_err(|e| AurbError::filesystem(archive, "cannot unpack archive", e))
}
