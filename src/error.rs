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

//! Error types shared by the AUR client, the downloader and the CLI.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for aurb operations
#[derive(Debug, Error)]
pub enum AurbError {
    /// The remote endpoint could not be reached, timed out, or sent
    /// something that is not a valid envelope
    #[error("Network error for {url}: {message}")]
    Transport {
        url: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The endpoint answered with an error envelope
    #[error("AUR query failed: {message}")]
    Query { message: String },

    /// A required local path or setting is unusable
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The download target is already present
    #[error("'{}' already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    /// File system errors
    #[error("File system error for '{}': {message}", .path.display())]
    FileSystem {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Interrupted operation
    #[error("Operation interrupted")]
    Interrupted,
}

impl AurbError {
    /// Transport failures may succeed on a second attempt; everything else
    /// will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AurbError::Transport { .. })
    }

    /// Create a transport error without an underlying source
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        AurbError::Transport {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a reqwest failure for the given url
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let message = if source.is_timeout() {
            "request timed out".to_string()
        } else if source.is_connect() {
            "connection failed".to_string()
        } else {
            source.to_string()
        };

        AurbError::Transport {
            url: url.into(),
            message,
            source: Some(source),
        }
    }

    /// Create a query error from a server-supplied message
    pub fn query(message: impl Into<String>) -> Self {
        AurbError::Query {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        AurbError::Configuration {
            message: message.into(),
        }
    }

    /// Create a filesystem error
    pub fn filesystem(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        AurbError::FileSystem {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }
}

/// Result type alias for aurb operations
pub type AurbResult<T> = std::result::Result<T, AurbError>;
