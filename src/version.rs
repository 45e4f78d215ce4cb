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

//! Segmented version numbers with a total ordering.
//!
//! A version string is split on every non-alphanumeric character
//! (`1.2.0-3` becomes `1`, `2`, `0`, `3`). Segments are compared pairwise:
//! digits compare by integer value, anything else compares lexically, and a
//! segment that is missing on one side is the lowest possible value.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// One component of a version number
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Digits only, stored without leading zeros so "007" == "7"
    Numeric(String),
    /// Any other alphanumeric run, e.g. "rc1" or "beta"
    Text(String),
}

impl Segment {
    fn new(raw: &str) -> Self {
        if raw.bytes().all(|b| b.is_ascii_digit()) {
            let trimmed = raw.trim_start_matches('0');
            Segment::Numeric(trimmed.to_string())
        } else {
            Segment::Text(raw.to_string())
        }
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // No leading zeros, so a longer digit string is a bigger number.
            (Segment::Numeric(a), Segment::Numeric(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Segment::Text(a), Segment::Text(b)) => a.cmp(b),
            (Segment::Numeric(_), Segment::Text(_)) => Ordering::Greater,
            (Segment::Text(_), Segment::Numeric(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed, comparable version number
#[derive(Debug, Clone)]
pub struct VersionNumber {
    raw: String,
    segments: Vec<Segment>,
}

impl VersionNumber {
    /// Parse a version string. Never fails; an empty or separator-only
    /// string gives a version with no segments.
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(Segment::new)
            .collect();

        Self {
            raw: raw.to_string(),
            segments,
        }
    }
}

impl FromStr for VersionNumber {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl PartialEq for VersionNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionNumber {}

impl Ord for VersionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let longest = self.segments.len().max(other.segments.len());
        for i in 0..longest {
            // Option orders None below Some, which is exactly "missing is lowest".
            let ord = self.segments.get(i).cmp(&other.segments.get(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for VersionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
