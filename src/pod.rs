// Copyright 2020 Johan Fleury <jfleury@arcaik.net>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::io;
use std::time::{Duration, Instant};

/// Identity and start time of the running process.
///
/// Created once before the web server starts and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Pod {
    started: Instant,
    started_at: DateTime<Utc>,
    name: Option<String>,
}

impl Pod {
    pub fn new(name: Option<String>) -> Self {
        Pod {
            started: Instant::now(),
            started_at: Utc::now(),
            name,
        }
    }

    pub fn uptime(&self) -> Uptime {
        Uptime::from(self.started.elapsed())
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Host name as reported by the system, looked up on every call.
    pub fn hostname(&self) -> io::Result<String> {
        Ok(hostname::get()?.to_string_lossy().into_owned())
    }

    /// Configured pod name, falling back to the host name.
    pub fn name(&self) -> io::Result<String> {
        match &self.name {
            Some(name) => Ok(name.clone()),
            None => self.hostname(),
        }
    }
}

/// Whole seconds elapsed since the process started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Uptime(u64);

impl Uptime {
    pub fn seconds(self) -> u64 {
        self.0
    }
}

impl From<Duration> for Uptime {
    fn from(d: Duration) -> Self {
        Uptime(d.as_secs())
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;

        write!(f, "{}h {}m {}s", hours, minutes, seconds)
    }
}

/// Current UTC time, as used in every JSON payload.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
