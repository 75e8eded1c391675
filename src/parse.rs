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

use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;

pub fn ip_addr(value: &str) -> Result<IpAddr, String> {
    IpAddr::from_str(value).map_err(|_| format!("can't parse IP address from '{}'", value))
}

pub fn file(value: &str) -> Result<String, String> {
    let file = Path::new(value);

    if !file.exists() {
        return Err(format!("no such file or directory: '{}'", value));
    }

    if !file.is_file() {
        return Err(format!("not a file: {}", value));
    }

    Ok(value.to_string())
}

pub fn path(value: &str) -> Result<String, String> {
    if value.starts_with('/') {
        Ok(value.to_string())
    } else {
        Err("path must start with `/`".to_string())
    }
}

pub fn probability(value: &str) -> Result<f64, String> {
    let p = f64::from_str(value).map_err(|_| format!("can't parse a number from '{}'", value))?;

    if !(0.0..=1.0).contains(&p) {
        return Err(format!("{} is not between 0 and 1", value));
    }

    Ok(p)
}
