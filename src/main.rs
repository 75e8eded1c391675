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

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod chaos;
mod logger;
mod metrics;
mod parse;
mod pod;
mod web;

use anyhow::{Context, Result};
use structopt::StructOpt;

use crate::logger::Logger;
use crate::pod::Pod;

#[derive(Debug, StructOpt)]
#[structopt(set_term_width = 0)]
struct Opts {
    #[structopt(
        name = "log.level",
        long = "log.level",
        env = "LOG_LEVEL",
        hide_env_values = true,
        value_name = "string",
        possible_values = &["off", "error", "warn", "info", "debug", "trace"],
        case_insensitive = true,
        default_value = "info",
        help = "Log level",
        display_order = 10,
    )]
    log_level: log::LevelFilter,

    #[structopt(flatten)]
    web: web::Opts,

    #[structopt(
        name = "pod.name",
        long = "pod.name",
        env = "HOSTNAME",
        hide_env_values = true,
        value_name = "string",
        help = "Name reported for this pod (defaults to the host name)",
        display_order = 30
    )]
    pod_name: Option<String>,

    #[structopt(flatten)]
    chaos: chaos::Opts,
}

static LOGGER: Logger = Logger;

fn main() -> Result<()> {
    let opts: Opts = Opts::from_args();

    log::set_logger(&LOGGER).context("unable to setup logger")?;
    log::set_max_level(opts.log_level);

    debug!("Parsed arguments: {:?}", opts);

    // container runtimes may export an empty HOSTNAME
    let pod_name = opts.pod_name.filter(|name| !name.trim().is_empty());
    let pod = Pod::new(pod_name);
    let faults = opts.chaos.injector();

    web::launch(opts.web, pod, faults).context("Web server failed to start")
}
