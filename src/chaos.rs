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

use rand::Rng;
use structopt::StructOpt;

use crate::parse;

#[derive(Debug, StructOpt)]
pub struct Opts {
    #[structopt(
        name = "chaos.failure-rate",
        long = "chaos.failure-rate",
        env = "CHAOS_FAILURE_RATE",
        hide_env_values = true,
        value_name = "float",
        parse(try_from_str = parse::probability),
        default_value = "0.2",
        help = "Probability (between 0 and 1) that a triggered action fails",
        display_order = 40
    )]
    failure_rate: f64,
}

impl Opts {
    pub fn injector(&self) -> Box<dyn FaultInjector> {
        if self.failure_rate == 0.0 {
            info!("chaos injection disabled");
            return Box::new(Never);
        }

        info!(
            "chaos injection enabled with a failure rate of {}",
            self.failure_rate
        );
        Box::new(RandomFaults::new(self.failure_rate))
    }
}

/// Decides whether a triggered action should fail.
pub trait FaultInjector: Send + Sync {
    fn should_fail(&self) -> bool;
}

#[derive(Debug)]
pub struct RandomFaults {
    failure_rate: f64,
}

impl RandomFaults {
    /// `failure_rate` must be between 0 and 1.
    pub fn new(failure_rate: f64) -> Self {
        RandomFaults { failure_rate }
    }
}

impl FaultInjector for RandomFaults {
    fn should_fail(&self) -> bool {
        rand::thread_rng().gen_bool(self.failure_rate)
    }
}

#[derive(Debug)]
pub struct Never;

impl FaultInjector for Never {
    fn should_fail(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[derive(Debug)]
pub struct Always;

#[cfg(test)]
impl FaultInjector for Always {
    fn should_fail(&self) -> bool {
        true
    }
}
