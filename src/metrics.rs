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

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Data, Request, Response};
use std::convert::TryFrom;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::pod::Uptime;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct InfoLabel {
    pod_name: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RouteLabel {
    method: String,
    endpoint: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabel {
    method: String,
    endpoint: String,
    status: String,
}

/// Process wide metrics, exposed on `/metrics`.
///
/// Uptime and info gauges are refreshed when rendering, request metrics are
/// recorded by the [`RequestMetrics`] fairing.
#[derive(Debug)]
pub struct Metrics {
    registry: Registry,
    uptime: Gauge,
    info: Family<InfoLabel, Gauge>,
    requests: Family<RequestLabel, Counter>,
    duration: Family<RouteLabel, Histogram>,
    // pod name currently exported by `app_info`, held for a whole scrape
    exported: Mutex<Option<String>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = <Registry>::default();

        let uptime = Gauge::default();
        let info = Family::<InfoLabel, Gauge>::default();
        let requests = Family::<RequestLabel, Counter>::default();
        let duration = Family::<RouteLabel, Histogram>::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.005, 2.0, 10))
        });

        registry.register(
            "app_uptime_seconds",
            "Application uptime in seconds",
            uptime.clone(),
        );
        registry.register("app_info", "Application information", info.clone());
        registry.register(
            "http_requests",
            "Number of HTTP requests handled",
            requests.clone(),
        );
        registry.register(
            "http_request_duration_seconds",
            "Time spent handling HTTP requests in seconds",
            duration.clone(),
        );

        Metrics {
            registry,
            uptime,
            info,
            requests,
            duration,
            exported: Mutex::new(None),
        }
    }

    /// Encodes every metric in the Prometheus text format.
    pub fn render(&self, uptime: Uptime, pod_name: &str) -> Result<String, fmt::Error> {
        let mut exported = self
            .exported
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.uptime
            .set(i64::try_from(uptime.seconds()).unwrap_or(i64::MAX));

        // only the current pod name is exported
        if exported.as_deref() != Some(pod_name) {
            self.info.clear();
            self.info
                .get_or_create(&InfoLabel {
                    pod_name: pod_name.to_string(),
                })
                .set(1);
            *exported = Some(pod_name.to_string());
        }

        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, elapsed: Duration) {
        self.requests
            .get_or_create(&RequestLabel {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
                status: status.to_string(),
            })
            .inc();

        self.duration
            .get_or_create(&RouteLabel {
                method: method.to_string(),
                endpoint: endpoint.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }
}

struct RequestStart(Instant);

/// Counts requests and observes their duration.
///
/// Needs [`Metrics`] in the managed state, requests are not recorded otherwise.
pub struct RequestMetrics;

#[rocket::async_trait]
impl Fairing for RequestMetrics {
    fn info(&self) -> Info {
        Info {
            name: "Request metrics",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, req: &mut Request<'_>, _: &mut Data<'_>) {
        req.local_cache(|| RequestStart(Instant::now()));
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let metrics = match req.rocket().state::<Metrics>() {
            Some(metrics) => metrics,
            None => return,
        };

        let elapsed = req.local_cache(|| RequestStart(Instant::now())).0.elapsed();
        let endpoint = match req.route() {
            Some(route) => route.uri.to_string(),
            None => "unmatched".to_string(),
        };
        let status = res.status().code;

        debug!(
            "{} {} -> {} in {:?}",
            req.method(),
            endpoint,
            status,
            elapsed
        );

        metrics.record_request(req.method().as_str(), &endpoint, status, elapsed);
    }
}
