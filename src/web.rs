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

mod health;

use anyhow::Result;
use rocket::fs::FileServer;
use rocket::http::{ContentType, Status};
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::{catch, catchers, get, post, routes};
use rocket::{Build, Config, Request, Rocket, State};
use rocket_dyn_templates::{context, Template};
use serde_json::json;
use serde_json::value::Value;
use std::fmt;
use std::io;
use std::net::IpAddr;
use structopt::StructOpt;
use thiserror::Error;

use crate::chaos::FaultInjector;
use crate::metrics::{Metrics, RequestMetrics};
use crate::parse;
use crate::pod::{self, Pod};

const STATIC_DIR: &str = "static/";
const TEMPLATE_DIR: &str = "templates/";

#[derive(Debug, StructOpt)]
pub struct Opts {
    #[structopt(
        name = "web.address",
        long = "web.address",
        env = "WEB_ADDRESS",
        hide_env_values = true,
        value_name = "address",
        parse(try_from_str = parse::ip_addr),
        default_value = "0.0.0.0",
        help = "IP address to listen on",
        display_order = 20,
    )]
    address: IpAddr,

    #[structopt(
        name = "web.port",
        long = "web.port",
        env = "PORT",
        hide_env_values = true,
        value_name = "integer",
        default_value = "3000",
        help = "Port to listen on",
        display_order = 21,
    )]
    port: u16,

    #[structopt(
        name = "web.tls-cert-file",
        long = "web.tls-cert-file",
        env = "WEB_TLS_CERT_FILE",
        hide_env_values = true,
        value_name = "file",
        requires = "web.tls-key-file",
        help = "Path to a certificate chain file in PEM format (enables TLS)",
        parse(try_from_str = parse::file),
        display_order = 22,
    )]
    tls_cert_file: Option<String>,

    #[structopt(
        name = "web.tls-key-file",
        long = "web.tls-key-file",
        env = "WEB_TLS_KEY_FILE",
        hide_env_values = true,
        value_name = "file",
        parse(try_from_str = parse::file),
        requires = "web.tls-cert-file",
        help = "Path to a private key file in PEM format (enables TLS)",
        display_order = 23,
    )]
    tls_key_file: Option<String>,

    #[structopt(
        name = "web.base-path",
        long = "web.base-path",
        env = "WEB_BASE_PATH",
        hide_env_values = true,
        value_name = "string",
        parse(try_from_str = parse::path),
        default_value = "/",
        help = "Path prefix for endpoints",
        display_order = 24,
    )]
    base_path: String,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to look up host name: {0}")]
    Hostname(#[from] io::Error),

    #[error("unable to encode metrics: {0}")]
    Metrics(#[from] fmt::Error),
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        warn!("{} {} failed: {}", req.method(), req.uri(), self);
        internal_server_error_body().respond_to(req)
    }
}

/// Base path without its trailing `/`, prepended to links in templates.
struct Prefix(String);

pub fn launch(opts: Opts, pod: Pod, faults: Box<dyn FaultInjector>) -> Result<()> {
    let rocket = build(&opts, pod, faults);

    // the launch future only resolves once the server is shut down
    match rocket::execute(rocket.launch()) {
        Ok(_) => {
            info!("web server stopped");
            Ok(())
        }
        Err(e) => Err(anyhow!("{}", e)),
    }
}

fn build(opts: &Opts, pod: Pod, faults: Box<dyn FaultInjector>) -> Rocket<Build> {
    let mut figment = Config::figment()
        .merge(("address", opts.address))
        .merge(("port", opts.port))
        .merge(("template_dir", TEMPLATE_DIR));

    if let (Some(certs), Some(key)) = (&opts.tls_cert_file, &opts.tls_key_file) {
        figment = figment
            .merge(("tls.certs", certs.as_str()))
            .merge(("tls.key", key.as_str()));
    }

    let prefix = opts.base_path.trim_end_matches('/').to_string();
    let static_path = format!("{}/static", prefix);

    rocket::custom(figment)
        .mount(
            opts.base_path.as_str(),
            routes![
                index,
                get_info,
                post_action,
                get_metrics,
                health::live,
                health::ready,
            ],
        )
        .mount(static_path.as_str(), FileServer::from(STATIC_DIR))
        .register("/", catchers![not_found, internal_server_error])
        .manage(Prefix(prefix))
        .manage(pod)
        .manage(faults)
        .manage(Metrics::new())
        .attach(Template::fairing())
        .attach(RequestMetrics)
}

fn internal_server_error_body() -> (Status, Json<Value>) {
    (
        Status::InternalServerError,
        Json(json!({ "error": "Internal Server Error" })),
    )
}

#[get("/")]
fn index(pod: &State<Pod>, prefix: &State<Prefix>) -> Template {
    // the dashboard still renders if the host name can't be resolved
    let pod_name = match pod.name() {
        Ok(name) => name,
        Err(e) => {
            warn!("unable to look up pod name: {}", e);
            String::new()
        }
    };

    Template::render(
        "index",
        context! {
            pod_name: pod_name,
            version: env!("CARGO_PKG_VERSION"),
            started_at: pod.started_at().to_rfc3339(),
            prefix: prefix.0.as_str(),
        },
    )
}

#[get("/api/info")]
fn get_info(pod: &State<Pod>) -> Result<Json<Value>, Error> {
    let uptime = pod.uptime();

    Ok(Json(json!({
        "hostname": pod.hostname()?,
        "pod_name": pod.name()?,
        "uptime": uptime.to_string(),
        "uptime_seconds": uptime.seconds(),
        "timestamp": pod::timestamp(),
    })))
}

#[post("/action")]
fn post_action(pod: &State<Pod>, faults: &State<Box<dyn FaultInjector>>) -> (Status, Json<Value>) {
    if faults.should_fail() {
        warn!("action failed: simulated failure");
        return (
            Status::InternalServerError,
            Json(json!({
                "status": "error",
                "message": "Simulated failure for chaos testing",
            })),
        );
    }

    let pod_name = match pod.name() {
        Ok(name) => name,
        Err(e) => {
            warn!("unable to look up pod name: {}", e);
            return (
                Status::InternalServerError,
                Json(json!({
                    "status": "error",
                    "message": format!("unable to look up pod name: {}", e),
                })),
            );
        }
    };

    info!("action executed on `{}`", pod_name);

    (
        Status::Ok,
        Json(json!({
            "status": "success",
            "message": "Action executed successfully",
            "pod_name": pod_name,
            "timestamp": pod::timestamp(),
        })),
    )
}

#[get("/metrics")]
fn get_metrics(pod: &State<Pod>, metrics: &State<Metrics>) -> Result<(ContentType, String), Error> {
    let body = metrics.render(pod.uptime(), &pod.name()?)?;

    Ok((openmetrics_content_type(), body))
}

fn openmetrics_content_type() -> ContentType {
    ContentType::new("application", "openmetrics-text")
        .with_params(vec![("version", "1.0.0"), ("charset", "utf-8")])
}

#[catch(404)]
fn not_found(req: &Request) -> Template {
    Template::render("404", context! { path: req.uri().path().as_str() })
}

#[catch(500)]
fn internal_server_error(_req: &Request) -> (Status, Json<Value>) {
    internal_server_error_body()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chaos::{Always, Never, RandomFaults};
    use rocket::local::blocking::{Client, LocalResponse};

    fn opts(args: &[&str]) -> Opts {
        Opts::from_iter(std::iter::once("sre-portal").chain(args.iter().copied()))
    }

    fn client_with(args: &[&str], faults: Box<dyn FaultInjector>) -> Client {
        let pod = Pod::new(Some("test-pod".to_string()));
        Client::tracked(build(&opts(args), pod, faults)).expect("valid rocket instance")
    }

    fn client() -> Client {
        client_with(&[], Box::new(Never))
    }

    fn json(response: LocalResponse) -> Value {
        response.into_json::<Value>().expect("JSON body")
    }

    #[test]
    fn probes_always_succeed() {
        let client = client();

        for _ in 0..3 {
            let response = client.get("/health").dispatch();
            assert_eq!(response.status(), Status::Ok);
            let body = json(response);
            assert_eq!(body["status"], "healthy");
            assert!(body["timestamp"].is_string());

            let response = client.get("/readiness").dispatch();
            assert_eq!(response.status(), Status::Ok);
            let body = json(response);
            assert_eq!(body["status"], "ready");
            assert!(body["timestamp"].is_string());
        }
    }

    #[test]
    fn info_right_after_start() {
        let client = client();

        let response = client.get("/api/info").dispatch();
        assert_eq!(response.status(), Status::Ok);

        let body = json(response);
        assert_eq!(body["uptime_seconds"], 0);
        assert_eq!(body["uptime"], "0h 0m 0s");
        assert_eq!(body["pod_name"], "test-pod");
        assert!(!body["hostname"].as_str().unwrap().is_empty());
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn info_uptime_never_decreases() {
        let client = client();
        let mut last = 0;

        for _ in 0..5 {
            let uptime = json(client.get("/api/info").dispatch())["uptime_seconds"]
                .as_u64()
                .unwrap();
            assert!(uptime >= last);
            last = uptime;
        }
    }

    #[test]
    fn action_success() {
        let client = client();

        let response = client.post("/action").dispatch();
        assert_eq!(response.status(), Status::Ok);

        let body = json(response);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Action executed successfully");
        assert_eq!(body["pod_name"], "test-pod");
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn action_failure() {
        let client = client_with(&[], Box::new(Always));

        let response = client.post("/action").dispatch();
        assert_eq!(response.status(), Status::InternalServerError);

        let body = json(response);
        assert_eq!(body["status"], "error");
        assert!(body["message"].is_string());
        assert!(body.get("pod_name").is_none());
    }

    #[test]
    fn action_fails_about_one_time_in_five() {
        let client = client_with(&[], Box::new(RandomFaults::new(0.2)));
        let calls = 1000;

        let failures = (0..calls)
            .filter(|_| client.post("/action").dispatch().status() == Status::InternalServerError)
            .count();
        let rate = failures as f64 / calls as f64;

        assert!((rate - 0.2).abs() < 0.05, "failure rate was {}", rate);
    }

    #[test]
    fn metrics_exposition() {
        let client = client();

        let response = client.get("/metrics").dispatch();
        assert_eq!(response.status(), Status::Ok);
        let content_type = response.headers().get_one("Content-Type").unwrap();
        assert!(content_type.starts_with("application/openmetrics-text"));
        assert!(content_type.contains("version=1.0.0"));

        let body = response.into_string().unwrap();
        let uptime = body
            .lines()
            .find_map(|line| line.strip_prefix("app_uptime_seconds "))
            .expect("uptime sample");
        assert!(uptime.parse::<u64>().is_ok());
        assert!(body.lines().any(|line| line == "app_info{pod_name=\"test-pod\"} 1"));
    }

    #[test]
    fn metrics_count_requests() {
        let client = client();

        client.get("/health").dispatch();
        client.get("/health").dispatch();
        client.get("/nowhere").dispatch();

        let body = client.get("/metrics").dispatch().into_string().unwrap();
        assert!(body.contains(
            "http_requests_total{method=\"GET\",endpoint=\"/health\",status=\"200\"} 2"
        ));
        assert!(body.contains(
            "http_requests_total{method=\"GET\",endpoint=\"unmatched\",status=\"404\"} 1"
        ));
    }

    #[test]
    fn dashboard() {
        let client = client();

        let response = client.get("/").dispatch();
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::HTML));

        let body = response.into_string().unwrap();
        assert!(body.contains("test-pod"));
        assert!(body.contains("/api/info"));

        let response = client.get("/static/dashboard.css").dispatch();
        assert_eq!(response.status(), Status::Ok);
    }

    #[get("/fail/<cause>")]
    fn fail(cause: &str) -> Result<Json<Value>, Error> {
        match cause {
            "hostname" => Err(Error::Hostname(io::Error::new(
                io::ErrorKind::Other,
                "no host name",
            ))),
            _ => Err(Error::Metrics(fmt::Error)),
        }
    }

    #[get("/crash")]
    fn crash() -> Result<(), Status> {
        Err(Status::InternalServerError)
    }

    #[test]
    fn errors_answer_generic_json() {
        let rocket = build(&opts(&[]), Pod::new(None), Box::new(Never))
            .mount("/", routes![fail, crash]);
        let client = Client::tracked(rocket).expect("valid rocket instance");

        for uri in &["/fail/hostname", "/fail/metrics", "/crash"] {
            let response = client.get(*uri).dispatch();
            assert_eq!(response.status(), Status::InternalServerError, "{}", uri);
            assert_eq!(
                json(response),
                json!({ "error": "Internal Server Error" }),
                "{}",
                uri
            );
        }
    }

    #[test]
    fn unknown_route() {
        let client = client();

        let response = client.get("/does-not-exist").dispatch();
        assert_eq!(response.status(), Status::NotFound);
    }

    #[test]
    fn base_path() {
        let client = client_with(&["--web.base-path", "/portal"], Box::new(Never));

        assert_eq!(client.get("/portal/health").dispatch().status(), Status::Ok);
        assert_eq!(
            client.get("/portal/static/dashboard.css").dispatch().status(),
            Status::Ok
        );
        assert_eq!(client.get("/health").dispatch().status(), Status::NotFound);

        let body = json(client.get("/portal/api/info").dispatch());
        assert_eq!(body["pod_name"], "test-pod");
    }
}
