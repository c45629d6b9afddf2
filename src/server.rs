//! Local preview server.
//!
//! Serves the presenter page and a small API the page's controls talk to:
//!
//! | Route                                   | Effect                                   |
//! |-----------------------------------------|------------------------------------------|
//! | `GET /`                                 | full preview page                        |
//! | `GET /api/fragment`                     | latest accepted fragment (ticket header) |
//! | `GET /api/state`                        | current values as JSON                   |
//! | `POST /api/pending?param=&value=`       | pending update, never fetches            |
//! | `POST /api/commit?param=[&value=]`      | commit (optionally with the final value) |
//! | `POST /api/nudge?param=&delta=`         | stepper button                           |
//! | `POST /api/year?value=`                 | select year                              |
//!
//! The fragment's ticket travels in `X-Fragment-Ticket` so the page can drop
//! reads that arrive out of order. Each request is handled on its own thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use log::{debug, info, warn};
use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server};

use crate::fetcher::{FetchOutcome, Ticket};
use crate::params::{parse_value, Dimension};
use crate::presenter::Presenter;
use crate::session::Session;
use crate::{Error, Result};

/// Response header carrying the ticket of the served fragment
pub const TICKET_HEADER: &str = "X-Fragment-Ticket";

/// JSON body answered by the `/api/*` routes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiReply {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Committed numeric values keyed by parameter name
    pub values: HashMap<String, f64>,
    pub year: String,
}

/// A routed response before it is turned into HTTP
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Html(String),
    /// Fragment markup and the ticket of the fetch that produced it
    Fragment(Ticket, String),
    Json(u16, ApiReply),
    NotFound,
}

impl ApiReply {
    fn from_session(session: &Session, outcome: &str) -> Self {
        let params = session.parameters();
        Self {
            outcome: outcome.to_string(),
            ticket: None,
            error: None,
            values: Dimension::ALL
                .iter()
                .map(|d| (d.query_name().to_string(), params.committed(*d)))
                .collect(),
            year: params.year().to_string(),
        }
    }
}

fn reply_for(session: &Session, result: Result<FetchOutcome>) -> Reply {
    match result {
        Ok(outcome) => {
            let mut reply = ApiReply::from_session(session, outcome.as_str());
            reply.ticket = outcome.ticket().map(|t| t.0);
            Reply::Json(200, reply)
        }
        // The fragment stays as it was; the page decides whether to alert.
        Err(e @ Error::NetworkError(_)) => {
            let mut reply = ApiReply::from_session(session, "failed");
            reply.error = Some(e.to_string());
            Reply::Json(200, reply)
        }
        Err(e) => {
            let mut reply = ApiReply::from_session(session, "rejected");
            reply.error = Some(e.to_string());
            Reply::Json(400, reply)
        }
    }
}

fn query_map(url: &str) -> (&str, HashMap<String, String>) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let map = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    (path, map)
}

fn required<'a>(query: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    query
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| Error::InvalidParameter(format!("missing '{}'", key)))
}

fn dimension_of(query: &HashMap<String, String>) -> Result<Dimension> {
    required(query, "param")?.parse()
}

/// Route one request against the session. Pure apart from the session calls,
/// so it can be exercised without a socket.
pub fn route(session: &Session, method: &Method, url: &str) -> Reply {
    let (path, query) = query_map(url);
    debug!("{} {}", method, url);

    match (method, path) {
        (Method::Get, "/") => Reply::Html(Presenter::render_page(&session.view())),
        (Method::Get, "/api/fragment") => {
            let (ticket, markup) = session.fetcher().snapshot();
            Reply::Fragment(ticket, markup)
        }
        (Method::Get, "/api/state") => {
            let mut reply = ApiReply::from_session(session, "state");
            reply.error = session.last_error();
            Reply::Json(200, reply)
        }
        (Method::Post, "/api/pending") => {
            let result = dimension_of(&query).and_then(|dim| {
                let value = parse_value(required(&query, "value")?)?;
                session.set_pending(dim, value)?;
                Ok(FetchOutcome::Unchanged)
            });
            reply_for(session, result)
        }
        (Method::Post, "/api/commit") => {
            let result = dimension_of(&query).and_then(|dim| {
                if let Some(value) = query.get("value") {
                    session.set_pending(dim, parse_value(value)?)?;
                }
                session.commit(dim)
            });
            reply_for(session, result)
        }
        (Method::Post, "/api/nudge") => {
            let result = dimension_of(&query).and_then(|dim| {
                let delta = parse_value(required(&query, "delta")?)?;
                session.nudge(dim, delta)
            });
            reply_for(session, result)
        }
        (Method::Post, "/api/year") => {
            let result = required(&query, "value").and_then(|label| session.select_year(label));
            reply_for(session, result)
        }
        _ => Reply::NotFound,
    }
}

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes())
        .map_err(|_| Error::ServerError(format!("invalid header {}: {}", name, value)))
}

fn respond(request: Request, reply: Reply) -> Result<()> {
    let response = match reply {
        Reply::Html(body) => Response::from_string(body)
            .with_header(header("Content-Type", "text/html; charset=utf-8")?),
        Reply::Fragment(ticket, markup) => Response::from_string(markup)
            .with_header(header("Content-Type", "text/html; charset=utf-8")?)
            .with_header(header(TICKET_HEADER, &ticket.0.to_string())?),
        Reply::Json(status, body) => {
            let json = serde_json::to_string(&body)
                .map_err(|e| Error::ServerError(format!("failed to encode reply: {}", e)))?;
            Response::from_string(json)
                .with_status_code(status)
                .with_header(header("Content-Type", "application/json")?)
        }
        Reply::NotFound => Response::from_string(r#"{"error":"not_found"}"#)
            .with_status_code(404)
            .with_header(header("Content-Type", "application/json")?),
    };
    let response = response.with_header(header("Cache-Control", "no-store")?);
    request.respond(response)?;
    Ok(())
}

/// Serves one session over HTTP
pub struct PreviewServer {
    server: Server,
    session: Arc<Session>,
}

impl PreviewServer {
    /// Bind to `addr` (for example `127.0.0.1:8080`; port 0 picks a free one).
    pub fn bind(addr: &str, session: Arc<Session>) -> Result<Self> {
        let server = Server::http(addr)
            .map_err(|e| Error::InitializationError(format!("Failed to bind {}: {}", addr, e)))?;
        Ok(Self { server, session })
    }

    /// Base URL the server is reachable at
    pub fn url(&self) -> String {
        format!("http://{}/", self.server.server_addr())
    }

    /// Accept requests until the listener shuts down.
    pub fn run(self) -> Result<()> {
        info!("serving preview at {}", self.url());
        for request in self.server.incoming_requests() {
            let session = Arc::clone(&self.session);
            thread::spawn(move || {
                let reply = route(&session, request.method(), request.url());
                if let Err(e) = respond(request, reply) {
                    warn!("request error: {}", e);
                }
            });
        }
        Ok(())
    }
}
