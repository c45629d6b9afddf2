//! Fake date-conversion and rendering services for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tiny_http::{Header, Response, Server};

fn json_header() -> Header {
    "Content-Type: application/json".parse::<Header>().unwrap()
}

fn html_header() -> Header {
    "Content-Type: text/html; charset=utf-8".parse::<Header>().unwrap()
}

/// Converter that knows the Hebrew years of 2024 and 2025 and fails otherwise.
pub fn start_converter() -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();

    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let url = request.url().to_string();
            let response = if url.contains("date=2024-") {
                Response::from_string(
                    r#"{"gy":2024,"gm":10,"gd":19,"hy":5785,"hm":"Tishrei","hd":17,"hebrew":"י״ז בְּתִשְׁרֵי תשפ״ה","heDateParts":{"y":"תשפ״ה","m":"תשרי","d":"י״ז"}}"#,
                )
                .with_header(json_header())
            } else if url.contains("date=2025-") {
                Response::from_string(
                    r#"{"gy":2025,"gm":10,"gd":19,"hy":5786,"hm":"Tishrei","hd":27,"hebrew":"כ״ז בְּתִשְׁרֵי תשפ״ו","heDateParts":{"y":"תשפ״ו","m":"תשרי","d":"כ״ז"}}"#,
                )
                .with_header(json_header())
            } else {
                Response::from_string(r#"{"error":"date out of range"}"#)
                    .with_status_code(500)
                    .with_header(json_header())
            };
            let _ = request.respond(response);
        }
    });

    format!("http://{}/converter", addr)
}

/// Rendering service that echoes the query string and records every request.
///
/// Requests whose query contains `slow` are answered after `delay`; requests
/// containing `failing` get a 503.
pub struct FakeRenderer {
    pub endpoint: String,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl FakeRenderer {
    pub fn start(slow: &'static str, delay: Duration) -> Self {
        Self::start_with(slow, delay, "")
    }

    pub fn start_with(slow: &'static str, delay: Duration, failing: &'static str) -> Self {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        std::thread::spawn(move || loop {
            if let Ok(req) = server.recv() {
                let url = req.url().to_string();
                seen.lock().unwrap().push(url.clone());
                std::thread::spawn(move || {
                    if !slow.is_empty() && url.contains(slow) {
                        std::thread::sleep(delay);
                    }
                    if !failing.is_empty() && url.contains(failing) {
                        let _ = req.respond(Response::from_string("busy").with_status_code(503));
                        return;
                    }
                    let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
                    let body = format!("<table class=\"bookmark\" data-query=\"{}\"></table>", query);
                    let _ = req.respond(Response::from_string(body).with_header(html_header()));
                });
            }
        });

        Self {
            endpoint: format!("http://{}/bookmarker/tanah_yomi", addr),
            requests,
        }
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last(&self) -> String {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

/// An endpoint nothing listens on
pub fn dead_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/converter", port)
}
