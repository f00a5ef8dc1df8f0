// Copyright 2025-2026 CEMAXECUTER LLC

//! Runtime control over JSON lines.
//!
//! Requests arrive one per line, e.g.
//! `{"cmd":"set","param":"center","value":"2.4e9","req_id":"1"}`,
//! `{"cmd":"status"}` or `{"cmd":"stop"}`. Each produces one JSON response
//! line. Setters only touch the pending configuration; the streaming thread
//! picks the change up at the start of its next block.

use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use sh_sdr::{Control, Param};

pub struct ControlServer {
    control: Arc<dyn Control>,
    running: Arc<AtomicBool>,
}

impl ControlServer {
    pub fn new(control: Arc<dyn Control>, running: Arc<AtomicBool>) -> Self {
        Self { control, running }
    }

    /// Serve requests until `input` hits EOF (blocking). Call from a
    /// dedicated thread.
    pub fn run<R: BufRead, W: Write>(&self, input: R, mut output: W) {
        for line in input.lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    log::warn!("control input: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let resp = self.dispatch(&line);
            if writeln!(output, "{}", resp).and_then(|_| output.flush()).is_err() {
                break;
            }
        }
        log::debug!("control input closed");
    }

    fn response(req_id: Option<&str>, status: &str, message: &str) -> Value {
        let mut resp = json!({
            "type": "response",
            "status": status,
            "message": message,
        });
        if let Some(id) = req_id {
            resp["req_id"] = json!(id);
        }
        resp
    }

    pub fn dispatch(&self, line: &str) -> Value {
        let root: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => return Self::response(None, "error", &format!("bad json: {}", e)),
        };
        let req_id = root.get("req_id").and_then(|r| r.as_str());

        let cmd = match root.get("cmd").and_then(|c| c.as_str()) {
            Some(c) => c,
            None => return Self::response(req_id, "error", "missing cmd"),
        };

        match cmd {
            "set" => {
                let name = match root.get("param").and_then(|p| p.as_str()) {
                    Some(n) => n,
                    None => return Self::response(req_id, "error", "missing param"),
                };
                // accept "2.4e9", 2.4e9 and true alike
                let value = match root.get("value") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::Bool(b)) => b.to_string(),
                    _ => return Self::response(req_id, "error", "missing value"),
                };
                match Param::parse(name, &value).and_then(|p| self.control.set(p).map(|_| p)) {
                    Ok(p) => Self::response(req_id, "ok", &format!("{} pending", p)),
                    Err(e) => Self::response(req_id, "error", &e.to_string()),
                }
            }
            "status" => {
                let mut resp = json!({
                    "type": "status",
                    "device": self.control.family().name(),
                    "pending": self.control.describe(),
                    "running": self.running.load(Ordering::Relaxed),
                });
                if let Some(id) = req_id {
                    resp["req_id"] = json!(id);
                }
                resp
            }
            "stop" => {
                self.running.store(false, Ordering::Relaxed);
                Self::response(req_id, "ok", "stopping")
            }
            other => Self::response(req_id, "error", &format!("unknown cmd '{}'", other)),
        }
    }
}
