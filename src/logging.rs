//! Structured logging for study sessions.
//!
//! Design goals:
//! 1. Multi-level granularity (TRACE → FATAL)
//! 2. Per-section domains for filtering
//! 3. One run directory per process with events, trace and a manifest
//! 4. Records mirrored to stderr so stdout stays free for the participant view

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Consent,      // Consent checkbox, URL capture
    Instructions, // Pager navigation, read times
    Pledge,       // Integrity pledge
    Sampler,      // Block randomization draws, assignment
    Trial,        // Per-trial phases and records
    Survey,       // Topic self-assessment
    Feedback,     // Completion page
    Store,        // Persistence writes
    System,       // Startup, shutdown, config
    Profile,      // Timing scopes
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Consent => "consent",
            Domain::Instructions => "instructions",
            Domain::Pledge => "pledge",
            Domain::Sampler => "sampler",
            Domain::Trial => "trial",
            Domain::Survey => "survey",
            Domain::Feedback => "feedback",
            Domain::Store => "store",
            Domain::System => "system",
            Domain::Profile => "profile",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS is a comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Sequence counter for ordering
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
}

fn open_stream(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(file) => Some(Mutex::new(BufWriter::new(file))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("s-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/sessions".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_stream(run_dir.join("events.jsonl")),
            trace: open_stream(run_dir.join("trace.jsonl")),
            run_id,
        }
    })
}

fn sanitize_fields(mut fields: Map<String, Value>) -> Map<String, Value> {
    let redacted = Value::String("[REDACTED]".to_string());
    for key in ["authorization", "Authorization", "auth", "token", "api_key"] {
        if fields.contains_key(key) {
            fields.insert(key.to_string(), redacted.clone());
        }
    }
    fields
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["participant_id", "trial", "page", "table", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
            let _ = w.flush();
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    emit_record(level, domain.as_str(), event, fields);
}

fn emit_record(level: Level, component: &str, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let fields = sanitize_fields(fields);
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(component));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    if std::env::var("LOG_STDERR").map(|v| v != "0").unwrap_or(true) {
        eprintln!("{}", line);
    }
}

// =============================================================================
// Flow logs
// =============================================================================

/// Log a section change (consent → instructions → ...)
pub fn log_reveal(participant_id: &str, from: &str, to: &str) {
    log(
        Level::Info,
        Domain::System,
        "section.reveal",
        obj(&[
            ("participant_id", v_str(participant_id)),
            ("from", v_str(from)),
            ("to", v_str(to)),
        ]),
    );
}

/// Log a user event rejected by a section state machine
pub fn log_rejected(domain: Domain, event: &str, reason: &str) {
    agg_increment("rejected");
    log(
        Level::Warn,
        domain,
        "event.rejected",
        obj(&[("event", v_str(event)), ("msg", v_str(reason))]),
    );
}

/// Log one block randomization draw and how it was decomposed
pub fn log_draw(table: &str, assigned: u32, question: usize, explanation: usize, remaining: usize) {
    agg_increment("draw");
    log(
        Level::Debug,
        Domain::Sampler,
        "draw",
        obj(&[
            ("table", v_str(table)),
            ("assigned", json!(assigned)),
            ("question", json!(question)),
            ("explanation", json!(explanation)),
            ("remaining", json!(remaining)),
        ]),
    );
}

/// Log a persistence write that did not land
pub fn log_write_failed(path: &str, err: &str) {
    agg_increment("write_failed");
    log(
        Level::Warn,
        Domain::Store,
        "write.failed",
        obj(&[("path", v_str(path)), ("msg", v_str(err))]),
    );
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Short sha256 fingerprint used to tag a configuration in the run log.
pub fn params_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Profiling scope that emits structured timing on drop.
pub struct ProfileScope {
    label: &'static str,
    context: Map<String, Value>,
    started: Instant,
}

impl ProfileScope {
    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: obj(fields),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = std::mem::take(&mut self.context);
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Session counters
// =============================================================================

static AGGREGATOR: OnceLock<Mutex<LogAggregator>> = OnceLock::new();

fn get_aggregator() -> &'static Mutex<LogAggregator> {
    AGGREGATOR.get_or_init(|| Mutex::new(LogAggregator::default()))
}

#[derive(Debug, Default, Clone, Copy)]
struct LogAggregator {
    writes: u64,
    write_failures: u64,
    draws: u64,
    rejected: u64,
}

impl LogAggregator {
    fn increment(&mut self, event: &str) {
        match event {
            "write" => self.writes += 1,
            "write_failed" => self.write_failures += 1,
            "draw" => self.draws += 1,
            "rejected" => self.rejected += 1,
            _ => {}
        }
    }
}

/// Increment a counter in the aggregator
pub fn agg_increment(event: &str) {
    if let Ok(mut agg) = get_aggregator().lock() {
        agg.increment(event);
    }
}

/// Emit the session counters; called once when the process winds down.
pub fn log_session_summary(participant_id: &str, section: &str) {
    let snapshot = get_aggregator().lock().map(|a| *a).unwrap_or_default();
    log(
        Level::Info,
        Domain::System,
        "session.summary",
        obj(&[
            ("participant_id", v_str(participant_id)),
            ("section", v_str(section)),
            ("writes", json!(snapshot.writes)),
            ("write_failures", json!(snapshot.write_failures)),
            ("draws", json!(snapshot.draws)),
            ("rejected", json!(snapshot.rejected)),
        ]),
    );
}

// =============================================================================
// Tests
// =============================================================================
