//! Live call-stack tracking.
//!
//! A `Session` turns a strictly nested stream of enter/return events into
//! path-keyed aggregate records: each return adds elapsed time and a count
//! to the node identified by the full ancestry of call-site tokens at that
//! moment. One session serves exactly one execution context: threads or
//! coroutines must each own their own session, since interleaved events
//! from two contexts would corrupt the shared stacks.
//!
//! The crate itself holds no global state. A host whose instrumentation
//! hook is inherently process-global (one callback slot for the whole
//! runtime) owns that boundary and the session registered behind it.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use log::debug;
use thiserror::Error;

use callprof_protocol::RawRecord;
use callprof_protocol::path::{self, PARENT, TOTAL};

use crate::matcher::{CallMatcher, TraceAll};
use crate::resolver::{NameResolver, ResolveError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("profiling is already active")]
    AlreadyActive,
    #[error("no active profiling session")]
    NotActive,
    #[error("return for `{got}` does not match stack top `{expected}`")]
    UnbalancedReturn { expected: String, got: String },
    #[error("stop with {depth} unreturned frame(s), innermost `{top}`")]
    ActiveFrames { depth: usize, top: String },
    #[error("timing stack desynchronized at `{path}`")]
    CorruptStacks { path: String },
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("malformed call-site token `{token}`")]
    BadToken { token: String },
}

/// Monotonic seconds source, abstracted so tests can drive time by hand.
pub trait Clock {
    /// Seconds since an arbitrary fixed origin.
    fn now(&self) -> f64;
}

/// Monotonic wall clock anchored at construction.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// One call site: where the call happens and on which instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite {
    pub file: String,
    pub line: u32,
    /// Opaque per-process instance identity; `None` for free functions.
    /// Not stable across processes; finalize remaps it to a small
    /// per-class ordinal.
    pub instance: Option<u64>,
    pub func: String,
}

impl CallSite {
    pub fn method(
        file: impl Into<String>,
        line: u32,
        instance: u64,
        func: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            line,
            instance: Some(instance),
            func: func.into(),
        }
    }

    pub fn function(file: impl Into<String>, line: u32, func: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            instance: None,
            func: func.into(),
        }
    }

    /// Serialized token form `file#line#instance#function`. `#` and `@`
    /// are reserved and must not appear in the fields.
    fn token(&self) -> String {
        match self.instance {
            Some(id) => format!("{}#{}#{}#{}", self.file, self.line, id, self.func),
            None => format!("{}#{}#-#{}", self.file, self.line, self.func),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct NodeStat {
    time: f64,
    count: u64,
}

/// Call-stack tracker for one execution context.
pub struct Session {
    matcher: Box<dyn CallMatcher>,
    clock: Box<dyn Clock>,
    call_stack: Vec<String>,
    timing_stack: Vec<f64>,
    nodes: BTreeMap<String, NodeStat>,
    instance_labels: HashMap<u64, String>,
    started: Option<f64>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session that traces every matched event, on the system clock.
    pub fn new() -> Self {
        Self::with_matcher(TraceAll)
    }

    pub fn with_matcher(matcher: impl CallMatcher + 'static) -> Self {
        Self {
            matcher: Box::new(matcher),
            clock: Box::new(MonotonicClock::new()),
            call_stack: Vec::new(),
            timing_stack: Vec::new(),
            nodes: BTreeMap::new(),
            instance_labels: HashMap::new(),
            started: None,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Register the externally visible name of an instance, used by the
    /// display form in preference to the `Class#ordinal` fallback.
    pub fn set_instance_label(&mut self, instance: u64, label: impl Into<String>) {
        self.instance_labels.insert(instance, label.into());
    }

    pub fn is_active(&self) -> bool {
        self.started.is_some()
    }

    /// Begin a profiling session: push the synthetic `$total` root and
    /// record the session start time.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.started.is_some() {
            return Err(SessionError::AlreadyActive);
        }
        self.started = Some(self.clock.now());
        self.call_stack.push(TOTAL.to_string());
        debug!("profiling session started");
        Ok(())
    }

    /// End the session: pop `$total` and add the elapsed duration to the
    /// root node. Stopping an inactive session is a harmless no-op so
    /// shutdown paths can call it unconditionally; stopping with frames
    /// still on the stack is a contract violation.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        let Some(started) = self.started else {
            return Ok(());
        };
        if self.call_stack.len() > 1 {
            let top = self.call_stack[self.call_stack.len() - 1].clone();
            return Err(SessionError::ActiveFrames {
                depth: self.call_stack.len() - 1,
                top,
            });
        }
        self.call_stack.pop();
        let elapsed = self.clock.now() - started;
        let root = self.nodes.entry(TOTAL.to_string()).or_default();
        root.time += elapsed;
        root.count += 1;
        self.started = None;
        debug!("profiling session stopped after {elapsed:.6}s");
        Ok(())
    }

    /// Record entry into a matched invocation.
    pub fn enter(&mut self, site: &CallSite) -> Result<(), SessionError> {
        if self.started.is_none() {
            return Err(SessionError::NotActive);
        }
        self.call_stack.push(site.token());
        self.timing_stack.push(self.clock.now());
        Ok(())
    }

    /// Record return from a matched invocation. The record is keyed by the
    /// whole current stack, returning frame included, so recursive calls at
    /// the same site accumulate into one node per recursion depth.
    pub fn leave(&mut self, site: &CallSite) -> Result<(), SessionError> {
        if self.started.is_none() {
            return Err(SessionError::NotActive);
        }
        let token = site.token();
        match self.call_stack.last() {
            Some(top) if *top == token => {}
            Some(top) => {
                return Err(SessionError::UnbalancedReturn {
                    expected: top.clone(),
                    got: token,
                });
            }
            None => {
                return Err(SessionError::UnbalancedReturn {
                    expected: String::new(),
                    got: token,
                });
            }
        }

        let finished = self.clock.now();
        let key = path::join(&self.call_stack);
        self.call_stack.pop();
        let Some(entered) = self.timing_stack.pop() else {
            return Err(SessionError::CorruptStacks { path: key });
        };

        let stat = self.nodes.entry(key).or_default();
        stat.time += finished - entered;
        stat.count += 1;
        Ok(())
    }

    /// Matcher-gated entry. Returns whether the event was traced.
    pub fn record_call(
        &mut self,
        site: &CallSite,
        owner_type: Option<&str>,
    ) -> Result<bool, SessionError> {
        if !self.matcher.should_trace(&site.func, owner_type) {
            return Ok(false);
        }
        self.enter(site)?;
        Ok(true)
    }

    /// Matcher-gated return, mirroring the `record_call` decision.
    pub fn record_return(
        &mut self,
        site: &CallSite,
        owner_type: Option<&str>,
    ) -> Result<bool, SessionError> {
        if !self.matcher.should_trace(&site.func, owner_type) {
            return Ok(false);
        }
        self.leave(site)?;
        Ok(true)
    }

    /// Stop the session (if still active) and produce the display-keyed
    /// record set for the raw trace writer.
    ///
    /// Raw tokens are resolved to qualified names, instance identities are
    /// remapped to per-(file, class) ordinals in first-seen order, and an
    /// exclusive-self `$parent` leaf is synthesized for every node whose
    /// direct children carry time.
    pub fn finalize(mut self, resolver: &mut dyn NameResolver) -> Result<Vec<RawRecord>, FinalizeError> {
        self.stop()?;

        // Display names for every distinct raw token, in sorted-path order
        // so ordinal assignment is deterministic.
        let mut display: HashMap<String, String> = HashMap::new();
        display.insert(TOTAL.to_string(), TOTAL.to_string());
        display.insert(PARENT.to_string(), PARENT.to_string());
        let mut ordinals: HashMap<(Option<String>, Option<String>), HashMap<u64, usize>> =
            HashMap::new();

        for key in self.nodes.keys() {
            for token in path::split(key) {
                if display.contains_key(token) {
                    continue;
                }
                let site = parse_token(token)?;
                let q = resolver.qualify(site.file, site.line)?;

                let name = match &q.class {
                    Some(class) => match site.instance {
                        Some(id) => {
                            let idents = ordinals
                                .entry((q.file.clone(), q.class.clone()))
                                .or_default();
                            let next = idents.len();
                            let ord = *idents.entry(id).or_insert(next);
                            match self.instance_labels.get(&id) {
                                Some(label) => format!("{label}.{class}.{}", q.func),
                                None => format!("{class}#{ord}.{}", q.func),
                            }
                        }
                        None => format!("{class}.{}", q.func),
                    },
                    None => {
                        let file = q.file.as_deref().unwrap_or(site.file);
                        format!("<{file}>.{}", q.func)
                    }
                };
                display.insert(token.to_string(), name);
            }
        }

        // Direct-children-only time accumulation over the raw keys.
        let mut child_time: HashMap<&str, f64> = HashMap::new();
        for (key, stat) in &self.nodes {
            if let Some(parent) = path::parent_of(key) {
                *child_time.entry(parent).or_default() += stat.time;
            }
        }

        // Exclusive-self leaves for nodes whose children carry time.
        let mut self_leaves: Vec<RawRecord> = Vec::new();
        for (key, stat) in &self.nodes {
            let ct = child_time.get(key.as_str()).copied().unwrap_or(0.0);
            if ct > 0.0 {
                self_leaves.push(RawRecord::new(path::child_of(key, PARENT), 1, stat.time - ct));
            }
        }

        let mut records = Vec::with_capacity(self.nodes.len() + self_leaves.len());
        for (key, stat) in &self.nodes {
            records.push(RawRecord::new(
                map_path(key, &display)?,
                stat.count,
                stat.time,
            ));
        }
        for leaf in &self_leaves {
            records.push(RawRecord::new(
                map_path(&leaf.path, &display)?,
                leaf.count,
                leaf.time,
            ));
        }
        debug!("finalized {} records", records.len());
        Ok(records)
    }
}

struct ParsedToken<'a> {
    file: &'a str,
    line: u32,
    instance: Option<u64>,
}

fn parse_token(token: &str) -> Result<ParsedToken<'_>, FinalizeError> {
    let bad = || FinalizeError::BadToken {
        token: token.to_string(),
    };
    let fields: Vec<&str> = token.split(path::TOKEN_SEP).collect();
    let [file, line, instance, _func] = fields[..] else {
        return Err(bad());
    };
    let line: u32 = line.parse().map_err(|_| bad())?;
    let instance = match instance {
        "-" => None,
        id => Some(id.parse::<u64>().map_err(|_| bad())?),
    };
    Ok(ParsedToken {
        file,
        line,
        instance,
    })
}

fn map_path(raw: &str, display: &HashMap<String, String>) -> Result<String, FinalizeError> {
    let mut segments = Vec::new();
    for token in path::split(raw) {
        let name = display.get(token).ok_or_else(|| FinalizeError::BadToken {
            token: token.to_string(),
        })?;
        segments.push(name.as_str());
    }
    Ok(path::join(segments))
}
