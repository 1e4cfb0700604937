//! Command registry — declarative specs plus executable handlers.
//!
//! Built once at startup, then shared read-only with the dispatcher.
//! Each [`CommandSpec`] declares its argument contract, so argument
//! checking happens once, generically, in [`CommandSpec::validate`]
//! and handlers receive an already-typed [`Args`].
//!
//! ```text
//!  register(spec, handler) ──▶ BTreeMap<name, Entry> ──▶ lookup / list
//!                                                      └─▶ help text
//! ```

use core::fmt;
use core::future::Future;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use futures_lite::future::BoxedLocal;
use serde_json::Value;

use super::engine::Invocation;
use super::envelope::{ArgMap, StatusCode};

// ── Argument schema ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Int,
    Bool,
}

impl ArgKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Bool => "bool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
    pub description: &'static str,
}

impl ArgSpec {
    pub const fn required(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: ArgKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

/// Capability class of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    User,
    Operator,
}

impl Permission {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Operator => "operator",
        }
    }
}

/// Informational risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl Risk {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

// ── Typed arguments ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

/// Arguments after validation against a [`CommandSpec`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    values: BTreeMap<&'static str, ArgValue>,
}

impl Args {
    pub fn str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ArgValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Argument contract violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    Unknown(String),
    Missing(&'static str),
    WrongType { name: &'static str, expected: ArgKind },
    /// Rejected by the command's own check.
    Invalid(String),
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(name) => write!(f, "unknown argument: {name}"),
            Self::Missing(name) => write!(f, "missing required argument: {name}"),
            Self::WrongType { name, expected } => {
                write!(f, "argument '{name}' must be {}", expected.as_str())
            }
            Self::Invalid(msg) => f.write_str(msg),
        }
    }
}

// ── Command spec ─────────────────────────────────────────────

/// Extra per-command check, run after the generic schema check.
pub type ArgCheck = fn(&Args) -> Result<(), String>;

/// Declarative description of one command.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub summary: &'static str,
    pub usage: &'static str,
    pub permission: Permission,
    pub risk: Risk,
    /// Handler deadline enforced by the dispatcher.
    pub timeout: Duration,
    /// Serialised against other exclusive commands by the busy lock.
    pub exclusive: bool,
    pub args: &'static [ArgSpec],
    pub check: Option<ArgCheck>,
}

impl CommandSpec {
    pub fn new(name: &'static str, summary: &'static str) -> Self {
        Self {
            name,
            summary,
            usage: "",
            permission: Permission::User,
            risk: Risk::Low,
            timeout: Duration::from_secs(5),
            exclusive: false,
            args: &[],
            check: None,
        }
    }

    #[must_use]
    pub fn usage(mut self, usage: &'static str) -> Self {
        self.usage = usage;
        self
    }

    #[must_use]
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    #[must_use]
    pub fn risk(mut self, risk: Risk) -> Self {
        self.risk = risk;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    #[must_use]
    pub fn args(mut self, args: &'static [ArgSpec]) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn check(mut self, check: ArgCheck) -> Self {
        self.check = Some(check);
        self
    }

    /// Validate raw wire arguments into a typed [`Args`].
    ///
    /// Unknown names are rejected. A blank string counts as absent, so a
    /// required string argument that is blank is missing.
    pub fn validate(&self, raw: &ArgMap) -> Result<Args, ArgError> {
        if let Some(unknown) = raw.keys().find(|k| !self.args.iter().any(|a| a.name == *k)) {
            return Err(ArgError::Unknown(unknown.clone()));
        }

        let mut values = BTreeMap::new();
        for spec in self.args {
            let value = match raw.get(spec.name) {
                None | Some(Value::Null) => None,
                Some(v) => coerce(spec, v)?,
            };
            match value {
                Some(v) => {
                    values.insert(spec.name, v);
                }
                None if spec.required => return Err(ArgError::Missing(spec.name)),
                None => {}
            }
        }

        let args = Args { values };
        if let Some(check) = self.check {
            check(&args).map_err(ArgError::Invalid)?;
        }
        Ok(args)
    }
}

fn coerce(spec: &ArgSpec, value: &Value) -> Result<Option<ArgValue>, ArgError> {
    let wrong = || ArgError::WrongType {
        name: spec.name,
        expected: spec.kind,
    };
    match (spec.kind, value) {
        (ArgKind::Str, Value::String(s)) if s.trim().is_empty() => Ok(None),
        (ArgKind::Str, Value::String(s)) => Ok(Some(ArgValue::Str(s.clone()))),
        (ArgKind::Int, Value::Number(n)) => n.as_i64().map(|v| Some(ArgValue::Int(v))).ok_or_else(wrong),
        (ArgKind::Bool, Value::Bool(b)) => Ok(Some(ArgValue::Bool(*b))),
        _ => Err(wrong()),
    }
}

// ── Handlers ─────────────────────────────────────────────────

/// Successful handler result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub text: String,
    pub data: Option<ArgMap>,
}

impl Outcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: ArgMap) -> Self {
        self.data = Some(data);
        self
    }
}

/// Handler failure. Defaults to `ERR_INTERNAL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub code: StatusCode,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type HandlerResult = Result<Outcome, HandlerError>;

/// Executable side of a command.
pub trait Handler {
    fn call(&self, inv: Invocation) -> BoxedLocal<HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Invocation) -> Fut,
    Fut: Future<Output = HandlerResult> + 'static,
{
    fn call(&self, inv: Invocation) -> BoxedLocal<HandlerResult> {
        Box::pin(self(inv))
    }
}

// ── Registry ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Duplicate(&'static str),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate(name) => write!(f, "duplicate command registration: {name}"),
        }
    }
}

/// A registered command.
pub struct Entry {
    pub spec: CommandSpec,
    pub handler: Rc<dyn Handler>,
}

/// Name → (spec, handler), ordered by name.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<&'static str, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        spec: CommandSpec,
        handler: impl Handler + 'static,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }
        self.entries.insert(
            spec.name,
            Entry {
                spec,
                handler: Rc::new(handler),
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Specs ordered by name.
    pub fn list(&self) -> Vec<&CommandSpec> {
        self.entries.values().map(|e| &e.spec).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Help text: the command list, or one command's details.
    pub fn render_help(&self, target: Option<&str>) -> Result<String, HandlerError> {
        let Some(name) = target else {
            let mut lines = vec!["Available commands:".to_string()];
            lines.extend(self.entries.keys().map(|name| format!("- {name}")));
            lines.push(String::new());
            lines.push(r#"Use help with args.cmd for details, e.g. {"cmd":"provision"}."#.into());
            return Ok(lines.join("\n"));
        };

        let entry = self.lookup(name).ok_or_else(|| {
            HandlerError::new(StatusCode::InvalidArgs, format!("Unknown command: {name}"))
        })?;
        Ok(render_spec(&entry.spec))
    }
}

fn render_spec(spec: &CommandSpec) -> String {
    let mut lines = vec![
        format!("Command: {}", spec.name),
        format!("Summary: {}", spec.summary),
        format!("Usage: {}", spec.usage),
        format!("Permission: {}", spec.permission.as_str()),
        format!("Risk: {}", spec.risk.as_str()),
        format!("Timeout: {:.1}s", spec.timeout.as_secs_f64()),
    ];
    if spec.args.is_empty() {
        lines.push("Args: (none)".into());
    } else {
        lines.push("Args:".into());
        for arg in spec.args {
            let req = if arg.required { "required" } else { "optional" };
            lines.push(format!(
                "  - {} ({}, {}): {}",
                arg.name,
                arg.kind.as_str(),
                req,
                arg.description
            ));
        }
    }
    lines.join("\n")
}

// ── Tests ────────────────────────────────────────────────────
