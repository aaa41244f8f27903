//! Configuration value lookup: process environment first, then properties.
//!
//! Properties are the `-Dkey=value` overrides passed on the command line. A
//! value that is empty or whitespace-only counts as absent in either source,
//! and a key found in neither resolves to the caller's default. Lookups never
//! fail.

use std::collections::HashMap;

/// A read-only source of string configuration values.
#[cfg_attr(test, mockall::automock)]
pub trait ValueSource: Send + Sync {
    /// Return the raw value stored under `key`, if any.
    fn lookup(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ValueSource for ProcessEnv {
    fn lookup(&self, key: &str) -> Option<String> {
        // Non-UTF-8 values are treated as unset.
        std::env::var(key).ok()
    }
}

/// Property overrides, keyed case-sensitively.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    /// An empty property store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `-Dkey=value` arguments. Anything else is skipped.
    ///
    /// ```
    /// use telemetry::env::{Properties, ValueSource};
    ///
    /// let props = Properties::from_args(["server", "-DnewrelicLicenseKey=abc", "--verbose"]);
    /// assert_eq!(props.lookup("newrelicLicenseKey").as_deref(), Some("abc"));
    /// ```
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values = args
            .into_iter()
            .filter_map(|arg| {
                let (key, value) = arg.as_ref().strip_prefix("-D")?.split_once('=')?;
                (!key.is_empty()).then(|| (key.to_owned(), value.to_owned()))
            })
            .collect();
        Self { values }
    }

    /// Set (or replace) a single property.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Number of stored properties.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if no properties are stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ValueSource for Properties {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Two-level lookup over an environment and a property store.
#[derive(Debug, Clone, Default)]
pub struct Resolver<E = ProcessEnv, P = Properties> {
    env: E,
    properties: P,
}

impl Resolver {
    /// Resolve against the real process environment and the given properties.
    pub fn from_process(properties: Properties) -> Self {
        Self::new(ProcessEnv, properties)
    }
}

impl<E: ValueSource, P: ValueSource> Resolver<E, P> {
    /// Build a resolver over arbitrary sources.
    pub fn new(env: E, properties: P) -> Self {
        Self { env, properties }
    }

    /// Resolve `key`, applying `transform` to a found value.
    ///
    /// The property store is only consulted when the environment has no
    /// usable value. `default` is returned untransformed.
    pub fn resolve<T>(&self, key: &str, transform: impl FnOnce(String) -> T, default: T) -> T {
        non_blank(self.env.lookup(key))
            .or_else(|| non_blank(self.properties.lookup(key)))
            .map(transform)
            .unwrap_or(default)
    }

    /// [`resolve`](Self::resolve) with the identity transform.
    pub fn string(&self, key: &str, default: &str) -> String {
        self.resolve(key, |v| v, default.to_owned())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
