//! Spawn parameters handed from a State to its child process.

use std::collections::BTreeMap;

/// Well-known parameter keys.
pub mod keys {
    /// Owning layer's name
    pub const LAYER: &str = "layer";
    /// Paired state/kernel name
    pub const NAME: &str = "name";
    /// Kernel → State channel, rendered as `producer -> consumer`
    pub const UPLINK: &str = "uplink";
    /// State → Kernel channel, rendered as `producer -> consumer`
    pub const DOWNLINK: &str = "downlink";
    /// Deadline for the kernel's blocking parameter RPCs
    pub const RPC_TIMEOUT_MS: &str = "rpc_timeout_ms";
    /// Optional bound on how long an idle kernel waits to be scheduled
    pub const ACTIVATION_TIMEOUT_MS: &str = "activation_timeout_ms";
}

/// Ordered string map passed to a spawned process.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpawnParams {
    entries: BTreeMap<String, String>,
}

impl SpawnParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as `--key=value` command-line arguments, sorted by key.
    pub fn to_args(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("--{}={}", k, v))
            .collect()
    }

    /// Parse arguments produced by [`SpawnParams::to_args`].
    ///
    /// Arguments that are not of the `--key=value` form are ignored.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut params = Self::new();
        for arg in args {
            let arg = arg.as_ref();
            let Some(body) = arg.strip_prefix("--") else {
                continue;
            };
            if let Some((key, value)) = body.split_once('=') {
                if !key.is_empty() {
                    params.insert(key, value);
                }
            }
        }
        params
    }
}
