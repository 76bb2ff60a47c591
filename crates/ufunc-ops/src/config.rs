//! Dispatch configuration.

/// Environment variable selecting the broadcast policy.
pub const BROADCAST_ENV: &str = "UFUNC_RS_BROADCAST";

/// Which operand shapes a ufunc call accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastPolicy {
    /// Full NumPy broadcasting; the result takes the broadcast shape.
    #[default]
    Numpy,
    /// Every array operand (and the output) must have the same shape.
    /// Scalars are still accepted.
    EqualShapes,
}

impl BroadcastPolicy {
    /// Parse `"numpy"` or `"equal"`, case-insensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "numpy" => Some(BroadcastPolicy::Numpy),
            "equal" => Some(BroadcastPolicy::EqualShapes),
            _ => None,
        }
    }
}

/// Settings a `Context` applies to every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub broadcast: BroadcastPolicy,
}

impl Config {
    /// Read the configuration from the environment.
    ///
    /// `UFUNC_RS_BROADCAST` (`"numpy"` or `"equal"`) selects the broadcast
    /// policy; unset or unrecognized values fall through to the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let broadcast = lookup(BROADCAST_ENV)
            .and_then(|v| BroadcastPolicy::parse(&v))
            .unwrap_or_default();
        Self { broadcast }
    }

    pub fn with_broadcast(mut self, broadcast: BroadcastPolicy) -> Self {
        self.broadcast = broadcast;
        self
    }
}
