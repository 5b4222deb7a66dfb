//! Checks that run before any request body is read.
//!
//! A [`GateChain`] is an ordered list of [`Gate`]s. Each one either lets the
//! request through or ends it with a [`PipelineError`]; the first rejection
//! wins and later gates never run. The default chain is API key, then rate
//! limit, so unauthenticated callers can't burn someone else's budget.

use std::net::SocketAddr;
use std::sync::Arc;

use subtle::ConstantTimeEq;
use tracing::warn;

use crate::error::PipelineError;
use crate::rate_limit::{RateClass, RateDecision, RateLimiter};

/// What the gates know about the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    /// Key from the `X-API-Key` header or `api_key` query parameter.
    pub api_key: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub class: RateClass,
}

impl CallerContext {
    pub fn new(class: RateClass) -> Self {
        Self {
            api_key: None,
            remote_addr: None,
            class,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Identity budgets are charged against: the API key when present,
    /// otherwise the remote IP.
    pub fn identity(&self) -> String {
        match (&self.api_key, self.remote_addr) {
            (Some(key), _) => format!("key:{key}"),
            (None, Some(addr)) => format!("ip:{}", addr.ip()),
            (None, None) => "anonymous".to_string(),
        }
    }

    fn remote_display(&self) -> String {
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// First four characters of a key, for logs. Never log the whole key.
pub fn key_prefix(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}...")
}

pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, ctx: &CallerContext) -> Result<(), PipelineError>;
}

/// Rejects callers without a configured API key.
pub struct ApiKeyGate {
    keys: Vec<Vec<u8>>,
}

impl ApiKeyGate {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.as_ref().as_bytes().to_vec())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Compares against every configured key without short-circuiting.
    pub fn is_valid(&self, candidate: &str) -> bool {
        let candidate = candidate.as_bytes();
        self.keys
            .iter()
            .fold(0u8, |found, key| found | key.as_slice().ct_eq(candidate).unwrap_u8())
            == 1
    }
}

impl Gate for ApiKeyGate {
    fn name(&self) -> &'static str {
        "api_key"
    }

    fn check(&self, ctx: &CallerContext) -> Result<(), PipelineError> {
        match ctx.api_key.as_deref() {
            None | Some("") => {
                warn!(
                    target: "security",
                    remote_addr = %ctx.remote_display(),
                    class = %ctx.class,
                    "api_key_missing"
                );
                Err(PipelineError::AuthRequired)
            }
            Some(key) if self.is_valid(key) => Ok(()),
            Some(key) => {
                warn!(
                    target: "security",
                    remote_addr = %ctx.remote_display(),
                    key_prefix = %key_prefix(key),
                    class = %ctx.class,
                    "api_key_invalid"
                );
                Err(PipelineError::AuthInvalid)
            }
        }
    }
}

/// Charges the request against the caller's budget for its class.
pub struct RateLimitGate {
    limiter: Arc<dyn RateLimiter>,
}

impl RateLimitGate {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Gate for RateLimitGate {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn check(&self, ctx: &CallerContext) -> Result<(), PipelineError> {
        match self.limiter.check(&ctx.identity(), ctx.class) {
            RateDecision::Allowed { .. } => Ok(()),
            RateDecision::Limited { retry_after } => {
                warn!(
                    remote_addr = %ctx.remote_display(),
                    key_prefix = %ctx.api_key.as_deref().map(key_prefix).unwrap_or_default(),
                    class = %ctx.class,
                    retry_after_secs = retry_after.as_secs(),
                    "rate_limited"
                );
                Err(PipelineError::RateLimited {
                    class: ctx.class,
                    retry_after,
                })
            }
        }
    }
}

/// Ordered gates; runs until the first rejection.
#[derive(Clone, Default)]
pub struct GateChain {
    gates: Vec<Arc<dyn Gate>>,
}

impl GateChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// API key check followed by rate limiting.
    pub fn standard(keys: &[String], limiter: Arc<dyn RateLimiter>) -> Self {
        Self::new()
            .with(ApiKeyGate::new(keys))
            .with(RateLimitGate::new(limiter))
    }

    pub fn with<G: Gate + 'static>(mut self, gate: G) -> Self {
        self.gates.push(Arc::new(gate));
        self
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Names of the gates, in the order they run.
    pub fn names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    pub fn run(&self, ctx: &CallerContext) -> Result<(), PipelineError> {
        self.gates.iter().try_for_each(|gate| gate.check(ctx))
    }
}
