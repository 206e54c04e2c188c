//! Bot filter and client identification
//!
//! Rejects user agents matching the configured automation signatures and
//! tags every admitted request with a [`ClientIp`] for logging and rate
//! limiting.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use regex_lite::Regex;

use crate::AppState;
use vejovis_common::{
    config::GuardConfig,
    errors::{AppError, Result},
};

/// Best-effort client address taken from proxy headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Compiled user-agent signature
#[derive(Debug)]
pub struct BotGuard {
    signature: Option<Regex>,
}

impl BotGuard {
    pub fn from_config(config: &GuardConfig) -> Result<Self> {
        if !config.block_bots || config.bot_patterns.is_empty() {
            return Ok(Self { signature: None });
        }

        let pattern = format!("(?i){}", config.bot_patterns.join("|"));
        let signature = Regex::new(&pattern)
            .map_err(|e| AppError::configuration(format!("invalid guard.bot_patterns: {}", e)))?;

        Ok(Self {
            signature: Some(signature),
        })
    }

    pub fn is_automated(&self, user_agent: &str) -> bool {
        self.signature
            .as_ref()
            .is_some_and(|signature| signature.is_match(user_agent))
    }
}

/// First `X-Forwarded-For` entry, else `CF-Connecting-IP`, else "unknown"
pub fn client_ip(headers: &HeaderMap) -> String {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header_value("x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_value("cf-connecting-ip"))
        .unwrap_or("unknown")
        .to_string()
}

/// Guard middleware
pub async fn bot_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let ip = client_ip(request.headers());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if state.guard.is_automated(user_agent) {
        tracing::warn!(client_ip = %ip, user_agent, "Blocked automated client");
        return Err(AppError::Forbidden {
            message: "Automated access not permitted".to_string(),
        });
    }

    request.extensions_mut().insert(ClientIp(ip));
    Ok(next.run(request).await)
}
