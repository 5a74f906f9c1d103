use std::{env, fmt::Display, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use rand::{distributions::Alphanumeric, Rng};
use usta_common::{helpers::parse_pairs, Secret};
use usta_engine::{
    helpers::{CommissionRate, CommissionSchedule, DEFAULT_FALLBACK_RATE},
    MarketplacePolicy,
    RejectionPolicy,
};

use crate::helpers::secrets_match;

const DEFAULT_USTA_HOST: &str = "127.0.0.1";
const DEFAULT_USTA_PORT: u16 = 8370;
const DEFAULT_ESCALATION_INTERVAL: StdDuration = StdDuration::from_secs(60);
const DEFAULT_COMMISSION_TIERS: &str = "100:12,9999:8";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Admins authenticate against the HTTP surface with one of these tokens
    pub admin_tokens: AdminTokens,
    /// Master key for encrypting payout card numbers at rest
    pub pii_key: Secret<String>,
    /// How often the escalation worker looks for overdue receipts and expired blocks
    pub escalation_interval: StdDuration,
    pub policy: MarketplacePolicy,
}

#[derive(Clone, Debug)]
pub struct AdminToken {
    pub admin_id: i64,
    pub token: Secret<String>,
}

#[derive(Clone, Debug, Default)]
pub struct AdminTokens(Vec<AdminToken>);

impl AdminTokens {
    pub fn new(tokens: Vec<AdminToken>) -> Self {
        Self(tokens)
    }

    /// Resolves an admin token to the admin it belongs to.
    pub fn admin_for_token(&self, token: &str) -> Option<i64> {
        self.0.iter().find(|t| !t.token.is_empty() && secrets_match(t.token.reveal(), token)).map(|t| t.admin_id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_USTA_HOST.to_string(),
            port: DEFAULT_USTA_PORT,
            database_url: String::default(),
            admin_tokens: AdminTokens::default(),
            pii_key: Secret::default(),
            escalation_interval: DEFAULT_ESCALATION_INTERVAL,
            policy: MarketplacePolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("USTA_HOST").ok().unwrap_or_else(|| DEFAULT_USTA_HOST.into());
        let port = env::var("USTA_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for USTA_PORT. {e} Using the default, {DEFAULT_USTA_PORT}, \
                         instead."
                    );
                    DEFAULT_USTA_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_USTA_PORT);
        let database_url = env::var("USTA_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ USTA_DATABASE_URL is not set. Please set it to the URL for the Usta database.");
            String::default()
        });
        let admin_tokens = configure_admin_tokens();
        let pii_key = configure_pii_key();
        let escalation_interval = env_or("USTA_ESCALATION_INTERVAL", DEFAULT_ESCALATION_INTERVAL.as_secs());
        let escalation_interval = StdDuration::from_secs(escalation_interval.max(1));
        let policy = configure_policy();
        Self { host, port, database_url, admin_tokens, pii_key, escalation_interval, policy }
    }
}

/// Reads and parses an environment variable, falling back to `default` with a log message if it is missing or
/// invalid.
fn env_or<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name}: {s}. {e}. Using the default value of {default}.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

fn configure_admin_tokens() -> AdminTokens {
    let Ok(value) = env::var("USTA_ADMIN_TOKENS") else {
        warn!("🪛️ USTA_ADMIN_TOKENS is not set. The admin API will refuse every request.");
        return AdminTokens::default();
    };
    match parse_pairs::<i64, String>(&value) {
        Ok(pairs) => {
            let tokens = pairs
                .into_iter()
                .filter(|(_, token)| !token.is_empty())
                .map(|(admin_id, token)| AdminToken { admin_id, token: Secret::new(token) })
                .collect::<Vec<_>>();
            info!("🪛️ {} admin tokens configured", tokens.len());
            AdminTokens::new(tokens)
        },
        Err(_) => {
            // The offending item probably contains a token, so it is not echoed back
            error!("🪛️ USTA_ADMIN_TOKENS is malformed. Use 'admin_id:token' pairs separated by commas.");
            AdminTokens::default()
        },
    }
}

fn configure_pii_key() -> Secret<String> {
    match env::var("USTA_PII_KEY") {
        Ok(key) if !key.is_empty() => Secret::new(key),
        _ => {
            warn!(
                "🚨️🚨️🚨️ USTA_PII_KEY has not been set. I'm using a random value for this session. Payout cards stored \
                 now cannot be read after a restart. DO NOT operate on production like this. 🚨️🚨️🚨️"
            );
            let key = rand::thread_rng().sample_iter(&Alphanumeric).take(48).map(char::from).collect::<String>();
            Secret::new(key)
        },
    }
}

fn configure_policy() -> MarketplacePolicy {
    let defaults = MarketplacePolicy::default();
    let fallback = env_or::<CommissionRate>("USTA_DEFAULT_COMMISSION_RATE", DEFAULT_FALLBACK_RATE);
    let commission = match env::var("USTA_COMMISSION_TIERS") {
        Ok(tiers) => CommissionSchedule::parse(&tiers, fallback).unwrap_or_else(|e| {
            warn!("🪛️ Invalid USTA_COMMISSION_TIERS ({tiers}). {e}. Using the default of {DEFAULT_COMMISSION_TIERS}.");
            default_schedule(fallback)
        }),
        Err(_) => default_schedule(fallback),
    };
    let search_radius_km = env_or("USTA_SEARCH_RADIUS_KM", defaults.search_radius_km);
    let mut expanded_radius_km = env_or("USTA_EXPANDED_RADIUS_KM", defaults.expanded_radius_km);
    if expanded_radius_km < search_radius_km {
        warn!(
            "🪛️ USTA_EXPANDED_RADIUS_KM ({expanded_radius_km}) is smaller than USTA_SEARCH_RADIUS_KM \
             ({search_radius_km}). The wider search is disabled."
        );
        expanded_radius_km = search_radius_km;
    }
    let dispatch_fanout = env_or("USTA_DISPATCH_FANOUT", defaults.dispatch_fanout).max(1);
    let card_receipt_window =
        Duration::hours(env_or("USTA_CARD_RECEIPT_WINDOW", defaults.card_receipt_window.num_hours()));
    let commission_window = Duration::hours(env_or("USTA_COMMISSION_WINDOW", defaults.commission_window.num_hours()));
    let rejection_policy = env_or::<RejectionPolicy>("USTA_REJECTION_POLICY", defaults.rejection_policy);
    let pending_action_ttl =
        Duration::minutes(env_or("USTA_PENDING_ACTION_TTL", defaults.pending_action_ttl.num_minutes()));
    let max_escalation_attempts = env_or("USTA_MAX_ESCALATION_ATTEMPTS", defaults.max_escalation_attempts).max(1);
    let policy = MarketplacePolicy {
        commission,
        search_radius_km,
        expanded_radius_km,
        dispatch_fanout,
        card_receipt_window,
        commission_window,
        rejection_policy,
        pending_action_ttl,
        max_escalation_attempts,
        ..defaults
    };
    info!(
        "🪛️ Marketplace policy: search {}km/{}km, fan-out {}, receipt window {}h, commission window {}h, on rejection: \
         {}",
        policy.search_radius_km,
        policy.expanded_radius_km,
        policy.dispatch_fanout,
        policy.card_receipt_window.num_hours(),
        policy.commission_window.num_hours(),
        policy.rejection_policy
    );
    policy
}

fn default_schedule(fallback: CommissionRate) -> CommissionSchedule {
    CommissionSchedule::parse(DEFAULT_COMMISSION_TIERS, fallback).unwrap_or_default()
}
