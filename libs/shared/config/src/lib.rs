use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_token: String,
    pub recheck_conflicts_on_update: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        // Loading Env Vars
        dotenv::dotenv().ok();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_token: env::var("SUPABASE_SERVICE_TOKEN")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_TOKEN not set, requests will use the anon key");
                    String::new()
                }),
            recheck_conflicts_on_update: env::var("SCHEDULING_RECHECK_ON_UPDATE")
                .map(|value| parse_flag(&value))
                .unwrap_or(false),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - appointment storage will stay in memory");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
    }

    /// Bearer token for PostgREST calls; falls back to the anon key.
    pub fn service_token(&self) -> &str {
        if self.supabase_service_token.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_token
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
