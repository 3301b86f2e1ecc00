use std::fs;
use std::io::Write as IoWrite;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use clap::Parser;
use colored::*;
use reqwest::Client;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use lineup_catalog::config::load_config;
use lineup_catalog::similarity::names_match;
use lineup_catalog::PgCatalog;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "lineup-sync",
    about = "Fill in missing SoundCloud links from the SoundCloud API"
)]
struct Args {
    /// Only artists whose name starts with this prefix (case insensitive)
    #[arg(long)]
    only: Option<String>,

    /// Limit to first N artists (0 = no limit)
    #[arg(long, default_value = "0")]
    limit: usize,
}

// ---------------------------------------------------------------------------
// SoundCloud API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ScTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ScUser {
    #[allow(dead_code)]
    id: u64,
    username: String,
    permalink_url: String,
}

// ---------------------------------------------------------------------------
// Token cache
// ---------------------------------------------------------------------------

const SC_TOKEN_URL: &str = "https://secure.soundcloud.com/oauth/token";
const SC_API_BASE: &str = "https://api.soundcloud.com";

struct ScCredentials {
    client_id: String,
    client_secret: String,
}

/// Client-credentials token with its expiry. Constructed in `main` and
/// handed to the job; the cached token is refreshed shortly before it runs
/// out.
struct TokenCache {
    credentials: ScCredentials,
    access_token: Option<String>,
    expires_at: Instant,
}

impl TokenCache {
    fn new(credentials: ScCredentials) -> Self {
        Self {
            credentials,
            access_token: None,
            expires_at: Instant::now(),
        }
    }

    fn cached(&self) -> Option<&str> {
        if Instant::now() < self.expires_at {
            self.access_token.as_deref()
        } else {
            None
        }
    }

    fn store(&mut self, token: String, expires_in: u64) {
        self.access_token = Some(token);
        // refresh a minute early rather than racing the expiry
        self.expires_at = Instant::now() + Duration::from_secs(expires_in.saturating_sub(60));
    }

    async fn token(&mut self, client: &Client) -> Result<String, String> {
        if let Some(token) = self.cached() {
            return Ok(token.to_string());
        }

        let resp = client
            .post(SC_TOKEN_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| format!("Token request failed: {}", e))?;

        if resp.status().as_u16() != 200 {
            return Err(format!("Token request failed: HTTP {}", resp.status()));
        }

        let token: ScTokenResponse = resp
            .json()
            .await
            .map_err(|e| format!("Token parse error: {}", e))?;
        self.store(token.access_token.clone(), token.expires_in);
        Ok(token.access_token)
    }
}

// ---------------------------------------------------------------------------
// Adaptive rate limiter
// ---------------------------------------------------------------------------

struct RateLimiter {
    delay_ms: u64,
    min_delay: u64,
    max_delay: u64,
    last_request: Instant,
}

impl RateLimiter {
    fn new() -> Self {
        Self {
            delay_ms: 500,
            min_delay: 500,
            max_delay: 10000,
            last_request: Instant::now(),
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed().as_millis() as u64;
        if elapsed < self.delay_ms {
            sleep(Duration::from_millis(self.delay_ms - elapsed)).await;
        }
        self.last_request = Instant::now();
    }

    fn on_success(&mut self) {
        if self.delay_ms > self.min_delay {
            self.delay_ms = (self.delay_ms * 95 / 100).max(self.min_delay);
        }
    }

    fn on_rate_limit(&mut self) {
        self.delay_ms = (self.delay_ms * 2).min(self.max_delay);
    }
}

// ---------------------------------------------------------------------------
// SoundCloud client
// ---------------------------------------------------------------------------

async fn sc_get(
    client: &Client,
    url: &str,
    tokens: &mut TokenCache,
    limiter: &mut RateLimiter,
) -> Result<String, String> {
    let max_attempts = 5;
    let mut wait_time = limiter.delay_ms;

    for attempt in 0..max_attempts {
        limiter.wait().await;
        let token = tokens.token(client).await?;

        let resp = client
            .get(url)
            .header("Authorization", format!("OAuth {}", token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = resp.status().as_u16();

        if status == 200 {
            limiter.on_success();
            return resp
                .text()
                .await
                .map_err(|e| format!("Read body failed: {}", e));
        }

        if status == 401 {
            // token went stale early; drop it and retry with a fresh one
            tokens.access_token = None;
            tokens.expires_at = Instant::now();
            continue;
        }

        if status == 429 || status == 503 {
            limiter.on_rate_limit();
            if attempt < max_attempts - 1 {
                wait_time = (wait_time * 2).min(60000);
                eprint!(
                    "\r  Rate limited - waiting {:.1}s before retry {}/{}...          ",
                    wait_time as f64 / 1000.0,
                    attempt + 1,
                    max_attempts - 1
                );
                sleep(Duration::from_millis(wait_time)).await;
                continue;
            } else {
                eprintln!();
                return Err(format!(
                    "SoundCloud API still rate limiting after {} retries",
                    max_attempts
                ));
            }
        }

        return Err(format!("HTTP {} for {}", status, url));
    }

    Err("Max retries exceeded".to_string())
}

async fn sc_find_artist(
    client: &Client,
    name: &str,
    tokens: &mut TokenCache,
    limiter: &mut RateLimiter,
) -> Result<Option<ScUser>, String> {
    let url = format!(
        "{}/users?q={}&limit=5",
        SC_API_BASE,
        urlencoding::encode(name)
    );
    let body = sc_get(client, &url, tokens, limiter).await?;
    let users: Vec<ScUser> =
        serde_json::from_str(&body).map_err(|e| format!("Parse error: {}", e))?;

    // exact username first, then a close one
    if let Some(exact) = users
        .iter()
        .position(|u| u.username.to_lowercase() == name.to_lowercase())
    {
        let mut users = users;
        return Ok(Some(users.swap_remove(exact)));
    }
    Ok(users.into_iter().find(|u| names_match(&u.username, name)))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();

    println!("{}", "Lineup SoundCloud Sync".bright_cyan().bold());
    println!("{}", "======================".bright_black());
    println!();

    let error_log = Mutex::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open("errors.log")
            .expect("Cannot open errors.log"),
    );

    let config = load_config();
    let credentials = ScCredentials {
        client_id: std::env::var("SOUNDCLOUD_CLIENT_ID")
            .expect("SOUNDCLOUD_CLIENT_ID not set in web/.env"),
        client_secret: std::env::var("SOUNDCLOUD_CLIENT_SECRET")
            .expect("SOUNDCLOUD_CLIENT_SECRET not set in web/.env"),
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database. Is PostgreSQL running?");
    let store = PgCatalog::new(pool);

    let client = Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .expect("Failed to create HTTP client");

    let mut tokens = TokenCache::new(credentials);
    let mut limiter = RateLimiter::new();

    let artists = match store
        .artists_missing_soundcloud(args.only.as_deref(), args.limit)
        .await
    {
        Ok(artists) => artists,
        Err(e) => {
            eprintln!("{} Failed to fetch artists: {}", "✗".red(), e);
            std::process::exit(1);
        }
    };

    if artists.is_empty() {
        println!("{} Every artist already has a SoundCloud link", "✓".green());
        return;
    }

    println!(
        "Artists to check: {}",
        artists.len().to_string().bright_white()
    );
    println!();

    let start = Instant::now();
    let total = artists.len();
    let mut linked = 0u32;
    let mut unmatched = 0u32;
    let mut failed: Vec<(String, String)> = Vec::new();

    for (idx, (artist_id, artist_name)) in artists.iter().enumerate() {
        print!(
            "{} {}... ",
            format!("[{}/{}]", idx + 1, total).bright_blue().bold(),
            artist_name.bright_cyan()
        );
        std::io::Write::flush(&mut std::io::stdout()).ok();

        match sc_find_artist(&client, artist_name, &mut tokens, &mut limiter).await {
            Ok(Some(user)) => {
                match store.set_soundcloud_url(artist_id, &user.permalink_url).await {
                    Ok(()) => {
                        linked += 1;
                        println!("{} {}", "✓".green(), user.permalink_url.bright_black());
                    }
                    Err(e) => {
                        failed.push((artist_name.clone(), format!("DB error: {}", e)));
                        if let Ok(mut f) = error_log.lock() {
                            writeln!(
                                f,
                                "[SYNC] DB error saving SoundCloud url for '{}': {}",
                                artist_name, e
                            )
                            .ok();
                        }
                        println!("{} {}", "✗".red(), e.to_string().bright_red());
                    }
                }
            }
            Ok(None) => {
                unmatched += 1;
                println!("{} no match", "✗".yellow());
            }
            Err(e) => {
                failed.push((artist_name.clone(), e.clone()));
                if let Ok(mut f) = error_log.lock() {
                    writeln!(f, "[SYNC] Lookup failed for '{}': {}", artist_name, e).ok();
                }
                println!("{} {}", "✗".red(), e.bright_red());
            }
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("{}", "═".repeat(60).bright_black());
    println!();
    println!("{} {:.1}s", "Completed in:".white().bold(), elapsed.as_secs_f64());
    println!("  {} {}", "Linked:".green(), linked);
    if unmatched > 0 {
        println!("  {} {}", "No match:".yellow(), unmatched);
    }
    if !failed.is_empty() {
        println!("  {} {}", "Failed:".red(), failed.len());
        println!();
        println!("{}", "Failed Artists:".red().bold());
        for (name, reason) in &failed {
            println!(
                "  {} {} - {}",
                "✗".red(),
                name.bright_white(),
                reason.bright_black()
            );
        }
        println!();
        println!("{}: Check errors.log for details", "Note".yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_cache_expires_and_refreshes_early() {
        let mut cache = TokenCache::new(ScCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        });
        assert!(cache.cached().is_none());

        cache.store("t1".into(), 3600);
        assert_eq!(cache.cached(), Some("t1"));

        // a token about to expire within the safety margin is not reused
        cache.store("t2".into(), 30);
        assert!(cache.cached().is_none());
    }

    #[test]
    fn rate_limiter_backs_off_and_recovers() {
        let mut limiter = RateLimiter::new();
        let base = limiter.delay_ms;

        limiter.on_rate_limit();
        assert_eq!(limiter.delay_ms, base * 2);
        limiter.on_rate_limit();
        assert_eq!(limiter.delay_ms, base * 4);

        limiter.on_success();
        assert!(limiter.delay_ms < base * 4);
        for _ in 0..200 {
            limiter.on_success();
        }
        assert_eq!(limiter.delay_ms, limiter.min_delay);
    }
}
