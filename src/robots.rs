//! C2 - Robots Oracle: per-origin robots.txt cache with allow/deny lookups.
//!
//! On any outcome other than a 200 response (non-200 status, network error, timeout),
//! the allow-all sentinel is cached too, so a hostile or absent robots.txt is fetched at
//! most once per origin per run, unlike the original implementation, which returns
//! "allow" on failure but forgets to populate its cache, re-fetching robots.txt on every
//! subsequent first-touch race for that origin (see DESIGN.md).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use url::Url;

#[derive(Debug, Clone)]
enum Rule {
    Disallow(String),
    Allow(String),
}

#[derive(Debug, Default)]
struct RobotsRules {
    rules: Vec<(String, Rule)>,
}

impl RobotsRules {
    fn allow_all() -> Self {
        Self { rules: Vec::new() }
    }

    /// Minimal robots.txt parser: tracks `User-agent: *` blocks and their
    /// `Allow`/`Disallow` lines. Unknown directives are ignored. Parse errors default to
    /// allow (§4.2).
    fn parse(body: &str) -> Self {
        let mut rules = Vec::new();
        let mut applies = false;
        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "user-agent" => applies = value == "*",
                "disallow" if applies && !value.is_empty() => {
                    rules.push((value.to_string(), Rule::Disallow(value.to_string())))
                }
                "allow" if applies && !value.is_empty() => {
                    rules.push((value.to_string(), Rule::Allow(value.to_string())))
                }
                _ => {}
            }
        }
        Self { rules }
    }

    fn allows(&self, path: &str) -> bool {
        // Longest-matching-prefix wins, the conventional robots.txt precedence rule.
        let mut best: Option<(&str, bool)> = None;
        for (prefix, rule) in &self.rules {
            if path.starts_with(prefix.as_str())
                && best.is_none_or(|(b, _)| prefix.len() > b.len())
            {
                best = Some((
                    prefix.as_str(),
                    matches!(rule, Rule::Allow(_)),
                ));
            }
        }
        best.map(|(_, allow)| allow).unwrap_or(true)
    }
}

pub struct RobotsOracle {
    client: reqwest::Client,
    cache: DashMap<String, Arc<OnceCell<RobotsRules>>>,
}

impl RobotsOracle {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            cache: DashMap::new(),
        }
    }

    /// `allow(url, agent) → bool`. The first caller for an origin blocks on the fetch;
    /// concurrent/subsequent callers reuse the cached (or in-flight) result.
    pub async fn allow(&self, url: &Url, _agent: &str) -> bool {
        let origin = match (url.scheme(), url.host_str(), url.port_or_known_default()) {
            (scheme, Some(host), Some(port)) => format!("{scheme}://{host}:{port}"),
            _ => return true,
        };

        let cell = self
            .cache
            .entry(origin.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let rules = cell
            .get_or_init(|| async { self.fetch(&origin).await })
            .await;

        rules.allows(url.path())
    }

    async fn fetch(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        let response = self
            .client
            .get(&robots_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => RobotsRules::parse(&body),
                Err(_) => RobotsRules::allow_all(),
            },
            _ => RobotsRules::allow_all(),
        }
    }
}
