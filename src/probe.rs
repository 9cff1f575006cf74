//! Website liveness probe.
//!
//! `probe` never fails: malformed URLs, DNS errors, TLS errors and timeouts
//! all resolve to `false`. A URL without a scheme is tried as `https://`
//! first and, when that fails, once more as `http://` on the same host/path.

use metrics::counter;
use reqwest::Client;

use crate::config::ProbePolicy;
use crate::error::LeadsError;

pub struct LivenessProbe {
    client: Client,
    policy: ProbePolicy,
}

impl LivenessProbe {
    pub fn new(policy: ProbePolicy, user_agent: &str) -> Result<Self, LeadsError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(policy.timeout())
            .connect_timeout(policy.timeout())
            .redirect(reqwest::redirect::Policy::limited(policy.max_redirects))
            .build()?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &ProbePolicy {
        &self.policy
    }

    /// URLs to try, in order. Empty input → nothing to try.
    pub fn candidate_urls(&self, url: &str) -> Vec<String> {
        candidate_urls(url, self.policy.insecure_fallback)
    }

    /// `true` when some candidate answers 2xx/3xx after redirects.
    pub async fn probe(&self, url: Option<&str>) -> bool {
        let Some(url) = url else {
            return false;
        };
        let candidates = self.candidate_urls(url);
        if candidates.is_empty() {
            return false;
        }

        counter!("leads_probe_total").increment(1);
        for candidate in &candidates {
            if self.check(candidate).await {
                counter!("leads_probe_alive_total").increment(1);
                return true;
            }
        }
        false
    }

    async fn check(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                let ok = status.is_success() || status.is_redirection();
                tracing::debug!(target: "leads", url, %status, ok, "probe answered");
                ok
            }
            Err(e) => {
                tracing::debug!(target: "leads", url, timeout = e.is_timeout(), error = %e, "probe failed");
                false
            }
        }
    }
}

/// Scheme normalization: bare hosts get `https://`; an `https://` URL gets an
/// `http://` twin when the fallback is enabled. `http://` is tried as-is.
pub fn candidate_urls(url: &str, insecure_fallback: bool) -> Vec<String> {
    let url = url.trim();
    if url.is_empty() {
        return Vec::new();
    }

    let lower = url.to_ascii_lowercase();
    let rest = if lower.starts_with("https://") {
        &url["https://".len()..]
    } else if lower.starts_with("http://") {
        return vec![url.to_string()];
    } else if lower.contains("://") {
        // Other schemes are not websites; one attempt, which will fail.
        return vec![url.to_string()];
    } else {
        url.trim_start_matches("//")
    };

    let mut out = vec![format!("https://{rest}")];
    if insecure_fallback {
        out.push(format!("http://{rest}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_secure_then_insecure() {
        assert_eq!(
            candidate_urls("example.com", true),
            vec!["https://example.com", "http://example.com"]
        );
        assert_eq!(candidate_urls("example.com", false), vec!["https://example.com"]);
    }

    #[test]
    fn explicit_schemes_are_respected() {
        assert_eq!(
            candidate_urls("HTTPS://Example.com/a?b=1", true),
            vec!["https://Example.com/a?b=1", "http://Example.com/a?b=1"]
        );
        assert_eq!(candidate_urls("http://example.com", true), vec!["http://example.com"]);
        assert_eq!(candidate_urls("ftp://example.com", true), vec!["ftp://example.com"]);
        assert!(candidate_urls("   ", true).is_empty());
    }

    #[tokio::test]
    async fn absent_or_garbage_urls_are_not_websites() {
        let probe = LivenessProbe::new(
            ProbePolicy {
                timeout_ms: 500,
                ..ProbePolicy::default()
            },
            "test",
        )
        .unwrap();
        assert!(!probe.probe(None).await);
        assert!(!probe.probe(Some("")).await);
        assert!(!probe.probe(Some("ht!tp:// not a url")).await);
        assert!(!probe.probe(Some("ftp://example.com")).await);
    }
}
