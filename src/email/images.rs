//! Image proxy rewriting
//!
//! Some mail clients penalise third-party image hosts, so therapist profile
//! photos are served through a same-domain proxy path. This is a pure string
//! rewrite; nothing is fetched.

use crate::config::Config;
use crate::email::{EmailError, EmailResult};
use regex::{Captures, Regex};
use std::borrow::Cow;

/// Rewrites object-storage photo URLs to the site's image proxy
#[derive(Debug, Clone)]
pub struct ImageProxy {
    pattern: Regex,
    proxy_base: String,
}

impl ImageProxy {
    /// Build from the bucket name and an absolute proxy base URL.
    ///
    /// Matches `https://<project>.supabase.co/storage/v1/object/public/<bucket>/<path>`
    /// and, when given, the same path under `public_url`.
    pub fn new(bucket: &str, proxy_base: &str, public_url: Option<&str>) -> EmailResult<Self> {
        let bucket = regex::escape(bucket.trim_matches('/'));

        let mut prefixes = vec![format!(
            r"https?://[A-Za-z0-9-]+\.supabase\.co/storage/v1/object/public/{}/",
            bucket
        )];
        if let Some(url) = public_url.map(|u| u.trim_end_matches('/')).filter(|u| !u.is_empty()) {
            prefixes.push(format!("{}/{}/", regex::escape(url), bucket));
        }

        let pattern = format!(
            r#"(?:{})([^\s"'<>()?#]+)(?:\?[^\s"'<>()#]*)?"#,
            prefixes.join("|")
        );

        let pattern = Regex::new(&pattern)
            .map_err(|e| EmailError::Config(format!("invalid image proxy pattern: {}", e)))?;

        Ok(Self {
            pattern,
            proxy_base: proxy_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> EmailResult<Self> {
        Self::new(
            &config.storage.profile_bucket,
            &config.site.image_proxy_base(),
            config.storage.public_url.as_deref(),
        )
    }

    /// Replace every matching URL with `<proxy_base>/<object path>`,
    /// dropping any query string.
    pub fn rewrite<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(input, |caps: &Captures| {
            format!("{}/{}", self.proxy_base, &caps[1])
        })
    }

    pub fn proxy_base(&self) -> &str {
        &self.proxy_base
    }
}
