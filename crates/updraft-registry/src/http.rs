use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use updraft_core::PackageMetadata;

use crate::MetadataSource;

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

const ABBREVIATED_METADATA: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8";

#[derive(Debug, Clone)]
pub struct HttpRegistry {
    base_url: String,
    http: Client,
}

impl HttpRegistry {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("updraft/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to create registry HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn metadata_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, name.replace('/', "%2f"))
    }
}

impl MetadataSource for HttpRegistry {
    fn fetch_metadata(&self, name: &str) -> Result<Rc<PackageMetadata>> {
        let url = self.metadata_url(name);
        tracing::debug!(%url, "fetching registry metadata");

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, ABBREVIATED_METADATA)
            .send()
            .with_context(|| format!("failed fetching registry metadata for '{name}'"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(anyhow!(
                "registry responded {} for '{}': {}",
                status,
                name,
                body.chars().take(200).collect::<String>()
            ));
        }

        let body = response
            .text()
            .with_context(|| format!("failed reading registry response for '{name}'"))?;
        let metadata = PackageMetadata::from_json_str(&body)
            .with_context(|| format!("failed parsing registry metadata for '{name}'"))?;
        Ok(Rc::new(metadata))
    }
}
