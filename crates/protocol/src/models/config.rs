use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

/// Cloud provider whose account is being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
}
impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
        }
    }
}
impl FromStr for Provider {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "aws" | "amazon" => Self::Aws,
            "azure" | "microsoft" => Self::Azure,
            "gcp" | "google" => Self::Gcp,
            other => exn::bail!(ErrorKind::UnknownProvider(other.to_string())),
        })
    }
}
impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Description of what to scan.
///
/// Built once by the caller and then only ever borrowed: there are no setters,
/// only consuming `with_*` builders. Serialized as the JSON request body of
/// both the streaming and the plain start endpoints.
///
/// ```
/// use tfscan_protocol::{Provider, ScanConfig};
///
/// let config = ScanConfig::new(Provider::Aws, "profile:prod")
///     .with_regions(["eu-west-1"])
///     .with_categories(["ec2", "s3"])
///     .with_name_filter("web-");
/// assert_eq!(config.categories(), ["ec2", "s3"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    provider: Provider,
    /// Reference to stored credentials (profile name, secret ID, ...), never
    /// the credentials themselves.
    credential_ref: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    regions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name_filter: Option<String>,
}

impl ScanConfig {
    pub fn new(provider: Provider, credential_ref: impl Into<String>) -> Self {
        Self {
            provider,
            credential_ref: credential_ref.into(),
            regions: Vec::new(),
            categories: Vec::new(),
            name_filter: None,
        }
    }

    /// Limit the scan to these regions. Empty means every region.
    pub fn with_regions(mut self, regions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    /// Limit the scan to these resource categories. Empty means everything.
    pub fn with_categories(mut self, categories: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_name_filter(mut self, filter: impl Into<String>) -> Self {
        let filter = filter.into();
        self.name_filter = (!filter.trim().is_empty()).then_some(filter);
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn credential_ref(&self) -> &str {
        &self.credential_ref
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn name_filter(&self) -> Option<&str> {
        self.name_filter.as_deref()
    }
}
