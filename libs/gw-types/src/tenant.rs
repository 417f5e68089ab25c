use serde::{Deserialize, Serialize};

/// One HTTP webhook destination configured by a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    pub secret: String,
    pub is_active: bool,
}

/// Business-profile snapshot merged best-effort from the upstream network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub working_hours: Option<String>,
    #[serde(default)]
    pub location_url: Option<String>,
    #[serde(default)]
    pub shipping_details: Option<String>,
    #[serde(default)]
    pub instagram_url: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub mobile_numbers: Vec<String>,
    #[serde(default)]
    pub last_updated: Option<i64>,
}

/// Per-tenant configuration: webhook destinations, exclusion list, business info.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub username: String,
    #[serde(default)]
    pub webhooks: Vec<Webhook>,
    #[serde(default)]
    pub excluded_numbers: Vec<String>,
    #[serde(default)]
    pub business_info: BusinessInfo,
}

impl TenantConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn active_webhooks(&self) -> impl Iterator<Item = &Webhook> {
        self.webhooks.iter().filter(|w| w.is_active)
    }

    pub fn is_excluded(&self, e164: &str) -> bool {
        self.excluded_numbers.iter().any(|n| n == e164)
    }
}
