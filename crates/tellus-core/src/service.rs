// Remote provider (service) entity

use crate::error::Result;
use crate::ident::validate_identifier;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol spoken by a registered provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ServiceType {
    #[serde(rename = "wps")]
    Wps,
    #[serde(rename = "wps-rest")]
    WpsRest,
    #[serde(rename = "esgf-cwt")]
    EsgfCwt,
}

/// A registered remote provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub public: bool,
    /// Opaque credentials handle, never interpreted by the engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
}

impl Service {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        service_type: ServiceType,
    ) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self {
            name,
            url: url.into(),
            service_type,
            public: false,
            auth: None,
        })
    }

    /// Summary JSON for provider listings (credentials never leave the
    /// record)
    pub fn summary_json(&self) -> Value {
        serde_json::json!({
            "id": self.name,
            "url": self.url,
            "type": self.service_type,
            "public": self.public,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_is_slug_checked() {
        assert!(Service::new("provider-a", "https://x/wps", ServiceType::Wps).is_ok());
        assert!(Service::new("p!", "https://x/wps", ServiceType::Wps).is_err());
    }

    #[test]
    fn test_summary_omits_auth() {
        let mut service =
            Service::new("provider-a", "https://x/wps", ServiceType::Wps).unwrap();
        service.auth = Some(serde_json::json!({"token": "secret"}));
        let summary = service.summary_json();
        assert!(summary.get("auth").is_none());
    }
}
