// Quote and bill entities
//
// The pricing model itself is a deployment concern; the engine only stores
// and retrieves these records through their repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A price quote for executing a process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub process: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub price: f64,
    pub currency: String,
    /// Estimated execution time in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl Quote {
    pub fn new(process: impl Into<String>, price: f64, currency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            process: process.into(),
            user: None,
            price,
            currency: currency.into(),
            estimated_time: None,
            valid_until: None,
            created: Utc::now(),
        }
    }
}

/// A bill issued for a completed job against a quote
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub quote: Uuid,
    pub job: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub price: f64,
    pub currency: String,
    pub created: DateTime<Utc>,
}

impl Bill {
    pub fn from_quote(quote: &Quote, job: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            quote: quote.id,
            job,
            user: quote.user.clone(),
            price: quote.price,
            currency: quote.currency.clone(),
            created: Utc::now(),
        }
    }
}
