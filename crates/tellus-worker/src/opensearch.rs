// OpenSearch EO-image input resolution
//
// A process payload can declare an input as an EO-image query through a
// well-known additionalParameters role. Before dispatch, the engine
// replaces the submitted AOI/TOI/collection triple with the list of file
// references resolved from the external catalogue, bounded by the input's
// max_occurs.

use crate::marshal::{parse_submitted_inputs, InputValue};
use serde_json::{json, Value};
use tellus_core::{EngineConfig, EngineError, MaxOccurs, Process, Result};
use tracing::{debug, info};

/// additionalParameters role marking an EO-image input
pub const OPENSEARCH_ROLE: &str = "http://www.opengis.net/eoc/applicationContext/inputMetadata";

/// Well-known companion input ids consumed by the resolution
pub const AOI_INPUT: &str = "aoi";
pub const TOI_START_INPUT: &str = "startDate";
pub const TOI_END_INPUT: &str = "endDate";

/// EO-image inputs declared by the deploy payload
pub fn detect_eo_inputs(payload: &Value) -> Vec<String> {
    let inputs = payload
        .get("processDescription")
        .and_then(|d| d.get("process"))
        .and_then(|p| p.get("inputs"))
        .and_then(Value::as_array);
    let Some(inputs) = inputs else {
        return Vec::new();
    };
    inputs
        .iter()
        .filter_map(|input| {
            let id = input.get("id").and_then(Value::as_str)?;
            let params = input.get("additionalParameters")?.as_array()?;
            let is_eo = params.iter().any(|block| {
                block.get("role").and_then(Value::as_str) == Some(OPENSEARCH_ROLE)
            });
            is_eo.then(|| id.to_string())
        })
        .collect()
}

/// Resolve every EO-image input of a job's submitted inputs, returning the
/// rewritten inputs. Jobs without EO inputs pass through untouched.
pub async fn resolve_eo_inputs(
    process: &Process,
    raw_inputs: &Value,
    config: &EngineConfig,
) -> Result<Value> {
    let eo_ids = detect_eo_inputs(&process.payload);
    if eo_ids.is_empty() {
        return Ok(raw_inputs.clone());
    }
    let endpoint = config.opensearch_url.as_deref().ok_or_else(|| {
        EngineError::execution("process declares EO inputs but no OpenSearch endpoint is configured")
    })?;
    let resolver = OpenSearchResolver::new(endpoint, config)?;

    let occurrences = parse_submitted_inputs(raw_inputs)?;
    let mut rewritten: Vec<Value> = Vec::new();
    for (id, value) in &occurrences {
        if eo_ids.contains(id) {
            let collection = match value {
                InputValue::Literal(v) => v.as_str().map(String::from).ok_or_else(|| {
                    EngineError::execution(format!(
                        "EO input '{id}' must carry a collection identifier"
                    ))
                })?,
                InputValue::Href { href, .. } => href.clone(),
            };
            let aoi = find_literal(&occurrences, AOI_INPUT);
            let toi = (
                find_literal(&occurrences, TOI_START_INPUT),
                find_literal(&occurrences, TOI_END_INPUT),
            );
            let max = process
                .inputs
                .iter()
                .find(|io| &io.id == id)
                .map(|io| io.max_occurs)
                .unwrap_or(MaxOccurs::Count(1));
            let files = resolver
                .resolve(&collection, aoi.as_deref(), &toi, max)
                .await?;
            if files.is_empty() {
                return Err(EngineError::execution(format!(
                    "OpenSearch returned no products for EO input '{id}' (collection '{collection}')"
                )));
            }
            info!(input = %id, collection = %collection, count = files.len(), "Resolved EO input");
            for href in files {
                rewritten.push(json!({"id": id, "href": href}));
            }
        } else if id != AOI_INPUT && id != TOI_START_INPUT && id != TOI_END_INPUT {
            rewritten.push(occurrence_json(id, value));
        }
    }
    Ok(Value::Array(rewritten))
}

fn occurrence_json(id: &str, value: &InputValue) -> Value {
    match value {
        InputValue::Literal(v) => json!({"id": id, "data": v}),
        InputValue::Href { href, mime_type } => match mime_type {
            Some(mime_type) => json!({"id": id, "href": href, "format": mime_type}),
            None => json!({"id": id, "href": href}),
        },
    }
}

fn find_literal(occurrences: &[(String, InputValue)], id: &str) -> Option<String> {
    occurrences.iter().find_map(|(oid, value)| {
        if oid != id {
            return None;
        }
        match value {
            InputValue::Literal(Value::String(s)) => Some(s.clone()),
            InputValue::Literal(other) => Some(other.to_string()),
            InputValue::Href { href, .. } => Some(href.clone()),
        }
    })
}

/// Client for the external OpenSearch catalogue
pub struct OpenSearchResolver {
    http: reqwest::Client,
    endpoint: String,
}

impl OpenSearchResolver {
    pub fn new(endpoint: &str, config: &EngineConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(|e| EngineError::communication(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    /// Query the catalogue and collect product file references, bounded by
    /// the declared cardinality.
    pub async fn resolve(
        &self,
        collection: &str,
        aoi: Option<&str>,
        toi: &(Option<String>, Option<String>),
        max_occurs: MaxOccurs,
    ) -> Result<Vec<String>> {
        let limit = match max_occurs {
            MaxOccurs::Count(n) => n as usize,
            MaxOccurs::Unbounded => 100,
        };
        let mut query: Vec<(&str, String)> = vec![
            ("parentIdentifier", collection.to_string()),
            ("maximumRecords", limit.to_string()),
            ("httpAccept", "application/geo+json".to_string()),
        ];
        if let Some(aoi) = aoi {
            query.push(("bbox", aoi.to_string()));
        }
        if let Some(start) = &toi.0 {
            query.push(("startDate", start.clone()));
        }
        if let Some(end) = &toi.1 {
            query.push(("endDate", end.clone()));
        }
        debug!(collection, "Querying OpenSearch catalogue");
        let response = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| EngineError::communication(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::communication(format!(
                "HTTP status {} from OpenSearch catalogue",
                status.as_u16()
            )));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| EngineError::communication(format!("unreadable catalogue response: {e}")))?;
        Ok(extract_product_links(&body, limit))
    }
}

/// Pull product file references out of a GeoJSON feature collection,
/// tolerating the link conventions catalogues actually use.
fn extract_product_links(body: &Value, limit: usize) -> Vec<String> {
    let mut links = Vec::new();
    let Some(features) = body.get("features").and_then(Value::as_array) else {
        return links;
    };
    for feature in features {
        if links.len() >= limit {
            break;
        }
        if let Some(href) = feature_link(feature) {
            links.push(href);
        }
    }
    links
}

fn feature_link(feature: &Value) -> Option<String> {
    // assets map: first entry with an href
    if let Some(assets) = feature.get("assets").and_then(Value::as_object) {
        for asset in assets.values() {
            if let Some(href) = asset.get("href").and_then(Value::as_str) {
                return Some(href.to_string());
            }
        }
    }
    // properties.enclosure
    if let Some(href) = feature
        .get("properties")
        .and_then(|p| p.get("enclosure"))
        .and_then(Value::as_str)
    {
        return Some(href.to_string());
    }
    // links list with rel=enclosure
    let links = feature
        .get("links")
        .or_else(|| feature.get("properties").and_then(|p| p.get("links")))
        .and_then(Value::as_array)?;
    links.iter().find_map(|link| {
        let rel = link.get("rel").and_then(Value::as_str)?;
        if rel == "enclosure" {
            link.get("href").and_then(Value::as_str).map(String::from)
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tellus_core::{IoDescription, ProcessType};
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn eo_payload() -> Value {
        json!({
            "processDescription": {
                "process": {
                    "id": "eo-stacker",
                    "inputs": [{
                        "id": "image",
                        "additionalParameters": [{
                            "role": OPENSEARCH_ROLE,
                            "parameters": [{"name": "EOImage", "values": ["true"]}]
                        }]
                    }]
                }
            }
        })
    }

    #[test]
    fn test_detect_eo_inputs() {
        assert_eq!(detect_eo_inputs(&eo_payload()), vec!["image"]);
        assert!(detect_eo_inputs(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn test_resolution_replaces_query_triple() {
        let server = MockServer::start().await;
        let features = json!({
            "type": "FeatureCollection",
            "features": [
                {"properties": {"enclosure": "http://data/products/a.tif"}},
                {"assets": {"data": {"href": "http://data/products/b.tif"}}},
                {"links": [{"rel": "enclosure", "href": "http://data/products/c.tif"}]}
            ]
        });
        Mock::given(method("GET"))
            .and(query_param("parentIdentifier", "sentinel-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(features))
            .mount(&server)
            .await;

        let mut process = Process::new("eo-stacker", ProcessType::Application).unwrap();
        process.payload = eo_payload();
        let mut image = IoDescription::complex("image", vec![]);
        image.max_occurs = MaxOccurs::Count(2);
        process.inputs = vec![image];

        let config = EngineConfig {
            opensearch_url: Some(server.uri()),
            ..EngineConfig::default()
        };
        let raw = json!([
            {"id": "image", "data": "sentinel-2"},
            {"id": "aoi", "data": "5.0,45.0,6.0,46.0"},
            {"id": "startDate", "data": "2025-01-01"},
            {"id": "endDate", "data": "2025-02-01"}
        ]);
        let resolved = resolve_eo_inputs(&process, &raw, &config).await.unwrap();
        let list = resolved.as_array().unwrap();
        // cardinality bounded by max_occurs = 2; aoi/toi consumed
        assert_eq!(list.len(), 2);
        assert_eq!(list[0]["id"], "image");
        assert_eq!(list[0]["href"], "http://data/products/a.tif");
        assert_eq!(list[1]["href"], "http://data/products/b.tif");
    }

    #[tokio::test]
    async fn test_non_eo_jobs_pass_through() {
        let process = Process::new("plain-proc", ProcessType::Application).unwrap();
        let raw = json!([{"id": "msg", "data": "hi"}]);
        let config = EngineConfig::default();
        let resolved = resolve_eo_inputs(&process, &raw, &config).await.unwrap();
        assert_eq!(resolved, raw);
    }
}
