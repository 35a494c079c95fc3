// WPS-1 GetCapabilities parsing

use crate::xml::Element;
use tellus_core::{EngineError, Result};

/// Process summary listed in a capabilities document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub id: String,
    pub title: Option<String>,
    pub abstract_: Option<String>,
    pub version: Option<String>,
}

/// Parsed capabilities: provider identity and offered processes
#[derive(Debug, Clone)]
pub struct Capabilities {
    pub title: Option<String>,
    pub abstract_: Option<String>,
    pub provider: Option<String>,
    pub processes: Vec<ProcessSummary>,
}

/// Parse a `GetCapabilities` response document
pub fn parse_capabilities(xml: &str) -> Result<Capabilities> {
    let root = Element::parse(xml)?;
    if root.name == "ExceptionReport" {
        return Err(EngineError::communication(crate::describe::exception_text(
            &root,
        )));
    }

    let identification = root.child("ServiceIdentification");
    let processes = root
        .descendants("Process")
        .into_iter()
        .filter_map(|process| {
            let id = process.child_text("Identifier")?;
            Some(ProcessSummary {
                id,
                title: process.child_text("Title"),
                abstract_: process.child_text("Abstract"),
                version: process.attr("processVersion").map(String::from),
            })
        })
        .collect();

    Ok(Capabilities {
        title: identification.and_then(|i| i.child_text("Title")),
        abstract_: identification.and_then(|i| i.child_text("Abstract")),
        provider: root
            .child("ServiceProvider")
            .and_then(|p| p.child_text("ProviderName")),
        processes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPABILITIES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wps:Capabilities xmlns:wps="http://www.opengis.net/wps/1.0.0"
    xmlns:ows="http://www.opengis.net/ows/1.1" service="WPS" version="1.0.0">
  <ows:ServiceIdentification>
    <ows:Title>Climate toolbox</ows:Title>
    <ows:Abstract>Remote processing services.</ows:Abstract>
  </ows:ServiceIdentification>
  <ows:ServiceProvider>
    <ows:ProviderName>Example Org</ows:ProviderName>
  </ows:ServiceProvider>
  <wps:ProcessOfferings>
    <wps:Process wps:processVersion="0.1">
      <ows:Identifier>subsetter</ows:Identifier>
      <ows:Title>Subsetter</ows:Title>
    </wps:Process>
    <wps:Process wps:processVersion="1.2">
      <ows:Identifier>averager</ows:Identifier>
      <ows:Title>Averager</ows:Title>
      <ows:Abstract>Average over a region.</ows:Abstract>
    </wps:Process>
  </wps:ProcessOfferings>
</wps:Capabilities>"#;

    #[test]
    fn test_parse_capabilities() {
        let caps = parse_capabilities(CAPABILITIES_XML).unwrap();
        assert_eq!(caps.title.as_deref(), Some("Climate toolbox"));
        assert_eq!(caps.provider.as_deref(), Some("Example Org"));
        assert_eq!(caps.processes.len(), 2);
        assert_eq!(caps.processes[0].id, "subsetter");
        assert_eq!(caps.processes[1].version.as_deref(), Some("1.2"));
        assert_eq!(
            caps.processes[1].abstract_.as_deref(),
            Some("Average over a region.")
        );
    }
}
