// WPS 1.0 wire format
//
// Client side: GetCapabilities / DescribeProcess / Execute / status
// documents against remote providers, plus the importer that turns a
// DescribeProcess document into a deployable process. Server side: response
// rendering for the engine's own OWS endpoint.
//
// All parsing matches local element names only; WPS servers disagree on
// namespace prefixes and several predate namespace hygiene.

pub mod capabilities;
pub mod client;
pub mod describe;
pub mod execute;
pub mod importer;
pub mod render;
pub mod xml;

pub use capabilities::{parse_capabilities, Capabilities, ProcessSummary};
pub use client::Wps1Client;
pub use describe::{parse_describe_process, RemoteProcessDescription};
pub use execute::{
    build_execute_request, parse_execute_response, ExecuteInput, ExecuteStatus, RemoteOutput,
};
pub use importer::Wps1Importer;
pub use render::{capabilities_xml, describe_xml, exception_xml, execute_response_xml};
