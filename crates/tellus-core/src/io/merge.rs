// Deploy-time merge of payload-supplied I/O over package-derived I/O
//
// Rule: package wins on type and formats; payload wins on every other field.
// Payload-only ids are discarded, package-only ids survive as-is.

use super::{IoDescription, IoKind};

/// Merge the deploy payload descriptions into the package-derived list.
///
/// The package-derived list fixes which I/O exist and what their types are;
/// the payload can only enrich the descriptive fields and occurrence bounds.
pub fn merge_io_descriptions(
    package_ios: Vec<IoDescription>,
    payload_ios: &[IoDescription],
) -> Vec<IoDescription> {
    package_ios
        .into_iter()
        .map(|package_io| {
            match payload_ios.iter().find(|p| p.id == package_io.id) {
                Some(payload_io) => merge_one(package_io, payload_io),
                None => package_io,
            }
        })
        .collect()
}

fn merge_one(package_io: IoDescription, payload_io: &IoDescription) -> IoDescription {
    let kind = match (package_io.kind, &payload_io.kind) {
        // package wins on the kind, formats included
        (package_kind @ IoKind::Complex { .. }, _) => package_kind,
        (package_kind @ IoKind::BoundingBox { .. }, _) => package_kind,
        (
            IoKind::Literal {
                data_type,
                allowed_values: package_allowed,
                default: package_default,
            },
            payload_kind,
        ) => {
            // within a literal, the domain fields are payload-overridable
            let (allowed_values, default) = match payload_kind {
                IoKind::Literal {
                    allowed_values: payload_allowed,
                    default: payload_default,
                    ..
                } => (
                    payload_allowed.clone().or(package_allowed),
                    payload_default.clone().or(package_default),
                ),
                _ => (package_allowed, package_default),
            };
            IoKind::Literal {
                data_type,
                allowed_values,
                default,
            }
        }
    };

    IoDescription {
        id: package_io.id,
        title: payload_io.title.clone().or(package_io.title),
        abstract_: payload_io.abstract_.clone().or(package_io.abstract_),
        keywords: if payload_io.keywords.is_empty() {
            package_io.keywords
        } else {
            payload_io.keywords.clone()
        },
        metadata: if payload_io.metadata.is_empty() {
            package_io.metadata
        } else {
            payload_io.metadata.clone()
        },
        min_occurs: payload_io.min_occurs,
        max_occurs: payload_io.max_occurs,
        kind,
    }
}
