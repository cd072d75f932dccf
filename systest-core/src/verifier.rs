//! Assertions against the plugin's introspection document
//!
//! The document served on the plugin's inspect port is only ever read
//! through two shapes:
//!
//! - the tunnel table, `vxlan.VtepTable` (an object keyed by remote tunnel
//!   endpoint) plus the optional `vxlan.LocalIp` string
//! - the whole pretty-printed text, searched for endpoint tokens
//!
//! A document that does not fit the tunnel shape is a
//! [`SystestError::DocumentShape`]; a document that fits but lacks an
//! expected entry is a mismatch ([`SystestError::MissingIdentity`] or
//! [`SystestError::MissingToken`]).

use crate::error::{SystestError, SystestResult};
use crate::node::Node;

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, error};

/// Fetch the pretty-printed driver state from the plugin
pub const INTROSPECTION_COMMAND: &str =
    "curl -s localhost:9090/inspect/driver | python -mjson.tool";

/// Tunnel endpoints known to one node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelTable {
    pub remote: BTreeSet<String>,
    pub local: Option<String>,
}

impl TunnelTable {
    /// Decode the tunnel table from introspection text
    pub fn from_document(text: &str) -> SystestResult<Self> {
        let document: Value = serde_json::from_str(text)
            .map_err(|e| SystestError::document_shape(format!("invalid JSON: {}", e)))?;

        let vxlan = document
            .get("vxlan")
            .and_then(Value::as_object)
            .ok_or_else(|| SystestError::document_shape("vxlan not found in driver info"))?;

        let remote = vxlan
            .get("VtepTable")
            .and_then(Value::as_object)
            .ok_or_else(|| SystestError::document_shape("VtepTable not found in driver info"))?
            .keys()
            .cloned()
            .collect();

        // A missing or non-string local address is tolerated
        let local = vxlan
            .get("LocalIp")
            .and_then(Value::as_str)
            .map(String::from);

        Ok(Self { remote, local })
    }

    /// Remote endpoints plus the local one
    pub fn observed(&self) -> BTreeSet<&str> {
        self.remote
            .iter()
            .map(String::as_str)
            .chain(self.local.as_deref())
            .collect()
    }

    /// First expected identity, in sorted order, that this table lacks
    pub fn first_missing<'e>(&self, expected: &'e BTreeSet<String>) -> Option<&'e str> {
        let observed = self.observed();
        expected
            .iter()
            .map(String::as_str)
            .find(|identity| !observed.contains(identity))
    }
}

/// First token, in the given order, that does not occur anywhere in `text`.
///
/// This is plain substring search: a token that is a prefix of a longer
/// value (`10.1.1.1` inside `10.1.1.10`) is reported as present.
pub fn first_missing_token<'t, S: AsRef<str>>(text: &str, expected: &'t [S]) -> Option<&'t str> {
    expected
        .iter()
        .map(AsRef::as_ref)
        .find(|token| !text.contains(token))
}

/// Read the introspection document from `node`
pub async fn fetch_introspection(node: &Node) -> SystestResult<String> {
    node.run_foreground(INTROSPECTION_COMMAND).await
}

/// Check that every expected tunnel endpoint is known to `node`
pub async fn verify_tunnel_membership<I, S>(node: &Node, expected: I) -> SystestResult<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let expected: BTreeSet<String> = expected.into_iter().map(Into::into).collect();
    let document = fetch_introspection(node).await?;

    let table = TunnelTable::from_document(&document).map_err(|e| {
        error!("Driver info on {} has unexpected shape: {}", node.name(), e);
        debug!("{}", document);
        e
    })?;

    match table.first_missing(&expected) {
        None => {
            debug!("{} knows all {} expected VTEPs", node.name(), expected.len());
            Ok(())
        }
        Some(identity) => {
            error!("VTEP {} missing on {}; driver info: {}", identity, node.name(), document);
            Err(SystestError::MissingIdentity {
                node: node.name().to_string(),
                identity: identity.to_string(),
            })
        }
    }
}

/// Check that every expected endpoint token appears in `node`'s driver state
pub async fn verify_endpoints_present<S: AsRef<str>>(
    node: &Node,
    expected: &[S],
) -> SystestResult<()> {
    let document = fetch_introspection(node).await?;

    match first_missing_token(&document, expected) {
        None => Ok(()),
        Some(token) => {
            error!("{} missing on {}; driver info: {}", token, node.name(), document);
            Err(SystestError::MissingToken {
                node: node.name().to_string(),
                token: token.to_string(),
            })
        }
    }
}
