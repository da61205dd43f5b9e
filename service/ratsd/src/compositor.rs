//! Evidence composition
//!
//! One request runs `validate → resolve attesters → negotiate formats →
//! invoke → merge → serialize`. Composition is all-or-nothing: the first
//! failing attester fails the request and no partial collection escapes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use futures::stream::{FuturesUnordered, StreamExt};
use ratsd_plugin::{EvidenceIn, OptionDescriptor, PluginManager, SubAttester};
use ratsd_tokens::cmw::{Collection, Monad};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{FanOut, ListOptions};
use crate::problem::Problem;

pub const CHARES_MEDIA_TYPE: &str = "application/vnd.veraison.chares+json";
pub const EAT_PROFILE: &str = "tag:github.com,2024:veraison/ratsd";
pub const EAT_MEDIA_TYPE: &str =
    r#"application/eat-ucs+json; eat_profile="tag:github.com,2024:veraison/ratsd""#;
pub const CMW_COLLECTION_KIND: &str = "tag:github.com,2025:veraison/ratsd/cmw";

/// Per-attester option naming the desired output format
pub const CONTENT_TYPE_OPTION: &str = "content-type";

/// Body of `POST /ratsd/chares`
#[derive(Debug, Default, Deserialize)]
pub struct CharesRequest {
    #[serde(default)]
    pub nonce: String,
    #[serde(rename = "attester-selection", default)]
    pub attester_selection: Option<Value>,
}

/// The response envelope. `cmw` is the standard base64 of the collection's
/// JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub eat_profile: String,
    pub eat_nonce: String,
    pub cmw: String,
}

impl Envelope {
    pub fn collection(&self) -> ratsd_tokens::Result<Collection> {
        let json = STANDARD
            .decode(&self.cmw)
            .map_err(|e| ratsd_tokens::TokenError::InvalidCmw(e.to_string()))?;
        Collection::from_json(&json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAttesterInfo {
    pub name: String,
    pub options: Vec<OptionDescriptor>,
}

/// An attester whose output format has been settled
struct Plan {
    name: String,
    attester: Arc<dyn SubAttester>,
    request: EvidenceIn,
}

pub struct Compositor {
    manager: Arc<dyn PluginManager>,
    list_options: ListOptions,
    fan_out: FanOut,
    request_timeout: Duration,
}

impl Compositor {
    pub fn new(manager: Arc<dyn PluginManager>) -> Self {
        Self {
            manager,
            list_options: ListOptions::All,
            fan_out: FanOut::Parallel,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_list_options(mut self, list_options: ListOptions) -> Self {
        self.list_options = list_options;
        self
    }

    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn manager(&self) -> &Arc<dyn PluginManager> {
        &self.manager
    }

    /// Check the request and accept media types.
    pub fn check_media_types(
        &self,
        content_type: Option<&str>,
        accept: Option<&str>,
    ) -> Result<(), Problem> {
        let content_type = content_type.unwrap_or_default();
        if content_type != CHARES_MEDIA_TYPE {
            return Err(Problem::invalid_request(format!(
                "wrong content type, expect {CHARES_MEDIA_TYPE} (got {content_type})"
            )));
        }

        if let Some(accept) = accept {
            if accept != EAT_MEDIA_TYPE && accept != "*/*" {
                return Err(Problem::not_acceptable(format!(
                    "wrong accept type, expect {EAT_MEDIA_TYPE} (got {accept})"
                )));
            }
        }

        Ok(())
    }

    /// Compose an envelope for a raw request body.
    pub async fn compose(&self, body: &[u8]) -> Result<Envelope, Problem> {
        let request: CharesRequest = serde_json::from_slice(body).unwrap_or_default();
        if request.nonce.is_empty() {
            return Err(Problem::invalid_request(
                "fail to retrieve nonce from the request",
            ));
        }

        let nonce = decode_nonce(&request.nonce)?;
        tracing::info!(nonce = %request.nonce, "composing evidence");

        if self.manager.plugin_list().is_empty() {
            return Err(Problem::internal("no sub-attester available"));
        }

        let selection = self.parse_selection(request.attester_selection)?;
        if let Some(selection) = &selection {
            tracing::info!(attesters = ?selection.keys().collect::<Vec<_>>(), "attester selection");
        }

        let collection =
            match tokio::time::timeout(self.request_timeout, self.collect(&nonce, selection)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(Problem::internal(format!(
                        "evidence collection timed out after {}s",
                        self.request_timeout.as_secs()
                    )))
                }
            };

        let serialized = collection
            .to_json()
            .map_err(|e| Problem::internal(format!("failed to serialize CMW collection: {e}")))?;

        Ok(Envelope {
            eat_profile: EAT_PROFILE.to_string(),
            eat_nonce: request.nonce,
            cmw: STANDARD.encode(serialized),
        })
    }

    /// Loaded attesters with their declared options, sorted by name
    pub async fn subattesters(&self) -> Result<Vec<SubAttesterInfo>, Problem> {
        let mut names = self.manager.plugin_list();
        names.sort();

        let mut infos = Vec::with_capacity(names.len());
        for name in names {
            let attester = self.lookup(&name)?;
            let out = attester.get_options().await;
            if !out.status.result {
                tracing::warn!(attester = %name, error = %out.status.error, "failed to get options");
            }
            infos.push(SubAttesterInfo {
                name,
                options: out.options,
            });
        }
        Ok(infos)
    }

    /// `None` means "no selection": the configured mode decides.
    fn parse_selection(
        &self,
        raw: Option<Value>,
    ) -> Result<Option<BTreeMap<String, Value>>, Problem> {
        let selection = match raw {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map.into_iter().collect::<BTreeMap<_, _>>()),
            Some(other) => {
                return Err(Problem::invalid_request(format!(
                    "failed to parse attester selection: expected an object, got {other}"
                )))
            }
        };

        match (self.list_options, selection) {
            (ListOptions::Selected, None) => Err(Problem::invalid_request(
                "attester-selection must contain at least one attester",
            )),
            (ListOptions::Selected, Some(s)) if s.is_empty() => Err(Problem::invalid_request(
                "attester-selection must contain at least one attester",
            )),
            (ListOptions::All, Some(s)) if s.is_empty() => Ok(None),
            (_, selection) => Ok(selection),
        }
    }

    async fn collect(
        &self,
        nonce: &[u8],
        selection: Option<BTreeMap<String, Value>>,
    ) -> Result<Collection, Problem> {
        // In "all" mode the selection only carries per-attester options.
        let names = match (self.list_options, &selection) {
            (ListOptions::Selected, Some(selection)) => selection.keys().cloned().collect(),
            _ => {
                let mut names = self.manager.plugin_list();
                names.sort();
                names
            }
        };

        // Negotiation is sequential so client errors surface before any
        // attester does real work.
        let mut plans = Vec::with_capacity(names.len());
        for name in names {
            let options = selection.as_ref().and_then(|s| s.get(&name));
            plans.push(self.negotiate(name, nonce, options).await?);
        }

        let results = match self.fan_out {
            FanOut::Sequential => {
                let mut results = Vec::with_capacity(plans.len());
                for plan in plans {
                    results.push(invoke(plan).await?);
                }
                results
            }
            FanOut::Parallel => {
                let mut pending: FuturesUnordered<_> = plans.into_iter().map(invoke).collect();
                let mut results = Vec::with_capacity(pending.len());
                // returning early drops the outstanding calls
                while let Some(result) = pending.next().await {
                    results.push(result?);
                }
                results
            }
        };

        let mut collection = Collection::new(CMW_COLLECTION_KIND);
        for (name, monad) in results {
            collection
                .add_item(name, monad)
                .map_err(|e| Problem::internal(e.to_string()))?;
        }
        Ok(collection)
    }

    async fn negotiate(
        &self,
        name: String,
        nonce: &[u8],
        options: Option<&Value>,
    ) -> Result<Plan, Problem> {
        let attester = self.lookup(&name)?;

        let formats = attester.get_supported_formats().await;
        let default_format = match formats.formats.first() {
            Some(format) if formats.status.result => format,
            _ => {
                return Err(Problem::internal(format!(
                    "no supported formats from attester {name}: {}",
                    formats.status.error
                )))
            }
        };
        let mut content_type = default_format.content_type.clone();

        let raw_options = match options {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => {
                let Value::Object(map) = value else {
                    return Err(Problem::invalid_request(format!(
                        "failed to parse options for {name}: expected an object"
                    )));
                };

                if let Some(desired) = map.get(CONTENT_TYPE_OPTION) {
                    let Some(desired) = desired.as_str() else {
                        return Err(Problem::invalid_request(format!(
                            "failed to parse options for {name}: {CONTENT_TYPE_OPTION} must be a string"
                        )));
                    };
                    if !formats.formats.iter().any(|f| f.content_type == desired) {
                        return Err(Problem::invalid_request(format!(
                            "{name} does not support content type {desired}"
                        )));
                    }
                    content_type = desired.to_string();
                }

                serde_json::to_vec(value).map_err(|e| {
                    Problem::internal(format!("failed to encode options for {name}: {e}"))
                })?
            }
        };

        tracing::info!(attester = %name, %content_type, "output content type");

        Ok(Plan {
            name,
            attester,
            request: EvidenceIn {
                content_type,
                nonce: nonce.to_vec(),
                options: raw_options,
            },
        })
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn SubAttester>, Problem> {
        self.manager
            .lookup_by_name(name)
            .map_err(|e| Problem::internal(format!("failed to get handle from {name}: {e}")))
    }
}

async fn invoke(plan: Plan) -> Result<(String, Monad), Problem> {
    let Plan {
        name,
        attester,
        request,
    } = plan;

    let content_type = request.content_type.clone();
    let out = attester.get_evidence(request).await;
    if !out.status.result {
        return Err(Problem::internal(format!(
            "failed to get attestation report from {name}: {}",
            out.status.error
        )));
    }

    tracing::debug!(attester = %name, bytes = out.evidence.len(), "evidence collected");
    Ok((name, Monad::new(content_type, out.evidence)))
}

/// Decode a base64url nonce; trailing padding is tolerated.
fn decode_nonce(encoded: &str) -> Result<Vec<u8>, Problem> {
    let nonce = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| {
            Problem::invalid_request(format!("fail to decode nonce from the request: {e}"))
        })?;

    if nonce.is_empty() {
        return Err(Problem::invalid_request(
            "fail to retrieve nonce from the request",
        ));
    }
    Ok(nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_accepts_padded_and_unpadded_base64url() {
        assert_eq!(decode_nonce("AQID").unwrap(), vec![1, 2, 3]);
        assert_eq!(decode_nonce("AQ==").unwrap(), vec![1]);
        assert_eq!(decode_nonce("_-8").unwrap(), vec![0xff, 0xef]);

        let err = decode_nonce("not base64!").unwrap_err();
        assert_eq!(err.status, 400);
        assert!(err.detail.starts_with("fail to decode nonce from the request"));
    }

    #[test]
    fn padding_only_nonce_is_missing() {
        let err = decode_nonce("==").unwrap_err();
        assert_eq!(err.detail, "fail to retrieve nonce from the request");
    }
}
