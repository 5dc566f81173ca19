//! Persistence gateway: explicit whole-document saves over HTTP.
//!
//! A save flattens the in-memory nested document into the flat item
//! list the storage API expects, then creates (`POST`) or updates
//! (`PUT`) depending on whether the document already has a persisted
//! identity. Every mutating call carries an anti-forgery token fetched
//! out-of-band beforehand; a save attempted without one is refused
//! locally, with zero network traffic.
//!
//! Saves are all-or-nothing from the caller's perspective and never
//! suspend live collaboration — peers keep receiving live edits while a
//! save is in flight. On any failure the caller's in-memory document is
//! left untouched so the save can be retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{Category, FlatItem, SwotDocument};

/// Errors surfaced by a save.
///
/// None of these are fatal to the process; all are scoped to the single
/// save attempt.
#[derive(Debug, Error)]
pub enum SaveError {
    /// Precondition: [`PersistenceGateway::fetch_csrf_token`] has not
    /// produced a token. No network call was made.
    #[error("anti-forgery token not available; fetch it before saving")]
    TokenMissing,

    /// The storage API answered with a non-success status.
    #[error("storage API rejected the request: HTTP {status}")]
    Rejected { status: u16 },

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the storage API, no trailing slash.
    pub api_base: String,
}

/// One item of the canonical stored document the API returns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SavedItem {
    pub id: u64,
    pub category: Category,
    pub content: String,
}

/// The canonical stored document returned by a successful save.
///
/// Previously-unsaved items come back with assigned identities.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SavedDocument {
    pub id: u64,
    pub title: String,
    pub items: Vec<SavedItem>,
    pub project: u64,
}

impl SavedDocument {
    /// Rebuild the in-memory document shape from this snapshot.
    pub fn into_document(self) -> SwotDocument {
        let flat = self.items.into_iter().map(|i| FlatItem {
            id: Some(i.id),
            category: i.category,
            content: i.content,
        });
        SwotDocument::from_parts(Some(self.id), self.project, self.title, flat)
    }
}

#[derive(Deserialize)]
struct CsrfResponse {
    #[serde(rename = "csrfToken")]
    csrf_token: Option<String>,
}

#[derive(Serialize)]
struct SavePayload<'a> {
    title: &'a str,
    items: Vec<FlatItem>,
    project: u64,
}

/// The gateway to the external storage API.
pub struct PersistenceGateway {
    config: GatewayConfig,
    http: reqwest::Client,
    csrf_token: Option<String>,
}

impl PersistenceGateway {
    /// Build a gateway with a cookie-keeping HTTP client (the API pairs
    /// the token with a session cookie).
    pub fn new(config: GatewayConfig) -> Result<Self, SaveError> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { config, http, csrf_token: None })
    }

    /// Fetch the anti-forgery token from `GET {api_base}/api/csrf/`.
    ///
    /// Must succeed once before the first save.
    pub async fn fetch_csrf_token(&mut self) -> Result<(), SaveError> {
        let url = format!("{}/api/csrf/", self.config.api_base);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(SaveError::Rejected { status: resp.status().as_u16() });
        }
        let body: CsrfResponse = resp.json().await?;
        match body.csrf_token {
            Some(token) => {
                self.csrf_token = Some(token);
                Ok(())
            }
            None => {
                log::error!("CSRF endpoint returned no token");
                Err(SaveError::TokenMissing)
            }
        }
    }

    pub fn has_token(&self) -> bool {
        self.csrf_token.is_some()
    }

    /// Persist a reconciled snapshot of the document.
    ///
    /// Create when the document has no persisted identity yet, update
    /// otherwise. Returns the canonical stored document; adopt it via
    /// [`SavedDocument::into_document`] to pick up assigned item ids.
    pub async fn save(&self, document: &SwotDocument) -> Result<SavedDocument, SaveError> {
        let token = self.csrf_token.as_deref().ok_or(SaveError::TokenMissing)?;

        let payload = SavePayload {
            title: &document.title,
            items: document.flatten(),
            project: document.project,
        };

        let request = match document.id {
            Some(id) => self.http.put(format!(
                "{}/api/projects/{}/swot/{}/",
                self.config.api_base, document.project, id
            )),
            None => self.http.post(format!(
                "{}/api/projects/{}/swot/",
                self.config.api_base, document.project
            )),
        };

        let resp = request
            .header("X-CSRFToken", token)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            log::warn!("Save rejected with HTTP {status}");
            return Err(SaveError::Rejected { status: status.as_u16() });
        }

        let saved: SavedDocument = resp.json().await?;
        log::info!("Saved document {} ({} items)", saved.id, saved.items.len());
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Item;

    fn gateway() -> PersistenceGateway {
        // Port 1 is never listening; these tests must not reach it.
        PersistenceGateway::new(GatewayConfig { api_base: "http://127.0.0.1:1".into() }).unwrap()
    }

    #[tokio::test]
    async fn test_save_without_token_refused_locally() {
        let gw = gateway();
        assert!(!gw.has_token());

        let doc = SwotDocument::template(1);
        // Refused before any network call — an unroutable api_base
        // would otherwise produce an Http error, not TokenMissing.
        match gw.save(&doc).await {
            Err(SaveError::TokenMissing) => {}
            other => panic!("expected TokenMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_save_payload_shape() {
        let mut doc = SwotDocument::template(9);
        doc.title = "Expansion".into();
        doc.set_content(Category::Strength, 0, "brand");

        let payload = SavePayload {
            title: &doc.title,
            items: doc.flatten(),
            project: doc.project,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["title"], "Expansion");
        assert_eq!(json["project"], 9);
        assert_eq!(json["items"][0]["category"], "Strength");
        assert_eq!(json["items"][0]["content"], "brand");
        assert!(json["items"][0].get("id").is_none());
    }

    #[test]
    fn test_saved_document_into_document() {
        let saved = SavedDocument {
            id: 11,
            title: "Q3".into(),
            items: vec![
                SavedItem { id: 100, category: Category::Weakness, content: "debt".into() },
                SavedItem { id: 101, category: Category::Strength, content: "team".into() },
            ],
            project: 4,
        };
        let doc = saved.into_document();
        assert_eq!(doc.id, Some(11));
        assert_eq!(doc.project, 4);
        assert_eq!(
            doc.items(Category::Strength),
            &[Item { id: Some(101), content: "team".into() }]
        );
        assert_eq!(doc.items(Category::Weakness)[0].id, Some(100));
        assert!(doc.items(Category::Opportunity).is_empty());
    }

    #[test]
    fn test_csrf_response_parsing() {
        let with: CsrfResponse = serde_json::from_str(r#"{"csrfToken":"abc"}"#).unwrap();
        assert_eq!(with.csrf_token.as_deref(), Some("abc"));

        let without: CsrfResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(without.csrf_token.is_none());
    }
}
