//! HTTP implementations of the publication database clients.

use crate::error::CoreError;
use crate::identifiers::{PublicationFetcher, PublicationRecord};

fn get_json(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<Option<serde_json::Value>, CoreError> {
    let response = client
        .get(url)
        .send()
        .map_err(|e| CoreError::Transport(format!("publication request failed: {}", e)))?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(CoreError::Transport(format!(
            "publication service returned status {} for {}",
            response.status(),
            url
        )));
    }
    response
        .json()
        .map(Some)
        .map_err(|e| CoreError::Transport(format!("publication service returned invalid JSON: {}", e)))
}

fn string_at(value: &serde_json::Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(|v| v.as_str()).map(str::to_owned)
}

/// Crossref works API client.
pub struct CrossrefClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl CrossrefClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl PublicationFetcher for CrossrefClient {
    fn fetch(&self, identifier: &str) -> Result<Option<PublicationRecord>, CoreError> {
        let url = format!("{}/works/{}", self.base_url, identifier);
        let Some(payload) = get_json(&self.client, &url)? else {
            return Ok(None);
        };
        let message = &payload["message"];
        let authors = message["author"]
            .as_array()
            .map(|authors| {
                authors
                    .iter()
                    .map(|a| {
                        let given = a["given"].as_str().unwrap_or_default();
                        let family = a["family"].as_str().unwrap_or_default();
                        format!("{} {}", given, family).trim().to_owned()
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(PublicationRecord {
            title: string_at(message, "/title/0").unwrap_or_default(),
            abstract_text: string_at(message, "/abstract"),
            doi: string_at(message, "/DOI"),
            authors,
            publication_year: message
                .pointer("/published-print/date-parts/0/0")
                .or_else(|| message.pointer("/published-online/date-parts/0/0"))
                .and_then(|v| v.as_i64())
                .map(|y| y as i32),
            publication_journal: string_at(message, "/container-title/0"),
            publication_volume: string_at(message, "/volume"),
            publication_pages: string_at(message, "/page"),
            url: string_at(message, "/URL"),
        }))
    }
}

/// PubMed esummary client.
pub struct PubmedClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl PubmedClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl PublicationFetcher for PubmedClient {
    fn fetch(&self, identifier: &str) -> Result<Option<PublicationRecord>, CoreError> {
        let mut url = format!(
            "{}/esummary.fcgi?db=pubmed&id={}&retmode=json",
            self.base_url, identifier
        );
        if let Some(api_key) = &self.api_key {
            url.push_str(&format!("&api_key={}", api_key));
        }
        let Some(payload) = get_json(&self.client, &url)? else {
            return Ok(None);
        };
        let summary = &payload["result"][identifier];
        if summary.is_null() || summary.get("error").is_some() {
            return Ok(None);
        }
        let authors = summary["authors"]
            .as_array()
            .map(|authors| {
                authors
                    .iter()
                    .filter_map(|a| a["name"].as_str())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(PublicationRecord {
            title: string_at(summary, "/title").unwrap_or_default(),
            abstract_text: None,
            doi: summary["articleids"].as_array().and_then(|ids| {
                ids.iter()
                    .find(|id| id["idtype"].as_str() == Some("doi"))
                    .and_then(|id| id["value"].as_str())
                    .map(str::to_owned)
            }),
            authors,
            publication_year: string_at(summary, "/pubdate")
                .and_then(|d| d.split_whitespace().next().map(str::to_owned))
                .and_then(|y| y.parse().ok()),
            publication_journal: string_at(summary, "/fulljournalname"),
            publication_volume: string_at(summary, "/volume"),
            publication_pages: string_at(summary, "/pages"),
            url: None,
        }))
    }
}

/// bioRxiv/medRxiv details API client; the server name selects the preprint
/// database.
pub struct RxivClient {
    base_url: String,
    server: String,
    client: reqwest::blocking::Client,
}

impl RxivClient {
    pub fn new(base_url: &str, server: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            server: server.to_owned(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl PublicationFetcher for RxivClient {
    fn fetch(&self, identifier: &str) -> Result<Option<PublicationRecord>, CoreError> {
        let url = format!(
            "{}/details/{}/10.1101/{}",
            self.base_url, self.server, identifier
        );
        let Some(payload) = get_json(&self.client, &url)? else {
            return Ok(None);
        };
        // The latest version of a preprint is the last collection entry.
        let Some(detail) = payload["collection"]
            .as_array()
            .and_then(|collection| collection.last())
        else {
            return Ok(None);
        };
        let authors = detail["authors"]
            .as_str()
            .map(|authors| {
                authors
                    .split(';')
                    .map(|a| a.trim().to_owned())
                    .filter(|a| !a.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(PublicationRecord {
            title: string_at(detail, "/title").unwrap_or_default(),
            abstract_text: string_at(detail, "/abstract"),
            doi: string_at(detail, "/doi"),
            authors,
            publication_year: string_at(detail, "/date")
                .and_then(|d| d.split('-').next().map(str::to_owned))
                .and_then(|y| y.parse().ok()),
            // Blanket journal for preprint articles.
            publication_journal: Some("Preprint".to_owned()),
            publication_volume: None,
            publication_pages: None,
            url: None,
        }))
    }
}
