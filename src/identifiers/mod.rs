//! Publication identifier resolution across external publication databases.

pub mod publication;

use std::sync::Arc;

use crate::error::CoreError;
use crate::identifiers::publication::{
    identifier_valid_for, infer_identifier_from_url, is_doi, normalize_doi, validate_db_name,
};
use crate::store::models::{PublicationAuthor, PublicationIdentifier};
use crate::store::Db;

/// Normalized record returned by every external publication client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublicationRecord {
    pub title: String,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    /// Author names in order; the first is the primary author.
    pub authors: Vec<String>,
    pub publication_year: Option<i32>,
    pub publication_journal: Option<String>,
    pub publication_volume: Option<String>,
    pub publication_pages: Option<String>,
    pub url: Option<String>,
}

/// A thin, blocking client for one external publication database.
///
/// `Ok(None)` means the database has no record for the identifier; transport
/// failures surface as [`CoreError::Transport`].
pub trait PublicationFetcher: Send + Sync {
    fn fetch(&self, identifier: &str) -> Result<Option<PublicationRecord>, CoreError>;
}

/// Clients for all accepted publication databases.
#[derive(Clone)]
pub struct PublicationClients {
    pub pubmed: Arc<dyn PublicationFetcher>,
    pub biorxiv: Arc<dyn PublicationFetcher>,
    pub medrxiv: Arc<dyn PublicationFetcher>,
    pub crossref: Arc<dyn PublicationFetcher>,
}

impl PublicationClients {
    fn fetcher_for(&self, db_name: &str) -> Option<Arc<dyn PublicationFetcher>> {
        match db_name {
            "PubMed" => Some(self.pubmed.clone()),
            "bioRxiv" => Some(self.biorxiv.clone()),
            "medRxiv" => Some(self.medrxiv.clone()),
            "Crossref" => Some(self.crossref.clone()),
            _ => None,
        }
    }
}

/// A fetched publication bound to its identifier and source database.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalPublication {
    pub identifier: String,
    pub db_name: String,
    pub record: PublicationRecord,
}

impl ExternalPublication {
    /// Canonical URL for this publication in its source database.
    pub fn url(&self) -> Option<String> {
        match self.db_name.as_str() {
            "PubMed" => Some(format!(
                "http://www.ncbi.nlm.nih.gov/pubmed/{}",
                self.identifier
            )),
            "bioRxiv" => Some(format!(
                "https://www.biorxiv.org/content/10.1101/{}",
                self.identifier
            )),
            "medRxiv" => Some(format!(
                "https://www.medrxiv.org/content/10.1101/{}",
                self.identifier
            )),
            "Crossref" => self.record.url.clone(),
            _ => None,
        }
    }

    fn format_authors(&self) -> String {
        let authors = &self.record.authors;
        match authors.len() {
            0 => String::new(),
            1 => authors[0].clone(),
            2 => format!("{} and {}", authors[0], authors[1]),
            _ => format!("{}, <i>et al</i>", authors[0]),
        }
    }

    /// A stable citation string built from the record fields.
    pub fn reference_html(&self) -> String {
        let author = self.format_authors();
        let doi = self.record.doi.clone().unwrap_or_default();
        let title = if self.record.title.is_empty() {
            "(None)".to_owned()
        } else {
            self.record.title.trim_end_matches('.').to_owned()
        };
        let journal = match self.record.publication_journal.as_deref() {
            None | Some("Preprint") => "(None)".to_owned(),
            Some(journal) => journal.trim_end_matches('.').to_owned(),
        };
        let year = self
            .record
            .publication_year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "(Unknown year)".to_owned());
        let volume = self
            .record
            .publication_volume
            .clone()
            .unwrap_or_else(|| "(Unknown volume)".to_owned());
        let pages = self
            .record
            .publication_pages
            .clone()
            .unwrap_or_else(|| "(Unknown pages)".to_owned());

        format!(
            "{author}. {title}. {journal}. {year}; {volume}:{pages}. {doi}",
            author = author,
            title = title,
            journal = journal,
            year = year,
            volume = volume,
            pages = pages,
            doi = doi,
        )
    }

    /// Build the storable publication identifier row.
    pub fn to_model(&self) -> PublicationIdentifier {
        PublicationIdentifier {
            id: 0,
            identifier: self.identifier.clone(),
            db_name: self.db_name.clone(),
            doi: self.record.doi.clone(),
            title: self.record.title.clone(),
            abstract_text: self.record.abstract_text.clone(),
            authors: self
                .record
                .authors
                .iter()
                .enumerate()
                .map(|(i, name)| PublicationAuthor {
                    name: name.clone(),
                    primary: i == 0,
                })
                .collect(),
            publication_year: self.record.publication_year,
            publication_journal: self.record.publication_journal.clone(),
            publication_volume: self.record.publication_volume.clone(),
            publication_pages: self.record.publication_pages.clone(),
            url: self.url(),
            reference_html: self.reference_html(),
        }
    }
}

async fn fetch_external(
    fetcher: Arc<dyn PublicationFetcher>,
    identifier: String,
) -> Result<Option<PublicationRecord>, CoreError> {
    tokio::task::spawn_blocking(move || fetcher.fetch(&identifier))
        .await
        .map_err(|e| CoreError::Internal(format!("publication fetch task failed: {}", e)))?
}

/// Find a stored publication identifier or resolve it against the external
/// databases and create one.
///
/// With a `db_name`, resolution is unambiguous. A DOI short-circuits to
/// Crossref. Otherwise every format-applicable database is queried in
/// parallel; more than one hit raises [`CoreError::AmbiguousIdentifier`],
/// none raises [`CoreError::NonexistentIdentifier`].
pub async fn find_or_create_publication_identifier(
    db: &Db,
    clients: &PublicationClients,
    identifier: &str,
    db_name: Option<&str>,
) -> Result<i64, CoreError> {
    // Accept URLs from accepted databases.
    let identifier = infer_identifier_from_url(identifier);

    if let Some(db_name) = db_name {
        validate_db_name(db_name)?;

        {
            let store = db.lock().await;
            let existing = if db_name == "Crossref" {
                store
                    .find_publication_by_doi(&identifier)
                    .or_else(|| store.find_publication(&identifier, db_name))
            } else {
                store.find_publication(&identifier, db_name)
            };
            if let Some(existing) = existing {
                return Ok(existing.id);
            }
        }

        let fetcher = clients
            .fetcher_for(db_name)
            .ok_or_else(|| CoreError::Internal(format!("no client for {}", db_name)))?;
        let record = fetch_external(fetcher, identifier.clone())
            .await?
            .ok_or_else(|| {
                CoreError::NonexistentIdentifier(format!(
                    "no matching articles found for identifier {} in {}",
                    identifier, db_name
                ))
            })?;
        let publication = ExternalPublication {
            identifier,
            db_name: db_name.to_owned(),
            record,
        };
        let mut store = db.lock().await;
        return store.insert_publication(publication.to_model());
    }

    // A DOI has a unique match in Crossref if any match exists.
    if is_doi(&identifier) {
        let identifier = normalize_doi(&identifier);
        {
            let store = db.lock().await;
            if let Some(existing) = store.find_publication_by_doi(&identifier) {
                return Ok(existing.id);
            }
        }
        let record = fetch_external(clients.crossref.clone(), identifier.clone())
            .await?
            .ok_or_else(|| {
                CoreError::NonexistentIdentifier(format!(
                    "no matching articles found for DOI {}",
                    identifier
                ))
            })?;
        let publication = ExternalPublication {
            identifier,
            db_name: "Crossref".to_owned(),
            record,
        };
        let mut store = db.lock().await;
        return store.insert_publication(publication.to_model());
    }

    // Otherwise, try every database the identifier is format-valid for.
    let applicable: Vec<&'static str> = identifier_valid_for(&identifier)
        .into_iter()
        .filter(|(_, valid)| *valid)
        .map(|(db_name, _)| db_name)
        .collect();

    let mut existing_matches: Vec<i64> = Vec::new();
    let mut to_fetch: Vec<&'static str> = Vec::new();
    {
        let store = db.lock().await;
        for candidate in &applicable {
            match store.find_publication(&identifier, candidate) {
                Some(existing) => existing_matches.push(existing.id),
                None => to_fetch.push(candidate),
            }
        }
    }

    // Explicit, bounded parallel fan-out across the remaining databases.
    let fetches = to_fetch.iter().map(|candidate| {
        let fetcher = clients
            .fetcher_for(candidate)
            .expect("every accepted db has a client");
        fetch_external(fetcher, identifier.clone())
    });
    let results = futures::future::join_all(fetches).await;

    let mut fetched: Vec<ExternalPublication> = Vec::new();
    for (candidate, result) in to_fetch.iter().zip(results) {
        if let Some(record) = result? {
            fetched.push(ExternalPublication {
                identifier: identifier.clone(),
                db_name: (*candidate).to_owned(),
                record,
            });
        }
    }

    let total_matches = existing_matches.len() + fetched.len();
    if total_matches == 0 {
        return Err(CoreError::NonexistentIdentifier(format!(
            "no matching articles found for identifier {} across all accepted publication \
             databases",
            identifier
        )));
    }
    if total_matches > 1 {
        return Err(CoreError::AmbiguousIdentifier(format!(
            "found multiple articles associated with identifier {}; specify a db_name along \
             with this identifier to avoid ambiguity",
            identifier
        )));
    }

    if let Some(id) = existing_matches.pop() {
        return Ok(id);
    }
    let publication = fetched.pop().expect("exactly one fetched match");
    let mut store = db.lock().await;
    store.insert_publication(publication.to_model())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use pretty_assertions::assert_eq;

    struct StaticFetcher(Option<PublicationRecord>);

    impl PublicationFetcher for StaticFetcher {
        fn fetch(&self, _identifier: &str) -> Result<Option<PublicationRecord>, CoreError> {
            Ok(self.0.clone())
        }
    }

    fn record(title: &str) -> PublicationRecord {
        PublicationRecord {
            title: title.to_owned(),
            authors: vec!["Author A".to_owned(), "Author B".to_owned(), "Author C".to_owned()],
            publication_year: Some(2024),
            publication_journal: Some("Journal of Tests".to_owned()),
            doi: Some("10.1000/test".to_owned()),
            ..Default::default()
        }
    }

    fn clients(
        pubmed: Option<PublicationRecord>,
        biorxiv: Option<PublicationRecord>,
        medrxiv: Option<PublicationRecord>,
        crossref: Option<PublicationRecord>,
    ) -> PublicationClients {
        PublicationClients {
            pubmed: Arc::new(StaticFetcher(pubmed)),
            biorxiv: Arc::new(StaticFetcher(biorxiv)),
            medrxiv: Arc::new(StaticFetcher(medrxiv)),
            crossref: Arc::new(StaticFetcher(crossref)),
        }
    }

    fn db() -> Db {
        Arc::new(tokio::sync::Mutex::new(Store::new()))
    }

    #[tokio::test]
    async fn ambiguous_identifier_requires_db_name() {
        // An 8-digit id is format-valid for PubMed and medRxiv; both hit.
        let clients = clients(Some(record("pm")), None, Some(record("mr")), None);
        let db = db();
        let result =
            find_or_create_publication_identifier(&db, &clients, "12345678", None).await;
        assert!(matches!(result, Err(CoreError::AmbiguousIdentifier(_))));

        // Supplying db_name resolves the ambiguity and creates exactly one row.
        let id = find_or_create_publication_identifier(&db, &clients, "12345678", Some("PubMed"))
            .await
            .unwrap();
        let store = db.lock().await;
        assert_eq!(1, store.publication_identifiers.len());
        assert_eq!("PubMed", store.publication_identifiers[&id].db_name);
    }

    #[tokio::test]
    async fn missing_identifier_raises_nonexistent() {
        let clients = clients(None, None, None, None);
        let result =
            find_or_create_publication_identifier(&db(), &clients, "12345678", None).await;
        assert!(matches!(result, Err(CoreError::NonexistentIdentifier(_))));
    }

    #[tokio::test]
    async fn single_hit_resolves_without_db_name() {
        let clients = clients(Some(record("pm")), None, None, None);
        let db = db();
        let id = find_or_create_publication_identifier(&db, &clients, "24567513", None)
            .await
            .unwrap();
        // Resolving again finds the stored row rather than creating another.
        let again = find_or_create_publication_identifier(&db, &clients, "24567513", None)
            .await
            .unwrap();
        assert_eq!(id, again);
        assert_eq!(1, db.lock().await.publication_identifiers.len());
    }

    #[tokio::test]
    async fn doi_short_circuits_to_crossref() {
        let clients = clients(None, None, None, Some(record("cr")));
        let db = db();
        let id = find_or_create_publication_identifier(
            &db,
            &clients,
            "10.1038/s41586-020-2308-7",
            None,
        )
        .await
        .unwrap();
        let store = db.lock().await;
        assert_eq!("Crossref", store.publication_identifiers[&id].db_name);
    }

    #[tokio::test]
    async fn urls_are_stripped_to_identifiers() {
        let clients = clients(Some(record("pm")), None, None, None);
        let db = db();
        let id = find_or_create_publication_identifier(
            &db,
            &clients,
            "https://pubmed.ncbi.nlm.nih.gov/24567513/",
            Some("PubMed"),
        )
        .await
        .unwrap();
        assert_eq!("24567513", db.lock().await.publication_identifiers[&id].identifier);
    }

    #[test]
    fn citation_renderer_formats_authors_and_defaults() {
        let publication = ExternalPublication {
            identifier: "24567513".to_owned(),
            db_name: "PubMed".to_owned(),
            record: record("A title."),
        };
        assert_eq!(
            "Author A, <i>et al</i>. A title. Journal of Tests. 2024; (Unknown volume):\
             (Unknown pages). 10.1000/test",
            publication.reference_html()
        );

        let preprint = ExternalPublication {
            identifier: "2024.04.26.591310".to_owned(),
            db_name: "bioRxiv".to_owned(),
            record: PublicationRecord {
                title: "Preprint title".to_owned(),
                authors: vec!["Solo Author".to_owned()],
                publication_journal: Some("Preprint".to_owned()),
                ..Default::default()
            },
        };
        assert_eq!(
            "Solo Author. Preprint title. (None). (Unknown year); (Unknown volume):\
             (Unknown pages). ",
            preprint.reference_html()
        );
        assert_eq!(
            Some("https://www.biorxiv.org/content/10.1101/2024.04.26.591310".to_owned()),
            preprint.url()
        );
    }
}
