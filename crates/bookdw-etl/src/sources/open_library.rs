//! Open Library search API adapter
//!
//! Queries `search.json?q=<title>+<author>&limit=1` (or `isbn:<isbn>`).
//! Open Library is the metadata-authoritative source: author keys and
//! edition counts come from here.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{
    classify_status, classify_transport, AdapterError, AuthorRef, FetchOutcome,
    IdentityHint, RawRecord, Source, SourceAdapter,
};

pub struct OpenLibraryAdapter {
    client: Client,
    base_url: String,
}

impl OpenLibraryAdapter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AdapterError::Permanent {
                source: Source::OpenLibrary,
                reason: format!("failed to build HTTP client: {}", e),
            }
        })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn query_url(&self, hint: &IdentityHint) -> String {
        let query = match &hint.isbn {
            Some(isbn) => format!("isbn:{}", isbn),
            None => format!("{} {}", hint.title.trim(), hint.author.trim()).replace(' ', "+"),
        };
        format!("{}/search.json?q={}&limit=1", self.base_url, query)
    }
}

#[async_trait]
impl SourceAdapter for OpenLibraryAdapter {
    fn source(&self) -> Source {
        Source::OpenLibrary
    }

    async fn fetch(&self, hint: &IdentityHint) -> Result<FetchOutcome, AdapterError> {
        let url = self.query_url(hint);
        debug!(url = %url, "querying open library");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_transport(Source::OpenLibrary, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        if let Some(err) = classify_status(Source::OpenLibrary, status) {
            return Err(err);
        }

        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|e| classify_transport(Source::OpenLibrary, e))?;

        let mut docs = payload.docs;
        if docs.is_empty() {
            return Ok(FetchOutcome::NotFound);
        }
        Ok(FetchOutcome::Found(docs.remove(0).into_record()))
    }
}

// ============================================================================
// Payload models
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchDoc {
    title: Option<String>,
    #[serde(default)]
    author_name: Vec<String>,
    #[serde(default)]
    author_key: Vec<String>,
    #[serde(default)]
    publisher: Vec<String>,
    #[serde(default)]
    language: Vec<String>,
    #[serde(default)]
    isbn: Vec<String>,
    first_publish_year: Option<i32>,
    edition_count: Option<i32>,
    number_of_pages_median: Option<i32>,
    #[serde(default)]
    subject: Vec<String>,
}

impl SearchDoc {
    fn into_record(self) -> RawRecord {
        // Author names and keys are parallel arrays; zip pairs them and
        // any surplus names stay unkeyed.
        let mut keys = self.author_key.into_iter();
        let authors = self
            .author_name
            .into_iter()
            .map(|name| AuthorRef {
                name,
                external_key: keys.next(),
            })
            .collect();

        let isbn13 = self.isbn.iter().find(|i| i.len() == 13).cloned();

        RawRecord {
            isbn13,
            title: self.title,
            description: None,
            page_count: self.number_of_pages_median,
            languages: self.language,
            publisher: self.publisher.into_iter().next(),
            published_date: self.first_publish_year.map(|y| y.to_string()),
            authors,
            genres: self.subject,
            rating_avg: None,
            rating_count: None,
            list_price_amount: None,
            retail_price_amount: None,
            currency_code: None,
            is_ebook: None,
            saleability: None,
            edition_count: self.edition_count,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url_shapes() {
        let adapter =
            OpenLibraryAdapter::new("https://openlibrary.org", Duration::from_secs(10)).unwrap();

        let hint = IdentityHint {
            title: "Crime and Punishment".to_string(),
            author: "Fyodor Dostoevsky".to_string(),
            isbn: None,
        };
        assert_eq!(
            adapter.query_url(&hint),
            "https://openlibrary.org/search.json?q=Crime+and+Punishment+Fyodor+Dostoevsky&limit=1"
        );

        let with_isbn = IdentityHint {
            isbn: Some("9780140449136".to_string()),
            ..hint
        };
        assert_eq!(
            adapter.query_url(&with_isbn),
            "https://openlibrary.org/search.json?q=isbn:9780140449136&limit=1"
        );
    }

    #[test]
    fn test_doc_into_record() {
        let payload = serde_json::json!({
            "title": "Crime and Punishment",
            "author_name": ["Fyodor Dostoevsky", "Translator Person"],
            "author_key": ["OL22242A"],
            "publisher": ["Penguin", "Vintage"],
            "language": ["eng", "rus"],
            "isbn": ["0140449132", "9780140449136"],
            "first_publish_year": 1866,
            "edition_count": 312,
            "number_of_pages_median": 671,
            "subject": ["Fiction", "Classics"]
        });

        let doc: SearchDoc = serde_json::from_value(payload).unwrap();
        let record = doc.into_record();

        assert_eq!(record.isbn13.as_deref(), Some("9780140449136"));
        assert_eq!(record.publisher.as_deref(), Some("Penguin"));
        assert_eq!(record.published_date.as_deref(), Some("1866"));
        assert_eq!(record.edition_count, Some(312));
        assert_eq!(record.languages, vec!["eng", "rus"]);

        assert_eq!(record.authors.len(), 2);
        assert_eq!(record.authors[0].external_key.as_deref(), Some("OL22242A"));
        assert!(record.authors[1].external_key.is_none());

        assert!(record.rating_avg.is_none());
        assert!(record.is_ebook.is_none());
    }

    #[test]
    fn test_empty_doc_is_all_none() {
        let doc: SearchDoc = serde_json::from_value(serde_json::json!({})).unwrap();
        let record = doc.into_record();
        assert!(record.title.is_none());
        assert!(record.isbn13.is_none());
        assert!(record.authors.is_empty());
    }
}
