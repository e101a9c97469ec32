//! Google Books volumes API adapter
//!
//! Queries `/volumes?q=isbn:<isbn>` when the job carries an ISBN,
//! otherwise `intitle:<title>+inauthor:<author>`, always with
//! `maxResults=1`. Google Books is the commerce-authoritative source:
//! ratings, prices, ebook availability, and saleability come from here.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{
    classify_status, classify_transport, AdapterError, AuthorRef, FetchOutcome,
    IdentityHint, RawRecord, Source, SourceAdapter,
};

pub struct GoogleBooksAdapter {
    client: Client,
    base_url: String,
}

impl GoogleBooksAdapter {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AdapterError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AdapterError::Permanent {
                source: Source::GoogleBooks,
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
            None => format!(
                "intitle:{} inauthor:{}",
                hint.title.trim(),
                hint.author.trim()
            )
            .replace(' ', "+"),
        };
        format!("{}/volumes?q={}&maxResults=1", self.base_url, query)
    }
}

#[async_trait]
impl SourceAdapter for GoogleBooksAdapter {
    fn source(&self) -> Source {
        Source::GoogleBooks
    }

    async fn fetch(&self, hint: &IdentityHint) -> Result<FetchOutcome, AdapterError> {
        let url = self.query_url(hint);
        debug!(url = %url, "querying google books");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_transport(Source::GoogleBooks, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        if let Some(err) = classify_status(Source::GoogleBooks, status) {
            return Err(err);
        }

        let payload: VolumesResponse = response
            .json()
            .await
            .map_err(|e| classify_transport(Source::GoogleBooks, e))?;

        let Some(volume) = payload.items.and_then(|mut items| {
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        }) else {
            return Ok(FetchOutcome::NotFound);
        };

        Ok(FetchOutcome::Found(volume.into_record()))
    }
}

// ============================================================================
// Payload models
// ============================================================================

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Option<Vec<Volume>>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    #[serde(rename = "volumeInfo", default)]
    volume_info: VolumeInfo,
    #[serde(rename = "saleInfo", default)]
    sale_info: SaleInfo,
}

#[derive(Debug, Default, Deserialize)]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    publisher: Option<String>,
    #[serde(rename = "publishedDate")]
    published_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "pageCount")]
    page_count: Option<i32>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(rename = "averageRating")]
    average_rating: Option<f64>,
    #[serde(rename = "ratingsCount")]
    ratings_count: Option<i32>,
    language: Option<String>,
    #[serde(rename = "industryIdentifiers", default)]
    industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Default, Deserialize)]
struct SaleInfo {
    saleability: Option<String>,
    #[serde(rename = "isEbook")]
    is_ebook: Option<bool>,
    #[serde(rename = "listPrice")]
    list_price: Option<Price>,
    #[serde(rename = "retailPrice")]
    retail_price: Option<Price>,
}

#[derive(Debug, Deserialize)]
struct Price {
    amount: Option<f64>,
    #[serde(rename = "currencyCode")]
    currency_code: Option<String>,
}

impl Volume {
    fn into_record(self) -> RawRecord {
        let info = self.volume_info;
        let sale = self.sale_info;

        let isbn13 = info
            .industry_identifiers
            .iter()
            .find(|id| id.kind == "ISBN_13")
            .map(|id| id.identifier.clone());

        let currency_code = sale
            .list_price
            .as_ref()
            .and_then(|p| p.currency_code.clone())
            .or_else(|| sale.retail_price.as_ref().and_then(|p| p.currency_code.clone()));

        RawRecord {
            isbn13,
            title: info.title,
            description: info.description,
            page_count: info.page_count,
            languages: info.language.into_iter().collect(),
            publisher: info.publisher,
            published_date: info.published_date,
            authors: info
                .authors
                .into_iter()
                .map(|name| AuthorRef {
                    name,
                    external_key: None,
                })
                .collect(),
            genres: info.categories,
            rating_avg: info.average_rating,
            rating_count: info.ratings_count,
            list_price_amount: sale.list_price.and_then(|p| p.amount),
            retail_price_amount: sale.retail_price.and_then(|p| p.amount),
            currency_code,
            is_ebook: sale.is_ebook,
            saleability: sale.saleability,
            edition_count: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url_prefers_isbn() {
        let adapter = GoogleBooksAdapter::new(
            "https://www.googleapis.com/books/v1",
            Duration::from_secs(10),
        )
        .unwrap();

        let with_isbn = IdentityHint {
            title: "Crime and Punishment".to_string(),
            author: "Fyodor Dostoevsky".to_string(),
            isbn: Some("9780140449136".to_string()),
        };
        assert_eq!(
            adapter.query_url(&with_isbn),
            "https://www.googleapis.com/books/v1/volumes?q=isbn:9780140449136&maxResults=1"
        );

        let without_isbn = IdentityHint {
            isbn: None,
            ..with_isbn
        };
        assert_eq!(
            adapter.query_url(&without_isbn),
            "https://www.googleapis.com/books/v1/volumes?q=intitle:Crime+and+Punishment+inauthor:Fyodor+Dostoevsky&maxResults=1"
        );
    }

    #[test]
    fn test_volume_into_record() {
        let payload = serde_json::json!({
            "volumeInfo": {
                "title": "Crime and Punishment",
                "authors": ["Fyodor Dostoevsky"],
                "publisher": "Penguin Classics",
                "publishedDate": "2002-12-31",
                "description": "A novel.",
                "pageCount": 720,
                "categories": ["Fiction"],
                "averageRating": 4.5,
                "ratingsCount": 1200,
                "language": "en",
                "industryIdentifiers": [
                    {"type": "ISBN_10", "identifier": "0140449132"},
                    {"type": "ISBN_13", "identifier": "9780140449136"}
                ]
            },
            "saleInfo": {
                "saleability": "FOR_SALE",
                "isEbook": true,
                "listPrice": {"amount": 12.99, "currencyCode": "USD"},
                "retailPrice": {"amount": 9.99, "currencyCode": "USD"}
            }
        });

        let volume: Volume = serde_json::from_value(payload).unwrap();
        let record = volume.into_record();

        assert_eq!(record.isbn13.as_deref(), Some("9780140449136"));
        assert_eq!(record.title.as_deref(), Some("Crime and Punishment"));
        assert_eq!(record.page_count, Some(720));
        assert_eq!(record.languages, vec!["en"]);
        assert_eq!(record.rating_avg, Some(4.5));
        assert_eq!(record.list_price_amount, Some(12.99));
        assert_eq!(record.currency_code.as_deref(), Some("USD"));
        assert_eq!(record.is_ebook, Some(true));
        assert_eq!(record.saleability.as_deref(), Some("FOR_SALE"));
        assert!(record.edition_count.is_none());
        assert_eq!(record.authors.len(), 1);
        assert!(record.authors[0].external_key.is_none());
    }

    #[test]
    fn test_missing_sale_info_defaults() {
        let payload = serde_json::json!({
            "volumeInfo": {"title": "Bare"}
        });
        let volume: Volume = serde_json::from_value(payload).unwrap();
        let record = volume.into_record();
        assert!(record.is_ebook.is_none());
        assert!(record.list_price_amount.is_none());
    }
}
