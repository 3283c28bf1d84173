use crate::models::{MapDetail, OfficialMap};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

const DETAILS_URL: &str = "https://api.steampowered.com/IPublishedFileService/GetDetails/v1";
const CS2_APP_ID: &str = "730";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

static BSP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+/(\S+)\.bsp").expect("Invalid bsp filename regex"));

/// Errors from the Steam Web API lookup
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("No Steam Web API token configured")]
    NoApiToken,

    #[error("Steam API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Steam API returned status {0}")]
    Status(u16),

    #[error("Unexpected Steam API response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
pub struct DetailsResponse {
    pub response: DetailsBody,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailsBody {
    #[serde(default)]
    pub publishedfiledetails: Vec<PublishedFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PublishedFile {
    pub result: i32,
    pub publishedfileid: String,
    pub filename: String,
    pub title: String,
    #[serde(alias = "description")]
    pub file_description: String,
    pub preview_url: String,
    pub tags: Vec<FileTag>,
    pub children: Vec<FileChild>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileTag {
    pub tag: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileChild {
    pub publishedfileid: String,
}

/// Steam Workshop lookups for the map catalog
#[derive(Debug, Clone)]
pub struct MapCatalog {
    client: Client,
    api_token: String,
    official_maps: Vec<OfficialMap>,
}

impl MapCatalog {
    /// Fails when the HTTP client cannot be built (e.g. no TLS backend).
    pub fn new(api_token: &str, official_maps: Vec<OfficialMap>) -> Result<Self, CatalogError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            api_token: api_token.to_string(),
            official_maps,
        })
    }

    /// Name-only entries for the configured official maps
    pub fn official_fallback(&self) -> Vec<MapDetail> {
        self.official_maps
            .iter()
            .map(|m| MapDetail::name_only(&m.name, &m.id, true))
            .collect()
    }

    /// Full details of the official maps that have a workshop id.
    pub async fn official_details(&self) -> Result<Vec<MapDetail>, CatalogError> {
        self.token()?;
        let ids: Vec<String> = self
            .official_maps
            .iter()
            .filter(|m| !m.id.is_empty())
            .map(|m| m.id.clone())
            .collect();
        if ids.is_empty() {
            return Err(CatalogError::Decode("no official map ids configured".to_string()));
        }

        self.map_details(&ids, true).await
    }

    /// Ids of the maps contained in a workshop collection.
    pub async fn collection_children(&self, collection_id: &str) -> Result<Vec<String>, CatalogError> {
        let token = self.token()?;
        let query = [
            ("key", token.to_string()),
            ("publishedfileids[0]", collection_id.to_string()),
            ("includechildren", "true".to_string()),
        ];

        let response = self.get(&query).await?;
        let collection = response
            .response
            .publishedfiledetails
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::Decode("empty collection response".to_string()))?;

        Ok(collection
            .children
            .into_iter()
            .map(|c| c.publishedfileid)
            .collect())
    }

    pub async fn map_details(
        &self,
        ids: &[String],
        official: bool,
    ) -> Result<Vec<MapDetail>, CatalogError> {
        let token = self.token()?;
        let mut query = vec![
            ("key".to_string(), token.to_string()),
            ("appid".to_string(), CS2_APP_ID.to_string()),
        ];
        for (i, id) in ids.iter().enumerate() {
            query.push((format!("publishedfileids[{}]", i), id.clone()));
        }

        let response = self.get(&query).await?;
        Ok(details_from_response(
            response,
            official,
            &self.official_maps,
        ))
    }

    fn token(&self) -> Result<&str, CatalogError> {
        if self.api_token.is_empty() {
            Err(CatalogError::NoApiToken)
        } else {
            Ok(&self.api_token)
        }
    }

    async fn get<Q: serde::Serialize + ?Sized>(
        &self,
        query: &Q,
    ) -> Result<DetailsResponse, CatalogError> {
        let response = self.client.get(DETAILS_URL).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Steam GetDetails call failed with status {}", status);
            return Err(CatalogError::Status(status.as_u16()));
        }

        Ok(response.json::<DetailsResponse>().await?)
    }
}

/// Convert a GetDetails response into catalog entries, skipping failed items.
///
/// The map name comes from the `.bsp` filename; official maps without a
/// filename are named from the configured official list.
pub fn details_from_response(
    response: DetailsResponse,
    official: bool,
    official_maps: &[OfficialMap],
) -> Vec<MapDetail> {
    response
        .response
        .publishedfiledetails
        .into_iter()
        .filter_map(|file| {
            if file.result != 1 {
                tracing::warn!(
                    "No details for map {}. Query result: {}",
                    file.publishedfileid,
                    file.result
                );
                return None;
            }

            let name = if let Some(c) = BSP_NAME.captures(&file.filename) {
                c[1].to_string()
            } else if official {
                official_maps
                    .iter()
                    .find(|m| m.id == file.publishedfileid)
                    .map(|m| m.name.clone())
                    .unwrap_or_default()
            } else {
                String::new()
            };

            Some(MapDetail {
                name,
                official,
                title: file.title,
                workshop_id: file.publishedfileid,
                description: file.file_description,
                preview_link: file.preview_url,
                tags: file.tags.into_iter().map(|t| t.tag).collect(),
            })
        })
        .collect()
}

/// Name-only entries from the output of `ds_workshop_listmaps`.
///
/// Blank lines and the console echo of the command are dropped.
pub fn workshop_maps_from_listing(listing: &str) -> Vec<MapDetail> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(' '))
        .map(|name| MapDetail::name_only(name, "", false))
        .collect()
}

/// Sort by title, ignoring case
pub fn sort_by_title(details: &mut [MapDetail]) {
    details.sort_by_key(|d| d.title.to_lowercase());
}
