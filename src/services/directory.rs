use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::models::Profile;

/// Errors that can occur when reading profiles
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: invalid API key or token")]
    Unauthorized,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Seed file error: {0}")]
    SeedIo(#[from] std::io::Error),

    #[error("Seed file is not valid profile JSON: {0}")]
    SeedParse(#[from] serde_json::Error),
}

/// Read-only access to student profiles owned by the profile service
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Profile, DirectoryError>;

    /// Profiles that could be offered to `viewer_id` as candidates
    ///
    /// Never returns the viewer or anyone in `excluded`. Implementations may
    /// also pre-filter on active/verified; callers filter again regardless.
    async fn list_profiles(
        &self,
        viewer_id: &str,
        excluded: &HashSet<String>,
    ) -> Result<Vec<Profile>, DirectoryError>;
}

/// Exclusions pushed into the query as `notEqual` filters. Appwrite caps the
/// number of queries per request; the rest are filtered while paging.
const MAX_QUERY_EXCLUSIONS: usize = 50;

/// Appwrite REST client for the user profile collection
pub struct AppwriteDirectory {
    base_url: String,
    api_key: String,
    project_id: String,
    database_id: String,
    profiles_collection: String,
    pool_limit: usize,
    client: Client,
}

impl AppwriteDirectory {
    pub fn new(
        base_url: String,
        api_key: String,
        project_id: String,
        database_id: String,
        profiles_collection: String,
        pool_limit: usize,
    ) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url,
            api_key,
            project_id,
            database_id,
            profiles_collection,
            pool_limit,
            client,
        })
    }

    fn documents_url(&self, queries: &[String]) -> String {
        let mut url = format!(
            "{}/databases/{}/collections/{}/documents",
            self.base_url.trim_end_matches('/'),
            self.database_id,
            self.profiles_collection
        );

        for (i, query) in queries.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str("queries[]=");
            url.push_str(&urlencoding::encode(query));
        }
        url
    }

    async fn fetch_documents(&self, queries: &[String]) -> Result<Vec<Value>, DirectoryError> {
        let url = self.documents_url(queries);

        tracing::debug!("Fetching profile documents from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Appwrite-Key", &self.api_key)
            .header("X-Appwrite-Project", &self.project_id)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DirectoryError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            tracing::error!("Profile query failed: {} - {}", status, body);
            return Err(DirectoryError::ApiError(format!("Failed to query profiles: {}", status)));
        }

        let json: Value = response.json().await?;

        json.get("documents")
            .and_then(|d| d.as_array())
            .cloned()
            .ok_or_else(|| DirectoryError::InvalidResponse("Missing documents array".into()))
    }
}

/// Pull a profile out of an Appwrite document, using `$id` when `userId` is absent
fn parse_profile(doc: &Value) -> Result<Profile, DirectoryError> {
    let mut data = doc.get("data").unwrap_or(doc).clone();

    if let Some(obj) = data.as_object_mut() {
        if !obj.contains_key("userId") {
            if let Some(id) = doc.get("$id").cloned() {
                obj.insert("userId".to_string(), id);
            }
        }
    }

    serde_json::from_value(data)
        .map_err(|e| DirectoryError::InvalidResponse(format!("Failed to parse profile: {}", e)))
}

#[async_trait]
impl ProfileDirectory for AppwriteDirectory {
    async fn get_profile(&self, user_id: &str) -> Result<Profile, DirectoryError> {
        let queries = vec![
            format!("equal(\"userId\", [{}])", serde_json::Value::from(user_id)),
            "limit(1)".to_string(),
        ];

        let documents = self.fetch_documents(&queries).await?;
        let doc = documents
            .first()
            .ok_or_else(|| DirectoryError::NotFound(format!("Profile not found for user {}", user_id)))?;

        parse_profile(doc)
    }

    /// Pages through active, verified profiles in `userId` order until
    /// `pool_limit` of them are outside the exclusion set or the collection
    /// runs out.
    async fn list_profiles(
        &self,
        viewer_id: &str,
        excluded: &HashSet<String>,
    ) -> Result<Vec<Profile>, DirectoryError> {
        let page_size = self.pool_limit.max(1);

        let mut filters = vec![
            "equal(\"isActive\", [true])".to_string(),
            "equal(\"isEmailVerified\", [true])".to_string(),
            format!("notEqual(\"userId\", [{}])", Value::from(viewer_id)),
            "orderAsc(\"userId\")".to_string(),
        ];

        let mut pushed: Vec<&String> = excluded.iter().collect();
        pushed.sort();
        for id in pushed.into_iter().take(MAX_QUERY_EXCLUSIONS) {
            filters.push(format!("notEqual(\"userId\", [{}])", Value::from(id.as_str())));
        }

        let mut profiles = Vec::new();
        let mut offset = 0;

        loop {
            let mut queries = filters.clone();
            queries.push(format!("limit({})", page_size));
            queries.push(format!("offset({})", offset));

            let documents = self.fetch_documents(&queries).await?;
            let fetched = documents.len();

            for doc in &documents {
                match parse_profile(doc) {
                    Ok(profile) if profile.user_id == viewer_id || excluded.contains(&profile.user_id) => {}
                    Ok(profile) => profiles.push(profile),
                    Err(e) => tracing::warn!("Skipping unreadable profile document: {}", e),
                }
            }

            offset += fetched;
            if fetched < page_size || profiles.len() >= self.pool_limit {
                break;
            }
        }

        profiles.truncate(self.pool_limit);
        tracing::debug!("Queried {} candidate profiles for {} ({} documents read)", profiles.len(), viewer_id, offset);

        Ok(profiles)
    }
}

/// Fixed in-process directory, loaded from a JSON seed file or built directly
#[derive(Default)]
pub struct StaticDirectory {
    profiles: RwLock<Vec<Profile>>,
    index: RwLock<HashMap<String, usize>>,
}

impl StaticDirectory {
    pub fn from_profiles(profiles: Vec<Profile>) -> Self {
        let directory = Self::default();
        for profile in profiles {
            directory.insert(profile);
        }
        directory
    }

    /// Load a JSON array of profiles
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let profiles: Vec<Profile> = serde_json::from_str(&raw)?;

        tracing::info!("Loaded {} profiles from {}", profiles.len(), path.as_ref().display());

        Ok(Self::from_profiles(profiles))
    }

    /// Insert or replace a profile, keeping its original position on replace
    pub fn insert(&self, profile: Profile) {
        let mut profiles = self.profiles.write();
        let mut index = self.index.write();

        match index.get(&profile.user_id) {
            Some(&position) => profiles[position] = profile,
            None => {
                index.insert(profile.user_id.clone(), profiles.len());
                profiles.push(profile);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProfileDirectory for StaticDirectory {
    async fn get_profile(&self, user_id: &str) -> Result<Profile, DirectoryError> {
        let profiles = self.profiles.read();
        let index = self.index.read();

        index
            .get(user_id)
            .and_then(|&position| profiles.get(position))
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("Profile not found for user {}", user_id)))
    }

    async fn list_profiles(
        &self,
        viewer_id: &str,
        excluded: &HashSet<String>,
    ) -> Result<Vec<Profile>, DirectoryError> {
        Ok(self
            .profiles
            .read()
            .iter()
            .filter(|p| p.user_id != viewer_id && !excluded.contains(&p.user_id))
            .cloned()
            .collect())
    }
}
