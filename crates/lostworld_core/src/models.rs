use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const WORLD_TYPE: &str = "world";
pub const AUTH_COOKIE: &str = "auth";
pub const SECOND_FACTOR_MARKER: &str = "requiresTwoFactorAuth";

/// Cookie name to value, as captured from the platform's domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialSet(BTreeMap<String, String>);

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn has_auth_cookie(&self) -> bool {
        self.get(AUTH_COOKIE).is_some_and(|v| !v.is_empty())
    }

    /// Renders the set as a `Cookie` request header value.
    pub fn to_header_value(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Parses a `name=value; name2=value2` header string. Pairs without `=`
    /// or with an empty name are skipped.
    pub fn parse_header(raw: &str) -> Self {
        let raw = raw.trim();
        let raw = raw
            .strip_prefix("Cookie:")
            .or_else(|| raw.strip_prefix("cookie:"))
            .unwrap_or(raw);
        raw.split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for CredentialSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

/// Entry of the flat favorites list. `id` identifies the favorite itself,
/// `favorite_id` the favorited world.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRecord {
    pub id: String,
    pub favorite_id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FavoriteRecord {
    pub fn group_name(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteGroupRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl FavoriteGroupRecord {
    pub fn is_world_group(&self) -> bool {
        self.kind == WORLD_TYPE
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Public,
    Private,
    Hidden,
    #[default]
    #[serde(other)]
    Unknown,
}

/// World summary as returned per favorite group. Restricted worlds come back
/// with masked or missing fields.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FavoritedWorld {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub favorite_id: Option<String>,
    #[serde(default)]
    pub favorite_group: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub release_status: ReleaseStatus,
    #[serde(rename = "created_at", default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub publication_date: Option<DateTime<Utc>>,
    #[serde(rename = "updated_at", default, deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Subset of the world detail lookup used to fill in masked summaries.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorldDetail {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub author_name: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PerTypeLimit {
    #[serde(default)]
    pub world: u32,
    #[serde(default)]
    pub avatar: u32,
    #[serde(default)]
    pub friend: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteLimits {
    pub max_favorite_groups: PerTypeLimit,
    pub max_favorites_per_group: PerTypeLimit,
}

impl FavoriteLimits {
    /// Hard ceiling on the number of world favorites an account can hold.
    pub fn total_world_favorites(&self) -> usize {
        self.max_favorite_groups.world as usize * self.max_favorites_per_group.world as usize
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutResponse {
    pub success: LogoutSuccess,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutSuccess {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status_code: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorldStatus {
    Public,
    Private,
    Deleted,
}

impl From<ReleaseStatus> for WorldStatus {
    fn from(status: ReleaseStatus) -> Self {
        match status {
            ReleaseStatus::Public => WorldStatus::Public,
            ReleaseStatus::Private => WorldStatus::Private,
            ReleaseStatus::Hidden | ReleaseStatus::Unknown => WorldStatus::Deleted,
        }
    }
}

impl fmt::Display for WorldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorldStatus::Public => "Public",
            WorldStatus::Private => "Private",
            WorldStatus::Deleted => "Deleted",
        };
        f.write_str(label)
    }
}

/// One row of the exported report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AggregatedRecord {
    pub fav_group: String,
    pub world_id: String,
    pub name: String,
    pub author: String,
    pub description: String,
    pub link: String,
    pub reference: String,
    pub status: WorldStatus,
    pub created: Option<DateTime<Utc>>,
    pub published: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
}

pub fn world_link(world_id: &str) -> String {
    format!("https://vrchat.com/home/world/{world_id}")
}

pub fn world_reference(world_id: &str) -> String {
    format!("https://www.vrcw.net/world/detail/{world_id}")
}

/// Timestamps on restricted worlds are sometimes `"none"` or masked; those
/// become `None` instead of failing the whole page.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|value| {
        DateTime::parse_from_rfc3339(value.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cookie_header_parsing_skips_junk() {
        let set = CredentialSet::parse_header("Cookie: auth=abc; twoFactorAuth=xyz;;=oops; junk");
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("auth"), Some("abc"));
        assert_eq!(set.get("twoFactorAuth"), Some("xyz"));
        assert!(set.has_auth_cookie());
        assert_eq!(set.to_header_value(), "auth=abc; twoFactorAuth=xyz");
    }

    #[test]
    fn favorited_world_tolerates_masked_fields() {
        let world: FavoritedWorld = serde_json::from_value(json!({
            "id": "???",
            "favoriteGroup": "worlds1",
            "name": "???",
            "releaseStatus": "private",
            "created_at": "none",
            "publicationDate": "none",
            "updated_at": "2024-03-01T10:00:00.000Z"
        }))
        .expect("summary");
        assert_eq!(world.favorite_id, None);
        assert_eq!(world.release_status, ReleaseStatus::Private);
        assert!(world.created_at.is_none());
        assert!(world.publication_date.is_none());
        assert!(world.updated_at.is_some());
    }

    #[test]
    fn unknown_release_status_maps_to_deleted() {
        let status: ReleaseStatus = serde_json::from_value(json!("all")).expect("status");
        assert_eq!(status, ReleaseStatus::Unknown);
        assert_eq!(WorldStatus::from(status), WorldStatus::Deleted);
        assert_eq!(WorldStatus::from(ReleaseStatus::Hidden).to_string(), "Deleted");
    }

    #[test]
    fn limits_multiply_world_values() {
        let limits: FavoriteLimits = serde_json::from_value(json!({
            "maxFavoriteGroups": {"avatar": 6, "friend": 3, "world": 4},
            "maxFavoritesPerGroup": {"avatar": 50, "friend": 150, "world": 100}
        }))
        .expect("limits");
        assert_eq!(limits.total_world_favorites(), 400);
    }
}
