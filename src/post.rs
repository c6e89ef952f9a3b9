use std::{cmp::Reverse, fmt::Display};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Post as kept in the feed and in the local mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub username: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub timestamp: String,
}

/// Identity of a post from the client's point of view.
///
/// A post created locally is [`PostId::Pending`] until the server answers the
/// creation request with its own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostId {
    /// Provisional id minted by this client.
    Pending(String),
    /// Id assigned by the remote service.
    Confirmed(String),
}

/// Body of create and update requests. Never carries an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub username: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub timestamp: String,
}

/// Post-shaped object as returned by `GET /posts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePost {
    pub id: RemoteId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub timestamp: RemoteTimestamp,
}

/// Server timestamp: a date string or epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteTimestamp {
    Millis(f64),
    Text(String),
}

/// Server id that is either a [`u64`] or a [`String`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(u64),
    String(String),
}

impl PostId {
    /// Raw id string, whichever side minted it.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending(s) | Self::Confirmed(s) => s,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

impl Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(v) => v.fmt(f),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl Post {
    pub fn from_draft(id: PostId, draft: PostDraft) -> Self {
        let PostDraft {
            username,
            content,
            image,
            timestamp,
        } = draft;

        Self {
            id,
            username,
            content,
            image,
            timestamp,
        }
    }

    /// Parsed timestamp. Accepts RFC 3339, ISO date-times without an offset
    /// (local time) and bare dates (UTC midnight).
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        let raw = self.timestamp.trim();

        if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
            return Some(t.with_timezone(&Utc));
        }

        let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok());
        if let Some(naive) = naive {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc));
        }

        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| Utc.from_utc_datetime(&t))
    }

    /// Whether `draft` is exactly what this post carries.
    pub fn holds(&self, draft: &PostDraft) -> bool {
        self.username == draft.username
            && self.content == draft.content
            && self.image == draft.image
            && self.timestamp == draft.timestamp
    }
}

impl From<RemotePost> for Post {
    fn from(remote: RemotePost) -> Self {
        Self {
            id: PostId::Confirmed(remote.id.to_string()),
            username: remote.username,
            content: remote.content,
            image: remote.image.filter(|s| !s.is_empty()),
            timestamp: remote.timestamp.into_string(),
        }
    }
}

impl RemoteTimestamp {
    /// Text as received; epoch milliseconds become RFC 3339.
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Millis(ms) => Utc
                .timestamp_millis_opt(ms as i64)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| ms.to_string()),
        }
    }
}

impl Default for RemoteTimestamp {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl PostDraft {
    /// Draft stamped with the current time.
    pub fn now(username: impl Into<String>, content: impl Into<String>, image: Option<String>) -> Self {
        Self {
            username: username.into(),
            content: content.into(),
            image,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Sorts newest first. Stable, so equal or unparseable timestamps keep their
/// relative order; unparseable ones end up last.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by_cached_key(|p| Reverse(p.instant()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, timestamp: &str) -> Post {
        Post {
            id: PostId::Confirmed(id.to_owned()),
            username: "alice".to_owned(),
            content: String::new(),
            image: None,
            timestamp: timestamp.to_owned(),
        }
    }

    #[test]
    fn sorts_descending_by_timestamp() {
        let mut posts = vec![
            post("a", "2024-01-01T10:00:00Z"),
            post("b", "2024-03-01T10:00:00Z"),
            post("c", "2024-02-01T10:00:00+02:00"),
        ];

        sort_newest_first(&mut posts);

        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn unparseable_timestamps_go_last() {
        let mut posts = vec![
            post("bad", "yesterday"),
            post("old", "2020-01-01T00:00:00Z"),
            post("new", "2021-01-01T00:00:00Z"),
        ];

        sort_newest_first(&mut posts);

        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["new", "old", "bad"]);
    }

    #[test]
    fn offsetless_and_date_only_timestamps_order() {
        let mut posts = vec![
            post("1", "2024-01-01T10:00:00"),
            post("2", "2024-03-01T10:00:00"),
            post("3", "2024-02-01T10:00:00.250"),
            post("4", "2024-02-15"),
            post("5", "2023-12-31 23:59:59"),
        ];

        sort_newest_first(&mut posts);

        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["2", "4", "3", "1", "5"]);
    }

    #[test]
    fn epoch_millis_from_the_server() {
        let remote: Vec<RemotePost> = serde_json::from_str(
            r#"[
                {"id": 1, "username": "bob", "content": "old", "timestamp": 1704067200000},
                {"id": 2, "username": "bob", "content": "new", "timestamp": "2024-06-01T00:00:00Z"},
                {"id": 3, "username": "bob", "content": "mid", "timestamp": 1709251200000.0}
            ]"#,
        )
        .unwrap();

        let mut posts: Vec<Post> = remote.into_iter().map(Post::from).collect();
        assert_eq!(
            posts[0].instant(),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single()
        );

        sort_newest_first(&mut posts);

        let ids: Vec<_> = posts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["2", "3", "1"]);
    }

    #[test]
    fn remote_ids_accept_numbers_and_strings() {
        let posts: Vec<RemotePost> = serde_json::from_str(
            r#"[
                {"id": 7, "username": "bob", "content": "x", "timestamp": "t"},
                {"id": "ab12", "username": "eve", "content": "y", "image": null, "timestamp": "t"}
            ]"#,
        )
        .unwrap();

        let posts: Vec<Post> = posts.into_iter().map(Post::from).collect();
        assert_eq!(posts[0].id, PostId::Confirmed("7".to_owned()));
        assert_eq!(posts[1].id, PostId::Confirmed("ab12".to_owned()));
        assert_eq!(posts[1].image, None);
    }

    #[test]
    fn draft_never_serializes_an_id() {
        let draft = PostDraft::now("alice", "hi", None);
        let value = serde_json::to_value(&draft).unwrap();

        assert!(value.get("id").is_none());
        assert!(value.get("image").is_none());
        assert_eq!(value["content"], "hi");
    }
}
