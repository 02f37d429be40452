use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Queryable, Selectable, Insertable, Clone)]
#[diesel(table_name = crate::db::schema::users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub avatar_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, Queryable, Selectable, Insertable, Clone)]
#[diesel(table_name = crate::db::schema::videos)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub owner_id: Uuid,
    pub is_published: bool,
    pub views: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Partial update for a video; `None` fields are left untouched.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = crate::db::schema::videos)]
pub struct VideoChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub updated_at: NaiveDateTime,
}

/// Feed entry: a video joined with its owner's avatar. The avatar is
/// derived on every read and never persisted on the video row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoWithOwner {
    #[serde(flatten)]
    pub video: Video,
    pub owner_avatar: Option<String>,
}

/// Detail view: a video plus its like aggregates. The raw like rows are
/// never part of the response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetail {
    #[serde(flatten)]
    pub video: Video,
    pub total_likes: i64,
    pub liked_by_me: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_video() -> Video {
        let t = NaiveDate::from_ymd_opt(2026, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        Video {
            id: Uuid::nil(),
            title: "A".to_string(),
            description: "B".to_string(),
            video_url: "https://media.example.com/m1".to_string(),
            thumbnail_url: "https://media.example.com/t1".to_string(),
            owner_id: Uuid::nil(),
            is_published: true,
            views: 0,
            created_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn enriched_video_flattens_the_base_record() {
        let entry = VideoWithOwner {
            video: sample_video(),
            owner_avatar: Some("https://media.example.com/a1".to_string()),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["title"], "A");
        assert_eq!(json["isPublished"], true);
        assert_eq!(json["ownerAvatar"], "https://media.example.com/a1");
    }

    #[test]
    fn detail_carries_like_aggregates_but_no_like_rows() {
        let detail = VideoDetail {
            video: sample_video(),
            total_likes: 3,
            liked_by_me: true,
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["totalLikes"], 3);
        assert_eq!(json["likedByMe"], true);
        assert!(json.get("likes").is_none());
    }
}
