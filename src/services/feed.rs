// src/services/feed.rs
//
// Query construction and enrichment for the video feed. Handlers translate
// request parameters into a `FeedFilter`/`FeedSort` pair and the functions
// here turn that into store queries.

use diesel::dsl::exists;
use diesel::helper_types::{AsSelect, InnerJoin, IntoBoxed, Select};
use diesel::pg::Pg;
use diesel::{
    select, BoolExpressionMethods, ExpressionMethods, OptionalExtension, QueryDsl,
    SelectableHelper,
};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use uuid::Uuid;

use crate::db::models::{User, Video, VideoDetail, VideoWithOwner};
use crate::db::schema::{likes, users, videos};
use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 9;

/// Sort directive for feed queries. A positive directive sorts by title
/// ascending, a negative one by title descending; without one the feed is
/// newest-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedSort {
    TitleAsc,
    TitleDesc,
    Newest,
}

impl FeedSort {
    pub fn from_directive(directive: Option<i32>) -> Self {
        match directive {
            Some(n) if n > 0 => FeedSort::TitleAsc,
            Some(n) if n < 0 => FeedSort::TitleDesc,
            _ => FeedSort::Newest,
        }
    }
}

/// Filter for the main feed. The owner clause and the two text clauses are
/// combined with OR, and a clause that was not supplied matches every
/// video: the disjunction therefore only narrows the result when the owner
/// scope and the search term are both present. Upstream clients depend on
/// that shape, so it is kept rather than tightened to AND-of-owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFilter {
    All,
    OwnerOrText { owner: Uuid, term: String },
}

impl FeedFilter {
    pub fn from_params(owner: Option<Uuid>, term: Option<&str>) -> Self {
        match (owner, term) {
            (Some(owner), Some(term)) => FeedFilter::OwnerOrText {
                owner,
                term: term.to_string(),
            },
            _ => FeedFilter::All,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedPage {
    pub videos: Vec<VideoWithOwner>,
    pub length: i64,
}

type FeedSource = Select<
    InnerJoin<videos::table, users::table>,
    (AsSelect<Video, Pg>, AsSelect<User, Pg>),
>;
type BoxedFeedQuery<'a> = IntoBoxed<'a, FeedSource, Pg>;

fn feed_query<'a>(sort: FeedSort) -> BoxedFeedQuery<'a> {
    let query = videos::table
        .inner_join(users::table)
        .select((Video::as_select(), User::as_select()))
        .into_boxed();

    match sort {
        FeedSort::TitleAsc => query.order(videos::title.asc()),
        FeedSort::TitleDesc => query.order(videos::title.desc()),
        // Recency comes from the creation timestamp; the id breaks ties so
        // pages stay stable across requests.
        FeedSort::Newest => query.order((videos::created_at.desc(), videos::id.desc())),
    }
}

fn enrich((video, owner): (Video, User)) -> VideoWithOwner {
    VideoWithOwner {
        video,
        owner_avatar: owner.avatar_url,
    }
}

// The reported length counts every video in the store, not the filtered
// set. Upstream clients page against the global count.
async fn global_video_count(conn: &mut AsyncPgConnection) -> Result<i64, AppError> {
    let count = videos::table.count().get_result(conn).await?;
    Ok(count)
}

pub async fn list_videos(
    conn: &mut AsyncPgConnection,
    filter: FeedFilter,
    sort: FeedSort,
    limit: i64,
) -> Result<FeedPage, AppError> {
    let mut query = feed_query(sort);

    if let FeedFilter::OwnerOrText { owner, term } = filter {
        query = query.filter(
            videos::owner_id
                .eq(owner)
                .or(videos::title.eq(term.clone()))
                .or(videos::description.eq(term)),
        );
    }

    let rows: Vec<(Video, User)> = query.limit(limit).load(conn).await?;
    let length = global_video_count(conn).await?;

    Ok(FeedPage {
        videos: rows.into_iter().map(enrich).collect(),
        length,
    })
}

/// Feed restricted to the channels the viewer is subscribed to.
pub async fn subscription_feed(
    conn: &mut AsyncPgConnection,
    channels: &[Uuid],
    sort: FeedSort,
    limit: i64,
) -> Result<FeedPage, AppError> {
    let query = feed_query(sort).filter(videos::owner_id.eq_any(channels.to_vec()));

    let rows: Vec<(Video, User)> = query.limit(limit).load(conn).await?;
    let length = global_video_count(conn).await?;

    Ok(FeedPage {
        videos: rows.into_iter().map(enrich).collect(),
        length,
    })
}

/// Loads one video, applies the playback view-count side effect, and
/// recomputes its like aggregates for the acting viewer.
pub async fn video_detail(
    conn: &mut AsyncPgConnection,
    video_id: Uuid,
    viewer: Uuid,
    is_playing: bool,
) -> Result<VideoDetail, AppError> {
    let video: Video = videos::table
        .find(video_id)
        .select(Video::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::NotFound("video not found".to_string()))?;

    // Playback counts as a view. The increment is a single-field update so
    // the store's row-level atomicity covers concurrent playbacks.
    let video = if is_playing {
        diesel::update(videos::table.find(video_id))
            .set(videos::views.eq(videos::views + 1))
            .returning(Video::as_returning())
            .get_result(conn)
            .await?
    } else {
        video
    };

    let total_likes: i64 = likes::table
        .filter(likes::video_id.eq(video_id))
        .count()
        .get_result(conn)
        .await?;

    let liked_by_me: bool = select(exists(
        likes::table
            .filter(likes::video_id.eq(video_id))
            .filter(likes::liked_by.eq(viewer)),
    ))
    .get_result(conn)
    .await?;

    Ok(VideoDetail {
        video,
        total_likes,
        liked_by_me,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_directive_sorts_by_title_ascending() {
        assert_eq!(FeedSort::from_directive(Some(1)), FeedSort::TitleAsc);
        assert_eq!(FeedSort::from_directive(Some(42)), FeedSort::TitleAsc);
    }

    #[test]
    fn negative_directive_sorts_by_title_descending() {
        assert_eq!(FeedSort::from_directive(Some(-1)), FeedSort::TitleDesc);
    }

    #[test]
    fn missing_or_zero_directive_sorts_newest_first() {
        assert_eq!(FeedSort::from_directive(None), FeedSort::Newest);
        assert_eq!(FeedSort::from_directive(Some(0)), FeedSort::Newest);
    }

    #[test]
    fn filter_narrows_only_when_owner_and_term_are_both_set() {
        let owner = Uuid::new_v4();

        assert_eq!(FeedFilter::from_params(None, None), FeedFilter::All);
        assert_eq!(FeedFilter::from_params(Some(owner), None), FeedFilter::All);
        assert_eq!(FeedFilter::from_params(None, Some("cats")), FeedFilter::All);
        assert_eq!(
            FeedFilter::from_params(Some(owner), Some("cats")),
            FeedFilter::OwnerOrText {
                owner,
                term: "cats".to_string()
            }
        );
    }
}
