use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use futures::TryStreamExt;
use serde::Deserialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::api::shared::ApiResponse;
use crate::auth::Viewer;
use crate::config::{AppConfig, StorageConfig};
use crate::db::models::{Video, VideoChanges};
use crate::db::schema::videos;
use crate::db::DbPool;
use crate::error::AppError;
use crate::services::feed::{self, FeedFilter, FeedSort, DEFAULT_PAGE_SIZE};
use crate::services::media::{self, AssetKind, MediaStore};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/videos")
            .route("", web::get().to(list_videos))
            .route("", web::post().to(publish_video))
            .route("/subscriptions", web::post().to(subscription_feed))
            .route("/{videoId}/toggle", web::patch().to(toggle_publish_status))
            .route("/{videoId}", web::get().to(get_video))
            .route("/{videoId}", web::patch().to(update_video))
            .route("/{videoId}", web::delete().to(delete_video)),
    );
}

fn parse_video_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("invalid video id: {}", raw)))
}

fn page_size(limit: Option<i64>) -> Result<i64, AppError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit < 1 {
        return Err(AppError::Validation(
            "limit must be a positive integer".to_string(),
        ));
    }
    Ok(limit)
}

#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    pub limit: Option<i64>,
    pub query: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<i32>,
    #[serde(rename = "userId")]
    pub user_id: Option<Uuid>,
}

pub async fn list_videos(
    query: web::Query<ListQueryParams>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let params = query.into_inner();
    let limit = page_size(params.limit)?;
    let filter = FeedFilter::from_params(params.user_id, params.query.as_deref());
    let sort = FeedSort::from_directive(params.sort_by);

    let mut conn = pool.get().await?;
    let page = feed::list_videos(&mut conn, filter, sort, limit).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(page, "videos filtered successfully")))
}

#[derive(Debug, Deserialize)]
pub struct FeedQueryParams {
    pub limit: Option<i64>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionFeedRequest {
    #[serde(rename = "allsubscribedId")]
    pub all_subscribed_id: Vec<SubscribedChannel>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribedChannel {
    pub channel: Uuid,
}

pub async fn subscription_feed(
    query: web::Query<FeedQueryParams>,
    body: web::Json<SubscriptionFeedRequest>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let limit = page_size(query.limit)?;
    let sort = FeedSort::from_directive(query.sort_by);

    let channels: Vec<Uuid> = body
        .into_inner()
        .all_subscribed_id
        .into_iter()
        .map(|entry| entry.channel)
        .collect();
    if channels.is_empty() {
        return Err(AppError::Validation(
            "at least one subscribed channel is required".to_string(),
        ));
    }

    let mut conn = pool.get().await?;
    let page = feed::subscription_feed(&mut conn, &channels, sort, limit).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(page, "videos filtered successfully")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishVideoRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub video_file: Option<String>,
    pub thumbnail: Option<String>,
}

impl PublishVideoRequest {
    /// All four fields are required and must be non-empty.
    fn validated(self) -> Result<(String, String, String, String), AppError> {
        fn required(field: Option<String>, name: &str) -> Result<String, AppError> {
            field
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::Validation(format!("{} is required", name)))
        }

        Ok((
            required(self.title, "title")?,
            required(self.description, "description")?,
            required(self.video_file, "videoFile")?,
            required(self.thumbnail, "thumbnail")?,
        ))
    }
}

pub async fn publish_video(
    viewer: Viewer,
    body: web::Json<PublishVideoRequest>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let (title, description, video_url, thumbnail_url) = body.into_inner().validated()?;

    let now = Utc::now().naive_utc();
    let video = Video {
        id: Uuid::new_v4(),
        title,
        description,
        video_url,
        thumbnail_url,
        owner_id: viewer.user_id,
        is_published: true,
        views: 0,
        created_at: now,
        updated_at: now,
    };

    let mut conn = pool.get().await?;
    let created: Video = diesel::insert_into(videos::table)
        .values(&video)
        .returning(Video::as_returning())
        .get_result(&mut conn)
        .await
        .map_err(|e| AppError::Internal(format!("failed to create video: {}", e)))?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(created, "video uploaded successfully")))
}

#[derive(Debug, Deserialize)]
pub struct DetailQueryParams {
    pub isplaying: Option<bool>,
}

pub async fn get_video(
    viewer: Viewer,
    path: web::Path<String>,
    query: web::Query<DetailQueryParams>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let video_id = parse_video_id(&path)?;
    let is_playing = query.isplaying.unwrap_or(false);

    let mut conn = pool.get().await?;
    let detail = feed::video_detail(&mut conn, video_id, viewer.user_id, is_playing).await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(detail, "video fetched successfully")))
}

#[derive(Debug, Default)]
struct UpdateVideoForm {
    new_title: Option<String>,
    new_description: Option<String>,
    thumbnail: Option<PathBuf>,
}

impl UpdateVideoForm {
    fn is_empty(&self) -> bool {
        self.new_title.is_none() && self.new_description.is_none() && self.thumbnail.is_none()
    }
}

pub async fn update_video(
    _viewer: Viewer,
    path: web::Path<String>,
    payload: Multipart,
    pool: web::Data<DbPool>,
    media: web::Data<MediaStore>,
    config: web::Data<Arc<AppConfig>>,
) -> Result<HttpResponse, AppError> {
    let video_id = parse_video_id(&path)?;

    let form = read_update_form(payload, &config.storage).await?;
    if form.is_empty() {
        return Err(AppError::Validation(
            "supply a new title, description or thumbnail".to_string(),
        ));
    }

    let mut conn = pool.get().await?;
    let current: Option<Video> = videos::table
        .find(video_id)
        .select(Video::as_select())
        .first(&mut conn)
        .await
        .optional()?;
    let Some(current) = current else {
        if let Some(staged) = &form.thumbnail {
            discard_staged(staged).await;
        }
        return Err(AppError::NotFound("video not found".to_string()));
    };

    // The new thumbnail must be durably stored before the old one is
    // touched; cleanup of the old asset runs in the background. The staging
    // copy is garbage once the upload settles, either way.
    let mut new_thumbnail_url = None;
    if let Some(staged) = &form.thumbnail {
        let upload_result = media.upload(staged, AssetKind::Image).await;
        discard_staged(staged).await;
        let uploaded = upload_result?;
        media::spawn_delete(
            media.get_ref().clone(),
            current.thumbnail_url.clone(),
            AssetKind::Image,
        );
        new_thumbnail_url = Some(uploaded.url);
    }

    let updated: Video = diesel::update(videos::table.find(video_id))
        .set(&VideoChanges {
            title: form.new_title,
            description: form.new_description,
            thumbnail_url: new_thumbnail_url,
            updated_at: Utc::now().naive_utc(),
        })
        .returning(Video::as_returning())
        .get_result(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(updated, "video details updated successfully")))
}

pub async fn delete_video(
    _viewer: Viewer,
    path: web::Path<String>,
    pool: web::Data<DbPool>,
    media: web::Data<MediaStore>,
) -> Result<HttpResponse, AppError> {
    let video_id = parse_video_id(&path)?;

    let mut conn = pool.get().await?;
    let deleted: Video = diesel::delete(videos::table.find(video_id))
        .returning(Video::as_returning())
        .get_result(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::NotFound("video not found".to_string()))?;

    // Asset cleanup never blocks or fails the delete
    media::spawn_delete(
        media.get_ref().clone(),
        deleted.thumbnail_url.clone(),
        AssetKind::Image,
    );
    media::spawn_delete(
        media.get_ref().clone(),
        deleted.video_url.clone(),
        AssetKind::Video,
    );

    Ok(HttpResponse::Ok().json(ApiResponse::ok(deleted, "video deleted successfully")))
}

pub async fn toggle_publish_status(
    _viewer: Viewer,
    path: web::Path<String>,
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, AppError> {
    let video_id = parse_video_id(&path)?;

    let mut conn = pool.get().await?;
    let video: Video = videos::table
        .find(video_id)
        .select(Video::as_select())
        .first(&mut conn)
        .await
        .optional()?
        .ok_or_else(|| AppError::NotFound("video not found".to_string()))?;

    let updated: Video = diesel::update(videos::table.find(video_id))
        .set((
            videos::is_published.eq(!video.is_published),
            videos::updated_at.eq(Utc::now().naive_utc()),
        ))
        .returning(Video::as_returning())
        .get_result(&mut conn)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(
        updated,
        "video publish status changed successfully",
    )))
}

async fn read_update_form(
    mut payload: Multipart,
    storage: &StorageConfig,
) -> Result<UpdateVideoForm, AppError> {
    let mut form = UpdateVideoForm::default();

    while let Ok(Some(mut field)) = payload.try_next().await {
        let Some(name) = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .map(str::to_owned)
        else {
            drain_field(&mut field).await;
            continue;
        };

        match name.as_str() {
            "newTitle" => {
                let value = read_text_field(&mut field).await?;
                if !value.trim().is_empty() {
                    form.new_title = Some(value);
                }
            }
            "newDescription" => {
                let value = read_text_field(&mut field).await?;
                if !value.trim().is_empty() {
                    form.new_description = Some(value);
                }
            }
            "thumbnail" => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or("thumbnail")
                    .to_owned();
                form.thumbnail = Some(stage_file(&mut field, storage, &filename).await?);
            }
            _ => {
                // Skip unknown fields
                drain_field(&mut field).await;
            }
        }
    }

    Ok(form)
}

async fn drain_field(field: &mut actix_multipart::Field) {
    while let Ok(Some(_)) = field.try_next().await {}
}

async fn read_text_field(field: &mut actix_multipart::Field) -> Result<String, AppError> {
    let mut value = String::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart field: {}", e)))?
    {
        value.push_str(
            std::str::from_utf8(&chunk)
                .map_err(|e| AppError::Validation(format!("field is not valid utf-8: {}", e)))?,
        );
    }
    Ok(value)
}

/// Streams an uploaded file into the staging directory and returns its
/// path. The file is removed again once the media store upload settles.
async fn stage_file(
    field: &mut actix_multipart::Field,
    storage: &StorageConfig,
    filename: &str,
) -> Result<PathBuf, AppError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");
    let path = Path::new(&storage.staging_path).join(format!("{}.{}", Uuid::new_v4(), ext));

    let mut f = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&path)
        .await
        .map_err(|e| {
            log::error!("failed to open staging file: {}", e);
            AppError::Internal("storage error".to_string())
        })?;

    let mut written = 0usize;
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| AppError::Validation(format!("upload interrupted: {}", e)))?
    {
        written += chunk.len();
        if written > storage.max_file_size {
            drop(f);
            discard_staged(&path).await;
            return Err(AppError::Validation(
                "uploaded file exceeds the size limit".to_string(),
            ));
        }
        f.write_all(&chunk).await.map_err(|e| {
            log::error!("failed to write staging file: {}", e);
            AppError::Internal("storage error".to_string())
        })?;
    }

    f.sync_all().await.map_err(|e| {
        log::error!("failed to sync staging file: {}", e);
        AppError::Internal("storage error".to_string())
    })?;

    Ok(path)
}

async fn discard_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("failed to remove staged file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_defaults_to_nine() {
        assert_eq!(page_size(None).unwrap(), 9);
    }

    #[test]
    fn page_size_rejects_non_positive_limits() {
        assert!(matches!(page_size(Some(0)), Err(AppError::Validation(_))));
        assert!(matches!(page_size(Some(-3)), Err(AppError::Validation(_))));
        assert_eq!(page_size(Some(2)).unwrap(), 2);
    }

    #[test]
    fn malformed_video_ids_are_a_validation_error() {
        assert!(matches!(
            parse_video_id("not-a-uuid"),
            Err(AppError::Validation(_))
        ));
        let id = Uuid::new_v4();
        assert_eq!(parse_video_id(&id.to_string()).unwrap(), id);
    }

    fn full_publish_request() -> PublishVideoRequest {
        PublishVideoRequest {
            title: Some("A".to_string()),
            description: Some("B".to_string()),
            video_file: Some("https://media.example.com/m1".to_string()),
            thumbnail: Some("https://media.example.com/t1".to_string()),
        }
    }

    #[test]
    fn publish_requires_every_field() {
        for strip in 0..4 {
            let mut request = full_publish_request();
            match strip {
                0 => request.title = None,
                1 => request.description = None,
                2 => request.video_file = None,
                _ => request.thumbnail = None,
            }
            assert!(matches!(
                request.validated(),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn publish_rejects_blank_fields() {
        let mut request = full_publish_request();
        request.title = Some("   ".to_string());
        assert!(matches!(request.validated(), Err(AppError::Validation(_))));
    }

    #[test]
    fn publish_accepts_a_complete_request() {
        let (title, description, video_url, thumbnail_url) =
            full_publish_request().validated().unwrap();
        assert_eq!(title, "A");
        assert_eq!(description, "B");
        assert_eq!(video_url, "https://media.example.com/m1");
        assert_eq!(thumbnail_url, "https://media.example.com/t1");
    }

    #[test]
    fn update_form_with_no_fields_is_empty() {
        assert!(UpdateVideoForm::default().is_empty());

        let form = UpdateVideoForm {
            new_title: Some("t".to_string()),
            ..Default::default()
        };
        assert!(!form.is_empty());

        let form = UpdateVideoForm {
            thumbnail: Some(PathBuf::from("uploads/staging/x.png")),
            ..Default::default()
        };
        assert!(!form.is_empty());
    }
}
