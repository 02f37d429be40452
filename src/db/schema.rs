diesel::table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        avatar_url -> Nullable<Varchar>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    videos (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Text,
        video_url -> Varchar,
        thumbnail_url -> Varchar,
        owner_id -> Uuid,
        is_published -> Bool,
        views -> Int8,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    likes (id) {
        id -> Uuid,
        video_id -> Uuid,
        liked_by -> Uuid,
        created_at -> Timestamp,
    }
}

diesel::joinable!(videos -> users (owner_id));
diesel::joinable!(likes -> videos (video_id));
diesel::joinable!(likes -> users (liked_by));

diesel::allow_tables_to_appear_in_same_query!(users, videos, likes,);
