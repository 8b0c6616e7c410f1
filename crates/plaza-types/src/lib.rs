//! Types shared across the plaza crates: domain models as they leave the
//! stores, and the JSON bodies of the HTTP API.

pub mod api;
pub mod models;

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::api::SortDirection;
    use super::models::{FeedItem, Post};

    #[test]
    fn sort_direction_only_accepts_two_values() {
        assert_eq!(SortDirection::parse("asc"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::parse("desc"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::parse("DESC; DROP TABLE posts"), None);
        assert_eq!(SortDirection::parse(""), None);
    }

    #[test]
    fn feed_item_flattens_post_fields() {
        let now = Utc::now();
        let item = FeedItem {
            post: Post {
                id: 7,
                user_id: 1,
                title: "hello".into(),
                content: "world".into(),
                tags: vec!["rust".into()],
                created_at: now,
                updated_at: now,
                version: 0,
            },
            username: "alice".into(),
            comments_count: 3,
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["title"], "hello");
        assert_eq!(value["username"], "alice");
        assert_eq!(value["comments_count"], 3);
    }
}
