use serde::Serialize;

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
}

/// A message joined with its author, ready for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: i64,
    pub text: String,
    /// Display form, e.g. "05 March 2024".
    pub timestamp: String,
    pub user_id: i64,
    pub author_username: String,
    pub author_image_url: String,
    /// Whether the viewing user likes this message.
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub messages: i64,
    pub following: i64,
    pub followers: i64,
    pub likes: i64,
}

/// A user as listed on search, following and followers pages.
#[derive(Debug, Clone, Serialize)]
pub struct UserCard {
    #[serde(flatten)]
    pub user: User,
    /// Whether the viewing user follows this one.
    pub is_following: bool,
}
