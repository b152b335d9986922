use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension, Params, Row, params};
use warbler_types::models::UserStats;

use crate::models::{
    DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL, MessageRow, NewUser, ProfileUpdate, UserRow,
    non_blank,
};
use crate::{Database, Result};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password, u.image_url, \
                            u.header_image_url, u.bio, u.location, u.created_at";

// JOIN users to fetch the author's display fields in a single query
const MESSAGE_SELECT: &str = "SELECT m.id, m.text, m.timestamp, m.user_id, u.username, u.image_url
     FROM messages m
     JOIN users u ON u.id = m.user_id";

impl Database {
    // -- Users --

    /// Insert a user. Duplicate or empty username/email surfaces as
    /// [`DbError::Integrity`](crate::DbError::Integrity).
    pub fn create_user(&self, new: &NewUser<'_>) -> Result<UserRow> {
        let image_url = non_blank(new.image_url).unwrap_or(DEFAULT_IMAGE_URL);

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password, image_url, header_image_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    new.username,
                    new.email,
                    new.password_hash,
                    image_url,
                    DEFAULT_HEADER_IMAGE_URL
                ],
            )?;

            let id = conn.last_insert_rowid();
            let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
            Ok(conn.query_row(&sql, [id], map_user)?)
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
            Ok(conn.query_row(&sql, [id], map_user).optional()?)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1");
            Ok(conn.query_row(&sql, [username], map_user).optional()?)
        })
    }

    /// All users ordered by username, optionally narrowed to usernames
    /// containing `search`.
    pub fn list_users(&self, search: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| match non_blank(search) {
            Some(term) => {
                let pattern = format!("%{}%", escape_like(term));
                let sql = format!(
                    "SELECT {USER_COLUMNS} FROM users u
                     WHERE u.username LIKE ?1 ESCAPE '\\'
                     ORDER BY u.username"
                );
                collect_users(conn, &sql, [pattern])
            }
            None => {
                let sql = format!("SELECT {USER_COLUMNS} FROM users u ORDER BY u.username");
                collect_users(conn, &sql, [])
            }
        })
    }

    /// Returns false if no user has this id.
    pub fn update_user(&self, id: i64, update: &ProfileUpdate<'_>) -> Result<bool> {
        let image_url = non_blank(update.image_url).unwrap_or(DEFAULT_IMAGE_URL);
        let header_image_url =
            non_blank(update.header_image_url).unwrap_or(DEFAULT_HEADER_IMAGE_URL);

        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET username = ?1, email = ?2, image_url = ?3, header_image_url = ?4,
                     bio = ?5, location = ?6
                 WHERE id = ?7",
                params![
                    update.username,
                    update.email,
                    image_url,
                    header_image_url,
                    non_blank(update.bio),
                    non_blank(update.location),
                    id
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes the user; messages, likes and follow rows go with it.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
    }

    pub fn user_stats(&self, user_id: i64) -> Result<UserStats> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM messages WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_following_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_being_followed_id = ?1),
                    (SELECT COUNT(*) FROM likes WHERE user_id = ?1)",
                [user_id],
                |row| {
                    Ok(UserStats {
                        messages: row.get(0)?,
                        following: row.get(1)?,
                        followers: row.get(2)?,
                        likes: row.get(3)?,
                    })
                },
            )?)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, user_id: i64, text: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (text, user_id) VALUES (?1, ?2)",
                params![text, user_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
            Ok(conn.query_row(&sql, [id], map_message).optional()?)
        })
    }

    /// Deletes the message only if `owner_id` wrote it.
    pub fn delete_message(&self, id: i64, owner_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND user_id = ?2",
                [id, owner_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn messages_for_user(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.user_id = ?1
                 ORDER BY m.timestamp DESC, m.id DESC
                 LIMIT ?2"
            );
            collect_messages(conn, &sql, params![user_id, limit])
        })
    }

    /// Messages written by `user_id` or by anyone they follow, newest first.
    pub fn timeline(&self, user_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.user_id = ?1
                    OR m.user_id IN (
                        SELECT user_being_followed_id FROM follows WHERE user_following_id = ?1
                    )
                 ORDER BY m.timestamp DESC, m.id DESC
                 LIMIT ?2"
            );
            collect_messages(conn, &sql, params![user_id, limit])
        })
    }

    pub fn count_messages(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?)
        })
    }

    // -- Follows --

    /// Record that `follower_id` follows `followed_id`.
    /// Returns false if the pair was already recorded.
    pub fn follow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follows (user_being_followed_id, user_following_id)
                 VALUES (?1, ?2)",
                [followed_id, follower_id],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM follows WHERE user_being_followed_id = ?1 AND user_following_id = ?2",
                [followed_id, follower_id],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Is `user_id` following `other_id`?
    pub fn is_following(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM follows
                    WHERE user_following_id = ?1 AND user_being_followed_id = ?2
                 )",
                [user_id, other_id],
                |r| r.get(0),
            )?)
        })
    }

    /// Is `user_id` followed by `other_id`?
    pub fn is_followed_by(&self, user_id: i64, other_id: i64) -> Result<bool> {
        self.is_following(other_id, user_id)
    }

    /// Users that `user_id` follows.
    pub fn following(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 JOIN follows f ON f.user_being_followed_id = u.id
                 WHERE f.user_following_id = ?1
                 ORDER BY u.username"
            );
            collect_users(conn, &sql, [user_id])
        })
    }

    /// Users following `user_id`.
    pub fn followers(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 JOIN follows f ON f.user_following_id = u.id
                 WHERE f.user_being_followed_id = ?1
                 ORDER BY u.username"
            );
            collect_users(conn, &sql, [user_id])
        })
    }

    /// Ids of users that `user_id` follows.
    pub fn following_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_being_followed_id FROM follows WHERE user_following_id = ?1",
            )?;
            let ids = stmt
                .query_map([user_id], |r| r.get(0))?
                .collect::<std::result::Result<HashSet<i64>, _>>()?;
            Ok(ids)
        })
    }

    // -- Likes --

    /// Returns false if the user already liked the message.
    pub fn like(&self, user_id: i64, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO likes (user_id, message_id) VALUES (?1, ?2)",
                [user_id, message_id],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn unlike(&self, user_id: i64, message_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2",
                [user_id, message_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn is_liked_by(&self, message_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM likes WHERE message_id = ?1 AND user_id = ?2)",
                [message_id, user_id],
                |r| r.get(0),
            )?)
        })
    }

    /// Messages liked by `user_id`, newest first.
    pub fn liked_messages(&self, user_id: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 JOIN likes l ON l.message_id = m.id
                 WHERE l.user_id = ?1
                 ORDER BY m.timestamp DESC, m.id DESC"
            );
            collect_messages(conn, &sql, [user_id])
        })
    }

    pub fn liked_message_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT message_id FROM likes WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |r| r.get(0))?
                .collect::<std::result::Result<HashSet<i64>, _>>()?;
            Ok(ids)
        })
    }

    pub fn count_likes(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM likes", [], |r| r.get(0))?))
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        image_url: row.get(4)?,
        header_image_url: row.get(5)?,
        bio: row.get(6)?,
        location: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        timestamp: row.get(2)?,
        user_id: row.get(3)?,
        author_username: row.get(4)?,
        author_image_url: row.get(5)?,
    })
}

fn collect_users<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn collect_messages<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Escape LIKE wildcards so a search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, UserRow, UserRow) {
        let db = Database::open_in_memory().unwrap();
        let u1 = db.create_user(&new_user("u1", "u1@email.com")).unwrap();
        let u2 = db.create_user(&new_user("u2", "u2@email.com")).unwrap();
        (db, u1, u2)
    }

    fn new_user<'a>(username: &'a str, email: &'a str) -> NewUser<'a> {
        NewUser {
            username,
            email,
            password_hash: "$argon2id$placeholder",
            image_url: None,
        }
    }

    #[test]
    fn new_user_has_defaults_and_no_relations() {
        let (db, u1, _) = setup();

        assert_eq!(u1.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(u1.header_image_url, DEFAULT_HEADER_IMAGE_URL);
        assert!(db.messages_for_user(u1.id, 100).unwrap().is_empty());
        assert!(db.followers(u1.id).unwrap().is_empty());
        assert!(db.following(u1.id).unwrap().is_empty());
    }

    #[test]
    fn duplicate_username_is_integrity_error() {
        let (db, _, _) = setup();
        let err = db.create_user(&new_user("u1", "other@email.com")).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn duplicate_email_is_integrity_error() {
        let (db, _, _) = setup();
        let err = db.create_user(&new_user("u3", "u1@email.com")).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn empty_username_or_email_is_integrity_error() {
        let (db, _, _) = setup();
        assert!(db.create_user(&new_user("", "u3@email.com")).unwrap_err().is_integrity());
        assert!(db.create_user(&new_user("u3", "")).unwrap_err().is_integrity());
        assert_eq!(db.count_users().unwrap(), 2);
    }

    #[test]
    fn following_is_directional() {
        let (db, u1, u2) = setup();

        assert!(db.follow(u1.id, u2.id).unwrap());

        assert!(db.is_following(u1.id, u2.id).unwrap());
        assert!(!db.is_following(u2.id, u1.id).unwrap());
        assert!(!db.is_following(u1.id, u1.id).unwrap());

        assert!(db.is_followed_by(u2.id, u1.id).unwrap());
        assert!(!db.is_followed_by(u1.id, u2.id).unwrap());

        let following: Vec<_> = db.following(u1.id).unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(following, vec![u2.id]);
        let followers: Vec<_> = db.followers(u2.id).unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(followers, vec![u1.id]);
    }

    #[test]
    fn follow_twice_records_one_row() {
        let (db, u1, u2) = setup();

        assert!(db.follow(u1.id, u2.id).unwrap());
        assert!(!db.follow(u1.id, u2.id).unwrap());
        assert_eq!(db.user_stats(u2.id).unwrap().followers, 1);

        assert!(db.unfollow(u1.id, u2.id).unwrap());
        assert!(!db.unfollow(u1.id, u2.id).unwrap());
        assert!(!db.is_following(u1.id, u2.id).unwrap());
    }

    #[test]
    fn following_unknown_user_is_integrity_error() {
        let (db, u1, _) = setup();
        assert!(db.follow(u1.id, 9999).unwrap_err().is_integrity());
    }

    #[test]
    fn message_belongs_to_its_author() {
        let (db, u1, u2) = setup();

        let id = db.insert_message(u1.id, "test text").unwrap();

        assert_eq!(db.messages_for_user(u1.id, 100).unwrap().len(), 1);
        assert_eq!(db.messages_for_user(u2.id, 100).unwrap().len(), 0);

        let row = db.get_message(id).unwrap().unwrap();
        assert_eq!(row.text, "test text");
        assert_eq!(row.author_username, "u1");
    }

    #[test]
    fn message_text_length_is_checked() {
        let (db, u1, _) = setup();
        assert!(db.insert_message(u1.id, "").unwrap_err().is_integrity());
        assert!(db.insert_message(u1.id, &"x".repeat(141)).unwrap_err().is_integrity());
        assert!(db.insert_message(u1.id, &"x".repeat(140)).is_ok());
    }

    #[test]
    fn only_author_deletes_message() {
        let (db, u1, u2) = setup();
        let id = db.insert_message(u1.id, "m1-text").unwrap();

        assert!(!db.delete_message(id, u2.id).unwrap());
        assert_eq!(db.count_messages().unwrap(), 1);

        assert!(db.delete_message(id, u1.id).unwrap());
        assert_eq!(db.count_messages().unwrap(), 0);
        assert!(db.get_message(id).unwrap().is_none());
    }

    #[test]
    fn like_is_per_user_and_idempotent() {
        let (db, u1, u2) = setup();
        let id = db.insert_message(u1.id, "test text").unwrap();

        assert!(db.like(u2.id, id).unwrap());
        assert!(!db.like(u2.id, id).unwrap());

        assert!(db.is_liked_by(id, u2.id).unwrap());
        assert!(!db.is_liked_by(id, u1.id).unwrap());
        assert_eq!(db.count_likes().unwrap(), 1);

        assert!(db.unlike(u2.id, id).unwrap());
        assert_eq!(db.count_likes().unwrap(), 0);
        assert!(!db.is_liked_by(id, u2.id).unwrap());
    }

    #[test]
    fn liked_messages_lists_only_likes() {
        let (db, u1, u2) = setup();
        let liked = db.insert_message(u1.id, "liked").unwrap();
        db.insert_message(u1.id, "not liked").unwrap();
        db.like(u2.id, liked).unwrap();

        let rows = db.liked_messages(u2.id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "liked");
        assert_eq!(db.liked_message_ids(u2.id).unwrap(), HashSet::from([liked]));
    }

    #[test]
    fn timeline_has_own_and_followed_messages_newest_first() {
        let (db, u1, u2) = setup();
        let u3 = db.create_user(&new_user("u3", "u3@email.com")).unwrap();

        db.insert_message(u2.id, "from u2").unwrap();
        db.insert_message(u3.id, "from u3").unwrap();
        db.insert_message(u1.id, "from u1").unwrap();
        db.follow(u1.id, u2.id).unwrap();

        let texts: Vec<_> = db
            .timeline(u1.id, 100)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["from u1", "from u2"]);
    }

    #[test]
    fn deleting_user_cascades() {
        let (db, u1, u2) = setup();
        let own = db.insert_message(u1.id, "mine").unwrap();
        let theirs = db.insert_message(u2.id, "theirs").unwrap();
        db.follow(u1.id, u2.id).unwrap();
        db.follow(u2.id, u1.id).unwrap();
        db.like(u1.id, theirs).unwrap();
        db.like(u2.id, own).unwrap();

        assert!(db.delete_user(u1.id).unwrap());

        assert!(db.get_user(u1.id).unwrap().is_none());
        assert_eq!(db.count_messages().unwrap(), 1);
        assert_eq!(db.count_likes().unwrap(), 0);
        let stats = db.user_stats(u2.id).unwrap();
        assert_eq!(stats.messages, 1);
        assert_eq!((stats.following, stats.followers, stats.likes), (0, 0, 0));
        assert!(!db.delete_user(u1.id).unwrap());
    }

    #[test]
    fn search_matches_substring_literally() {
        let (db, _, _) = setup();
        db.create_user(&new_user("alice", "a@email.com")).unwrap();
        db.create_user(&new_user("al_x", "x@email.com")).unwrap();

        let names = |q: Option<&str>| -> Vec<String> {
            db.list_users(q).unwrap().into_iter().map(|u| u.username).collect()
        };

        assert_eq!(names(None), vec!["al_x", "alice", "u1", "u2"]);
        assert_eq!(names(Some("  ")).len(), 4);
        assert_eq!(names(Some("lic")), vec!["alice"]);
        assert_eq!(names(Some("al_")), vec!["al_x"]);
        assert!(names(Some("%")).is_empty());
    }

    #[test]
    fn update_user_changes_profile() {
        let (db, u1, _) = setup();
        let update = ProfileUpdate {
            username: "renamed",
            email: "renamed@email.com",
            image_url: Some(""),
            header_image_url: Some("/h.png"),
            bio: Some("hello"),
            location: Some("  "),
        };
        assert!(db.update_user(u1.id, &update).unwrap());

        let row = db.get_user(u1.id).unwrap().unwrap();
        assert_eq!(row.username, "renamed");
        assert_eq!(row.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(row.header_image_url, "/h.png");
        assert_eq!(row.bio.as_deref(), Some("hello"));
        assert_eq!(row.location, None);
    }

    #[test]
    fn update_user_to_taken_username_is_integrity_error() {
        let (db, u1, _) = setup();
        let update = ProfileUpdate {
            username: "u2",
            email: "u1@email.com",
            image_url: None,
            header_image_url: None,
            bio: None,
            location: None,
        };
        assert!(db.update_user(u1.id, &update).unwrap_err().is_integrity());
        assert_eq!(db.get_user(u1.id).unwrap().unwrap().username, "u1");
    }
}
