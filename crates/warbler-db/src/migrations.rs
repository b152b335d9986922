use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, messages, follows, likes)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                email               TEXT NOT NULL UNIQUE CHECK (email <> ''),
                username            TEXT NOT NULL UNIQUE CHECK (username <> ''),
                image_url           TEXT NOT NULL,
                header_image_url    TEXT NOT NULL,
                bio                 TEXT,
                location            TEXT,
                password            TEXT NOT NULL CHECK (password <> ''),
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                text        TEXT NOT NULL CHECK (length(text) BETWEEN 1 AND 140),
                timestamp   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX idx_messages_user
                ON messages(user_id, timestamp);

            CREATE TABLE follows (
                user_being_followed_id  INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user_following_id       INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (user_being_followed_id, user_following_id)
            );

            CREATE INDEX idx_follows_following
                ON follows(user_following_id);

            CREATE TABLE likes (
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, message_id)
            );

            CREATE INDEX idx_likes_message
                ON likes(message_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
