//! SQL schema for the bot's SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS posts (
    post_id      TEXT PRIMARY KEY,
    item_id      TEXT NOT NULL UNIQUE,
    title        TEXT NOT NULL,
    link         TEXT,
    tags         TEXT NOT NULL DEFAULT '[]',
    post_ids     TEXT,            -- JSON string or array; NULL until delivered
    published_at TEXT,
    created_at   TEXT NOT NULL
);

-- At most one schedule per post; deleting the post removes it.
CREATE TABLE IF NOT EXISTS schedules (
    schedule_id  TEXT PRIMARY KEY,
    name         TEXT NOT NULL,   -- 'Public' | 'Mention'
    post_id      TEXT NOT NULL UNIQUE
                 REFERENCES posts(post_id) ON DELETE CASCADE,
    receiver     TEXT,
    visibility   TEXT,
    scheduled_at TEXT NOT NULL
);

-- (api_domain, uid) uniqueness is checked by the store before each write.
CREATE TABLE IF NOT EXISTS accounts (
    account_id      TEXT PRIMARY KEY,
    uid             TEXT NOT NULL,
    api_domain      TEXT NOT NULL,
    host            TEXT NOT NULL DEFAULT 'mastodon',
    access_token    TEXT NOT NULL UNIQUE,
    api_base_url    TEXT NOT NULL,
    is_enabled      INTEGER NOT NULL DEFAULT 1,
    is_bot          INTEGER NOT NULL DEFAULT 1,
    is_discoverable INTEGER NOT NULL DEFAULT 1,
    is_locked       INTEGER NOT NULL DEFAULT 0,
    display_name    TEXT,
    fields          TEXT NOT NULL DEFAULT '[]',
    note            TEXT
);

CREATE TABLE IF NOT EXISTS feeds (
    feed_id    TEXT PRIMARY KEY,
    uid        TEXT NOT NULL UNIQUE,
    endpoint   TEXT NOT NULL,
    is_enabled INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS accounts_identity_idx ON accounts(api_domain, uid);
CREATE INDEX IF NOT EXISTS posts_published_idx   ON posts(published_at);

PRAGMA user_version = 1;
";
