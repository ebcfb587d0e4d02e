//! SQL schema for the Fork & Feast SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Content-addressed documents. Rows are never updated or deleted.
CREATE TABLE IF NOT EXISTS contents (
    content_id    TEXT PRIMARY KEY,  -- sha256 of document_json, lowercase hex
    document_json TEXT NOT NULL
);

-- head_revision_id is the only column that ever changes, and only by
-- compare-and-swap.
CREATE TABLE IF NOT EXISTS lineages (
    lineage_id           TEXT PRIMARY KEY,
    name                 TEXT NOT NULL,
    owner                TEXT NOT NULL,
    root_revision_id     TEXT NOT NULL,
    head_revision_id     TEXT NOT NULL,
    forked_from_lineage  TEXT REFERENCES lineages(lineage_id),
    forked_from_revision TEXT,
    created_at           TEXT NOT NULL
);

-- Revisions are strictly append-only.
CREATE TABLE IF NOT EXISTS revisions (
    revision_id  TEXT PRIMARY KEY,
    lineage_id   TEXT NOT NULL REFERENCES lineages(lineage_id),
    content_id   TEXT NOT NULL REFERENCES contents(content_id),
    parent_id    TEXT REFERENCES revisions(revision_id),
    merged_from  TEXT REFERENCES revisions(revision_id),
    author       TEXT NOT NULL,
    committed_at TEXT NOT NULL,
    message      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pull_requests (
    pull_id            TEXT PRIMARY KEY,
    title              TEXT NOT NULL,
    description        TEXT NOT NULL DEFAULT '',
    author             TEXT NOT NULL,
    source_lineage_id  TEXT NOT NULL REFERENCES lineages(lineage_id),
    source_revision_id TEXT NOT NULL REFERENCES revisions(revision_id),
    target_lineage_id  TEXT NOT NULL REFERENCES lineages(lineage_id),
    base_revision_id   TEXT NOT NULL REFERENCES revisions(revision_id),
    status             TEXT NOT NULL DEFAULT 'open',  -- 'open' | 'merged' | 'closed'
    resolved_by        TEXT,
    resolved_at        TEXT,
    merge_revision_id  TEXT REFERENCES revisions(revision_id),
    created_at         TEXT NOT NULL
);

-- A comment belongs to exactly one pull request or revision.
CREATE TABLE IF NOT EXISTS comments (
    comment_id  TEXT PRIMARY KEY,
    pull_id     TEXT REFERENCES pull_requests(pull_id),
    revision_id TEXT REFERENCES revisions(revision_id),
    author      TEXT NOT NULL,
    body        TEXT NOT NULL,
    anchor_json TEXT,
    created_at  TEXT NOT NULL,
    CHECK ((pull_id IS NULL) != (revision_id IS NULL))
);

CREATE INDEX IF NOT EXISTS revisions_parent_idx  ON revisions(parent_id);
CREATE INDEX IF NOT EXISTS lineages_owner_idx    ON lineages(owner);
CREATE INDEX IF NOT EXISTS lineages_fork_idx     ON lineages(forked_from_lineage);
CREATE INDEX IF NOT EXISTS pulls_target_idx      ON pull_requests(target_lineage_id);
CREATE INDEX IF NOT EXISTS comments_pull_idx     ON comments(pull_id);
CREATE INDEX IF NOT EXISTS comments_revision_idx ON comments(revision_id);

PRAGMA user_version = 1;
";
