//! SQL schema for the folio Postgres store.
//!
//! Installed by the provisioning identity during [`crate::bootstrap`];
//! idempotent thanks to `IF NOT EXISTS`. Unqualified names resolve through
//! the `search_path` pinned on every connection, so the same DDL works for
//! the production schema and for throwaway test schemas.

/// Full schema DDL. Run with the simple query protocol (multi-statement).
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS authors (
    author_id   BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    source      TEXT NOT NULL,          -- 'google' | 'dblp' | open tag
    profile_url TEXT NOT NULL,
    last_crawl  TIMESTAMPTZ,            -- NULL = never successfully crawled
    UNIQUE (name, source)
);

CREATE TABLE IF NOT EXISTS publications (
    publication_id BIGSERIAL PRIMARY KEY,
    author_id      BIGINT NOT NULL
                     REFERENCES authors (author_id) ON DELETE CASCADE,
    title          TEXT NOT NULL,
    year           INTEGER CHECK (year >= 0),
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT now(),
    source         TEXT NOT NULL,
    UNIQUE (author_id, title)
);

-- Supporting indexes. The unique constraints above already index
-- authors(name, source) and publications(author_id, title); these two keep
-- the parent-join and the retention scan cheap at scale.
CREATE INDEX IF NOT EXISTS publications_author_idx
    ON publications (author_id);
CREATE INDEX IF NOT EXISTS publications_updated_idx
    ON publications (updated_at);
";
