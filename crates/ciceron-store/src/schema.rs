//! Database schema definitions.

/// Main schema SQL for initializing the database.
pub const SCHEMA: &str = r#"
-- Guide chunks; topics are stored as ",food,lodging," so a tag can be
-- matched with instr()
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    source TEXT NOT NULL,
    page INTEGER,
    chunk_index INTEGER NOT NULL DEFAULT 0,
    country TEXT,
    topics TEXT NOT NULL DEFAULT ',',
    title TEXT
);

CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
CREATE INDEX IF NOT EXISTS idx_chunks_country ON chunks(country);

-- Passage embeddings (little-endian f32)
CREATE TABLE IF NOT EXISTS chunk_embeddings (
    chunk_id TEXT PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
    dimension INTEGER NOT NULL,
    embedding BLOB NOT NULL
);

-- Image descriptions extracted from the guides
CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    source TEXT NOT NULL,
    page INTEGER,
    path TEXT NOT NULL,
    country TEXT,
    embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_images_source ON images(source);

-- FTS5 virtual table for keyword search
CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
    text,
    content=chunks,
    content_rowid=rowid,
    tokenize='unicode61 remove_diacritics 2'
);

-- Triggers to keep FTS5 in sync with chunks table
CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
    INSERT INTO chunks_fts(rowid, text) VALUES (NEW.rowid, NEW.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', OLD.rowid, OLD.text);
END;

CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
    INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES ('delete', OLD.rowid, OLD.text);
    INSERT INTO chunks_fts(rowid, text) VALUES (NEW.rowid, NEW.text);
END;
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
