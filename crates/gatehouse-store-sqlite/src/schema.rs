//! SQL schema for the Gatehouse SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS gates (
    gate_id       TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    slug          TEXT NOT NULL UNIQUE,
    is_default    INTEGER NOT NULL DEFAULT 0,
    dependency_id TEXT REFERENCES gates(gate_id),
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS gate_passes (
    pass_id    TEXT PRIMARY KEY,
    code       TEXT NOT NULL UNIQUE,
    status     TEXT NOT NULL DEFAULT 'pending',
    valid_from TEXT NOT NULL,
    valid_to   TEXT,             -- NULL: never expires
    max_uses   INTEGER,          -- NULL: unlimited
    uses_count INTEGER NOT NULL DEFAULT 0,
    house_id   TEXT NOT NULL,
    created_at TEXT NOT NULL,
    CHECK (max_uses IS NULL OR uses_count <= max_uses)
);

CREATE TABLE IF NOT EXISTS visitors (
    visitor_id       TEXT PRIMARY KEY,
    gate_pass_id     TEXT NOT NULL REFERENCES gate_passes(pass_id),
    name             TEXT NOT NULL,
    email            TEXT,
    phone            TEXT,
    pass_code_suffix TEXT,
    status           TEXT NOT NULL DEFAULT 'pending'
);

-- Events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS gate_events (
    seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id      TEXT NOT NULL UNIQUE,
    gate_id       TEXT NOT NULL REFERENCES gates(gate_id),
    owner_type    TEXT NOT NULL,   -- 'resident' | 'visitor'
    owner_id      TEXT NOT NULL,
    gate_pass_id  TEXT NOT NULL REFERENCES gate_passes(pass_id),
    checkin_time  TEXT,
    checkout_time TEXT,
    scanned_by    TEXT,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS gates_dependency_idx ON gates(dependency_id);
CREATE INDEX IF NOT EXISTS passes_house_idx     ON gate_passes(house_id);
CREATE INDEX IF NOT EXISTS visitors_pass_idx    ON visitors(gate_pass_id);
CREATE INDEX IF NOT EXISTS events_session_idx
    ON gate_events(gate_pass_id, owner_type, owner_id, gate_id);

PRAGMA user_version = 1;
";
