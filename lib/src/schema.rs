//! Column names of the play log frame.

// ── Source columns (exported) ───────────────────────────────────────────────
pub const PICK_ID: &str = "pick_id";
pub const TIMESTAMP: &str = "timestamp";
pub const ARTIST: &str = "artist";
pub const SONG: &str = "song";
pub const ARTWORK_LARGE: &str = "artwork_large";

/// Columns a CSV must carry to be loaded at all.
pub const REQUIRED: [&str; 3] = [TIMESTAMP, ARTIST, SONG];

/// Columns written on export, in order.
pub const EXPORTED: [&str; 5] = [PICK_ID, TIMESTAMP, ARTIST, SONG, ARTWORK_LARGE];

// ── Derived columns (never exported) ────────────────────────────────────────
pub const DATE: &str = "date";
pub const HOUR: &str = "hour";
/// Days from Monday, 0..=6.
pub const WEEKDAY: &str = "weekday";
pub const MONTH: &str = "month";
pub const YEAR: &str = "year";

// ── Query scratch columns ───────────────────────────────────────────────────
pub const PLAYS: &str = "plays";
pub const BUCKET: &str = "bucket";
