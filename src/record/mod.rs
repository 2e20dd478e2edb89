//! Record Module
//!
//! The track entity and its self-describing byte layout.
//!
//! ## Payload Format (all integers big-endian)
//! ```text
//! ┌─────────┬──────────────┬───────────┬───────────┬──────────────┬─────────────┐
//! │ id (4)  │ track_id(22) │ name      │ album     │ artists      │ genres      │
//! │         │              │ len(1)+.. │ len(1)+.. │ cnt(1)+str*  │ cnt(1)+str* │
//! ├─────────┴──────┬───────┴───────┬───┴───────────┴──┬───────────┴─┬───────────┤
//! │ popularity (4) │ duration (4)  │ explicit (1)     │ dance/energy│ tempo (4) │
//! │                │               │                  │ (4 + 4)     │           │
//! └────────────────┴───────────────┴──────────────────┴─────────────┴───────────┘
//! ```
//!
//! Every string and list carries a one-byte prefix, so no string may exceed
//! 255 bytes and no list may hold more than 255 items.

mod codec;

pub use codec::{decode, encode, peek_id};

/// Exact length of the Spotify-style track identifier
pub const TRACK_ID_LEN: usize = 22;

/// Largest string byte length or list length a one-byte prefix can carry
pub const MAX_PREFIXED_LEN: usize = u8::MAX as usize;

/// Track metadata, the single domain entity held by the store
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Track {
    /// Store-assigned identifier (ignored on create, overwritten with the new id)
    pub id: i32,
    /// Fixed-length external identifier, exactly 22 ASCII characters
    pub track_id: String,
    pub name: String,
    pub album: String,
    pub artists: Vec<String>,
    pub genres: Vec<String>,
    pub popularity: i32,
    pub duration_ms: i32,
    pub explicit: bool,
    pub danceability: f32,
    pub energy: f32,
    pub tempo: f32,
}

impl Track {
    /// Case-insensitive substring match over the textual fields
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        std::iter::once(&self.name)
            .chain(std::iter::once(&self.album))
            .chain(self.artists.iter())
            .chain(self.genres.iter())
            .any(|field| field.to_lowercase().contains(&needle))
    }
}
