//! Track codec
//!
//! Encoding and decoding functions for the record payload. Pure functions,
//! no I/O.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, StoreError};

use super::{Track, MAX_PREFIXED_LEN, TRACK_ID_LEN};

/// Fixed-width bytes: id + track_id + popularity + duration + explicit + 3 floats
const FIXED_SIZE: usize = 4 + TRACK_ID_LEN + 4 + 4 + 1 + 4 * 3;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a track into its payload bytes
///
/// Fails before producing any bytes if a field violates the layout limits.
pub fn encode(track: &Track) -> Result<Vec<u8>> {
    validate(track)?;

    let variable: usize = [&track.name, &track.album]
        .iter()
        .map(|s| 1 + s.len())
        .chain([&track.artists, &track.genres].iter().map(|list| {
            1 + list.iter().map(|s| 1 + s.len()).sum::<usize>()
        }))
        .sum();

    let mut buf = BytesMut::with_capacity(FIXED_SIZE + variable);
    buf.put_i32(track.id);
    buf.put_slice(track.track_id.as_bytes());
    put_str(&mut buf, &track.name);
    put_str(&mut buf, &track.album);
    put_list(&mut buf, &track.artists);
    put_list(&mut buf, &track.genres);
    buf.put_i32(track.popularity);
    buf.put_i32(track.duration_ms);
    buf.put_u8(track.explicit as u8);
    buf.put_f32(track.danceability);
    buf.put_f32(track.energy);
    buf.put_f32(track.tempo);

    Ok(buf.to_vec())
}

fn validate(track: &Track) -> Result<()> {
    if !track.track_id.is_ascii() || track.track_id.len() != TRACK_ID_LEN {
        return Err(StoreError::Encoding(format!(
            "track_id must be exactly {} ASCII characters, got {:?}",
            TRACK_ID_LEN, track.track_id
        )));
    }

    check_len("name", track.name.len())?;
    check_len("album", track.album.len())?;
    check_len("artists", track.artists.len())?;
    check_len("genres", track.genres.len())?;
    for artist in &track.artists {
        check_len("artist", artist.len())?;
    }
    for genre in &track.genres {
        check_len("genre", genre.len())?;
    }
    Ok(())
}

fn check_len(field: &str, len: usize) -> Result<()> {
    if len > MAX_PREFIXED_LEN {
        return Err(StoreError::Encoding(format!(
            "{} length {} exceeds {}",
            field, len, MAX_PREFIXED_LEN
        )));
    }
    Ok(())
}

fn put_str(buf: &mut BytesMut, value: &str) {
    buf.put_u8(value.len() as u8);
    buf.put_slice(value.as_bytes());
}

fn put_list(buf: &mut BytesMut, values: &[String]) {
    buf.put_u8(values.len() as u8);
    for value in values {
        put_str(buf, value);
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a track from payload bytes
///
/// Trailing bytes after the last field are ignored: an in-place update may
/// leave stale bytes behind a shorter payload.
pub fn decode(payload: &[u8]) -> Result<Track> {
    let mut buf = payload;

    let id = take_i32(&mut buf)?;
    ensure(&buf, TRACK_ID_LEN, "track_id")?;
    let track_id = String::from_utf8(buf[..TRACK_ID_LEN].to_vec())
        .map_err(|e| StoreError::Encoding(format!("track_id is not UTF-8: {}", e)))?;
    buf.advance(TRACK_ID_LEN);

    let name = take_str(&mut buf)?;
    let album = take_str(&mut buf)?;
    let artists = take_list(&mut buf)?;
    let genres = take_list(&mut buf)?;

    ensure(&buf, 4 + 4 + 1 + 4 * 3, "numeric fields")?;
    let popularity = buf.get_i32();
    let duration_ms = buf.get_i32();
    let explicit = buf.get_u8() != 0;
    let danceability = buf.get_f32();
    let energy = buf.get_f32();
    let tempo = buf.get_f32();

    Ok(Track {
        id,
        track_id,
        name,
        album,
        artists,
        genres,
        popularity,
        duration_ms,
        explicit,
        danceability,
        energy,
        tempo,
    })
}

/// Read only the id from the head of a payload
pub fn peek_id(payload: &[u8]) -> Result<i32> {
    let mut buf = payload;
    take_i32(&mut buf)
}

fn ensure(buf: &&[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(StoreError::Encoding(format!(
            "truncated payload reading {}: need {} bytes, have {}",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

fn take_i32(buf: &mut &[u8]) -> Result<i32> {
    ensure(buf, 4, "id")?;
    Ok(buf.get_i32())
}

fn take_str(buf: &mut &[u8]) -> Result<String> {
    ensure(buf, 1, "string length")?;
    let len = buf.get_u8() as usize;
    ensure(buf, len, "string bytes")?;
    let value = String::from_utf8(buf[..len].to_vec())
        .map_err(|e| StoreError::Encoding(format!("string is not UTF-8: {}", e)))?;
    buf.advance(len);
    Ok(value)
}

fn take_list(buf: &mut &[u8]) -> Result<Vec<String>> {
    ensure(buf, 1, "list length")?;
    let count = buf.get_u8() as usize;
    (0..count).map(|_| take_str(buf)).collect()
}
