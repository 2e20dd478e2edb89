//! Record Iterator
//!
//! Sequential iteration over every live record in physical order.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};

use crate::error::Result;
use crate::record;
use crate::StoreError;

use super::{StoredRecord, HEADER_SIZE, RECORD_HEADER_SIZE, TOMBSTONE, VALID};

/// Iterator over live records in physical order
///
/// Tombstones are skipped without decoding. Creating a new iterator reseeks
/// to the first record, so a scan can always be restarted.
pub struct RecordIter<'a> {
    reader: BufReader<&'a mut File>,
    /// Stop reading at this offset (file length when the scan began)
    end_offset: u64,
    /// Offset of the next record header
    current_offset: u64,
}

impl<'a> RecordIter<'a> {
    /// Create a new iterator starting right after the file header
    pub(super) fn new(file: &'a mut File) -> Result<Self> {
        let end_offset = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            reader,
            end_offset,
            current_offset: HEADER_SIZE,
        })
    }

    /// Read the next record header, skipping tombstones, and decode the
    /// payload of the first live record found
    fn read_next(&mut self) -> Result<Option<StoredRecord>> {
        while self.current_offset < self.end_offset {
            let offset = self.current_offset;

            let mut header = [0u8; RECORD_HEADER_SIZE as usize];
            match self.reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(StoreError::Corrupted(format!(
                        "truncated record header at offset {}",
                        offset
                    )));
                }
                Err(e) => return Err(e.into()),
            }

            let valid = header[0];
            let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
            let next_offset = offset + RECORD_HEADER_SIZE + len as u64;
            if next_offset > self.end_offset {
                return Err(StoreError::Corrupted(format!(
                    "record at offset {} claims {} payload bytes past end of file",
                    offset, len
                )));
            }
            self.current_offset = next_offset;

            match valid {
                TOMBSTONE => {
                    self.reader.seek_relative(len as i64)?;
                }
                VALID => {
                    let mut payload = vec![0u8; len as usize];
                    self.reader.read_exact(&mut payload)?;
                    return Ok(Some(StoredRecord {
                        offset,
                        len,
                        track: record::decode(&payload)?,
                    }));
                }
                other => {
                    return Err(StoreError::Corrupted(format!(
                        "invalid validity byte 0x{:02x} at offset {}",
                        other, offset
                    )));
                }
            }
        }
        Ok(None)
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<StoredRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first error, the stream position is unknown
                self.current_offset = self.end_offset;
                Some(Err(e))
            }
        }
    }
}
