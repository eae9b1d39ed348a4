//! Journal segment files.
//!
//! A segment is a header followed by CRC-protected frames:
//!
//! ```text
//! header:  [8-byte magic "EMBRJNL\0"][u32 version][4 reserved][u64 segment id]
//! frame:   [u32 length][bincode JournalRecord][u32 CRC32]
//! ```
//!
//! All integers are little-endian.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::entry::JournalRecord;
use super::error::{JournalError, JournalResult};
use super::{SegmentId, SyncMode, TxId};

/// Magic number at the start of segment files: "EMBRJNL\0"
const SEGMENT_MAGIC: [u8; 8] = *b"EMBRJNL\0";

/// Current segment format version
const SEGMENT_VERSION: u32 = 1;

/// Size of the segment header in bytes.
pub const HEADER_SIZE: u64 = 24;

/// Upper bound on a single frame payload.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Length prefix plus trailing checksum.
const FRAME_OVERHEAD: u64 = 8;

/// File extension of live segment files.
pub const SEGMENT_EXTENSION: &str = "seg";

/// File name of the segment with the given id.
pub fn segment_file_name(id: SegmentId) -> String {
    format!("{id:016}.{SEGMENT_EXTENSION}")
}

/// Parse a segment id out of a file name produced by [`segment_file_name`].
pub fn parse_segment_file_name(name: &str) -> Option<SegmentId> {
    let stem = name.strip_suffix(SEGMENT_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Where a record landed in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SegmentPosition {
    /// Segment holding the record.
    pub segment: SegmentId,
    /// Byte offset of the record's frame.
    pub offset: u64,
}

/// A segment that no longer receives appends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSegment {
    /// Segment id.
    pub id: SegmentId,
    /// Path of the segment file.
    pub path: PathBuf,
    /// First transaction in the segment, `None` if it holds no records.
    pub first_txid: Option<TxId>,
    /// Last transaction in the segment, `None` if it holds no records.
    pub last_txid: Option<TxId>,
    /// File length in bytes.
    pub len: u64,
}

impl SealedSegment {
    /// Whether the segment holds no records.
    pub const fn is_empty(&self) -> bool {
        self.last_txid.is_none()
    }
}

/// Appends frames to the active segment.
pub struct SegmentWriter {
    id: SegmentId,
    path: PathBuf,
    writer: BufWriter<File>,
    len: u64,
    first_txid: Option<TxId>,
    last_txid: Option<TxId>,
    sync_mode: SyncMode,
    ops_since_sync: usize,
}

impl SegmentWriter {
    /// Create (or truncate) the segment file at `path` and write its header.
    pub fn create(
        path: PathBuf,
        id: SegmentId,
        sync_mode: SyncMode,
        buffer_size: usize,
    ) -> JournalResult<Self> {
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&path)?;
        let mut writer = BufWriter::with_capacity(buffer_size, file);
        Self::write_header(&mut writer, id)?;
        writer.get_ref().sync_all()?;

        Ok(Self {
            id,
            path,
            writer,
            len: HEADER_SIZE,
            first_txid: None,
            last_txid: None,
            sync_mode,
            ops_since_sync: 0,
        })
    }

    fn write_header(writer: &mut BufWriter<File>, id: SegmentId) -> JournalResult<()> {
        writer.write_all(&SEGMENT_MAGIC)?;
        writer.write_all(&SEGMENT_VERSION.to_le_bytes())?;
        writer.write_all(&[0u8; 4])?; // Reserved
        writer.write_all(&id.to_le_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Append a record. Returns the frame's offset within the segment.
    pub fn append(&mut self, record: &JournalRecord) -> JournalResult<u64> {
        let data = record.encode()?;
        if data.len() > MAX_FRAME_LEN {
            return Err(JournalError::InvalidFormat(format!(
                "record of {} bytes exceeds the {MAX_FRAME_LEN} byte frame limit",
                data.len()
            )));
        }
        let len = u32::try_from(data.len())
            .map_err(|_| JournalError::InvalidFormat("frame length overflow".into()))?;
        let crc = crc32fast::hash(&data);

        let offset = self.len;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&data)?;
        self.writer.write_all(&crc.to_le_bytes())?;

        self.len += FRAME_OVERHEAD + u64::from(len);
        self.first_txid.get_or_insert(record.txid);
        self.last_txid = Some(record.txid);
        self.ops_since_sync += 1;

        match self.sync_mode {
            SyncMode::Immediate => self.sync()?,
            SyncMode::Batched(n) if self.ops_since_sync >= n => self.sync()?,
            _ => self.writer.flush()?,
        }

        Ok(offset)
    }

    /// Flush buffered frames and fsync the file.
    pub fn sync(&mut self) -> JournalResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.ops_since_sync = 0;
        Ok(())
    }

    /// Segment id.
    pub const fn id(&self) -> SegmentId {
        self.id
    }

    /// Bytes written so far, header included.
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether no record has been appended yet.
    pub const fn is_empty(&self) -> bool {
        self.last_txid.is_none()
    }

    /// Describe this segment as sealed. The caller syncs first.
    pub fn into_sealed(self) -> SealedSegment {
        SealedSegment {
            id: self.id,
            path: self.path,
            first_txid: self.first_txid,
            last_txid: self.last_txid,
            len: self.len,
        }
    }
}

/// Sequential reader over a segment file.
pub struct SegmentReader {
    id: SegmentId,
    reader: BufReader<File>,
    position: u64,
    file_size: u64,
}

impl SegmentReader {
    /// Open a segment and validate its header.
    pub fn open(path: impl AsRef<Path>) -> JournalResult<Self> {
        let file = File::open(path.as_ref())?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let id = Self::read_header(&mut reader)?;
        Ok(Self { id, reader, position: HEADER_SIZE, file_size })
    }

    fn read_header(reader: &mut BufReader<File>) -> JournalResult<SegmentId> {
        let mut header = [0u8; 24];
        if reader.read_exact(&mut header).is_err() {
            return Err(JournalError::InvalidFormat("file too small for segment header".into()));
        }

        if header[..8] != SEGMENT_MAGIC {
            return Err(JournalError::InvalidFormat(format!(
                "invalid magic number: {:?}",
                &header[..8]
            )));
        }

        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if version != SEGMENT_VERSION {
            return Err(JournalError::InvalidFormat(format!(
                "unsupported segment version: {version}, expected {SEGMENT_VERSION}"
            )));
        }

        let mut id = [0u8; 8];
        id.copy_from_slice(&header[16..24]);
        Ok(u64::from_le_bytes(id))
    }

    /// The id recorded in the segment header.
    pub const fn id(&self) -> SegmentId {
        self.id
    }

    /// Offset of the next frame to read.
    pub const fn position(&self) -> u64 {
        self.position
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8]) -> JournalResult<()> {
        match self.reader.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(JournalError::Truncated { offset: self.position })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the next record, or `None` at a clean end of file.
    pub fn read_record(&mut self) -> JournalResult<Option<JournalRecord>> {
        if self.position >= self.file_size {
            return Ok(None);
        }

        let mut len_bytes = [0u8; 4];
        self.read_exact_or_truncated(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len == 0 || len > MAX_FRAME_LEN {
            return Err(JournalError::InvalidFormat(format!(
                "invalid frame length {len} at offset {}",
                self.position
            )));
        }

        let mut data = vec![0u8; len];
        self.read_exact_or_truncated(&mut data)?;

        let mut crc_bytes = [0u8; 4];
        self.read_exact_or_truncated(&mut crc_bytes)?;

        let expected = u32::from_le_bytes(crc_bytes);
        let actual = crc32fast::hash(&data);
        if expected != actual {
            return Err(JournalError::ChecksumMismatch {
                segment: self.id,
                offset: self.position,
                expected,
                actual,
            });
        }

        let record = JournalRecord::decode(&data)?;
        self.position += FRAME_OVERHEAD + len as u64;
        Ok(Some(record))
    }

    /// Iterate over `(offset, record)` pairs. Stops after the first error.
    pub fn records(self) -> SegmentRecords {
        SegmentRecords { reader: self, finished: false }
    }
}

/// Iterator returned by [`SegmentReader::records`].
pub struct SegmentRecords {
    reader: SegmentReader,
    finished: bool,
}

impl Iterator for SegmentRecords {
    type Item = JournalResult<(u64, JournalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let offset = self.reader.position();
        match self.reader.read_record() {
            Ok(Some(record)) => Some(Ok((offset, record))),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// What a full pass over a segment found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    /// Id from the header.
    pub id: SegmentId,
    /// First readable transaction.
    pub first_txid: Option<TxId>,
    /// Last readable transaction.
    pub last_txid: Option<TxId>,
    /// Length of the readable prefix, header included.
    pub valid_len: u64,
    /// Whether bytes follow the readable prefix.
    pub torn: bool,
}

/// Read a segment end to end and report its readable range.
///
/// Unreadable trailing bytes are reported through [`SegmentSummary::torn`]
/// rather than as an error; a bad header is still an error.
pub fn scan_segment(path: &Path) -> JournalResult<SegmentSummary> {
    let mut reader = SegmentReader::open(path)?;
    let mut first_txid = None;
    let mut last_txid = None;
    let torn = loop {
        match reader.read_record() {
            Ok(Some(record)) => {
                first_txid.get_or_insert(record.txid);
                last_txid = Some(record.txid);
            }
            Ok(None) => break false,
            Err(e) if e.is_corruption() => break true,
            Err(e) => return Err(e),
        }
    };

    Ok(SegmentSummary { id: reader.id(), first_txid, last_txid, valid_len: reader.position(), torn })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::RedoOp;
    use std::fs;
    use tempfile::tempdir;

    fn record(txid: TxId) -> JournalRecord {
        JournalRecord::new(txid, vec![RedoOp::put(format!("doc/{txid}"), b"{}".to_vec())])
    }

    fn write_segment(path: &Path, txids: std::ops::RangeInclusive<TxId>) -> SealedSegment {
        let mut writer = SegmentWriter::create(path.to_path_buf(), 3, SyncMode::None, 4096)
            .expect("create segment");
        for txid in txids {
            writer.append(&record(txid)).expect("append");
        }
        writer.sync().expect("sync");
        writer.into_sealed()
    }

    #[test]
    fn test_file_names() {
        assert_eq!(segment_file_name(42), "0000000000000042.seg");
        assert_eq!(parse_segment_file_name("0000000000000042.seg"), Some(42));
        assert_eq!(parse_segment_file_name("0000000000000042.free"), None);
        assert_eq!(parse_segment_file_name("checkpoint.json"), None);
        assert_eq!(parse_segment_file_name(".seg"), None);
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(segment_file_name(3));
        let sealed = write_segment(&path, 1..=5);

        assert_eq!(sealed.first_txid, Some(1));
        assert_eq!(sealed.last_txid, Some(5));
        assert_eq!(sealed.len, fs::metadata(&path).expect("metadata").len());

        let reader = SegmentReader::open(&path).expect("open");
        assert_eq!(reader.id(), 3);
        let txids: Vec<TxId> =
            reader.records().map(|r| r.expect("record").1.txid).collect();
        assert_eq!(txids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_segment() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(segment_file_name(3));
        let sealed = write_segment(&path, 1..=0);
        assert!(sealed.is_empty());
        assert_eq!(sealed.len, HEADER_SIZE);

        let summary = scan_segment(&path).expect("scan");
        assert_eq!(summary.first_txid, None);
        assert!(!summary.torn);
    }

    #[test]
    fn test_truncated_tail_detected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(segment_file_name(3));
        let sealed = write_segment(&path, 1..=3);

        let file = OpenOptions::new().write(true).open(&path).expect("open");
        file.set_len(sealed.len - 3).expect("truncate");

        let results: Vec<_> = SegmentReader::open(&path).expect("open").records().collect();
        assert_eq!(results.len(), 3);
        assert!(matches!(results[2], Err(JournalError::Truncated { .. })));

        let summary = scan_segment(&path).expect("scan");
        assert!(summary.torn);
        assert_eq!(summary.last_txid, Some(2));
        assert!(summary.valid_len < sealed.len);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(segment_file_name(3));
        write_segment(&path, 1..=1);

        let mut bytes = fs::read(&path).expect("read");
        let payload_byte = usize::try_from(HEADER_SIZE).expect("fits") + 6;
        bytes[payload_byte] ^= 0xff;
        fs::write(&path, &bytes).expect("write");

        let mut reader = SegmentReader::open(&path).expect("open");
        assert!(matches!(reader.read_record(), Err(JournalError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join(segment_file_name(1));
        fs::write(&path, [0u8; 32]).expect("write");
        assert!(matches!(SegmentReader::open(&path), Err(JournalError::InvalidFormat(_))));
    }
}
