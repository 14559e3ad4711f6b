use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::error;

use crate::limits::MAX_FRAME_BYTES;
use crate::model::Event;

/// Bytes around each payload: `len` prefix plus crc suffix.
const FRAME_OVERHEAD: u64 = 8;

/// Frame one event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds {MAX_FRAME_BYTES}", payload.len()),
        ));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` on a clean or torn end of file.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode the next frame and its size on disk. `Ok(None)` stops replay: end
/// of log, torn tail, oversized length, CRC mismatch, or undecodable payload.
fn decode_next(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_full(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, len as u64 + FRAME_OVERHEAD)))
}

/// Result of reading a log from the start.
#[derive(Debug)]
pub struct Replay {
    /// Every intact event, in append order.
    pub events: Vec<Event>,
    /// Byte length of the intact prefix. Anything past it is a torn or
    /// corrupt tail.
    pub valid_len: u64,
}

/// Append-only reservation log.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`, little endian.
/// `len` covers the payload only. Appends are staged in memory and reach the
/// file as one write per batch; a batch that fails is cut back off the file,
/// so the log only ever holds whole, acknowledged batches.
pub struct Wal {
    file: File,
    path: PathBuf,
    pending: Vec<u8>,
    pending_count: u64,
    committed_len: u64,
    appends_since_compact: u64,
    /// Fail the append made with this many events already staged.
    #[cfg(test)]
    pub(crate) fail_append_at: Option<u64>,
}

impl Wal {
    /// Open (or create) the log at `path` for appending. Callers that replayed
    /// the file first should `truncate` it to `Replay::valid_len`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            pending: Vec::new(),
            pending_count: 0,
            committed_len,
            appends_since_compact: 0,
            #[cfg(test)]
            fail_append_at: None,
        })
    }

    /// Append and fsync a single event. Tests only; the store batches with
    /// `append_buffered` + `flush_sync`.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Stage one event. Not written until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        #[cfg(test)]
        if self.fail_append_at == Some(self.pending_count) {
            return Err(io::Error::other("injected append failure"));
        }
        encode_event(&mut self.pending, event)?;
        self.pending_count += 1;
        Ok(())
    }

    /// Drop everything staged since the last flush.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.pending_count = 0;
    }

    /// Write and fsync the staged events. On failure the file is cut back to
    /// its last committed length and the staged events are dropped.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        let written = self.pending.len() as u64;
        let count = self.pending_count;
        let result = self
            .file
            .write_all(&self.pending)
            .and_then(|()| self.file.sync_all());
        self.discard_pending();
        match result {
            Ok(()) => {
                self.committed_len += written;
                self.appends_since_compact += count;
                Ok(())
            }
            Err(e) => {
                if let Err(cut) = self.file.set_len(self.committed_len) {
                    error!(
                        "could not cut {} back to {} bytes: {cut}",
                        self.path.display(),
                        self.committed_len
                    );
                }
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write `events` to the side file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the side file over the log and reopen it for appending.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.committed_len = file.metadata()?.len();
        self.file = file;
        self.discard_pending();
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Both compaction phases in one call. Used by tests.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Read the log up to its first bad frame. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Replay {
                    events: Vec::new(),
                    valid_len: 0,
                });
            }
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut valid_len = 0;
        while let Some((event, frame_len)) = decode_next(&mut reader)? {
            events.push(event);
            valid_len += frame_len;
        }
        Ok(Replay { events, valid_len })
    }

    /// Cut the log at `path` down to `len` bytes and fsync it. Returns how
    /// many bytes were dropped.
    pub fn truncate(path: &Path, len: u64) -> io::Result<u64> {
        let file = match OpenOptions::new().write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let size = file.metadata()?.len();
        if size <= len {
            return Ok(0);
        }
        file.set_len(len)?;
        file.sync_all()?;
        Ok(size - len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("sala_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn inserted(date: &str) -> Event {
        let apt = Apartment::parse("1", "5", "A").unwrap();
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        Event::ReservationInserted {
            reservation: Reservation::from_fields(
                Ulid::new(),
                NewReservation::new(apt, date).into_fields(1_718_000_000_000),
            ),
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![
            inserted("2024-06-10"),
            Event::ReservationDeleted { id: Ulid::new() },
        ];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        assert_eq!(Wal::replay(&path).unwrap().events, events);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn_tail.wal");
        let event = inserted("2024-06-11");

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![event]);
        assert_eq!(replay.valid_len, fs::metadata(&path).unwrap().len() - 6);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn truncate_then_append_is_replayed() {
        let path = tmp_path("truncate_append.wal");
        let first = inserted("2024-06-10");
        let second = inserted("2024-06-11");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[40u8, 0, 0, 0, 1, 2, 3]).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(Wal::truncate(&path, replay.valid_len).unwrap(), 7);
        assert_eq!(Wal::truncate(&path, replay.valid_len).unwrap(), 0);
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&second).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap().events, vec![first, second]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn oversized_length_prefix_ends_replay() {
        let path = tmp_path("oversized.wal");
        let event = inserted("2024-06-12");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&u32::MAX.to_le_bytes()).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap().events, vec![event]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn discarded_appends_never_reach_the_file() {
        let path = tmp_path("discard.wal");
        let kept = inserted("2024-06-13");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_buffered(&inserted("2024-06-10")).unwrap();
            wal.discard_pending();
            wal.append(&kept).unwrap();
            assert_eq!(wal.appends_since_compact(), 1);
        }

        assert_eq!(Wal::replay(&path).unwrap().events, vec![kept]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        assert!(Wal::replay(&path).unwrap().events.is_empty());
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("bad_crc.wal");
        let event = Event::ReservationDeleted { id: Ulid::new() };
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }

        assert!(Wal::replay(&path).unwrap().events.is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_shrinks_and_keeps_live_set() {
        let path = tmp_path("compact.wal");
        let live = inserted("2024-06-10");

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&live).unwrap();
            for _ in 0..10 {
                let churn = inserted("2024-06-12");
                let Event::ReservationInserted { reservation } = &churn else {
                    unreachable!()
                };
                let id = reservation.id;
                wal.append(&churn).unwrap();
                wal.append(&Event::ReservationDeleted { id }).unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(std::slice::from_ref(&live)).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted log should be smaller: {after} < {before}");
        assert_eq!(Wal::replay(&path).unwrap().events, vec![live]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn append_after_compact() {
        let path = tmp_path("append_after_compact.wal");
        let first = inserted("2024-06-10");
        let second = inserted("2024-06-11");

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.compact(std::slice::from_ref(&first)).unwrap();
            wal.append(&second).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap().events, vec![first, second]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_counted_and_durable_after_flush() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = ["2024-06-10", "2024-06-11", "2024-06-12"]
            .into_iter()
            .map(inserted)
            .collect();

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 0);
            wal.flush_sync().unwrap();
            assert_eq!(wal.appends_since_compact(), 3);
        }

        assert_eq!(Wal::replay(&path).unwrap().events, events);
        let _ = fs::remove_file(&path);
    }
}
