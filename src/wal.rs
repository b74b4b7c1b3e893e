use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability;

/// Largest payload replay will allocate for. Anything bigger is a corrupt length prefix.
const MAX_FRAME_LEN: usize = 1 << 20;

/// Frame one event as `[u32 len][bincode payload][u32 crc32]`, little-endian.
fn write_record(out: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    out.write_all(&(payload.len() as u32).to_le_bytes())?;
    out.write_all(&payload)?;
    out.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Fill `buf` completely. `Ok(false)` means the file ended first.
fn read_full(input: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match input.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact record, or `None` at end of file or at the first torn/corrupt frame.
fn read_record(input: &mut impl Read) -> io::Result<Option<Event>> {
    let mut word = [0u8; 4];
    if !read_full(input, &mut word)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_FRAME_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_full(input, &mut payload)? || !read_full(input, &mut word)? {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload).ok())
}

/// Append-only event log backing one tenant.
///
/// A crash mid-write leaves at most one torn trailing frame; replay stops there.
/// A failed commit is cut back out of the file, so torn frames never sit between
/// acknowledged ones.
pub struct Wal {
    out: BufWriter<File>,
    path: PathBuf,
    since_compact: u64,
    /// Set when a failed commit could not be undone. Every later commit is refused.
    broken: bool,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
            since_compact: 0,
            broken: false,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.commit(std::slice::from_ref(event))
    }

    /// Write and fsync `events` as one unit.
    ///
    /// On failure the file is truncated back to its length before the call, so none
    /// of the batch replays and the next commit lands right after the last good frame.
    pub fn commit<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::other("WAL refuses writes after a failed rollback"));
        }
        let mark = self.out.get_ref().metadata()?.len();
        let mut staged = 0u64;
        let written = events
            .into_iter()
            .try_for_each(|event| {
                staged += 1;
                write_record(&mut self.out, event)
            })
            .and_then(|()| self.sync());
        match written {
            Ok(()) => {
                self.since_compact += staged;
                Ok(())
            }
            Err(e) => {
                if let Err(undo) = self.rollback(mark) {
                    tracing::error!("WAL rollback to byte {mark} failed: {undo}");
                    self.broken = true;
                }
                Err(e)
            }
        }
    }

    fn sync(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()
    }

    /// Drop whatever is still buffered, cut the file to `len` and reopen for appends.
    fn rollback(&mut self, len: u64) -> io::Result<()> {
        let fresh = OpenOptions::new().append(true).open(&self.path)?;
        let (_stale, _unflushed) = std::mem::replace(&mut self.out, BufWriter::new(fresh)).into_parts();
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len)?;
        file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.since_compact
    }

    fn staging_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a replacement log next to `path` and fsync it.
    pub fn write_snapshot(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(Self::staging_path(path))?);
        for event in events {
            write_record(&mut out, event)?;
        }
        out.flush()?;
        out.get_ref().sync_all()
    }

    /// Rename the staged snapshot over the live log and reopen it for appends.
    pub fn install_snapshot(&mut self) -> io::Result<()> {
        fs::rename(Self::staging_path(&self.path), &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.out = BufWriter::new(file);
        self.since_compact = 0;
        // The snapshot holds only applied state, so a log broken by a failed rollback is whole again.
        self.broken = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_snapshot(&self.path, events)?;
        self.install_snapshot()
    }

    /// Every intact event in file order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut input = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(event) = read_record(&mut input)? {
            events.push(event);
        }
        Ok(events)
    }
}

// ── Group commit ─────────────────────────────────────────────────

type Reply<T> = oneshot::Sender<T>;

enum WalRequest {
    Append {
        event: Event,
        done: Reply<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        done: Reply<io::Result<()>>,
    },
    AppendsSinceCompact {
        done: Reply<u64>,
    },
}

/// Cloneable sender side of the WAL writer task.
#[derive(Clone)]
pub struct WalHandle {
    tx: mpsc::Sender<WalRequest>,
}

fn writer_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "WAL writer shut down")
}

impl WalHandle {
    /// Move `wal` into a background writer task. Must be called inside a Tokio runtime.
    pub fn spawn(wal: Wal) -> Self {
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(writer_task(wal, rx));
        Self { tx }
    }

    /// Resolves once the event is fsynced together with its batch.
    pub async fn append(&self, event: Event) -> io::Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(WalRequest::Append { event, done })
            .await
            .map_err(|_| writer_gone())?;
        rx.await.map_err(|_| writer_gone())?
    }

    pub async fn compact(&self, events: Vec<Event>) -> io::Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(WalRequest::Compact { events, done })
            .await
            .map_err(|_| writer_gone())?;
        rx.await.map_err(|_| writer_gone())?
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (done, rx) = oneshot::channel();
        if self
            .tx
            .send(WalRequest::AppendsSinceCompact { done })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Owns the log. Each wakeup drains every append already queued and commits them
/// with one fsync; a non-append request ends the batch and runs after it.
async fn writer_task(mut wal: Wal, mut rx: mpsc::Receiver<WalRequest>) {
    let mut batch: Vec<(Event, Reply<io::Result<()>>)> = Vec::new();
    while let Some(first) = rx.recv().await {
        let mut deferred = match first {
            WalRequest::Append { event, done } => {
                batch.push((event, done));
                None
            }
            other => Some(other),
        };
        while deferred.is_none() {
            match rx.try_recv() {
                Ok(WalRequest::Append { event, done }) => batch.push((event, done)),
                Ok(other) => deferred = Some(other),
                Err(_) => break,
            }
        }
        if !batch.is_empty() {
            commit_batch(&mut wal, &mut batch);
        }
        if let Some(request) = deferred {
            serve(&mut wal, request);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, Reply<io::Result<()>>)>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let outcome = wal.commit(batch.iter().map(|(event, _)| event));

    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    if let Err(e) = &outcome {
        tracing::error!("WAL commit of {} events failed: {e}", batch.len());
    }
    for (_, done) in batch.drain(..) {
        let reply = match &outcome {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = done.send(reply);
    }
}

fn serve(wal: &mut Wal, request: WalRequest) {
    match request {
        WalRequest::Compact { events, done } => {
            let result = Wal::write_snapshot(wal.path(), &events).and_then(|()| wal.install_snapshot());
            let _ = done.send(result);
        }
        WalRequest::AppendsSinceCompact { done } => {
            let _ = done.send(wal.appends_since_compact());
        }
        WalRequest::Append { event, done } => {
            let mut single = vec![(event, done)];
            commit_batch(wal, &mut single);
        }
    }
}
