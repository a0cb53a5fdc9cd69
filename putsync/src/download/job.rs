//! On-disk state of one file transfer.
//!
//! A job writes into `<final path>.ptdownload`. The temp file holds the
//! payload in `[0, size)` followed by the progress bitmap in
//! `[size, size + bitmap_len)` and a 16-byte trailer recording the chunk
//! size and worker count the bitmap was written with. Presence of the temp
//! file means "resume"; absence means "start fresh". Only
//! [`DownloadJob::finalize`] turns the temp file into the final one.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::bitmap::ProgressBitmap;
use super::config::DOWNLOAD_EXTENSION;
use super::error::{DownloadError, DownloadResult};
use super::range::ChunkLayout;

/// Length of the trailer after the bitmap: chunk size and worker count,
/// both little-endian `u64`.
const TRAILER_LEN: u64 = 16;

/// How the job came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStart {
    /// No usable temp file existed; everything must be fetched.
    Fresh,
    /// An existing temp file and its bitmap were picked up.
    Resuming,
}

/// Temporary path for a destination: the destination plus the reserved suffix.
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = OsString::from(dest.as_os_str());
    name.push(DOWNLOAD_EXTENSION);
    PathBuf::from(name)
}

/// An open, in-flight transfer.
#[derive(Debug)]
pub struct DownloadJob {
    file: File,
    dest: PathBuf,
    temp: PathBuf,
    layout: ChunkLayout,
    workers: usize,
    start: JobStart,
    bitmap: Mutex<ProgressBitmap>,
}

impl DownloadJob {
    /// Open the temp file for `dest`, creating or resuming it.
    ///
    /// A fresh job splits the file between `workers` ranges (capped by
    /// [`ChunkLayout::effective_workers`]). A resumed job keeps the split
    /// recorded in its temp file, since set bits of chunks shared by two
    /// ranges are only meaningful for that split.
    pub fn open(dest: &Path, layout: ChunkLayout, workers: usize) -> DownloadResult<Self> {
        let temp = temp_path_for(dest);
        let workers = layout.effective_workers(workers);

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| DownloadError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let exists = temp.try_exists().map_err(|e| DownloadError::SetupFailed {
            path: temp.clone(),
            source: e,
        })?;

        if exists {
            Self::resume(dest, temp, layout, workers)
        } else {
            Self::create(dest, temp, layout, workers)
        }
    }

    fn create(
        dest: &Path,
        temp: PathBuf,
        layout: ChunkLayout,
        workers: usize,
    ) -> DownloadResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&temp)
            .map_err(|e| DownloadError::SetupFailed {
                path: temp.clone(),
                source: e,
            })?;

        Self::initialize(file, dest, temp, layout, workers)
    }

    /// Reset `file` to a zero-filled payload, an all-zero bitmap and a
    /// trailer for `workers`.
    fn initialize(
        file: File,
        dest: &Path,
        temp: PathBuf,
        layout: ChunkLayout,
        workers: usize,
    ) -> DownloadResult<Self> {
        let setup_err = |source: io::Error| DownloadError::SetupFailed {
            path: temp.clone(),
            source,
        };

        file.set_len(0)
            .and_then(|()| file.set_len(temp_file_len(&layout)))
            .map_err(setup_err)?;
        write_all_at(
            &file,
            &encode_trailer(layout.chunk_size(), workers),
            layout.size() + layout.bitmap_len(),
        )
        .map_err(setup_err)?;

        Ok(Self {
            file,
            dest: dest.to_path_buf(),
            temp,
            layout,
            workers,
            start: JobStart::Fresh,
            bitmap: Mutex::new(ProgressBitmap::new(layout.total_chunks())),
        })
    }

    fn resume(
        dest: &Path,
        temp: PathBuf,
        layout: ChunkLayout,
        workers: usize,
    ) -> DownloadResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&temp)
            .map_err(|e| DownloadError::SetupFailed {
                path: temp.clone(),
                source: e,
            })?;

        let expected_len = temp_file_len(&layout);
        let actual_len = file
            .metadata()
            .map_err(|e| DownloadError::SetupFailed {
                path: temp.clone(),
                source: e,
            })?
            .len();

        // Cut short before allocation finished, or a different remote size.
        if actual_len != expected_len {
            tracing::warn!(
                path = %temp.display(),
                expected_len,
                actual_len,
                "Temp file has unexpected length, restarting download"
            );
            return Self::initialize(file, dest, temp, layout, workers);
        }

        let bitmap_len = layout.bitmap_len() as usize;
        let mut bytes = vec![0u8; bitmap_len + TRAILER_LEN as usize];
        read_exact_at(&file, &mut bytes, layout.size()).map_err(|e| {
            DownloadError::BitmapReadFailed {
                path: temp.clone(),
                source: e,
            }
        })?;
        let trailer = bytes.split_off(bitmap_len);
        let (chunk_size, recorded_workers) = decode_trailer(&trailer);

        // Bits written for another chunk size describe other byte spans.
        if chunk_size != layout.chunk_size() {
            tracing::warn!(
                path = %temp.display(),
                recorded = chunk_size,
                configured = layout.chunk_size(),
                "Chunk size changed since the last run, restarting download"
            );
            return Self::initialize(file, dest, temp, layout, workers);
        }

        let recorded_workers = match usize::try_from(recorded_workers) {
            Ok(n) if n > 0 && layout.effective_workers(n) == n => n,
            _ => {
                tracing::warn!(
                    path = %temp.display(),
                    recorded = recorded_workers,
                    "Temp file records an unusable worker count, restarting download"
                );
                return Self::initialize(file, dest, temp, layout, workers);
            }
        };
        if recorded_workers != workers {
            tracing::info!(
                path = %temp.display(),
                recorded = recorded_workers,
                configured = workers,
                "Keeping the worker split of the earlier run"
            );
        }

        let bitmap = ProgressBitmap::from_bytes(bytes, layout.total_chunks()).ok_or_else(|| {
            DownloadError::BitmapReadFailed {
                path: temp.clone(),
                source: io::Error::new(io::ErrorKind::InvalidData, "bitmap length mismatch"),
            }
        })?;

        Ok(Self {
            file,
            dest: dest.to_path_buf(),
            temp,
            layout,
            workers: recorded_workers,
            start: JobStart::Resuming,
            bitmap: Mutex::new(bitmap),
        })
    }

    pub fn start(&self) -> JobStart {
        self.start
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    /// Number of ranges the file is split into.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp
    }

    /// Copy of the current bitmap.
    pub fn bitmap(&self) -> ProgressBitmap {
        self.bitmap.lock().clone()
    }

    /// Write payload bytes at `offset` without touching any shared cursor.
    pub fn write_at(&self, offset: u64, buf: &[u8]) -> DownloadResult<()> {
        write_all_at(&self.file, buf, offset).map_err(|e| DownloadError::WriteFailed {
            path: self.temp.clone(),
            source: e,
        })
    }

    /// Record that `[from, to)` of a range ending at `range_end` is on disk.
    ///
    /// Sets the bits of every chunk this write completed and, if any bit
    /// changed, rewrites the whole persisted bitmap. Mutation and flush
    /// happen under one lock so a flush never carries stale bits.
    pub fn record_written(&self, from: u64, to: u64, range_end: u64) -> DownloadResult<()> {
        let completed = self.layout.completed_by_write(from, to, range_end);
        if completed.is_empty() {
            return Ok(());
        }

        let mut bitmap = self.bitmap.lock();
        let mut changed = false;
        for index in completed {
            changed |= bitmap.set(index);
        }

        if changed {
            write_all_at(&self.file, bitmap.as_bytes(), self.layout.size()).map_err(|e| {
                DownloadError::WriteFailed {
                    path: self.temp.clone(),
                    source: e,
                }
            })?;
        }

        Ok(())
    }

    /// First chunk not yet on disk, if any.
    pub fn first_missing(&self) -> Option<u64> {
        let bitmap = self.bitmap.lock();
        bitmap.first_zero(0, self.layout.total_chunks())
    }

    /// Drop bitmap and trailer, close the file and move it to its final path.
    ///
    /// Must only be called once [`DownloadJob::first_missing`] is `None`.
    pub fn finalize(self) -> DownloadResult<u64> {
        let finalize_err = |source: io::Error| DownloadError::FinalizeFailed {
            from: self.temp.clone(),
            to: self.dest.clone(),
            source,
        };

        self.file.set_len(self.layout.size()).map_err(finalize_err)?;
        self.file.sync_all().map_err(finalize_err)?;

        let DownloadJob {
            file,
            dest,
            temp,
            layout,
            ..
        } = self;
        drop(file);

        fs::rename(&temp, &dest).map_err(|e| DownloadError::FinalizeFailed {
            from: temp,
            to: dest,
            source: e,
        })?;

        Ok(layout.size())
    }

    /// Swap the file handle for a read-only one so every write fails.
    #[cfg(test)]
    pub(crate) fn into_read_only(self) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).open(&self.temp)?;
        Ok(Self { file, ..self })
    }
}

/// Full length of a temp file: payload, bitmap and trailer.
fn temp_file_len(layout: &ChunkLayout) -> u64 {
    layout.size() + layout.bitmap_len() + TRAILER_LEN
}

fn encode_trailer(chunk_size: u64, workers: usize) -> [u8; TRAILER_LEN as usize] {
    let mut trailer = [0u8; TRAILER_LEN as usize];
    trailer[..8].copy_from_slice(&chunk_size.to_le_bytes());
    trailer[8..].copy_from_slice(&(workers as u64).to_le_bytes());
    trailer
}

fn decode_trailer(trailer: &[u8]) -> (u64, u64) {
    let mut chunk_size = [0u8; 8];
    let mut workers = [0u8; 8];
    chunk_size.copy_from_slice(&trailer[..8]);
    workers.copy_from_slice(&trailer[8..16]);
    (u64::from_le_bytes(chunk_size), u64::from_le_bytes(workers))
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => {
                buf = &mut std::mem::take(&mut buf)[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CHUNK: u64 = 1024;

    #[test]
    fn test_temp_path_appends_extension() {
        assert_eq!(
            temp_path_for(Path::new("/data/movie.mkv")),
            PathBuf::from("/data/movie.mkv.ptdownload")
        );
    }

    #[test]
    fn test_fresh_job_allocates_payload_bitmap_and_trailer() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");
        let layout = ChunkLayout::new(10_000, CHUNK);

        let job = DownloadJob::open(&dest, layout, 4).unwrap();
        assert_eq!(job.start(), JobStart::Fresh);
        assert_eq!(job.workers(), 4);

        let raw = fs::read(job.temp_path()).unwrap();
        // 10 chunks -> 2 bitmap bytes, then the trailer
        assert_eq!(raw.len(), 10_000 + 2 + 16);
        assert_eq!(&raw[10_002..10_010], &CHUNK.to_le_bytes());
        assert_eq!(&raw[10_010..], &4u64.to_le_bytes());
        assert_eq!(job.first_missing(), Some(0));
    }

    #[test]
    fn test_fresh_job_caps_workers() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");
        let job = DownloadJob::open(&dest, ChunkLayout::new(3 * CHUNK, CHUNK), 10).unwrap();
        assert_eq!(job.workers(), 3);
    }

    #[test]
    fn test_fresh_job_creates_parent_dirs() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a").join("b").join("file.bin");
        let job = DownloadJob::open(&dest, ChunkLayout::new(10, CHUNK), 1).unwrap();
        assert!(job.temp_path().exists());
    }

    #[test]
    fn test_bitmap_is_persisted_after_payload() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");
        let layout = ChunkLayout::new(4 * CHUNK, CHUNK);

        let job = DownloadJob::open(&dest, layout, 1).unwrap();
        job.write_at(0, &vec![7u8; CHUNK as usize]).unwrap();
        job.record_written(0, CHUNK, 4 * CHUNK).unwrap();
        drop(job);

        let raw = fs::read(temp_path_for(&dest)).unwrap();
        assert_eq!(raw.len() as u64, 4 * CHUNK + 1 + TRAILER_LEN);
        assert_eq!(raw[0], 7);
        assert_eq!(raw[(4 * CHUNK) as usize], 0b1000_0000);
    }

    #[test]
    fn test_resume_reads_back_bitmap() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");
        let layout = ChunkLayout::new(4 * CHUNK, CHUNK);

        let job = DownloadJob::open(&dest, layout, 1).unwrap();
        job.record_written(0, 2 * CHUNK, 4 * CHUNK).unwrap();
        drop(job);

        let resumed = DownloadJob::open(&dest, layout, 1).unwrap();
        assert_eq!(resumed.start(), JobStart::Resuming);
        assert!(resumed.bitmap().test(0));
        assert!(resumed.bitmap().test(1));
        assert_eq!(resumed.first_missing(), Some(2));
    }

    #[test]
    fn test_resume_keeps_recorded_worker_split() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");
        let layout = ChunkLayout::new(100 * CHUNK, CHUNK);

        drop(DownloadJob::open(&dest, layout, 2).unwrap());

        let resumed = DownloadJob::open(&dest, layout, 40).unwrap();
        assert_eq!(resumed.start(), JobStart::Resuming);
        assert_eq!(resumed.workers(), 2);
    }

    #[test]
    fn test_resume_with_other_chunk_size_restarts() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");

        // 8 chunks of 1024 and 4 chunks of 2048 both need one bitmap byte.
        let small = ChunkLayout::new(8 * CHUNK, CHUNK);
        let job = DownloadJob::open(&dest, small, 1).unwrap();
        job.record_written(0, 4 * CHUNK, 8 * CHUNK).unwrap();
        drop(job);

        let large = ChunkLayout::new(8 * CHUNK, 2 * CHUNK);
        assert_eq!(small.bitmap_len(), large.bitmap_len());
        let resumed = DownloadJob::open(&dest, large, 1).unwrap();
        assert_eq!(resumed.start(), JobStart::Fresh);
        assert_eq!(resumed.bitmap().count_set(), 0);
        assert_eq!(resumed.first_missing(), Some(0));

        // The trailer now describes the new chunk size.
        drop(resumed);
        let again = DownloadJob::open(&dest, large, 1).unwrap();
        assert_eq!(again.start(), JobStart::Resuming);
    }

    #[test]
    fn test_resume_with_wrong_length_restarts() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");
        fs::write(temp_path_for(&dest), b"short").unwrap();

        let layout = ChunkLayout::new(4 * CHUNK, CHUNK);
        let job = DownloadJob::open(&dest, layout, 1).unwrap();
        assert_eq!(job.start(), JobStart::Fresh);
        assert_eq!(
            fs::metadata(job.temp_path()).unwrap().len(),
            4 * CHUNK + 1 + TRAILER_LEN
        );
        assert_eq!(job.first_missing(), Some(0));
    }

    #[test]
    fn test_finalize_truncates_and_renames() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");
        let layout = ChunkLayout::new(2 * CHUNK + 5, CHUNK);

        let job = DownloadJob::open(&dest, layout, 1).unwrap();
        let payload = vec![1u8; (2 * CHUNK + 5) as usize];
        job.write_at(0, &payload).unwrap();
        job.record_written(0, 2 * CHUNK + 5, 2 * CHUNK + 5).unwrap();
        assert_eq!(job.first_missing(), None);

        let bytes = job.finalize().unwrap();
        assert_eq!(bytes, 2 * CHUNK + 5);
        assert_eq!(fs::read(&dest).unwrap(), payload);
        assert!(!temp_path_for(&dest).exists());
    }

    #[test]
    fn test_write_to_read_only_job_fails() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");
        let job = DownloadJob::open(&dest, ChunkLayout::new(4 * CHUNK, CHUNK), 1)
            .unwrap()
            .into_read_only()
            .unwrap();

        assert!(matches!(
            job.write_at(0, b"data"),
            Err(DownloadError::WriteFailed { .. })
        ));
    }

    #[test]
    fn test_concurrent_record_keeps_all_bits() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.bin");
        let chunks = 64;
        let layout = ChunkLayout::new(chunks * CHUNK, CHUNK);
        let job = DownloadJob::open(&dest, layout, 1).unwrap();

        std::thread::scope(|s| {
            for worker in 0..8u64 {
                let job = &job;
                s.spawn(move || {
                    for i in (worker..chunks).step_by(8) {
                        job.record_written(i * CHUNK, (i + 1) * CHUNK, chunks * CHUNK)
                            .unwrap();
                    }
                });
            }
        });
        drop(job);

        let resumed = DownloadJob::open(&dest, layout, 1).unwrap();
        assert_eq!(resumed.bitmap().count_set(), chunks);
    }
}
