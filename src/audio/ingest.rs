//! Ingestion of raw audio through an inter-process pipe
//!
//! A capture process writes interleaved S16LE frames into a named pipe and
//! this side reads them back one whole block at a time. The pipe is sized
//! to hold at least one block so the writer never stalls mid-block while
//! the reader is still busy with the previous one.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::IngestError;
use crate::protocol::BYTES_PER_SAMPLE;

/// Allocation granularity of kernel pipe buffers
pub const PIPE_PAGE_SIZE: usize = 4096;

/// Pipe capacity needed to hold one block, rounded up to whole pages
pub fn required_capacity(channels: u16, block_size: usize) -> usize {
    let block_bytes = channels as usize * block_size * BYTES_PER_SAMPLE;
    block_bytes.div_ceil(PIPE_PAGE_SIZE).max(1) * PIPE_PAGE_SIZE
}

/// Create a named pipe at `path` unless something already exists there
#[cfg(unix)]
pub fn create_fifo(path: &Path) -> Result<(), IngestError> {
    use nix::sys::stat::Mode;

    if path.exists() {
        return Ok(());
    }
    nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| IngestError::Open {
        path: path.display().to_string(),
        source: std::io::Error::from(errno),
    })?;
    tracing::info!("Created FIFO {}", path.display());
    Ok(())
}

/// Grow the kernel buffer of a pipe to at least `bytes`. Returns the
/// capacity actually granted.
#[cfg(target_os = "linux")]
pub fn set_pipe_capacity<F: std::os::fd::AsRawFd>(pipe: &F, bytes: usize) -> Result<usize, IngestError> {
    use nix::fcntl::{fcntl, FcntlArg};

    let current = fcntl(pipe.as_raw_fd(), FcntlArg::F_GETPIPE_SZ).map_err(|errno| {
        IngestError::PipeCapacity {
            requested: bytes,
            reason: errno.to_string(),
        }
    })? as usize;
    if current >= bytes {
        return Ok(current);
    }

    let requested = i32::try_from(bytes).map_err(|_| IngestError::PipeCapacity {
        requested: bytes,
        reason: "size out of range".into(),
    })?;
    let granted = fcntl(pipe.as_raw_fd(), FcntlArg::F_SETPIPE_SZ(requested)).map_err(|errno| {
        IngestError::PipeCapacity {
            requested: bytes,
            reason: errno.to_string(),
        }
    })?;
    Ok(granted as usize)
}

/// Pipe sizing is Linux-specific; elsewhere the default buffer is kept.
#[cfg(not(target_os = "linux"))]
pub fn set_pipe_capacity<F>(_pipe: &F, bytes: usize) -> Result<usize, IngestError> {
    tracing::warn!("Pipe capacity cannot be set on this platform; wanted {} bytes", bytes);
    Ok(bytes)
}

/// Open a FIFO for reading and size it for one block.
///
/// Blocks until a writer opens the other end.
pub fn open_fifo(path: &Path, channels: u16, block_size: usize) -> Result<File, IngestError> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|source| IngestError::Open {
            path: path.display().to_string(),
            source,
        })?;

    let wanted = required_capacity(channels, block_size);
    let granted = set_pipe_capacity(&file, wanted)?;
    tracing::info!(
        "Opened {} with pipe capacity {} bytes (need {})",
        path.display(),
        granted,
        wanted
    );
    Ok(file)
}

/// Reads exactly one block at a time from a byte stream, looping over
/// short reads.
pub struct BlockReader<R> {
    inner: R,
    bytes: Vec<u8>,
    short_reads: u64,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R, block_samples: usize) -> Self {
        Self {
            inner,
            bytes: vec![0; block_samples * BYTES_PER_SAMPLE],
            short_reads: 0,
        }
    }

    /// Fill `samples` with the next block.
    ///
    /// Returns `Ok(false)` on a clean end of stream at a block boundary.
    /// An end of stream inside a block is an error, as is any read error
    /// other than an interrupted call.
    pub fn read_block(&mut self, samples: &mut [i16]) -> Result<bool, IngestError> {
        assert_eq!(samples.len() * BYTES_PER_SAMPLE, self.bytes.len());

        let mut filled = 0;
        while filled < self.bytes.len() {
            match self.inner.read(&mut self.bytes[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(IngestError::TruncatedBlock {
                        got: filled,
                        expected: self.bytes.len(),
                    })
                }
                Ok(n) => {
                    filled += n;
                    if filled < self.bytes.len() {
                        self.short_reads += 1;
                        tracing::trace!("Short read: {} of {} bytes", filled, self.bytes.len());
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(IngestError::Read(e)),
            }
        }

        for (sample, chunk) in samples.iter_mut().zip(self.bytes.chunks_exact(BYTES_PER_SAMPLE)) {
            *sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        }
        Ok(true)
    }

    /// Reads that returned less than the rest of a block
    pub fn short_reads(&self) -> u64 {
        self.short_reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Hands out at most `chunk` bytes per read, with an EINTR first
    struct Dribble {
        data: Cursor<Vec<u8>>,
        chunk: usize,
        interrupted: bool,
    }

    impl Read for Dribble {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(io::Error::from(ErrorKind::Interrupted));
            }
            let n = buf.len().min(self.chunk);
            self.data.read(&mut buf[..n])
        }
    }

    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from(ErrorKind::BrokenPipe))
        }
    }

    fn le_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_required_capacity() {
        assert_eq!(required_capacity(2, 256), 4096);
        assert!(required_capacity(2, 256) >= 2 * 256 * 2);
        assert_eq!(required_capacity(2, 1024), 4096);
        assert_eq!(required_capacity(2, 1025), 8192);
        assert_eq!(required_capacity(8, 4096), 65536);
        assert_eq!(required_capacity(0, 256), PIPE_PAGE_SIZE);
    }

    #[test]
    fn test_short_reads_are_accumulated() {
        let samples: Vec<i16> = vec![1, -2, 300, -400, 5, 6];
        let mut data = le_bytes(&samples);
        data.extend(le_bytes(&[7, 8, 9, 10, 11, 12]));
        let mut reader = BlockReader::new(
            Dribble {
                data: Cursor::new(data),
                chunk: 5,
                interrupted: false,
            },
            6,
        );

        let mut block = [0i16; 6];
        assert!(reader.read_block(&mut block).unwrap());
        assert_eq!(block, [1, -2, 300, -400, 5, 6]);
        assert!(reader.read_block(&mut block).unwrap());
        assert_eq!(block, [7, 8, 9, 10, 11, 12]);
        assert!(reader.short_reads() > 0);
        assert!(!reader.read_block(&mut block).unwrap());
    }

    #[test]
    fn test_truncated_block_is_an_error() {
        let mut reader = BlockReader::new(Cursor::new(vec![0u8; 10]), 8);
        let mut block = [0i16; 8];
        match reader.read_block(&mut block) {
            Err(IngestError::TruncatedBlock { got, expected }) => {
                assert_eq!(got, 10);
                assert_eq!(expected, 16);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_read_error_is_fatal() {
        let mut reader = BlockReader::new(Broken, 4);
        let mut block = [0i16; 4];
        assert!(matches!(
            reader.read_block(&mut block),
            Err(IngestError::Read(e)) if e.kind() == ErrorKind::BrokenPipe
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_pipe_capacity_covers_block() {
        let (read_end, _write_end) = nix::unistd::pipe().unwrap();
        let wanted = required_capacity(2, 4096);
        let granted = set_pipe_capacity(&read_end, wanted).unwrap();
        assert!(granted >= wanted);
    }

    #[cfg(unix)]
    #[test]
    fn test_fifo_round_trip() {
        use std::io::Write;

        let path = std::env::temp_dir().join(format!("lan-audio-sync-{}.fifo", std::process::id()));
        let _ = std::fs::remove_file(&path);
        create_fifo(&path).unwrap();

        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            let mut fifo = OpenOptions::new().write(true).open(&writer_path).unwrap();
            for chunk in le_bytes(&[1, 2, 3, 4, 5, 6, 7, 8]).chunks(3) {
                fifo.write_all(chunk).unwrap();
            }
        });

        let file = open_fifo(&path, 2, 2).unwrap();
        let mut reader = BlockReader::new(file, 4);
        let mut block = [0i16; 4];
        assert!(reader.read_block(&mut block).unwrap());
        assert_eq!(block, [1, 2, 3, 4]);
        assert!(reader.read_block(&mut block).unwrap());
        assert_eq!(block, [5, 6, 7, 8]);

        writer.join().unwrap();
        assert!(!reader.read_block(&mut block).unwrap());
        std::fs::remove_file(&path).unwrap();
    }
}
