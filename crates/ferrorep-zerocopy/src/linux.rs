//! Linux `copy_file_range` transfer
//!
//! The kernel moves the bytes between the two descriptors without a round
//! trip through user space; on filesystems that support it the copy becomes a
//! reflink.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use tracing::debug;

/// Largest chunk handed to a single syscall
const MAX_CHUNK: u64 = 1 << 30;

/// Whether an error means the kernel or filesystem cannot do the transfer
pub fn is_unsupported(error: &io::Error) -> bool {
    matches!(
        error.raw_os_error(),
        Some(libc::ENOSYS | libc::EXDEV | libc::EINVAL | libc::EOPNOTSUPP | libc::EPERM)
    )
}

/// Copy `size` bytes from `source` to `dest` with `copy_file_range`
///
/// Returns the number of bytes moved, which is short only when the source
/// shrank during the copy.
pub fn copy_file_range_blocking(source: &File, dest: &File, size: u64) -> io::Result<u64> {
    let source_fd = source.as_raw_fd();
    let dest_fd = dest.as_raw_fd();
    let mut offset_in: i64 = 0;
    let mut offset_out: i64 = 0;
    let mut remaining = size;

    while remaining > 0 {
        let chunk_size = remaining.min(MAX_CHUNK) as usize;

        // SAFETY: both descriptors stay open for the duration of the call and
        // the offset pointers refer to live stack variables.
        let copied = unsafe {
            libc::syscall(
                libc::SYS_copy_file_range,
                source_fd,
                &mut offset_in as *mut i64,
                dest_fd,
                &mut offset_out as *mut i64,
                chunk_size,
                0u32,
            )
        };

        if copied < 0 {
            return Err(io::Error::last_os_error());
        }
        if copied == 0 {
            break;
        }

        remaining -= copied as u64;
        debug!("copy_file_range copied {} bytes, {} remaining", copied, remaining);
    }

    Ok(size - remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn test_copy_file_range_copies_content() {
        let dir = tempfile::tempdir().unwrap();
        let source_path = dir.path().join("source.bin");
        let dest_path = dir.path().join("dest.bin");
        let payload: Vec<u8> = (0..64 * 1024).map(|i| (i % 251) as u8).collect();
        std::fs::File::create(&source_path)
            .unwrap()
            .write_all(&payload)
            .unwrap();

        let source = File::open(&source_path).unwrap();
        let dest = File::create(&dest_path).unwrap();
        match copy_file_range_blocking(&source, &dest, payload.len() as u64) {
            Ok(copied) => {
                assert_eq!(copied, payload.len() as u64);
                let mut written = Vec::new();
                File::open(&dest_path)
                    .unwrap()
                    .read_to_end(&mut written)
                    .unwrap();
                assert_eq!(written, payload);
            }
            Err(e) => assert!(is_unsupported(&e), "unexpected error: {e}"),
        }
    }

    #[test]
    fn test_unsupported_classification() {
        assert!(is_unsupported(&io::Error::from_raw_os_error(libc::EXDEV)));
        assert!(is_unsupported(&io::Error::from_raw_os_error(libc::ENOSYS)));
        assert!(!is_unsupported(&io::Error::from_raw_os_error(libc::ENOSPC)));
    }
}
