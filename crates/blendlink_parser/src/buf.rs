//! Input buffer abstraction
//!
//! The parser consumes a whole file image at once. `FileBuf` unifies the
//! ways that image can be owned: a shared in-memory buffer, a ref-counted
//! `Bytes`, or a memory-mapped file when the `mmap` feature is enabled.
//! Slicing yields `Bytes` payload views without copying where the backing
//! storage allows it.

use bytes::Bytes;
use std::sync::Arc;

#[cfg(feature = "mmap")]
use memmap2::Mmap;

#[derive(Clone)]
enum Backing {
    ArcBuf(Arc<Vec<u8>>),
    Bytes(Bytes),
    #[cfg(feature = "mmap")]
    Mmap(Arc<Mmap>),
}

/// Owned, sliceable view of a complete file image
#[derive(Clone)]
pub struct FileBuf {
    backing: Backing,
}

impl FileBuf {
    pub fn from_vec(data: Vec<u8>) -> FileBuf {
        FileBuf {
            backing: Backing::ArcBuf(Arc::new(data)),
        }
    }

    pub fn from_bytes(bytes: Bytes) -> FileBuf {
        FileBuf {
            backing: Backing::Bytes(bytes),
        }
    }

    #[cfg(feature = "mmap")]
    pub fn from_mmap(mmap: Mmap) -> FileBuf {
        FileBuf {
            backing: Backing::Mmap(Arc::new(mmap)),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::ArcBuf(buf) => buf.as_ref(),
            Backing::Bytes(bytes) => bytes.as_ref(),
            #[cfg(feature = "mmap")]
            Backing::Mmap(mmap) => mmap.as_ref(),
        }
    }

    /// Slice out a payload view. Zero-copy for `Bytes` backing, a copy
    /// otherwise (payloads are consumed once, so the copy is transient).
    pub fn slice(&self, range: std::ops::Range<usize>) -> Result<Bytes, blendlink_error::BlendLinkError> {
        if range.start > range.end || range.end > self.len() {
            return Err(blendlink_error::BlendLinkError::parser(
                format!(
                    "invalid range {}..{} for buffer of length {}",
                    range.start,
                    range.end,
                    self.len()
                ),
                blendlink_error::ParserErrorKind::InvalidData,
            ));
        }
        Ok(match &self.backing {
            Backing::Bytes(bytes) => bytes.slice(range),
            other => {
                let data = match other {
                    Backing::ArcBuf(buf) => &buf[range],
                    Backing::Bytes(_) => unreachable!(),
                    #[cfg(feature = "mmap")]
                    Backing::Mmap(mmap) => &mmap[range],
                };
                Bytes::copy_from_slice(data)
            }
        })
    }
}

impl std::fmt::Debug for FileBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backing {
            Backing::ArcBuf(_) => write!(f, "FileBuf::ArcBuf(len={})", self.len()),
            Backing::Bytes(_) => write!(f, "FileBuf::Bytes(len={})", self.len()),
            #[cfg(feature = "mmap")]
            Backing::Mmap(_) => write!(f, "FileBuf::Mmap(len={})", self.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vec() {
        let data = vec![1u8, 2, 3, 4, 5];
        let buf = FileBuf::from_vec(data.clone());
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.as_slice(), &data[..]);
    }

    #[test]
    fn test_slicing() {
        let buf = FileBuf::from_vec((0u8..10).collect());
        let slice = buf.slice(2..6).unwrap();
        assert_eq!(slice.as_ref(), &[2, 3, 4, 5]);

        assert!(buf.slice(2..2).unwrap().is_empty());
        assert!(buf.slice(8..15).is_err());
    }

    #[test]
    fn test_bytes_backing_zero_copy() {
        let bytes = Bytes::from_static(b"hello world");
        let buf = FileBuf::from_bytes(bytes);
        assert_eq!(buf.slice(0..5).unwrap().as_ref(), b"hello");
    }
}
