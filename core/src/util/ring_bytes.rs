use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Fixed-capacity byte ring. Writers push chunks; old bytes are dropped from
/// the head so the ring always holds the most recent `cap` bytes.
///
/// Shared between the stderr pump and the runner via `Arc`, so pushes from
/// the pump task and the final `tail_string()` read never race.
#[derive(Clone)]
pub struct RingBytes {
    inner: Arc<Mutex<VecDeque<u8>>>,
    cap: usize,
}

impl RingBytes {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(cap.min(16 * 1024)))),
            cap,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn push(&self, data: &[u8]) {
        if self.cap == 0 {
            return;
        }
        let mut buf = self.inner.lock().unwrap();
        // A chunk larger than the ring replaces the whole ring.
        let data = if data.len() > self.cap {
            &data[data.len() - self.cap..]
        } else {
            data
        };
        let overflow = (buf.len() + data.len()).saturating_sub(self.cap);
        if overflow > 0 {
            buf.drain(..overflow);
        }
        buf.extend(data);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Snapshot of the retained bytes, oldest first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let buf = self.inner.lock().unwrap();
        let mut out = Vec::with_capacity(buf.len());
        out.extend(buf.iter().copied());
        out
    }

    /// Retained bytes as lossy UTF-8.
    pub fn tail_string(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_last_cap_bytes() {
        let ring = RingBytes::new(8);
        ring.push(b"0123456789");
        assert_eq!(ring.to_bytes(), b"23456789");

        ring.push(b"ab");
        assert_eq!(ring.to_bytes(), b"456789ab");
        assert_eq!(ring.len(), 8);
    }

    #[test]
    fn oversized_chunk_replaces_ring() {
        let ring = RingBytes::new(4);
        ring.push(b"xy");
        ring.push(b"abcdefgh");
        assert_eq!(ring.to_bytes(), b"efgh");
    }

    #[test]
    fn zero_capacity_drops_everything() {
        let ring = RingBytes::new(0);
        ring.push(b"data");
        assert!(ring.is_empty());
    }

    #[test]
    fn tail_string_is_lossy() {
        let ring = RingBytes::new(16);
        ring.push(b"ok \xff bytes");
        assert!(ring.tail_string().contains("ok"));
    }
}
