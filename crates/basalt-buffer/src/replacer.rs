//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use basalt_common::{BasaltError, Result};
use log::trace;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId) -> Result<()>;

    /// Marks a frame as evictable (unpinned) or pinned.
    ///
    /// A no-op on frames with no recorded access.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()>;

    /// Selects a victim frame for eviction and forgets its history.
    ///
    /// Returns None if no frames are evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Removes a frame and its access history from the replacer.
    ///
    /// A no-op on untracked frames; fails on a pinned frame.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// Per-frame access history.
struct FrameRecord {
    /// Total accesses since the frame was last forgotten.
    access_count: usize,
    /// Most recent timestamps, at most K of them (front = oldest retained).
    history: VecDeque<u64>,
    /// Whether the frame may be evicted.
    evictable: bool,
}

struct LruKInner {
    /// Access records for every tracked frame.
    records: HashMap<FrameId, FrameRecord>,
    /// Frames with fewer than K accesses, ordered by most recent access
    /// (front = oldest, evicted first).
    young: VecDeque<FrameId>,
    /// Frames with at least K accesses, ascending by their K-th most recent
    /// timestamp (index 0 evicted first).
    mature: Vec<FrameId>,
    /// Logical clock, advanced on every access.
    current_timestamp: u64,
    /// Count of tracked frames whose evictable flag is set.
    evictable_count: usize,
}

/// LRU-K replacement algorithm implementation.
///
/// Tracks the last K access timestamps of each frame. Victims are chosen
/// from the young set (fewer than K accesses) in LRU order first, then from
/// the mature set by oldest K-th-most-recent access. Frames become tracked
/// on their first recorded access and are forgotten on eviction or removal.
pub struct LruKReplacer {
    /// Number of frames.
    num_frames: usize,
    /// History depth K.
    k: usize,
    /// Internal state protected by mutex.
    inner: Mutex<LruKInner>,
}

impl LruKReplacer {
    /// Creates a new LRU-K replacer with the given number of frames.
    ///
    /// `k` must be at least 1.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            num_frames,
            k,
            inner: Mutex::new(LruKInner {
                records: HashMap::new(),
                young: VecDeque::new(),
                mature: Vec::new(),
                current_timestamp: 0,
                evictable_count: 0,
            }),
        }
    }

    /// Returns the total capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.num_frames
    }

    /// Returns the history depth K.
    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    fn check_frame(&self, frame_id: FrameId) -> Result<()> {
        if (frame_id.0 as usize) >= self.num_frames {
            return Err(BasaltError::FrameOutOfRange {
                frame_id: frame_id.0,
                capacity: self.num_frames,
            });
        }
        Ok(())
    }
}

/// Inserts `frame_id` into `mature` keeping ascending K-th-timestamp order.
fn insert_mature(
    mature: &mut Vec<FrameId>,
    records: &HashMap<FrameId, FrameRecord>,
    frame_id: FrameId,
    kth_timestamp: u64,
) {
    let pos = mature.partition_point(|f| {
        records[f]
            .history
            .front()
            .copied()
            .unwrap_or(u64::MAX)
            <= kth_timestamp
    });
    mature.insert(pos, frame_id);
}

fn remove_from_list<T: PartialEq>(list: &mut Vec<T>, item: &T) {
    if let Some(pos) = list.iter().position(|x| x == item) {
        list.remove(pos);
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;

        let mut inner = self.inner.lock();
        inner.current_timestamp += 1;
        let timestamp = inner.current_timestamp;

        let LruKInner {
            records,
            young,
            mature,
            evictable_count,
            ..
        } = &mut *inner;

        let is_new = !records.contains_key(&frame_id);
        if is_new {
            *evictable_count += 1;
        }
        let record = records.entry(frame_id).or_insert_with(|| FrameRecord {
            access_count: 0,
            history: VecDeque::with_capacity(self.k),
            evictable: true,
        });
        record.access_count += 1;
        record.history.push_back(timestamp);
        if record.history.len() > self.k {
            record.history.pop_front();
        }
        let access_count = record.access_count;
        let kth_timestamp = record.history.front().copied().unwrap_or(timestamp);

        if access_count < self.k {
            // Young frame: (re)position at the most-recently-accessed end.
            if !is_new {
                if let Some(pos) = young.iter().position(|f| *f == frame_id) {
                    young.remove(pos);
                }
            }
            young.push_back(frame_id);
        } else if access_count == self.k {
            // Graduation into the mature set.
            if !is_new {
                if let Some(pos) = young.iter().position(|f| *f == frame_id) {
                    young.remove(pos);
                }
            }
            insert_mature(mature, records, frame_id, kth_timestamp);
        } else {
            // Already mature: the history window slid, reposition.
            remove_from_list(mature, &frame_id);
            insert_mature(mature, records, frame_id, kth_timestamp);
        }

        Ok(())
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        self.check_frame(frame_id)?;

        let mut inner = self.inner.lock();
        let LruKInner {
            records,
            evictable_count,
            ..
        } = &mut *inner;

        if let Some(record) = records.get_mut(&frame_id) {
            if record.evictable && !evictable {
                record.evictable = false;
                *evictable_count -= 1;
            } else if !record.evictable && evictable {
                record.evictable = true;
                *evictable_count += 1;
            }
        }
        Ok(())
    }

    fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.evictable_count == 0 {
            return None;
        }

        let LruKInner {
            records,
            young,
            mature,
            evictable_count,
            ..
        } = &mut *inner;

        // Young victims first, oldest most-recent access first.
        if let Some(pos) = young.iter().position(|f| records[f].evictable) {
            let frame_id = young[pos];
            young.remove(pos);
            records.remove(&frame_id);
            *evictable_count -= 1;
            trace!("evicting young frame {frame_id}");
            return Some(frame_id);
        }

        // Then mature victims, oldest K-th-most-recent access first.
        if let Some(pos) = mature.iter().position(|f| records[f].evictable) {
            let frame_id = mature.remove(pos);
            records.remove(&frame_id);
            *evictable_count -= 1;
            trace!("evicting mature frame {frame_id}");
            return Some(frame_id);
        }

        None
    }

    fn remove(&self, frame_id: FrameId) -> Result<()> {
        self.check_frame(frame_id)?;

        let mut inner = self.inner.lock();
        let LruKInner {
            records,
            young,
            mature,
            evictable_count,
            ..
        } = &mut *inner;

        let record = match records.get(&frame_id) {
            Some(record) => record,
            None => return Ok(()),
        };
        if !record.evictable {
            return Err(BasaltError::RemovePinnedFrame {
                frame_id: frame_id.0,
            });
        }

        if record.access_count < self.k {
            if let Some(pos) = young.iter().position(|f| *f == frame_id) {
                young.remove(pos);
            }
        } else {
            remove_from_list(mature, &frame_id);
        }
        records.remove(&frame_id);
        *evictable_count -= 1;
        Ok(())
    }

    fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }
}
