use crate::frame::Frame;
use std::collections::VecDeque;

/// Bounded, oldest-first store of recently captured frames.
///
/// Index 0 is the oldest frame and `len() - 1` the newest. The browse cursor
/// uses the same direction for undo, manual browsing and playback.
#[derive(Debug)]
pub struct RecentFrameCache {
    frames: VecDeque<Frame>,
    capacity: usize,
    active: Option<usize>,
}

impl RecentFrameCache {
    /// A capacity of zero is bumped to one so a fresh capture is always viewable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            active: None,
        }
    }

    /// Append as newest, evicting the oldest when full.
    pub fn push(&mut self, frame: Frame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
            self.active = self.active.map(|i| i.saturating_sub(1));
        }
        self.frames.push_back(frame);
        if self.active.is_none() {
            self.active = Some(0);
        }
    }

    pub fn remove_newest(&mut self) -> Option<Frame> {
        let frame = self.frames.pop_back();
        self.clamp_cursor();
        frame
    }

    /// # Panics
    /// If `index` is outside `0..len()`; callers must clamp.
    pub fn get(&self, index: usize) -> &Frame {
        match self.frames.get(index) {
            Some(frame) => frame,
            None => panic!(
                "frame index {} out of range for cache of {}",
                index,
                self.frames.len()
            ),
        }
    }

    pub fn newest(&self) -> Option<&Frame> {
        self.frames.back()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.active = None;
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_frame(&self) -> Option<&Frame> {
        self.active.and_then(|i| self.frames.get(i))
    }

    /// Point the cursor at `index`, clamped into range. No-op when empty.
    pub fn set_active(&mut self, index: usize) {
        self.active = self.last_index().map(|last| index.min(last));
    }

    pub fn show_newest(&mut self) {
        self.active = self.last_index();
    }

    /// Move the cursor one step towards the oldest frame, stopping at 0.
    pub fn step_older(&mut self) -> Option<usize> {
        if let Some(i) = self.active {
            self.active = Some(i.saturating_sub(1));
        }
        self.active
    }

    /// Move the cursor one step towards the newest frame, stopping at the end.
    pub fn step_newer(&mut self) -> Option<usize> {
        if let (Some(i), Some(last)) = (self.active, self.last_index()) {
            self.active = Some((i + 1).min(last));
        }
        self.active
    }

    pub fn clamp_cursor(&mut self) {
        self.active = match (self.active, self.last_index()) {
            (_, None) => None,
            (None, Some(last)) => Some(last),
            (Some(i), Some(last)) => Some(i.min(last)),
        };
    }

    /// The newest `depth` frames, oldest-first, for onion-skin blending.
    pub fn onion_frames(&self, depth: usize) -> Vec<Frame> {
        let start = self.frames.len().saturating_sub(depth);
        self.frames.range(start..).cloned().collect()
    }

    fn last_index(&self) -> Option<usize> {
        self.frames.len().checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(tag: u8) -> Frame {
        Frame::new(vec![tag; 3], 1, 1, Instant::now())
    }

    fn tags(cache: &RecentFrameCache) -> Vec<u8> {
        (0..cache.len()).map(|i| cache.get(i).pixels()[0]).collect()
    }

    #[test]
    fn push_keeps_size_within_capacity() {
        let mut cache = RecentFrameCache::new(3);
        for tag in 0..10 {
            cache.push(frame(tag));
            assert!(cache.len() <= 3);
            assert_eq!(cache.get(cache.len() - 1).pixels()[0], tag);
        }
        assert_eq!(tags(&cache), vec![7, 8, 9]);
    }

    #[test]
    fn eviction_drops_oldest_first() {
        let mut cache = RecentFrameCache::new(2);
        cache.push(frame(1));
        cache.push(frame(2));
        cache.push(frame(3));
        assert_eq!(tags(&cache), vec![2, 3]);
    }

    #[test]
    fn remove_newest_then_push_restores_contents() {
        let mut cache = RecentFrameCache::new(4);
        for tag in 1..=3 {
            cache.push(frame(tag));
        }
        let before = tags(&cache);

        let removed = cache.remove_newest().unwrap();
        assert_eq!(tags(&cache), vec![1, 2]);
        cache.push(removed);

        assert_eq!(tags(&cache), before);
    }

    #[test]
    fn remove_newest_on_empty_is_none() {
        let mut cache = RecentFrameCache::new(2);
        assert!(cache.remove_newest().is_none());
        assert_eq!(cache.active_index(), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn get_out_of_range_panics() {
        let mut cache = RecentFrameCache::new(2);
        cache.push(frame(1));
        cache.get(1);
    }

    #[test]
    fn cursor_clamps_at_both_ends() {
        let mut cache = RecentFrameCache::new(5);
        for tag in 0..3 {
            cache.push(frame(tag));
        }
        cache.show_newest();
        assert_eq!(cache.step_newer(), Some(2));
        assert_eq!(cache.step_older(), Some(1));
        assert_eq!(cache.step_older(), Some(0));
        assert_eq!(cache.step_older(), Some(0));
        assert_eq!(cache.active_frame().unwrap().pixels()[0], 0);
    }

    #[test]
    fn cursor_follows_frame_through_eviction() {
        let mut cache = RecentFrameCache::new(3);
        for tag in 0..3 {
            cache.push(frame(tag));
        }
        cache.set_active(1);
        cache.push(frame(3));
        assert_eq!(cache.active_index(), Some(0));
        assert_eq!(cache.active_frame().unwrap().pixels()[0], 1);
    }

    #[test]
    fn undo_clamps_cursor() {
        let mut cache = RecentFrameCache::new(3);
        cache.push(frame(0));
        cache.push(frame(1));
        cache.show_newest();
        cache.remove_newest();
        assert_eq!(cache.active_index(), Some(0));
        cache.remove_newest();
        assert_eq!(cache.active_index(), None);
    }

    #[test]
    fn onion_frames_are_newest_oldest_first() {
        let mut cache = RecentFrameCache::new(5);
        for tag in 0..4 {
            cache.push(frame(tag));
        }
        let onion: Vec<u8> = cache.onion_frames(2).iter().map(|f| f.pixels()[0]).collect();
        assert_eq!(onion, vec![2, 3]);
        assert!(cache.onion_frames(0).is_empty());
        assert_eq!(cache.onion_frames(10).len(), 4);
    }
}
