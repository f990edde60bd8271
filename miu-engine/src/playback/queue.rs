//! Queue store and duplicate guard
//!
//! Two FIFO queues feed playback: explicit user requests first, then
//! autoplay picks. A track id occupies at most one slot across
//! {now playing, user queue, autoplay queue}.
//!
//! **Admission rules (checked in order):**
//! 1. Not the track currently playing
//! 2. Not already in either queue
//! 3. Not on cooldown for the request's scale (skipped in linear mode)

use super::cooldown::CooldownTracker;
use crate::model::{QueueItem, TrackId};
use chrono::{DateTime, Utc};
use miu_common::events::QueueOrigin;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

/// Why an enqueue was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnqueueRejection {
    #[error("track is currently playing")]
    CurrentlyPlaying,

    #[error("track is already queued")]
    AlreadyQueued,

    #[error("track is on cooldown")]
    OnCooldown,

    #[error("track is unavailable")]
    Unavailable,
}

#[derive(Debug, Default)]
pub struct QueueStore {
    user: VecDeque<QueueItem>,
    autoplay: VecDeque<QueueItem>,
    current: Option<TrackId>,
    /// Playlist mode: cooldown checks are bypassed
    linear_mode: bool,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_linear_mode(&mut self, enabled: bool) {
        self.linear_mode = enabled;
    }

    pub fn linear_mode(&self) -> bool {
        self.linear_mode
    }

    /// Track now occupying the playing slot
    pub fn set_current(&mut self, id: Option<TrackId>) {
        self.current = id;
    }

    pub fn current(&self) -> Option<&TrackId> {
        self.current.as_ref()
    }

    /// Run the admission rules without modifying anything
    pub fn check_admission(
        &self,
        id: &TrackId,
        origin: QueueOrigin,
        cooldown: &mut CooldownTracker,
        now: DateTime<Utc>,
    ) -> Result<(), EnqueueRejection> {
        if self.current.as_ref() == Some(id) {
            return Err(EnqueueRejection::CurrentlyPlaying);
        }
        if self.contains(id) {
            return Err(EnqueueRejection::AlreadyQueued);
        }
        if !self.linear_mode
            && cooldown.is_on_cooldown_at(id, origin == QueueOrigin::Autoplay, now)
        {
            return Err(EnqueueRejection::OnCooldown);
        }
        Ok(())
    }

    /// Append to the user queue; returns the 0-based combined position
    pub fn enqueue_user_request(
        &mut self,
        item: QueueItem,
        cooldown: &mut CooldownTracker,
        now: DateTime<Utc>,
    ) -> Result<usize, EnqueueRejection> {
        self.check_admission(&item.track_id, QueueOrigin::User, cooldown, now)?;
        self.user.push_back(item);
        Ok(self.user.len() - 1)
    }

    /// Append to the autoplay queue; returns the 0-based combined position
    pub fn enqueue_autoplay(
        &mut self,
        item: QueueItem,
        cooldown: &mut CooldownTracker,
        now: DateTime<Utc>,
    ) -> Result<usize, EnqueueRejection> {
        self.check_admission(&item.track_id, QueueOrigin::Autoplay, cooldown, now)?;
        self.autoplay.push_back(item);
        Ok(self.user.len() + self.autoplay.len() - 1)
    }

    /// Pop the next item, user queue first
    pub fn dequeue_next(&mut self) -> Option<QueueItem> {
        self.user.pop_front().or_else(|| self.autoplay.pop_front())
    }

    /// Put an item back at the head of its origin queue (retry after an error)
    pub fn requeue_front(&mut self, item: QueueItem) {
        match item.origin {
            QueueOrigin::User => self.user.push_front(item),
            QueueOrigin::Autoplay => self.autoplay.push_front(item),
        }
    }

    /// User requests followed by autoplay picks
    pub fn peek_combined(&self) -> impl Iterator<Item = &QueueItem> {
        self.user.iter().chain(self.autoplay.iter())
    }

    pub fn peek_next(&self) -> Option<&QueueItem> {
        self.user.front().or_else(|| self.autoplay.front())
    }

    /// Remove by combined position
    pub fn remove_at(&mut self, position: usize) -> Option<QueueItem> {
        if position < self.user.len() {
            self.user.remove(position)
        } else {
            self.autoplay.remove(position - self.user.len())
        }
    }

    pub fn clear_autoplay(&mut self) -> Vec<QueueItem> {
        self.autoplay.drain(..).collect()
    }

    /// Empty both queues, returning what was removed in combined order
    pub fn clear(&mut self) -> Vec<QueueItem> {
        let mut removed: Vec<QueueItem> = self.user.drain(..).collect();
        removed.extend(self.autoplay.drain(..));
        removed
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.peek_combined().any(|item| &item.track_id == id)
    }

    /// Every id holding a slot, including the playing one
    pub fn occupied_ids(&self) -> HashSet<TrackId> {
        self.peek_combined()
            .map(|item| item.track_id.clone())
            .chain(self.current.iter().cloned())
            .collect()
    }

    pub fn combined_ids(&self) -> Vec<String> {
        self.peek_combined()
            .map(|item| item.track_id.to_string())
            .collect()
    }

    pub fn user_len(&self) -> usize {
        self.user.len()
    }

    pub fn autoplay_len(&self) -> usize {
        self.autoplay.len()
    }

    pub fn len(&self) -> usize {
        self.user.len() + self.autoplay.len()
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.autoplay.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::MediaInfo;
    use crate::config::CooldownConfig;
    use crate::model::{Requester, Track};
    use miu_common::events::AutoplaySource;

    fn track(id: &str) -> Track {
        Track::from_info(
            TrackId::new(id),
            &MediaInfo {
                title: id.to_uppercase(),
                duration_secs: 200.0,
                thumbnail: None,
                channel_id: None,
            },
        )
    }

    fn user_item(id: &str) -> QueueItem {
        QueueItem::for_user(&track(id), Requester::user("u1", "alice"))
    }

    fn auto_item(id: &str) -> QueueItem {
        QueueItem::for_autoplay(&track(id), AutoplaySource::Random)
    }

    fn setup() -> (QueueStore, CooldownTracker) {
        (
            QueueStore::new(),
            CooldownTracker::new(CooldownConfig::default()),
        )
    }

    #[test]
    fn test_user_queue_drains_before_autoplay() {
        let (mut queue, mut cd) = setup();
        let now = Utc::now();
        queue.enqueue_autoplay(auto_item("x"), &mut cd, now).unwrap();
        queue.enqueue_user_request(user_item("a"), &mut cd, now).unwrap();
        queue.enqueue_autoplay(auto_item("y"), &mut cd, now).unwrap();
        queue.enqueue_user_request(user_item("b"), &mut cd, now).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue_next())
            .map(|i| i.track_id.to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "x", "y"]);
    }

    #[test]
    fn test_positions_are_combined() {
        let (mut queue, mut cd) = setup();
        let now = Utc::now();
        assert_eq!(queue.enqueue_autoplay(auto_item("x"), &mut cd, now), Ok(0));
        assert_eq!(queue.enqueue_user_request(user_item("a"), &mut cd, now), Ok(0));
        assert_eq!(queue.enqueue_autoplay(auto_item("y"), &mut cd, now), Ok(2));
        assert_eq!(queue.enqueue_user_request(user_item("b"), &mut cd, now), Ok(1));
    }

    #[test]
    fn test_duplicate_guard_across_slots() {
        let (mut queue, mut cd) = setup();
        let now = Utc::now();
        queue.set_current(Some(TrackId::new("now")));
        queue.enqueue_user_request(user_item("a"), &mut cd, now).unwrap();
        queue.enqueue_autoplay(auto_item("x"), &mut cd, now).unwrap();

        assert_eq!(
            queue.enqueue_user_request(user_item("now"), &mut cd, now),
            Err(EnqueueRejection::CurrentlyPlaying)
        );
        assert_eq!(
            queue.enqueue_user_request(user_item("x"), &mut cd, now),
            Err(EnqueueRejection::AlreadyQueued)
        );
        assert_eq!(
            queue.enqueue_autoplay(auto_item("a"), &mut cd, now),
            Err(EnqueueRejection::AlreadyQueued)
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_cooldown_rejects_unless_linear() {
        let (mut queue, mut cd) = setup();
        let now = Utc::now();
        cd.mark_played_at(&TrackId::new("a"), now);

        assert_eq!(
            queue.enqueue_user_request(user_item("a"), &mut cd, now),
            Err(EnqueueRejection::OnCooldown)
        );
        assert_eq!(
            queue.enqueue_autoplay(auto_item("a"), &mut cd, now),
            Err(EnqueueRejection::OnCooldown)
        );

        queue.set_linear_mode(true);
        assert!(queue.enqueue_user_request(user_item("a"), &mut cd, now).is_ok());
    }

    #[test]
    fn test_remove_at_spans_both_queues() {
        let (mut queue, mut cd) = setup();
        let now = Utc::now();
        queue.enqueue_user_request(user_item("a"), &mut cd, now).unwrap();
        queue.enqueue_autoplay(auto_item("x"), &mut cd, now).unwrap();
        queue.enqueue_autoplay(auto_item("y"), &mut cd, now).unwrap();

        let removed = queue.remove_at(2).unwrap();
        assert_eq!(removed.track_id.as_str(), "y");
        assert!(queue.remove_at(5).is_none());
        assert_eq!(queue.combined_ids(), vec!["a", "x"]);
    }

    #[test]
    fn test_requeue_front_restores_origin_queue() {
        let (mut queue, mut cd) = setup();
        let now = Utc::now();
        queue.enqueue_autoplay(auto_item("x"), &mut cd, now).unwrap();
        queue.enqueue_autoplay(auto_item("y"), &mut cd, now).unwrap();

        let head = queue.dequeue_next().unwrap();
        queue.requeue_front(head);
        assert_eq!(queue.combined_ids(), vec!["x", "y"]);
        assert_eq!(queue.user_len(), 0);
    }

    #[test]
    fn test_invariant_holds_under_mixed_operations() {
        let (mut queue, mut cd) = setup();
        let now = Utc::now();
        let ids = ["a", "b", "c", "a", "b", "d", "c", "e"];

        for (i, id) in ids.iter().enumerate() {
            if i % 2 == 0 {
                let _ = queue.enqueue_user_request(user_item(id), &mut cd, now);
            } else {
                let _ = queue.enqueue_autoplay(auto_item(id), &mut cd, now);
            }
            if i == 4 {
                let played = queue.dequeue_next().unwrap();
                queue.set_current(Some(played.track_id));
            }

            let mut seen = HashSet::new();
            for item in queue.peek_combined() {
                assert!(seen.insert(item.track_id.clone()), "duplicate {}", item.track_id);
            }
            if let Some(current) = queue.current() {
                assert!(!seen.contains(current));
            }
        }
    }

    #[test]
    fn test_occupied_ids_include_current() {
        let (mut queue, mut cd) = setup();
        queue.set_current(Some(TrackId::new("now")));
        queue
            .enqueue_user_request(user_item("a"), &mut cd, Utc::now())
            .unwrap();

        let occupied = queue.occupied_ids();
        assert!(occupied.contains(&TrackId::new("now")));
        assert!(occupied.contains(&TrackId::new("a")));
        assert_eq!(queue.clear().len(), 1);
        assert!(queue.is_empty());
    }
}
