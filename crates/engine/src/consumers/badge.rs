//! Notification badge: unread count plus the most recent notifications

use socialink_core::{FriendshipEvent, Notification, NotificationCommand, NotificationEvent, Result};
use socialink_networking::NotificationConnection;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

pub const BADGE_HANDLER_KEY: &str = "notification-badge";
pub const MAX_RECENT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipChange {
    Requested,
    Accepted,
    Rejected,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FriendshipActivity {
    pub change: FriendshipChange,
    pub friendship: FriendshipEvent,
}

#[derive(Default)]
struct Lists {
    recent: VecDeque<Notification>,
    friendships: VecDeque<FriendshipActivity>,
}

struct BadgeState {
    lists: Mutex<Lists>,
    unread_tx: watch::Sender<u64>,
}

impl BadgeState {
    fn lists(&self) -> std::sync::MutexGuard<'_, Lists> {
        self.lists.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn adjust_unread(&self, delta: i64) {
        self.unread_tx.send_modify(|count| {
            *count = if delta < 0 {
                count.saturating_sub(delta.unsigned_abs())
            } else {
                count.saturating_add(delta as u64)
            };
        });
    }

    fn apply(&self, event: &NotificationEvent) {
        match event {
            NotificationEvent::Notification { notification } => {
                debug!("New notification {} ({})", notification.id, notification.kind);
                let mut lists = self.lists();
                let previous = lists
                    .recent
                    .iter()
                    .position(|n| n.id == notification.id)
                    .and_then(|index| lists.recent.remove(index));
                lists.recent.push_front(notification.clone());
                lists.recent.truncate(MAX_RECENT);
                drop(lists);

                // A redelivered notification only counts the read flag change
                let was_unread = previous.map_or(false, |old| !old.is_read);
                match (was_unread, notification.is_read) {
                    (false, false) => self.adjust_unread(1),
                    (true, true) => self.adjust_unread(-1),
                    _ => {}
                }
            }
            NotificationEvent::NotificationUpdate { notification } => {
                let mut lists = self.lists();
                let previous = lists
                    .recent
                    .iter_mut()
                    .find(|n| n.id == notification.id)
                    .map(|slot| std::mem::replace(slot, notification.clone()));
                drop(lists);
                match previous {
                    Some(old) if !old.is_read && notification.is_read => self.adjust_unread(-1),
                    Some(old) if old.is_read && !notification.is_read => self.adjust_unread(1),
                    _ => {}
                }
            }
            NotificationEvent::NotificationDelete { notification_id } => {
                let mut lists = self.lists();
                let removed = lists
                    .recent
                    .iter()
                    .position(|n| &n.id == notification_id)
                    .and_then(|index| lists.recent.remove(index));
                drop(lists);
                if matches!(removed, Some(n) if !n.is_read) {
                    self.adjust_unread(-1);
                }
            }
            NotificationEvent::UnreadCountUpdate { count } => {
                self.unread_tx.send_replace(*count);
            }
            NotificationEvent::FriendshipRequest { friendship } => {
                self.record_friendship(FriendshipChange::Requested, friendship)
            }
            NotificationEvent::FriendshipAccepted { friendship } => {
                self.record_friendship(FriendshipChange::Accepted, friendship)
            }
            NotificationEvent::FriendshipRejected { friendship } => {
                self.record_friendship(FriendshipChange::Rejected, friendship)
            }
            NotificationEvent::FriendshipRemoved { friendship } => {
                self.record_friendship(FriendshipChange::Removed, friendship)
            }
            NotificationEvent::Unknown => debug!("Ignoring unknown notification envelope"),
        }
    }

    fn record_friendship(&self, change: FriendshipChange, friendship: &FriendshipEvent) {
        info!("Friendship {:?} with user {}", change, friendship.user_id);
        let mut lists = self.lists();
        lists.friendships.push_front(FriendshipActivity {
            change,
            friendship: friendship.clone(),
        });
        lists.friendships.truncate(MAX_RECENT);
    }
}

/// Consumer of the notification channel behind the header badge
pub struct NotificationBadge {
    manager: NotificationConnection,
    state: Arc<BadgeState>,
}

impl NotificationBadge {
    pub fn attach(manager: &NotificationConnection) -> Self {
        let (unread_tx, _) = watch::channel(0);
        let state = Arc::new(BadgeState {
            lists: Mutex::new(Lists::default()),
            unread_tx,
        });

        let weak: Weak<BadgeState> = Arc::downgrade(&state);
        manager.add_message_handler(BADGE_HANDLER_KEY, move |event| {
            if let Some(state) = weak.upgrade() {
                state.apply(event);
            }
        });

        Self {
            manager: manager.clone(),
            state,
        }
    }

    pub fn detach(self) {
        self.manager.remove_message_handler(BADGE_HANDLER_KEY);
    }

    /// Apply one envelope as if it arrived on the socket
    pub fn apply(&self, event: &NotificationEvent) {
        self.state.apply(event);
    }

    pub fn unread_count(&self) -> u64 {
        *self.state.unread_tx.borrow()
    }

    pub fn subscribe_unread(&self) -> watch::Receiver<u64> {
        self.state.unread_tx.subscribe()
    }

    /// Most recent first
    pub fn recent(&self) -> Vec<Notification> {
        self.state.lists().recent.iter().cloned().collect()
    }

    /// Most recent first
    pub fn friendship_activity(&self) -> Vec<FriendshipActivity> {
        self.state.lists().friendships.iter().cloned().collect()
    }

    /// Mark one notification read locally, then tell the server over the
    /// socket or, when it is down, over REST.
    #[instrument(skip(self))]
    pub async fn mark_as_read(&self, notification_id: &str) -> Result<()> {
        let flipped = {
            let mut lists = self.state.lists();
            match lists.recent.iter_mut().find(|n| n.id == notification_id) {
                Some(n) if !n.is_read => {
                    n.is_read = true;
                    true
                }
                _ => false,
            }
        };
        if flipped {
            self.state.adjust_unread(-1);
        }

        let command = NotificationCommand::MarkAsRead {
            notification_id: notification_id.to_string(),
        };
        if self.manager.send(&command) {
            return Ok(());
        }

        debug!("Socket down, marking {} read over REST", notification_id);
        self.manager
            .context()
            .api()
            .mark_notification_read(notification_id)
            .await
    }

    #[instrument(skip(self))]
    pub async fn mark_all_as_read(&self) -> Result<()> {
        {
            let mut lists = self.state.lists();
            for n in lists.recent.iter_mut() {
                n.is_read = true;
            }
        }
        self.state.unread_tx.send_replace(0);

        if let Some(recipient_id) = self.manager.context().cached_user_id() {
            if self.manager.send(&NotificationCommand::MarkAllAsRead { recipient_id }) {
                return Ok(());
            }
        }

        debug!("Socket down, marking all read over REST");
        self.manager.context().api().mark_all_notifications_read().await
    }

    /// Reload the unread count from the REST endpoint
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<()> {
        let count = self.manager.context().api().unread_notification_count().await?;
        self.state.unread_tx.send_replace(count);
        debug!("Unread count refreshed: {}", count);
        Ok(())
    }
}
