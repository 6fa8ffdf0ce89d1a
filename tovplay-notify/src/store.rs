use std::cmp::Ordering;
use tovplay_core::Notification;

/// Notification list plus derived unread counter. Every mutation recounts, so
/// `unread_count` can never drift from the records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationStore {
    notifications: Vec<Notification>,
    unread_count: usize,
    pub loading: bool,
    pub error: Option<String>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn ids(&self) -> Vec<String> {
        self.notifications.iter().map(|n| n.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn begin_loading(&mut self) {
        self.loading = true;
        self.error = None;
    }

    /// Server snapshot wins outright: newest first, undated records last,
    /// ties keep server order.
    pub fn replace_all(&mut self, mut notifications: Vec<Notification>) {
        notifications.sort_by(|a, b| match (&a.created_at, &b.created_at) {
            (Some(a), Some(b)) => b.cmp(a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        // Keep the first occurrence of each id
        let mut seen = std::collections::HashSet::new();
        notifications.retain(|n| seen.insert(n.id.clone()));

        self.notifications = notifications;
        self.loading = false;
        self.recount();
    }

    /// Leaves existing records in place.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.loading = false;
        self.error = Some(message.into());
    }

    /// Fast-path insert at the front. A record with the same id is replaced.
    pub fn prepend(&mut self, notification: Notification) {
        self.notifications.retain(|n| n.id != notification.id);
        self.notifications.insert(0, notification);
        self.recount();
    }

    /// Returns how many records flipped.
    pub fn mark_read(&mut self, ids: &[String]) -> usize {
        let mut flipped = 0;
        for n in self.notifications.iter_mut() {
            if !n.is_read && ids.contains(&n.id) {
                n.is_read = true;
                flipped += 1;
            }
        }
        self.recount();
        flipped
    }

    fn recount(&mut self) {
        self.unread_count = self.notifications.iter().filter(|n| !n.is_read).count();
    }
}
