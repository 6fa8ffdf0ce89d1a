use crate::channel::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerChange {
    Shown,
    Cleared,
    Unchanged,
}

/// Persistent "connection lost" warning. Shown on every transition into
/// `Disconnected`, hidden by the user until the next such transition, and
/// cleared automatically on reconnect.
#[derive(Debug, Default)]
pub struct DisconnectBanner {
    visible: bool,
    last: Option<ConnectionState>,
}

impl DisconnectBanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn observe(&mut self, state: ConnectionState) -> BannerChange {
        let previous = self.last.replace(state);

        match state {
            ConnectionState::Disconnected if previous != Some(ConnectionState::Disconnected) => {
                self.visible = true;
                BannerChange::Shown
            }
            ConnectionState::Connected if self.visible => {
                self.visible = false;
                BannerChange::Cleared
            }
            _ => BannerChange::Unchanged,
        }
    }

    pub fn dismiss(&mut self) {
        self.visible = false;
    }
}
