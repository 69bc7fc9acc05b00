//! Relocation between rooms, with occupancy and announcements.

use tracing::{debug, warn};

use crate::graph::Locator;
use crate::session::SessionKey;
use crate::world::World;

impl World {
    /// Move `key` into the room at `to`.
    ///
    /// Leaving is silent if the session wasn't listed in its old room. The
    /// mover gets the new room's view; everyone else there hears the arrival.
    pub fn move_session(&mut self, key: &SessionKey, to: &Locator) {
        let Some((name, from)) = self
            .session(key)
            .map(|s| (s.name().to_string(), s.location().cloned()))
        else {
            return;
        };
        if !self.graph().contains(to) {
            warn!(session = %key, locator = %to, "move to missing room");
            self.send_to(key, "You can't go that way.");
            return;
        }

        if let Some(from) = &from {
            let departed = self.graph_mut().room_mut(from).and_then(|room| {
                room.remove_occupant(key).then(|| {
                    room.exit_to(to).unwrap_or("Unknown").to_string()
                })
            });
            if let Some(exit) = departed {
                self.send_to_room(from, Some(key), &format!("{name} departed to the {exit}."));
            }
        }

        if let Some(room) = self.graph_mut().room_mut(to) {
            room.add_occupant(key.clone(), name.clone());
        }
        self.send_to_room(to, Some(key), &format!("{name} has arrived."));

        if let Some(s) = self.session_mut(key) {
            s.set_location(to.clone());
        }
        debug!(session = %key, locator = %to, "moved");

        let view = self.graph().room(to).map(|r| r.render_view(key));
        if let Some(view) = view {
            self.send_to(key, &view);
        }
    }
}
