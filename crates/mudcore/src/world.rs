use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};

use crate::commands::CommandTable;
use crate::graph::{LocationGraph, Locator};
use crate::resolver;
use crate::session::{LoginState, Session, SessionKey};
use crate::store::Store;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running,
    RebootRequested,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub tick_length: Duration,
    /// Sessions quiet for longer than this get their transport deactivated.
    pub idle_timeout: Duration,
    /// Where new characters (and characters whose room is gone) appear.
    /// Defaults to the first room in id order.
    pub start: Option<Locator>,
    pub greeting: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_length: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(300),
            start: None,
            greeting: "Welcome to miniMUD!".to_string(),
        }
    }
}

pub struct World {
    config: WorldConfig,
    store: Box<dyn Store>,
    graph: LocationGraph,
    start: Locator,
    commands: CommandTable,
    sessions: BTreeMap<SessionKey, Session>,
    pending: Vec<(SessionKey, String)>,
    next_tick: Instant,
    liveness: Liveness,
    cleaned_up: bool,
}

impl World {
    pub fn new(config: WorldConfig, store: Box<dyn Store>) -> anyhow::Result<Self> {
        Self::new_at(config, store, Instant::now())
    }

    /// Load and check the world. The first tick is due at `now`.
    pub fn new_at(
        config: WorldConfig,
        store: Box<dyn Store>,
        now: Instant,
    ) -> anyhow::Result<Self> {
        let zones = store.load_zones().context("load zones")?;
        let graph = LocationGraph::new(zones);
        graph.check_integrity().context("world sanity check")?;

        let start = match &config.start {
            Some(at) => {
                if !graph.contains(at) {
                    anyhow::bail!("start room {at} does not exist");
                }
                at.clone()
            }
            None => graph
                .first_locator()
                .context("world has no rooms")?,
        };
        info!(
            zones = graph.zones().count(),
            rooms = graph.room_count(),
            start = %start,
            "world loaded"
        );

        Ok(Self {
            config,
            store,
            graph,
            start,
            commands: CommandTable::builtin(),
            sessions: BTreeMap::new(),
            pending: Vec::new(),
            next_tick: now,
            liveness: Liveness::Running,
            cleaned_up: false,
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }

    pub fn is_running(&self) -> bool {
        self.liveness == Liveness::Running
    }

    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    pub fn start_locator(&self) -> &Locator {
        &self.start
    }

    pub fn graph(&self) -> &LocationGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut LocationGraph {
        &mut self.graph
    }

    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    pub fn session(&self, key: &SessionKey) -> Option<&Session> {
        self.sessions.get(key)
    }

    pub fn session_mut(&mut self, key: &SessionKey) -> Option<&mut Session> {
        self.sessions.get_mut(key)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Register a new connection and start its login.
    pub fn connect(&mut self, key: SessionKey, transport: Box<dyn Transport>) {
        info!(tag = "+", session = %key, "connected");
        let mut s = Session::new(key.clone(), transport);
        s.begin(&self.config.greeting);
        if let Some(old) = self.sessions.insert(key.clone(), s) {
            warn!(session = %key, name = %old.name(), "connection key reused; dropping old session");
            if old.state() != LoginState::Logout {
                old.save(self.store.as_ref());
            }
            self.graph.remove_everywhere(&key);
        }
    }

    /// Persist (unless already logged out), vacate its room silently and
    /// forget the session.
    pub fn disconnect(&mut self, key: &SessionKey) {
        let Some(s) = self.sessions.remove(key) else {
            return;
        };
        if s.state() != LoginState::Logout {
            s.save(self.store.as_ref());
        }
        match s.location() {
            Some(at) => {
                if let Some(room) = self.graph.room_mut(at) {
                    room.remove_occupant(key);
                }
            }
            None => self.graph.remove_everywhere(key),
        }
        info!(tag = "-", session = %key, name = %s.name(), "disconnected");
    }

    /// Sessions whose transport is no longer active. The host disconnects
    /// these once it has flushed their output.
    pub fn inactive_sessions(&self) -> Vec<SessionKey> {
        self.sessions
            .values()
            .filter(|s| !s.transport().is_active())
            .map(|s| s.key().clone())
            .collect()
    }

    pub fn poll(&mut self) {
        self.poll_at(Instant::now());
    }

    /// One scheduling iteration.
    pub fn poll_at(&mut self, now: Instant) {
        self.sweep_idle();
        self.promote_logins();
        self.collect_input();
        self.drain_updates();
        if now > self.next_tick {
            self.tick(now);
        }
    }

    fn sweep_idle(&mut self) {
        let limit = self.config.idle_timeout;
        for s in self.sessions.values_mut() {
            if s.transport().is_active() && s.transport().idle() > limit {
                s.transport_mut().deactivate();
                info!(session = %s.key(), name = %s.name(), "timed out");
            }
        }
    }

    fn promote_logins(&mut self) {
        let ready = self
            .sessions
            .values()
            .filter(|s| s.state() == LoginState::Authenticated)
            .map(|s| (s.key().clone(), s.location().cloned()))
            .collect::<Vec<_>>();

        for (key, stored) in ready {
            if self.playing_elsewhere(&key) {
                if let Some(s) = self.sessions.get_mut(&key) {
                    warn!(session = %key, name = %s.name(), "refusing second login");
                    s.send("That character is already playing.");
                    s.set_state(LoginState::Logout);
                }
                continue;
            }
            let at = match stored {
                Some(at) if self.graph.contains(&at) => at,
                Some(at) => {
                    warn!(session = %key, locator = %at, "stored room is gone; using start room");
                    self.start.clone()
                }
                None => self.start.clone(),
            };
            self.move_session(&key, &at);
            if let Some(s) = self.sessions.get_mut(&key) {
                s.set_state(LoginState::Live);
                info!(session = %key, name = %s.name(), "logged in");
            }
        }
    }

    /// True when another live session already plays the character logging
    /// in at `key`.
    fn playing_elsewhere(&self, key: &SessionKey) -> bool {
        let Some(name) = self.sessions.get(key).map(|s| s.name()) else {
            return false;
        };
        self.sessions.values().any(|s| {
            s.key() != key && s.state() == LoginState::Live && s.name().eq_ignore_ascii_case(name)
        })
    }

    fn collect_input(&mut self) {
        let store = self.store.as_ref();
        for s in self.sessions.values_mut() {
            if let Some(cmd) = s.process_input(store) {
                self.pending.push((s.key().clone(), cmd));
            }
        }
    }

    fn drain_updates(&mut self) {
        let updates = std::mem::take(&mut self.pending);
        for (key, raw) in updates {
            self.process_update(&key, &raw);
        }
    }

    /// Split, resolve and dispatch one raw command.
    pub fn process_update(&mut self, key: &SessionKey, raw: &str) {
        let mut words = raw.split_whitespace();
        let Some(token) = words.next() else {
            return;
        };
        let args = words.map(str::to_string).collect::<Vec<_>>();

        let Some(s) = self.sessions.get(key) else {
            return;
        };
        let room = s.location().and_then(|at| self.graph.room(at));
        let exits = room.map(|r| r.exit_names().collect::<Vec<_>>()).unwrap_or_default();
        let candidates = resolver::namespace(self.commands.names(), exits);

        let Some(resolved) = resolver::resolve(token, &candidates) else {
            self.send_to(key, &format!("I'm sorry, I don't understand the command '{token}'."));
            return;
        };

        if let Some(handler) = self.commands.get(&resolved) {
            handler(self, key, &args);
            return;
        }

        let target = room.and_then(|r| r.find_exit(&resolved)).map(|e| e.to.clone());
        if let Some(to) = target {
            self.move_session(key, &to);
        }
    }

    /// Decrement every wait timer and advance the deadline against its own
    /// previous value: `next + tick_length - (now - next)`.
    pub fn tick(&mut self, now: Instant) {
        for s in self.sessions.values_mut() {
            s.tick();
        }

        let prev = self.next_tick;
        let elapsed = now.saturating_duration_since(prev);
        let tick = self.config.tick_length;
        self.next_tick = if elapsed <= tick {
            prev + (tick - elapsed)
        } else {
            prev.checked_sub(elapsed - tick).unwrap_or(prev)
        };
    }

    /// Close the world for a stop or a restart.
    pub fn shutdown(&mut self, reboot: bool) {
        let doing = if reboot {
            self.liveness = Liveness::RebootRequested;
            "rebooting"
        } else {
            self.liveness = Liveness::Stopped;
            "shutting down temporarily"
        };
        self.send_to_all(&format!("The server is {doing}. Please come back soon!"));
        self.cleanup();
    }

    /// Persist every session and zone exactly once, and stop the loop.
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        if self.liveness == Liveness::Running {
            self.liveness = Liveness::Stopped;
        }

        info!("saving characters");
        let store = self.store.as_ref();
        for s in self.sessions.values_mut() {
            s.cleanup(store);
        }

        info!("saving zones");
        for zone in self.graph.zones() {
            if let Err(e) = store.save_zone(zone) {
                warn!(zone = %zone.id, err = %format!("{e:#}"), "zone save failed");
            }
        }
    }

    /// Persist and mark one session for removal.
    pub fn log_out(&mut self, key: &SessionKey) {
        let store = self.store.as_ref();
        if let Some(s) = self.sessions.get_mut(key) {
            s.cleanup(store);
        }
    }

    pub fn send_to(&mut self, key: &SessionKey, message: &str) {
        if let Some(s) = self.sessions.get_mut(key) {
            s.send(message);
        }
    }

    /// Everyone in the room at `at`, except `except`.
    pub fn send_to_room(&mut self, at: &Locator, except: Option<&SessionKey>, message: &str) {
        let Some(room) = self.graph.room(at) else {
            return;
        };
        let targets = room
            .occupants()
            .keys()
            .filter(|k| Some(*k) != except)
            .cloned()
            .collect::<Vec<_>>();
        for k in targets {
            self.send_to(&k, message);
        }
    }

    pub fn send_to_live(&mut self, message: &str) {
        for s in self.sessions.values_mut() {
            if s.state() == LoginState::Live {
                s.send(message);
            }
        }
    }

    fn send_to_all(&mut self, message: &str) {
        for s in self.sessions.values_mut() {
            s.send(message);
        }
    }

    /// Names of everyone in play, sorted.
    pub fn live_names(&self) -> Vec<String> {
        let mut names = self
            .sessions
            .values()
            .filter(|s| s.state() == LoginState::Live)
            .map(|s| s.name().to_string())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[cfg(test)]
    pub(crate) fn adopt(&mut self, s: Session) {
        self.sessions.insert(s.key().clone(), s);
    }
}
