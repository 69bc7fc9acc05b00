use std::collections::VecDeque;

use tracing::{info, warn};

use crate::graph::Locator;
use crate::page::Pager;
use crate::password::{hash_password, verify_password};
use crate::record::{PlayerRecord, RecordError};
use crate::store::Store;
use crate::transport::Transport;

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 20;

/// Opaque per-connection token; the host uses the peer's `ip:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Role {
    #[default]
    Normal,
    Moderator,
    Admin,
}

impl Role {
    pub fn level(self) -> i64 {
        match self {
            Role::Normal => 0,
            Role::Moderator => 1,
            Role::Admin => 2,
        }
    }

    pub fn from_level(n: i64) -> Option<Self> {
        match n {
            0 => Some(Role::Normal),
            1 => Some(Role::Moderator),
            2 => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unset,
}

impl Sex {
    pub fn as_str(self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Unset => "unset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Sex::Male),
            "female" | "f" => Some(Sex::Female),
            "unset" | "" => Some(Sex::Unset),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    New,
    GetName,
    VerifyName,
    ChoosePassword,
    VerifyPassword,
    ChooseGender,
    GetPassword,
    Authenticated,
    Live,
    Logout,
}

impl LoginState {
    /// States that carry a complete character worth persisting.
    pub fn has_character(self) -> bool {
        matches!(
            self,
            LoginState::Authenticated | LoginState::Live | LoginState::Logout
        )
    }
}

/// Lowercase, then capitalize the first character.
pub fn normalize_name(raw: &str) -> String {
    let lc = raw.trim().to_lowercase();
    let mut cs = lc.chars();
    match cs.next() {
        Some(first) => first.to_uppercase().chain(cs).collect(),
        None => String::new(),
    }
}

fn valid_name(raw: &str) -> bool {
    let n = raw.chars().count();
    (NAME_MIN..=NAME_MAX).contains(&n) && raw.chars().all(|c| c.is_ascii_alphabetic())
}

fn answer(input: &str) -> Option<char> {
    input.trim().chars().next().map(|c| c.to_ascii_lowercase())
}

pub struct Session {
    key: SessionKey,
    transport: Box<dyn Transport>,
    state: LoginState,
    name: String,
    pass_hash: String,
    role: Role,
    sex: Sex,
    location: Option<Locator>,
    queue: VecDeque<String>,
    last_command: Option<String>,
    wait: u32,
    pager: Pager,
    // Stored record found at the name prompt, held until the password checks out.
    pending: Option<PlayerRecord>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("location", &self.location)
            .field("queue", &self.queue)
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(key: SessionKey, transport: Box<dyn Transport>) -> Self {
        Self {
            key,
            transport,
            state: LoginState::New,
            name: String::new(),
            pass_hash: String::new(),
            role: Role::Normal,
            sex: Sex::Unset,
            location: None,
            queue: VecDeque::new(),
            last_command: None,
            wait: 0,
            pager: Pager::default(),
            pending: None,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: LoginState) {
        self.state = state;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    pub fn sex(&self) -> Sex {
        self.sex
    }

    pub fn location(&self) -> Option<&Locator> {
        self.location.as_ref()
    }

    pub(crate) fn set_location(&mut self, at: Locator) {
        self.location = Some(at);
    }

    pub fn queue(&self) -> &VecDeque<String> {
        &self.queue
    }

    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    pub fn wait(&self) -> u32 {
        self.wait
    }

    /// Block further commands for `ticks` ticks.
    pub fn set_wait(&mut self, ticks: u32) {
        self.wait = ticks;
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    /// Send a message, wrapped and paged for the client's terminal.
    pub fn send(&mut self, message: &str) {
        let size = self.transport.term_size();
        let out = self.pager.page(message, size);
        self.transport.send(&out);
    }

    /// Send a prompt as-is, without paging or a trailing newline.
    fn prompt(&mut self, text: &str) {
        self.transport.send(text);
    }

    /// New -> GetName.
    pub fn begin(&mut self, greeting: &str) {
        if self.state != LoginState::New {
            return;
        }
        self.transport.request_term_size();
        self.send(greeting);
        self.prompt("What is your name? ");
        self.state = LoginState::GetName;
    }

    /// Decrement the wait timer. Called once per world tick.
    pub fn tick(&mut self) {
        self.wait = self.wait.saturating_sub(1);
    }

    /// Take at most one line from the transport, then return the next command
    /// if one is ready. Login lines drive the login state machine and never
    /// produce commands.
    pub fn process_input(&mut self, store: &dyn Store) -> Option<String> {
        match self.state {
            LoginState::Logout => {
                if self.transport.is_active() {
                    self.transport.deactivate();
                }
                return None;
            }
            // Waiting on the engine; input stays buffered in the transport.
            LoginState::New | LoginState::Authenticated => return None,
            _ => {}
        }

        if self.transport.is_active() {
            if let Some(line) = self.transport.next_line() {
                if self.state == LoginState::Live {
                    self.accept_command(&line);
                } else {
                    self.state = self.advance_login(&line, store);
                }
            }
        }

        if self.state == LoginState::Live && self.wait == 0 {
            return self.queue.pop_front();
        }
        None
    }

    fn accept_command(&mut self, line: &str) {
        let cmd = line.trim();
        if cmd.is_empty() {
            let size = self.transport.term_size();
            if let Some(more) = self.pager.more(size) {
                self.transport.send(&more);
            }
            return;
        }

        // `halt` must be typed in full; it is never auto-completed.
        if cmd.eq_ignore_ascii_case("halt") {
            self.queue.clear();
            self.wait = 0;
            self.send("Command queue cleared.");
            return;
        }

        if cmd == "!" {
            match self.last_command.clone() {
                Some(last) => self.queue.push_back(last),
                None => self.send("There is no command to repeat."),
            }
            return;
        }

        self.queue.push_back(cmd.to_string());
        self.last_command = Some(cmd.to_string());
    }

    /// The login transition function. Each arm emits at most one message and
    /// names the next state.
    fn advance_login(&mut self, line: &str, store: &dyn Store) -> LoginState {
        match self.state {
            LoginState::GetName => {
                let raw = line.trim();
                if !valid_name(raw) {
                    self.prompt(&format!(
                        "Names are {NAME_MIN} to {NAME_MAX} letters, nothing else.\r\nWhat is your name? "
                    ));
                    return LoginState::GetName;
                }
                self.name = normalize_name(raw);
                match store.load_player(&self.name) {
                    Ok(rec) => {
                        self.pending = Some(rec);
                        self.prompt("Password: ");
                        LoginState::GetPassword
                    }
                    Err(e) => {
                        if !matches!(e, RecordError::Absent) {
                            warn!(session = %self.key, name = %self.name, err = %e, "player record unusable; treating as new");
                        }
                        self.prompt(&format!(
                            "Create a new character named {}? (y/n) ",
                            self.name
                        ));
                        LoginState::VerifyName
                    }
                }
            }
            LoginState::VerifyName => match answer(line) {
                Some('y') => {
                    self.prompt("Choose a password: ");
                    LoginState::ChoosePassword
                }
                Some('n') => {
                    self.name.clear();
                    self.prompt("What is your name? ");
                    LoginState::GetName
                }
                _ => {
                    self.prompt(&format!(
                        "Create a new character named {}? (y/n) ",
                        self.name
                    ));
                    LoginState::VerifyName
                }
            },
            LoginState::ChoosePassword => {
                if line.trim().is_empty() {
                    self.prompt("Choose a password: ");
                    return LoginState::ChoosePassword;
                }
                match hash_password(line) {
                    Ok(h) => {
                        self.pass_hash = h;
                        self.prompt("Verify password: ");
                        LoginState::VerifyPassword
                    }
                    Err(e) => {
                        warn!(session = %self.key, err = %e, "password hashing failed");
                        self.prompt("Something went wrong. Choose a password: ");
                        LoginState::ChoosePassword
                    }
                }
            }
            LoginState::VerifyPassword => {
                if verify_password(line, &self.pass_hash) {
                    self.prompt("Are you male or female? (m/f) ");
                    LoginState::ChooseGender
                } else {
                    self.pass_hash.clear();
                    self.prompt("Passwords do not match.\r\nChoose a password: ");
                    LoginState::ChoosePassword
                }
            }
            LoginState::ChooseGender => {
                self.sex = match answer(line) {
                    Some('m') => Sex::Male,
                    Some('f') => Sex::Female,
                    _ => {
                        self.prompt("Are you male or female? (m/f) ");
                        return LoginState::ChooseGender;
                    }
                };
                // Another connection may have finished signup under this name
                // since GetName looked.
                if store.load_player(&self.name).is_ok() {
                    warn!(session = %self.key, name = %self.name, "name taken during signup");
                    self.prompt(&format!(
                        "Someone else just took the name {}.\r\nWhat is your name? ",
                        self.name
                    ));
                    self.name.clear();
                    self.pass_hash.clear();
                    self.sex = Sex::default();
                    return LoginState::GetName;
                }
                // The very first character ever created runs the place.
                if !store.has_players() {
                    self.role = Role::Admin;
                }
                if let Err(e) = store.save_player(&self.to_record()) {
                    warn!(session = %self.key, name = %self.name, err = %e, "failed to save new character");
                }
                info!(tag = "+", session = %self.key, name = %self.name, role = ?self.role, "character created");
                self.send(&format!("Welcome to the world, {}!", self.name));
                LoginState::Authenticated
            }
            LoginState::GetPassword => {
                let ok = self
                    .pending
                    .as_ref()
                    .is_some_and(|rec| verify_password(line, &rec.pass));
                if !ok {
                    warn!(session = %self.key, name = %self.name, "bad password");
                    self.prompt("Incorrect password.\r\nPassword: ");
                    return LoginState::GetPassword;
                }
                if let Some(rec) = self.pending.take() {
                    self.restore(rec);
                }
                self.send(&format!("Welcome back, {}!", self.name));
                LoginState::Authenticated
            }
            // Not driven by input.
            s @ (LoginState::New
            | LoginState::Authenticated
            | LoginState::Live
            | LoginState::Logout) => s,
        }
    }

    fn restore(&mut self, rec: PlayerRecord) {
        self.name = rec.name;
        self.pass_hash = rec.pass;
        self.role = rec.role;
        self.sex = rec.sex;
        self.location = rec.room;
    }

    pub fn to_record(&self) -> PlayerRecord {
        PlayerRecord {
            name: self.name.clone(),
            pass: self.pass_hash.clone(),
            role: self.role,
            sex: self.sex,
            room: self.location.clone(),
        }
    }

    /// Persist the character if there is one.
    pub fn save(&self, store: &dyn Store) {
        if !self.state.has_character() || self.name.is_empty() {
            return;
        }
        match store.save_player(&self.to_record()) {
            Ok(()) => info!(tag = "<", session = %self.key, name = %self.name, "player saved"),
            Err(e) => warn!(session = %self.key, name = %self.name, err = %e, "player save failed"),
        }
    }

    /// Persist, then mark for removal.
    pub fn cleanup(&mut self, store: &dyn Store) {
        self.save(store);
        self.state = LoginState::Logout;
    }
}

#[cfg(test)]
impl Session {
    /// A session that has just finished logging in.
    pub(crate) fn authenticated(
        key: &str,
        transport: Box<dyn Transport>,
        name: &str,
        role: Role,
        location: Option<Locator>,
    ) -> Self {
        let mut s = Self::new(SessionKey::from(key), transport);
        s.state = LoginState::Authenticated;
        s.name = name.to_string();
        s.pass_hash = "$argon2id$test".to_string();
        s.role = role;
        s.location = location;
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{MemStore, MockTransport};

    fn live_session() -> (Session, crate::testkit::MockHandle) {
        let (t, h) = MockTransport::new();
        let mut s = Session::new(SessionKey::from("10.0.0.1:5000"), Box::new(t));
        s.name = "Alice".into();
        s.state = LoginState::Live;
        (s, h)
    }

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_name("aLICE"), "Alice");
        assert_eq!(normalize_name("  bob "), "Bob");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn rejects_non_alphabetic_names() {
        assert!(valid_name("Alice"));
        assert!(!valid_name("al1ce"));
        assert!(!valid_name("a"));
        assert!(!valid_name("al ice"));
        assert!(!valid_name(&"a".repeat(21)));
    }

    #[test]
    fn begin_greets_and_asks_for_name() {
        let (t, h) = MockTransport::new();
        let mut s = Session::new(SessionKey::from("k"), Box::new(t));
        s.begin("Welcome!");
        assert_eq!(s.state(), LoginState::GetName);
        assert!(h.output().contains("Welcome!"));
        assert!(h.output().ends_with("What is your name? "));
        assert_eq!(h.size_requests(), 1);
    }

    #[test]
    fn halt_clears_queue_and_wait() {
        let (mut s, h) = live_session();
        let store = MemStore::default();
        for c in ["a", "b", "c"] {
            s.queue.push_back(c.into());
        }
        s.set_wait(5);

        h.push_line("halt");
        assert_eq!(s.process_input(&store), None);
        assert!(s.queue().is_empty());
        assert_eq!(s.wait(), 0);
        assert!(h.output().contains("Command queue cleared."));
    }

    #[test]
    fn bang_repeats_last_command() {
        let (mut s, h) = live_session();
        let store = MemStore::default();
        s.set_wait(1);
        h.push_line("look");
        s.process_input(&store);
        h.push_line("!");
        s.process_input(&store);

        assert_eq!(s.queue(), &VecDeque::from(vec!["look".to_string(), "look".to_string()]));
        assert_eq!(s.last_command(), Some("look"));
        assert!(!s.queue().iter().any(|c| c == "!"));
    }

    #[test]
    fn bang_without_history_says_so() {
        let (mut s, h) = live_session();
        h.push_line("!");
        s.process_input(&MemStore::default());
        assert!(s.queue().is_empty());
        assert!(h.output().contains("no command to repeat"));
    }

    #[test]
    fn one_command_per_call_and_only_when_not_waiting() {
        let (mut s, h) = live_session();
        let store = MemStore::default();
        s.queue.push_back("look".into());
        s.queue.push_back("say hi".into());

        s.set_wait(2);
        assert_eq!(s.process_input(&store), None);
        s.tick();
        assert_eq!(s.process_input(&store), None);
        s.tick();
        assert_eq!(s.process_input(&store).as_deref(), Some("look"));
        assert_eq!(s.process_input(&store).as_deref(), Some("say hi"));
        assert_eq!(s.process_input(&store), None);
        drop(h);
    }

    #[test]
    fn empty_input_flushes_overflow() {
        let (mut s, h) = live_session();
        h.set_size(80, 4);
        s.send("1\n2\n3\n4\n5");
        assert!(h.output().contains(crate::page::MORE_HINT));
        h.clear_output();

        h.push_line("");
        s.process_input(&MemStore::default());
        assert_eq!(h.output(), format!("3\r\n4\r\n{}\r\n", crate::page::MORE_HINT));
    }

    #[test]
    fn logout_deactivates_transport() {
        let (mut s, h) = live_session();
        s.cleanup(&MemStore::default());
        assert_eq!(s.state(), LoginState::Logout);
        assert!(h.is_active());
        h.push_line("look");
        assert_eq!(s.process_input(&MemStore::default()), None);
        assert!(!h.is_active());
    }

    #[test]
    fn new_character_flow() {
        let store = MemStore::default();
        let (t, h) = MockTransport::new();
        let mut s = Session::new(SessionKey::from("k"), Box::new(t));
        s.begin("hi");

        for line in ["4lice", "aLiCe", "maybe", "y", "secret", "wrong", "secret", "secret", "x", "f"] {
            h.push_line(line);
            s.process_input(&store);
        }

        assert_eq!(s.state(), LoginState::Authenticated);
        assert_eq!(s.name(), "Alice");
        assert_eq!(s.sex(), Sex::Female);
        assert_eq!(s.role(), Role::Admin);
        let out = h.output();
        assert!(out.contains("Passwords do not match."));
        assert!(out.contains("Create a new character named Alice? (y/n)"));

        let saved = store.player("Alice").unwrap();
        assert_ne!(saved.pass, "secret");
        assert!(verify_password("secret", &saved.pass));
    }

    #[test]
    fn second_character_is_not_admin() {
        let store = MemStore::default();
        store.insert_player(PlayerRecord {
            name: "Zed".into(),
            pass: hash_password("pw").unwrap(),
            role: Role::Admin,
            sex: Sex::Male,
            room: None,
        });
        let (t, h) = MockTransport::new();
        let mut s = Session::new(SessionKey::from("k"), Box::new(t));
        s.begin("hi");
        for line in ["bob", "y", "pw", "pw", "m"] {
            h.push_line(line);
            s.process_input(&store);
        }
        assert_eq!(s.state(), LoginState::Authenticated);
        assert_eq!(s.role(), Role::Normal);
    }

    #[test]
    fn declining_name_returns_to_name_prompt() {
        let store = MemStore::default();
        let (t, h) = MockTransport::new();
        let mut s = Session::new(SessionKey::from("k"), Box::new(t));
        s.begin("hi");
        for line in ["bob", "no"] {
            h.push_line(line);
            s.process_input(&store);
        }
        assert_eq!(s.state(), LoginState::GetName);
    }

    #[test]
    fn existing_character_logs_in_and_restores() {
        let store = MemStore::default();
        store.insert_player(PlayerRecord {
            name: "Alice".into(),
            pass: hash_password("pw").unwrap(),
            role: Role::Moderator,
            sex: Sex::Female,
            room: Some(Locator::new("0", "1")),
        });
        let (t, h) = MockTransport::new();
        let mut s = Session::new(SessionKey::from("k"), Box::new(t));
        s.begin("hi");

        h.push_line("alice");
        s.process_input(&store);
        assert_eq!(s.state(), LoginState::GetPassword);

        h.push_line("nope");
        s.process_input(&store);
        assert_eq!(s.state(), LoginState::GetPassword);
        assert!(h.output().contains("Incorrect password."));

        h.push_line("pw");
        s.process_input(&store);
        assert_eq!(s.state(), LoginState::Authenticated);
        assert_eq!(s.role(), Role::Moderator);
        assert_eq!(s.location(), Some(&Locator::new("0", "1")));
    }

    #[test]
    fn corrupt_record_is_treated_as_absent() {
        let store = MemStore::default();
        store.insert_corrupt("Alice");
        let (t, h) = MockTransport::new();
        let mut s = Session::new(SessionKey::from("k"), Box::new(t));
        s.begin("hi");
        h.push_line("alice");
        s.process_input(&store);
        assert_eq!(s.state(), LoginState::VerifyName);
    }

    #[test]
    fn authenticated_session_ignores_input_until_promoted() {
        let (mut s, h) = live_session();
        s.state = LoginState::Authenticated;
        h.push_line("look");
        assert_eq!(s.process_input(&MemStore::default()), None);
        assert_eq!(h.pending_lines(), 1);
    }
}
