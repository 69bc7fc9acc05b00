//! Test doubles for the transport and the store.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use crate::graph::Zone;
use crate::record::{PlayerRecord, RecordError};
use crate::store::Store;
use crate::transport::{TermSize, Transport};

#[derive(Debug)]
struct MockState {
    output: String,
    input: VecDeque<String>,
    active: bool,
    idle: Duration,
    size: TermSize,
    size_requests: usize,
}

/// Transport half owned by the session.
pub struct MockTransport(Rc<RefCell<MockState>>);

/// Test half for feeding input and reading output.
#[derive(Clone)]
pub struct MockHandle(Rc<RefCell<MockState>>);

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let st = Rc::new(RefCell::new(MockState {
            output: String::new(),
            input: VecDeque::new(),
            active: true,
            idle: Duration::ZERO,
            size: TermSize::default(),
            size_requests: 0,
        }));
        (Self(st.clone()), MockHandle(st))
    }
}

impl Transport for MockTransport {
    fn send(&mut self, text: &str) {
        self.0.borrow_mut().output.push_str(text);
    }

    fn next_line(&mut self) -> Option<String> {
        self.0.borrow_mut().input.pop_front()
    }

    fn is_active(&self) -> bool {
        self.0.borrow().active
    }

    fn deactivate(&mut self) {
        self.0.borrow_mut().active = false;
    }

    fn idle(&self) -> Duration {
        self.0.borrow().idle
    }

    fn term_size(&self) -> TermSize {
        self.0.borrow().size
    }

    fn request_term_size(&mut self) {
        self.0.borrow_mut().size_requests += 1;
    }
}

impl MockHandle {
    pub fn push_line(&self, line: &str) {
        self.0.borrow_mut().input.push_back(line.to_string());
    }

    pub fn pending_lines(&self) -> usize {
        self.0.borrow().input.len()
    }

    pub fn output(&self) -> String {
        self.0.borrow().output.clone()
    }

    pub fn clear_output(&self) {
        self.0.borrow_mut().output.clear();
    }

    pub fn is_active(&self) -> bool {
        self.0.borrow().active
    }

    pub fn set_idle(&self, idle: Duration) {
        self.0.borrow_mut().idle = idle;
    }

    pub fn set_size(&self, cols: u16, rows: u16) {
        self.0.borrow_mut().size = TermSize { cols, rows };
    }

    pub fn size_requests(&self) -> usize {
        self.0.borrow().size_requests
    }
}

#[derive(Debug, Default)]
struct MemState {
    zones: Vec<Zone>,
    saved_zones: Vec<String>,
    players: BTreeMap<String, String>,
}

/// In-memory store keeping rendered records, so reads go through the parser.
#[derive(Debug, Clone, Default)]
pub struct MemStore(Rc<RefCell<MemState>>);

impl MemStore {
    pub fn with_zones(zones: Vec<Zone>) -> Self {
        let s = Self::default();
        s.0.borrow_mut().zones = zones;
        s
    }

    pub fn insert_player(&self, rec: PlayerRecord) {
        self.0
            .borrow_mut()
            .players
            .insert(rec.name.to_lowercase(), rec.render());
    }

    pub fn insert_corrupt(&self, name: &str) {
        self.0
            .borrow_mut()
            .players
            .insert(name.to_lowercase(), "name:\npass\n".to_string());
    }

    pub fn player(&self, name: &str) -> Option<PlayerRecord> {
        let st = self.0.borrow();
        let text = st.players.get(&name.to_lowercase())?;
        PlayerRecord::parse(text).ok()
    }

    pub fn saved_zones(&self) -> Vec<String> {
        self.0.borrow().saved_zones.clone()
    }
}

impl Store for MemStore {
    fn load_zones(&self) -> anyhow::Result<Vec<Zone>> {
        Ok(self.0.borrow().zones.clone())
    }

    fn save_zone(&self, zone: &Zone) -> anyhow::Result<()> {
        self.0.borrow_mut().saved_zones.push(zone.id.clone());
        Ok(())
    }

    fn load_player(&self, name: &str) -> Result<PlayerRecord, RecordError> {
        let st = self.0.borrow();
        let text = st
            .players
            .get(&name.to_lowercase())
            .ok_or(RecordError::Absent)?;
        PlayerRecord::parse(text)
    }

    fn save_player(&self, rec: &PlayerRecord) -> Result<(), RecordError> {
        self.insert_player(rec.clone());
        Ok(())
    }

    fn has_players(&self) -> bool {
        !self.0.borrow().players.is_empty()
    }
}
