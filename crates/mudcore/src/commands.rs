//! Built-in commands.
//!
//! The table is built once per [`World`] and never changes. Each handler does
//! its own authorization check and reports failures to the issuing session.

use std::collections::BTreeMap;

use tracing::info;

use crate::session::{Role, SessionKey};
use crate::world::World;

pub type Handler = fn(&mut World, &SessionKey, &[String]);

pub const DENIED: &str = "You don't have permission to do that.";

/// Ticks a broadcaster waits before their next command.
const BROADCAST_WAIT: u32 = 3;

#[derive(Clone)]
pub struct CommandTable {
    handlers: BTreeMap<&'static str, Handler>,
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

impl CommandTable {
    pub fn builtin() -> Self {
        let mut handlers: BTreeMap<&'static str, Handler> = BTreeMap::new();
        handlers.insert("broadcast", broadcast);
        handlers.insert("help", help);
        handlers.insert("look", look);
        handlers.insert("quit", quit);
        handlers.insert("reboot", reboot);
        handlers.insert("say", say);
        handlers.insert("shutdown", shutdown);
        handlers.insert("who", who);
        Self { handlers }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).copied()
    }
}

/// Send `DENIED` and return false unless the session holds at least `role`.
fn require(world: &mut World, key: &SessionKey, role: Role) -> bool {
    let ok = world.session(key).is_some_and(|s| s.role() >= role);
    if !ok {
        world.send_to(key, DENIED);
    }
    ok
}

fn broadcast(world: &mut World, key: &SessionKey, args: &[String]) {
    if !require(world, key, Role::Moderator) {
        return;
    }
    if args.is_empty() {
        world.send_to(key, "You must specify a message to broadcast!");
        return;
    }
    let message = args.join(" ");
    world.send_to_live(&message);
    info!(tag = "!", session = %key, message = %message, "broadcast");
    if let Some(s) = world.session_mut(key) {
        s.set_wait(BROADCAST_WAIT);
    }
}

fn help(world: &mut World, key: &SessionKey, _args: &[String]) {
    let names = world.commands().names().collect::<Vec<_>>().join(", ");
    let mut text = format!("Commands: {names}");
    if let Some(exits) = world
        .session(key)
        .and_then(|s| s.location())
        .and_then(|at| world.graph().room(at))
        .map(|r| r.exit_names().collect::<Vec<_>>())
        .filter(|e| !e.is_empty())
    {
        text.push_str(&format!("\nExits here: {}", exits.join(", ")));
    }
    text.push_str("\nAny unambiguous prefix works. 'halt' clears your queue, '!' repeats.");
    world.send_to(key, &text);
}

fn look(world: &mut World, key: &SessionKey, _args: &[String]) {
    let view = world
        .session(key)
        .and_then(|s| s.location())
        .and_then(|at| world.graph().room(at))
        .map(|r| r.render_view(key));
    match view {
        Some(v) => world.send_to(key, &v),
        None => world.send_to(key, "You are nowhere at all."),
    }
}

fn quit(world: &mut World, key: &SessionKey, _args: &[String]) {
    world.send_to(key, "Come back soon!");
    world.log_out(key);
}

fn reboot(world: &mut World, key: &SessionKey, _args: &[String]) {
    if !require(world, key, Role::Admin) {
        return;
    }
    info!(tag = "!", session = %key, "reboot requested");
    world.shutdown(true);
}

fn shutdown(world: &mut World, key: &SessionKey, _args: &[String]) {
    if !require(world, key, Role::Admin) {
        return;
    }
    info!(tag = "!", session = %key, "shutdown requested");
    world.shutdown(false);
}

fn say(world: &mut World, key: &SessionKey, args: &[String]) {
    if args.is_empty() {
        world.send_to(key, "Say what?");
        return;
    }
    let message = args.join(" ");
    let Some(s) = world.session(key) else {
        return;
    };
    let name = s.name().to_string();
    let Some(at) = s.location().cloned() else {
        return;
    };
    world.send_to(key, &format!("You say, \"{message}\""));
    world.send_to_room(&at, Some(key), &format!("{name} says, \"{message}\""));
}

fn who(world: &mut World, key: &SessionKey, _args: &[String]) {
    let names = world.live_names();
    let mut text = String::from("Players online:");
    for n in &names {
        text.push('\n');
        text.push_str(n);
    }
    text.push_str(&format!("\n{} total.", names.len()));
    world.send_to(key, &text);
}
