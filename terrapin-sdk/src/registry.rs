//! Command and service extension registry.
//!
//! Handlers are closures captured at registration time, so there is no
//! name-based global dispatch: the name only matters for lookup from chat
//! and for the `commands` listing.

use chrono::Utc;

/// On-demand handler, invoked when a user addresses the bot by callsign.
/// Gets the comma-separated positional arguments; a `Some` reply goes back
/// to the originating channel.
pub type CommandFn = Box<dyn Fn(&[String]) -> Option<String> + Send>;

/// Periodic handler, run once per session-loop iteration against its own
/// persisted [`ServiceState`]. A `Some` reply is sent to the session's
/// service target channel.
pub type ServiceFn = Box<dyn FnMut(&mut ServiceState) -> Option<String> + Send>;

/// Private persisted variables for one registered service. Only that
/// service's own invocations mutate it; the core never reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceState {
    /// Unix timestamp taken when the service was registered.
    pub created_at: i64,
    /// General-purpose counters, zeroed at registration.
    pub slots: Vec<i64>,
}

impl ServiceState {
    fn new(slot_count: usize) -> Self {
        Self {
            created_at: Utc::now().timestamp(),
            slots: vec![0; slot_count],
        }
    }
}

struct CommandEntry {
    name: String,
    run: CommandFn,
}

struct ServiceEntry {
    name: String,
    run: ServiceFn,
    state: ServiceState,
}

/// Holds everything external code has plugged into the bot. Registration
/// order is preserved so listings and service ticks stay deterministic.
#[derive(Default)]
pub struct Registry {
    commands: Vec<CommandEntry>,
    services: Vec<ServiceEntry>,
}

impl Registry {
    /// Register a named command. Immutable for the process lifetime.
    pub fn register_command<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[String]) -> Option<String> + Send + 'static,
    {
        self.commands.push(CommandEntry {
            name: name.into(),
            run: Box::new(handler),
        });
    }

    /// Register a named service with `slot_count` zeroed state slots.
    pub fn register_service<F>(&mut self, name: impl Into<String>, slot_count: usize, handler: F)
    where
        F: FnMut(&mut ServiceState) -> Option<String> + Send + 'static,
    {
        self.services.push(ServiceEntry {
            name: name.into(),
            run: Box::new(handler),
            state: ServiceState::new(slot_count),
        });
    }

    /// Names of all registered commands, in registration order.
    pub fn command_names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }

    /// Invoke `name` case-insensitively. Unknown names return `None`
    /// without any error surface: unrecognized chatter must not produce
    /// bot noise.
    pub fn invoke(&self, name: &str, args: &[String]) -> Option<String> {
        let cmd = self
            .commands
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))?;
        (cmd.run)(args)
    }

    /// Run every service exactly once, returning the non-empty replies in
    /// registration order.
    pub fn tick_services(&mut self) -> Vec<String> {
        let mut replies = Vec::new();
        for svc in &mut self.services {
            if let Some(reply) = (svc.run)(&mut svc.state)
                && !reply.is_empty()
            {
                replies.push(reply);
            }
        }
        replies
    }

    /// State of a registered service, for callers that inspect their own
    /// services (and for tests).
    pub fn service_state(&self, name: &str) -> Option<&ServiceState> {
        self.services
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .map(|s| &s.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_is_case_insensitive_and_passes_args() {
        let mut reg = Registry::default();
        reg.register_command("Echo", |args| Some(args.join(" ")));
        let args = vec!["hi".to_string(), "there".to_string()];
        assert_eq!(reg.invoke("echo", &args), Some("hi there".to_string()));
        assert_eq!(reg.invoke("ECHO", &args), Some("hi there".to_string()));
    }

    #[test]
    fn unknown_command_is_silently_none() {
        let reg = Registry::default();
        assert_eq!(reg.invoke("nope", &[]), None);
    }

    #[test]
    fn command_names_keep_registration_order() {
        let mut reg = Registry::default();
        reg.register_command("zulu", |_| None);
        reg.register_command("alpha", |_| None);
        assert_eq!(reg.command_names(), vec!["zulu", "alpha"]);
    }

    #[test]
    fn service_state_is_seeded_with_timestamp_and_zeroed_slots() {
        let mut reg = Registry::default();
        reg.register_service("tick", 2, |_| None);
        let state = reg.service_state("tick").unwrap();
        assert!(state.created_at > 0);
        assert_eq!(state.slots, vec![0, 0]);
    }

    #[test]
    fn tick_runs_each_service_once_and_state_persists() {
        let mut reg = Registry::default();
        reg.register_service("counter", 1, |state| {
            state.slots[0] += 1;
            if state.slots[0] == 3 {
                Some(format!("reached {}", state.slots[0]))
            } else {
                None
            }
        });
        assert!(reg.tick_services().is_empty());
        assert!(reg.tick_services().is_empty());
        assert_eq!(reg.tick_services(), vec!["reached 3".to_string()]);
        assert_eq!(reg.service_state("counter").unwrap().slots, vec![3]);
    }

    #[test]
    fn tick_collects_replies_in_registration_order() {
        let mut reg = Registry::default();
        reg.register_service("b", 0, |_| Some("second".into()));
        reg.register_service("a", 0, |_| Some("".into()));
        reg.register_service("c", 0, |_| Some("third".into()));
        // Empty replies are dropped, order of the rest follows registration.
        assert_eq!(reg.tick_services(), vec!["second", "third"]);
    }
}
