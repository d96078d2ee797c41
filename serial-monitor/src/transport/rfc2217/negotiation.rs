//! Telnet option state.
//!
//! Tracks which options each side has enabled and decides how to answer the
//! server's `WILL`/`WONT`/`DO`/`DONT`. Acknowledgements of our own requests
//! are never answered, which keeps the two sides from looping.

use std::collections::HashMap;

use super::{option, TelnetCommand, Verb};

/// Options this client is willing to enable on its own side.
const LOCAL_OPTIONS: &[u8] = &[option::BINARY, option::SGA, option::COM_PORT_OPTION];

/// Options this client accepts the server enabling.
const REMOTE_OPTIONS: &[u8] = &[option::BINARY, option::SGA, option::ECHO];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionState {
    #[default]
    Inactive,
    /// We asked, no answer yet
    Requested,
    Active,
    /// The other side refused
    Rejected,
}

#[derive(Debug, Default)]
pub struct Negotiator {
    /// Options enabled on our side (we WILL)
    local: HashMap<u8, OptionState>,
    /// Options enabled on the server side (they WILL)
    remote: HashMap<u8, OptionState>,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that open the session, marking each option as requested.
    pub fn initial_requests(&mut self) -> Vec<TelnetCommand> {
        let mut requests = Vec::new();
        for opt in [option::COM_PORT_OPTION, option::BINARY] {
            self.local.insert(opt, OptionState::Requested);
            requests.push(TelnetCommand::Negotiate(Verb::Will, opt));
        }
        for opt in [option::BINARY, option::SGA] {
            self.remote.insert(opt, OptionState::Requested);
            requests.push(TelnetCommand::Negotiate(Verb::Do, opt));
        }
        requests
    }

    /// State of the COM-PORT-OPTION on our side.
    pub fn com_port(&self) -> OptionState {
        self.local_state(option::COM_PORT_OPTION)
    }

    pub fn local_state(&self, opt: u8) -> OptionState {
        self.local.get(&opt).copied().unwrap_or_default()
    }

    pub fn remote_state(&self, opt: u8) -> OptionState {
        self.remote.get(&opt).copied().unwrap_or_default()
    }

    /// Record a negotiation from the server and return the reply, if any.
    pub fn receive(&mut self, verb: Verb, opt: u8) -> Option<TelnetCommand> {
        match verb {
            Verb::Do => {
                Self::enable(&mut self.local, LOCAL_OPTIONS, opt, Verb::Will, Verb::Wont)
            }
            Verb::Dont => Self::disable(&mut self.local, opt, Verb::Wont),
            Verb::Will => {
                Self::enable(&mut self.remote, REMOTE_OPTIONS, opt, Verb::Do, Verb::Dont)
            }
            Verb::Wont => Self::disable(&mut self.remote, opt, Verb::Dont),
        }
    }

    fn enable(
        states: &mut HashMap<u8, OptionState>,
        supported: &[u8],
        opt: u8,
        yes: Verb,
        no: Verb,
    ) -> Option<TelnetCommand> {
        let state = states.entry(opt).or_default();
        let current = *state;
        match current {
            OptionState::Requested => {
                *state = OptionState::Active;
                None
            }
            OptionState::Active => None,
            OptionState::Inactive | OptionState::Rejected if supported.contains(&opt) => {
                *state = OptionState::Active;
                Some(TelnetCommand::Negotiate(yes, opt))
            }
            OptionState::Inactive | OptionState::Rejected => {
                Some(TelnetCommand::Negotiate(no, opt))
            }
        }
    }

    fn disable(
        states: &mut HashMap<u8, OptionState>,
        opt: u8,
        no: Verb,
    ) -> Option<TelnetCommand> {
        let state = states.entry(opt).or_default();
        let current = *state;
        match current {
            OptionState::Requested => {
                *state = OptionState::Rejected;
                None
            }
            OptionState::Active => {
                *state = OptionState::Rejected;
                Some(TelnetCommand::Negotiate(no, opt))
            }
            OptionState::Inactive | OptionState::Rejected => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiate(verb: Verb, opt: u8) -> Option<TelnetCommand> {
        Some(TelnetCommand::Negotiate(verb, opt))
    }

    #[test]
    fn test_initial_requests() {
        let mut n = Negotiator::new();
        let requests = n.initial_requests();
        assert_eq!(requests[0], TelnetCommand::Negotiate(Verb::Will, option::COM_PORT_OPTION));
        assert_eq!(requests.len(), 4);
        assert_eq!(n.com_port(), OptionState::Requested);
        assert_eq!(n.remote_state(option::SGA), OptionState::Requested);
    }

    #[test]
    fn test_acknowledgement_gets_no_reply() {
        let mut n = Negotiator::new();
        n.initial_requests();
        assert_eq!(n.receive(Verb::Do, option::COM_PORT_OPTION), None);
        assert_eq!(n.com_port(), OptionState::Active);
        assert_eq!(n.receive(Verb::Will, option::SGA), None);
        assert_eq!(n.remote_state(option::SGA), OptionState::Active);

        // repeated acknowledgement stays quiet
        assert_eq!(n.receive(Verb::Do, option::COM_PORT_OPTION), None);
    }

    #[test]
    fn test_refused_com_port() {
        let mut n = Negotiator::new();
        n.initial_requests();
        assert_eq!(n.receive(Verb::Dont, option::COM_PORT_OPTION), None);
        assert_eq!(n.com_port(), OptionState::Rejected);
    }

    #[test]
    fn test_unsolicited_requests() {
        let mut n = Negotiator::new();
        // supported options are accepted
        assert_eq!(n.receive(Verb::Will, option::ECHO), negotiate(Verb::Do, option::ECHO));
        assert_eq!(n.receive(Verb::Do, option::SGA), negotiate(Verb::Will, option::SGA));
        // anything else is refused
        assert_eq!(n.receive(Verb::Do, 24), negotiate(Verb::Wont, 24));
        assert_eq!(n.receive(Verb::Will, 31), negotiate(Verb::Dont, 31));
        assert_eq!(n.local_state(24), OptionState::Inactive);
    }

    #[test]
    fn test_disabling_active_option_is_confirmed_once() {
        let mut n = Negotiator::new();
        n.receive(Verb::Will, option::ECHO);
        assert_eq!(n.receive(Verb::Wont, option::ECHO), negotiate(Verb::Dont, option::ECHO));
        assert_eq!(n.receive(Verb::Wont, option::ECHO), None);
        // never enabled: nothing to confirm
        assert_eq!(n.receive(Verb::Dont, option::BINARY), None);
    }
}
