//! Replicated credential state
//!
//! Two maps, both keyed by username. Keying tokens by username is what
//! enforces single-active-token: inserting a new token structurally
//! displaces the previous one, no separate revocation bookkeeping needed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use coral_core::{BusEvent, CoralError, CoralResult, Digest, Token};
use coral_store::{Applied, RoleState};

/// Credential state for the auth role
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    /// username -> password digest
    pub users: BTreeMap<String, Digest>,
    /// username -> currently valid token
    pub tokens: BTreeMap<String, Token>,
}

impl AuthState {
    /// The username a currently valid token belongs to
    pub fn user_of(&self, token: &Token) -> Option<&str> {
        self.tokens
            .iter()
            .find(|(_, t)| *t == token)
            .map(|(user, _)| user.as_str())
    }

    pub fn is_valid(&self, token: &Token) -> bool {
        self.user_of(token).is_some()
    }
}

impl RoleState for AuthState {
    fn apply(&mut self, event: &BusEvent) -> CoralResult<Applied> {
        match event {
            BusEvent::NewUser { user, digest } => {
                let prior = self.users.insert(user.clone(), digest.clone());
                Ok(if prior.as_ref() == Some(digest) {
                    Applied::Noop
                } else {
                    Applied::Changed
                })
            }
            BusEvent::NewToken { user, token } => {
                let prior = self.tokens.insert(user.clone(), token.clone());
                Ok(if prior.as_ref() == Some(token) {
                    Applied::Noop
                } else {
                    Applied::Changed
                })
            }
            BusEvent::RevokeToken { token } => {
                let owner = self.user_of(token).map(str::to_owned);
                Ok(match owner {
                    Some(user) => {
                        self.tokens.remove(&user);
                        Applied::Changed
                    }
                    // Already expired, replaced, or never ours.
                    None => Applied::Noop,
                })
            }
            BusEvent::RevokeUser { user } => {
                let removed_user = self.users.remove(user).is_some();
                let removed_token = self.tokens.remove(user).is_some();
                Ok(if removed_user || removed_token {
                    Applied::Changed
                } else {
                    Applied::Noop
                })
            }
            other => Err(CoralError::Protocol(format!(
                "not a credential event: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(state: &mut AuthState, event: BusEvent) -> Applied {
        state.apply(&event).unwrap()
    }

    #[test]
    fn test_new_token_displaces_previous() {
        let mut state = AuthState::default();
        apply(
            &mut state,
            BusEvent::NewToken {
                user: "alice".into(),
                token: Token::new("t1"),
            },
        );
        apply(
            &mut state,
            BusEvent::NewToken {
                user: "alice".into(),
                token: Token::new("t2"),
            },
        );

        assert!(!state.is_valid(&Token::new("t1")));
        assert_eq!(state.user_of(&Token::new("t2")), Some("alice"));
        assert_eq!(state.tokens.len(), 1);
    }

    #[test]
    fn test_revoke_token_is_idempotent() {
        let mut state = AuthState::default();
        apply(
            &mut state,
            BusEvent::NewToken {
                user: "alice".into(),
                token: Token::new("t1"),
            },
        );

        let event = BusEvent::RevokeToken {
            token: Token::new("t1"),
        };
        assert_eq!(apply(&mut state, event.clone()), Applied::Changed);
        assert_eq!(apply(&mut state, event), Applied::Noop);
    }

    #[test]
    fn test_revoke_user_drops_credentials_and_token() {
        let mut state = AuthState::default();
        apply(
            &mut state,
            BusEvent::NewUser {
                user: "alice".into(),
                digest: Digest::new("d1"),
            },
        );
        apply(
            &mut state,
            BusEvent::NewToken {
                user: "alice".into(),
                token: Token::new("t1"),
            },
        );

        let applied = apply(&mut state, BusEvent::RevokeUser { user: "alice".into() });
        assert_eq!(applied, Applied::Changed);
        assert!(state.users.is_empty());
        assert!(state.tokens.is_empty());
    }

    #[test]
    fn test_foreign_event_is_rejected() {
        let mut state = AuthState::default();
        let err = state
            .apply(&BusEvent::MediaRemoved {
                media: coral_core::MediaId::new("m1"),
            })
            .unwrap_err();
        assert!(matches!(err, CoralError::Protocol(_)));
    }
}
