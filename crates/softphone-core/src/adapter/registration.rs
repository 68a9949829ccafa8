//! Login, logout and registration notifications

use tracing::{debug, info, warn};

use crate::account::{AccountConfig, AccountInfo, RegistrationState};
use crate::effects::SessionEffect;
use crate::error::{AdapterError, AdapterResult};
use crate::events::RegistrationEvent;

/// Registration operations implementation for SessionAdapter
impl super::SessionAdapter {
    /// Ask the engine to register an account
    ///
    /// The account is tracked from here on, but its state only changes with
    /// registration notifications.
    pub fn login(&mut self, config: AccountConfig) -> AdapterResult<()> {
        self.guarded("login", |this| {
            config.validate()?;

            if let Some(account) = &this.account {
                if account.logout_pending {
                    return Err(AdapterError::teardown_pending(format!(
                        "account {}",
                        account.config.identity
                    )));
                }
                if !account.state.is_terminal() {
                    return Err(AdapterError::LoginInProgress {
                        identity: account.config.identity.clone(),
                    });
                }
            }

            let account_id = this.engine.register(&config);
            info!(
                account_id = %account_id,
                identity = %config.identity,
                transport = %config.transport,
                "Registering account"
            );
            this.account = Some(AccountInfo::new(account_id, config));
            Ok(())
        })
    }

    /// Ask the engine to unregister the current account
    pub fn logout(&mut self) -> AdapterResult<()> {
        self.guarded("logout", |this| {
            let account = this.account.as_mut().ok_or(AdapterError::NoAccount)?;
            if account.logout_pending {
                return Err(AdapterError::teardown_pending(format!(
                    "account {}",
                    account.config.identity
                )));
            }
            if account.state.is_terminal() {
                return Err(AdapterError::NoAccount);
            }

            account.logout_pending = true;
            let account_id = account.account_id;
            info!(account_id = %account_id, "Unregistering account");
            this.engine.unregister(account_id);
            Ok(())
        })
    }

    /// Apply a registration state notification
    pub fn on_registration_state_changed(&mut self, event: RegistrationEvent) {
        let RegistrationEvent {
            account_id,
            state,
            message,
            timestamp,
        } = event;

        if state == RegistrationState::Unknown {
            warn!(account_id = %account_id, "Ignoring unknown registration state");
            self.ignored();
            return;
        }

        let Some(account) = self.account.as_mut() else {
            warn!(account_id = %account_id, ?state, "Registration notification without an account");
            self.ignored();
            return;
        };
        if account.account_id != account_id {
            debug!(account_id = %account_id, ?state, "Stale registration notification");
            self.ignored();
            return;
        }
        if account.state == state {
            debug!(account_id = %account_id, ?state, "Duplicate registration notification");
            self.ignored();
            return;
        }
        if account.logged_out {
            debug!(account_id = %account_id, ?state, "Registration notification after logout");
            self.ignored();
            return;
        }
        // Only a fresh attempt leaves a terminal state
        if account.state.is_terminal() && state != RegistrationState::Progress {
            debug!(
                account_id = %account_id,
                previous = ?account.state,
                ?state,
                "Late registration notification"
            );
            self.ignored();
            return;
        }

        let previous = account.state;
        account.state = state;
        account.last_message = message.clone();
        info!(account_id = %account_id, ?previous, ?state, "Registration state changed");

        let mut cleared_identity = None;
        let text = match state {
            RegistrationState::Ok => {
                account.registered_at = Some(timestamp);
                state.to_string()
            }
            RegistrationState::Failed | RegistrationState::Cleared => {
                account.logged_out = account.logout_pending;
                account.logout_pending = false;
                if account.config.password.is_some() {
                    account.config.clear_credentials();
                    cleared_identity = Some(account.config.identity.clone());
                }
                match (state, message) {
                    (RegistrationState::Failed, Some(message)) => message,
                    _ => state.to_string(),
                }
            }
            _ => state.to_string(),
        };
        self.applied();

        match state {
            RegistrationState::Progress => self.set_login_enabled(false),
            RegistrationState::Ok => {
                self.set_login_enabled(false);
                self.set_authenticated(true);
            }
            RegistrationState::Failed | RegistrationState::Cleared => {
                if let Some(identity) = cleared_identity {
                    self.emit(SessionEffect::CredentialsCleared { identity });
                }
                self.set_authenticated(false);
                self.set_login_enabled(true);
            }
            RegistrationState::None | RegistrationState::Unknown => {}
        }

        self.registration_text = text.clone();
        self.emit(SessionEffect::RegistrationStatus { state, text });
    }

    fn set_login_enabled(&mut self, enabled: bool) {
        if self.login_enabled != enabled {
            self.login_enabled = enabled;
            self.emit(SessionEffect::LoginEnabled { enabled });
        }
    }

    fn set_authenticated(&mut self, authenticated: bool) {
        if self.authenticated != authenticated {
            self.authenticated = authenticated;
            self.emit(SessionEffect::AuthenticatedPanel {
                visible: authenticated,
            });
        }
    }
}
