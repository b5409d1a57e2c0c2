//! Session lifecycle
//!
//! Keeps the access token valid for the life of the application:
//!
//! - Login / register / initialize install credentials and arm scheduling
//! - A one-shot refresh timer re-evaluates at most every poll interval and
//!   refreshes once the token enters the refresh threshold
//! - A low-frequency warning timer flags sessions about to expire
//! - Refresh is single-flight: concurrent callers share one refresh call
//! - Logout (user-initiated or forced) cancels timers and clears storage
//! - Account operations (profile, password, verification) report failures
//!   through [`TokenLifecycleManager::error_message`] without touching the
//!   session, except that a profile update swaps the session's user
//!
//! The refresh itself runs as its own task. A caller that stops waiting
//! (a cancelled request, a cancelled timer) cannot abandon a rotation
//! halfway between the server issuing new tokens and the store saving them.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use taskdesk_common::time::{recurring, schedule, Clock, TimerHandle};
use taskdesk_domain::constants::{
    EMAIL_VERIFICATION_FAILED_MESSAGE, LOGIN_FAILED_MESSAGE, LOGOUT_REASON_SESSION_EXPIRED,
    PASSWORD_CHANGE_FAILED_MESSAGE, PASSWORD_RESET_FAILED_MESSAGE,
    PASSWORD_RESET_REQUEST_FAILED_MESSAGE, PROFILE_UPDATE_FAILED_MESSAGE,
    REGISTER_FAILED_MESSAGE, REVOKE_TOKENS_FAILED_MESSAGE,
};
use taskdesk_domain::{
    AuthPayload, AuthSession, ChangePasswordRequest, Credentials, LoginRequest,
    PasswordResetRequest, ProfileUpdate, RegisterRequest, ResetPasswordRequest, SessionSettings,
    UserProfile, VerifyEmailRequest,
};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::api::AuthApi;
use super::expiry::CredentialIssuer;
use crate::api::{ClientError, ErrorKind, UnauthorizedHandler};
use crate::storage::TokenStore;

type SharedRefresh = Shared<BoxFuture<'static, Result<Credentials, ClientError>>>;

/// What the scheduler decided for the current credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPlan {
    /// Token already expired; the session is ended
    Expired,
    /// Token is inside the refresh threshold; refresh now
    RefreshNow,
    /// Re-evaluate after this delay
    Wait(Duration),
}

/// Decide how to schedule the next refresh for `credentials` at `now`.
///
/// The wait is `min(time_until_expiry - threshold, poll_interval)` so long
/// idle periods or wall-clock jumps are corrected within one poll interval.
pub fn plan_refresh(
    credentials: &Credentials,
    now: DateTime<Utc>,
    settings: &SessionSettings,
) -> RefreshPlan {
    let remaining = match credentials.time_until_expiry(now).to_std() {
        Ok(remaining) if !remaining.is_zero() => remaining,
        _ => return RefreshPlan::Expired,
    };
    let threshold = settings.refresh_threshold();
    if remaining <= threshold {
        return RefreshPlan::RefreshNow;
    }
    RefreshPlan::Wait((remaining - threshold).min(settings.poll_interval()))
}

#[derive(Default)]
struct Timers {
    refresh: Option<TimerHandle>,
    warning: Option<TimerHandle>,
    notice: Option<TimerHandle>,
}

impl Timers {
    fn cancel_session(&mut self) {
        for handle in [self.refresh.take(), self.warning.take()].into_iter().flatten() {
            handle.cancel();
        }
    }

    fn cancel_all(&mut self) {
        self.cancel_session();
        if let Some(handle) = self.notice.take() {
            handle.cancel();
        }
    }
}

/// Owns the authenticated session. Cheap to clone.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    me: Weak<ManagerInner>,
    api: Arc<dyn AuthApi>,
    store: TokenStore,
    issuer: CredentialIssuer,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    state: watch::Sender<AuthSession>,
    refresh_slot: Mutex<Option<(u64, SharedRefresh)>>,
    refresh_seq: AtomicU64,
    // Bumped whenever a session is installed or ended; a refresh that
    // started under an older epoch must not resurrect the session.
    epoch: AtomicU64,
    timers: Mutex<Timers>,
    warning: AtomicBool,
    last_activity: Mutex<DateTime<Utc>>,
    notice: Mutex<Option<String>>,
    last_error: Mutex<Option<String>>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for TokenLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLifecycleManager")
            .field("state", &self.inner.state.borrow().state())
            .field("refreshing", &self.is_refreshing())
            .field("warning", &self.is_session_warning())
            .finish_non_exhaustive()
    }
}

impl TokenLifecycleManager {
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: TokenStore,
        issuer: CredentialIssuer,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        let now = clock.now();
        let (state, _) = watch::channel(AuthSession::Idle);
        let inner = Arc::new_cyclic(|me| ManagerInner {
            me: me.clone(),
            api,
            store,
            issuer,
            clock,
            settings,
            state,
            refresh_slot: Mutex::new(None),
            refresh_seq: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            timers: Mutex::new(Timers::default()),
            warning: AtomicBool::new(false),
            last_activity: Mutex::new(now),
            notice: Mutex::new(None),
            last_error: Mutex::new(None),
            initialized: AtomicBool::new(false),
        });
        Self { inner }
    }

    /// Handler for the request pipeline's `401` path.
    pub fn unauthorized_handler(&self) -> Weak<dyn UnauthorizedHandler> {
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        weak
    }

    /// Restore a persisted session. Runs once; later calls return the
    /// current state.
    ///
    /// No stored token ends `Unauthenticated`. An expired token is
    /// refreshed. Otherwise the token is validated against the profile
    /// endpoint, falling back to a refresh if that fails.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> AuthSession {
        let inner = &self.inner;
        if inner.initialized.swap(true, Ordering::AcqRel) {
            return self.session();
        }
        inner.state.send_replace(AuthSession::Loading);

        let stored = inner.store.load().await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to read stored session");
            None
        });
        let Some(credentials) = stored else {
            inner.state.send_replace(AuthSession::Unauthenticated);
            debug!("no stored session");
            return self.session();
        };

        if credentials.is_expired(inner.clock.now()) {
            info!("stored session expired, attempting refresh");
            let _ = inner.refresh().await;
            return self.session();
        }

        match inner.api.profile().await {
            Ok(user) => {
                inner.state.send_replace(AuthSession::Authenticated { user, credentials });
                inner.ensure_warning_timer();
                inner.schedule_refresh().await;
                info!("stored session restored");
            }
            Err(err) => {
                warn!(kind = %err.kind(), "stored session rejected, attempting refresh");
                let _ = inner.refresh().await;
            }
        }
        self.session()
    }

    /// Authenticate with email and password.
    ///
    /// On failure the session moves to `Error` and any stored credentials
    /// are left untouched.
    ///
    /// # Errors
    /// Returns the classified failure of the login call.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<AuthSession, ClientError> {
        let inner = &self.inner;
        inner.state.send_replace(AuthSession::Loading);
        inner.last_error.lock().take();

        let request = LoginRequest { email: email.to_string(), password: password.to_string() };
        match inner.api.login(&request).await {
            Ok(payload) => {
                if remember_me {
                    let normalized = email.trim().to_lowercase();
                    if let Err(e) = inner.store.remember_email(&normalized).await {
                        warn!(error = %e, "failed to remember email");
                    }
                }
                info!("login succeeded");
                Ok(inner.install(payload).await)
            }
            Err(err) => Err(inner.fail(err, LOGIN_FAILED_MESSAGE)),
        }
    }

    /// Create an account and start its session.
    ///
    /// # Errors
    /// Returns the classified failure of the register call.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthSession, ClientError> {
        let inner = &self.inner;
        inner.state.send_replace(AuthSession::Loading);
        inner.last_error.lock().take();

        match inner.api.register(request).await {
            Ok(payload) => {
                info!("registration succeeded");
                Ok(inner.install(payload).await)
            }
            Err(err) => Err(inner.fail(err, REGISTER_FAILED_MESSAGE)),
        }
    }

    /// Store profile changes and swap the session's user for the profile the
    /// server returns.
    ///
    /// # Errors
    /// Returns the classified failure; the message is also kept in
    /// [`error_message`](Self::error_message).
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile, ClientError> {
        let inner = &self.inner;
        inner.last_error.lock().take();

        match inner.api.update_profile(&update.normalized()).await {
            Ok(user) => {
                inner.replace_user(user.clone());
                info!("profile updated");
                Ok(user)
            }
            Err(err) => Err(inner.account_failure(err, PROFILE_UPDATE_FAILED_MESSAGE)),
        }
    }

    /// # Errors
    /// Returns the classified failure; the message is also kept in
    /// [`error_message`](Self::error_message).
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ClientError> {
        let inner = &self.inner;
        inner.last_error.lock().take();

        let request = ChangePasswordRequest {
            current_password: current_password.to_string(),
            new_password: new_password.to_string(),
        };
        inner
            .api
            .change_password(&request)
            .await
            .map_err(|err| inner.account_failure(err, PASSWORD_CHANGE_FAILED_MESSAGE))?;
        info!("password changed");
        Ok(())
    }

    /// Ask for a password reset email.
    ///
    /// # Errors
    /// As for [`change_password`](Self::change_password).
    #[instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ClientError> {
        let inner = &self.inner;
        inner.last_error.lock().take();

        let request = PasswordResetRequest { email: email.trim().to_lowercase() };
        inner
            .api
            .request_password_reset(&request)
            .await
            .map_err(|err| inner.account_failure(err, PASSWORD_RESET_REQUEST_FAILED_MESSAGE))
    }

    /// Set a new password with the token from a reset email.
    ///
    /// # Errors
    /// As for [`change_password`](Self::change_password).
    #[instrument(skip_all)]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ClientError> {
        let inner = &self.inner;
        inner.last_error.lock().take();

        let request =
            ResetPasswordRequest { token: token.to_string(), new_password: new_password.to_string() };
        inner
            .api
            .reset_password(&request)
            .await
            .map_err(|err| inner.account_failure(err, PASSWORD_RESET_FAILED_MESSAGE))
    }

    /// # Errors
    /// As for [`change_password`](Self::change_password).
    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> Result<(), ClientError> {
        let inner = &self.inner;
        inner.last_error.lock().take();

        let request = VerifyEmailRequest { token: token.to_string() };
        inner
            .api
            .verify_email(&request)
            .await
            .map_err(|err| inner.account_failure(err, EMAIL_VERIFICATION_FAILED_MESSAGE))
    }

    /// Whether `username` is still free.
    ///
    /// # Errors
    /// Returns the classified failure of the check.
    pub async fn check_username(&self, username: &str) -> Result<bool, ClientError> {
        self.inner.api.check_username(username.trim()).await
    }

    /// Whether `email` is still free.
    ///
    /// # Errors
    /// Returns the classified failure of the check.
    pub async fn check_email(&self, email: &str) -> Result<bool, ClientError> {
        self.inner.api.check_email(&email.trim().to_lowercase()).await
    }

    /// Revoke every session of the account, then end this one locally.
    ///
    /// # Errors
    /// Returns the classified failure; the local session is kept.
    #[instrument(skip(self))]
    pub async fn revoke_all_sessions(&self) -> Result<(), ClientError> {
        let inner = &self.inner;
        inner.last_error.lock().take();

        inner
            .api
            .revoke_tokens()
            .await
            .map_err(|err| inner.account_failure(err, REVOKE_TOKENS_FAILED_MESSAGE))?;
        inner.terminate(None, false).await;
        Ok(())
    }

    /// Refresh now, joining a refresh that is already in flight.
    ///
    /// # Errors
    /// Any refresh failure; the session has already been ended when this
    /// returns an error.
    pub async fn refresh(&self) -> Result<Credentials, ClientError> {
        self.inner.refresh().await
    }

    /// Refresh on explicit user request ("stay signed in").
    ///
    /// # Errors
    /// As for [`refresh`](Self::refresh).
    pub async fn extend_session(&self) -> Result<AuthSession, ClientError> {
        self.inner.refresh().await?;
        Ok(self.session())
    }

    /// Evaluate the current credentials and act on the plan: end an expired
    /// session, refresh inside the threshold, or arm the refresh timer.
    ///
    /// Returns `None` when there is no session to schedule.
    pub async fn schedule_refresh(&self) -> Option<RefreshPlan> {
        self.inner.schedule_refresh().await
    }

    /// Raise the expiry warning while the session is inside the warning
    /// threshold but not yet expired; clear it otherwise. Returns the
    /// resulting flag.
    pub fn check_session_warning(&self) -> bool {
        self.inner.check_session_warning()
    }

    /// Note user interaction. Does not extend the session but clears the
    /// expiry warning.
    pub fn record_activity(&self) {
        *self.inner.last_activity.lock() = self.inner.clock.now();
        if self.inner.warning.swap(false, Ordering::AcqRel) {
            debug!("activity cleared session warning");
        }
    }

    /// End the session: cancel timers, notify the server (best effort),
    /// clear stored credentials. Safe to call repeatedly.
    ///
    /// A `reason` is surfaced through [`notice`](Self::notice) for a short
    /// while.
    #[instrument(skip(self))]
    pub async fn logout(&self, reason: Option<&str>) {
        self.inner.terminate(reason, true).await;
    }

    pub fn session(&self) -> AuthSession {
        self.inner.state.borrow().clone()
    }

    /// Observe session transitions.
    pub fn subscribe(&self) -> watch::Receiver<AuthSession> {
        self.inner.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn is_session_warning(&self) -> bool {
        self.inner.warning.load(Ordering::Acquire)
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.refresh_slot.lock().is_some()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        *self.inner.last_activity.lock()
    }

    pub fn session_expiry(&self) -> Option<DateTime<Utc>> {
        self.inner.store.credentials().map(|c| c.expires_at())
    }

    /// Remaining session lifetime, zero once expired.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let credentials = self.inner.store.credentials()?;
        Some(credentials.time_until_expiry(self.inner.clock.now()).to_std().unwrap_or_default())
    }

    /// Remaining lifetime as `m:ss`; `0:00` without a session.
    pub fn formatted_time_until_expiry(&self) -> String {
        let secs = self.time_until_expiry().unwrap_or_default().as_secs();
        format!("{}:{:02}", secs / 60, secs % 60)
    }

    /// Transient message left by the last forced logout.
    pub fn notice(&self) -> Option<String> {
        self.inner.notice.lock().clone()
    }

    pub fn clear_notice(&self) {
        self.inner.notice.lock().take();
    }

    /// Message of the last failed login, registration or account operation.
    pub fn error_message(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    pub fn clear_error(&self) {
        self.inner.last_error.lock().take();
    }

    pub fn store(&self) -> &TokenStore {
        &self.inner.store
    }

    /// Stop all timers without touching the session.
    pub fn shutdown(&self) {
        self.inner.timers.lock().cancel_all();
        debug!("session timers stopped");
    }
}

impl ManagerInner {
    fn current_user(&self) -> UserProfile {
        self.state.borrow().user().cloned().unwrap_or_default()
    }

    fn fail(&self, err: ClientError, fallback: &str) -> ClientError {
        let message = failure_message(&err, fallback);
        warn!(kind = %err.kind(), "authentication failed");
        *self.last_error.lock() = Some(message.clone());
        self.state.send_replace(AuthSession::Error { message });
        err
    }

    fn account_failure(&self, err: ClientError, fallback: &str) -> ClientError {
        warn!(kind = %err.kind(), "account operation failed");
        *self.last_error.lock() = Some(failure_message(&err, fallback));
        err
    }

    fn replace_user(&self, new_user: UserProfile) {
        self.state.send_if_modified(|state| match state {
            AuthSession::Authenticated { user, .. } => {
                *user = new_user;
                true
            }
            _ => false,
        });
    }

    async fn install(self: &Arc<Self>, payload: AuthPayload) -> AuthSession {
        let credentials = self.issuer.issue(payload.token, payload.refresh_token);
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.timers.lock().cancel_session();

        if let Err(e) = self.store.save(&credentials).await {
            warn!(error = %e, "failed to persist credentials");
        }
        self.warning.store(false, Ordering::Release);
        *self.last_activity.lock() = self.clock.now();
        self.initialized.store(true, Ordering::Release);
        self.state.send_replace(AuthSession::Authenticated { user: payload.user, credentials });

        self.ensure_warning_timer();
        self.schedule_refresh().await;
        self.state.borrow().clone()
    }

    fn refresh(self: &Arc<Self>) -> SharedRefresh {
        let mut slot = self.refresh_slot.lock();
        if let Some((_, in_flight)) = slot.as_ref() {
            debug!("joining in-flight refresh");
            return in_flight.clone();
        }

        let id = self.refresh_seq.fetch_add(1, Ordering::Relaxed);
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = this.perform_refresh().await;
            let mut slot = this.refresh_slot.lock();
            if slot.as_ref().is_some_and(|(current, _)| *current == id) {
                *slot = None;
            }
            outcome
        });

        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(ClientError::new(ErrorKind::Unknown)
                    .with_message(format!("Session refresh did not complete: {e}")))
            })
        }
        .boxed()
        .shared();
        *slot = Some((id, shared.clone()));
        shared
    }

    async fn perform_refresh(self: &Arc<Self>) -> Result<Credentials, ClientError> {
        let epoch = self.epoch.load(Ordering::Acquire);
        let Some(refresh_token) =
            self.store.credentials().and_then(|c| c.refresh_token().map(str::to_string))
        else {
            warn!("no refresh token available, ending session");
            self.terminate(Some(LOGOUT_REASON_SESSION_EXPIRED), false).await;
            return Err(ClientError::new(ErrorKind::Unauthorized)
                .with_message("No refresh token available"));
        };

        match self.api.refresh(&refresh_token).await {
            Ok(payload) => {
                if self.epoch.load(Ordering::Acquire) != epoch {
                    debug!("session changed during refresh, discarding issued tokens");
                    return Err(ClientError::new(ErrorKind::Unauthorized)
                        .with_message("Session ended during refresh"));
                }

                let credentials = self
                    .issuer
                    .issue(payload.token, payload.refresh_token.or(Some(refresh_token)));
                if let Err(e) = self.store.save(&credentials).await {
                    warn!(error = %e, "failed to persist refreshed credentials");
                }

                let user =
                    if payload.user.as_value().is_null() { self.current_user() } else { payload.user };
                self.state.send_replace(AuthSession::Authenticated {
                    user,
                    credentials: credentials.clone(),
                });
                self.warning.store(false, Ordering::Release);
                self.arm_after_refresh(&credentials);
                self.ensure_warning_timer();

                info!(expires_at = %credentials.expires_at(), "session refreshed");
                Ok(credentials)
            }
            Err(err) => {
                warn!(kind = %err.kind(), error = %err, "session refresh failed");
                if self.epoch.load(Ordering::Acquire) == epoch {
                    self.terminate(Some(LOGOUT_REASON_SESSION_EXPIRED), false).await;
                }
                Err(err)
            }
        }
    }

    async fn schedule_refresh(self: &Arc<Self>) -> Option<RefreshPlan> {
        let credentials = self.store.credentials()?;
        let plan = plan_refresh(&credentials, self.clock.now(), &self.settings);
        debug!(?plan, "refresh scheduling");

        match plan {
            RefreshPlan::Expired => {
                info!("session expired");
                self.terminate(Some(LOGOUT_REASON_SESSION_EXPIRED), false).await;
            }
            RefreshPlan::RefreshNow => {
                if let Err(err) = self.refresh().await {
                    debug!(kind = %err.kind(), "scheduled refresh failed");
                }
            }
            RefreshPlan::Wait(delay) => self.arm_refresh_timer(delay),
        }
        Some(plan)
    }

    /// A fresh token that is already inside the threshold is re-checked
    /// later instead of refreshed again immediately.
    fn arm_after_refresh(&self, credentials: &Credentials) {
        let delay = match plan_refresh(credentials, self.clock.now(), &self.settings) {
            RefreshPlan::Wait(delay) => delay,
            RefreshPlan::Expired | RefreshPlan::RefreshNow => credentials
                .time_until_expiry(self.clock.now())
                .to_std()
                .unwrap_or_default()
                .min(self.settings.poll_interval()),
        };
        self.arm_refresh_timer(delay);
    }

    fn arm_refresh_timer(&self, delay: Duration) {
        let handle = schedule(delay, refresh_timer_fired(self.me.clone()));
        if let Some(previous) = self.timers.lock().refresh.replace(handle) {
            previous.cancel();
        }
        debug!(delay_secs = delay.as_secs(), "refresh timer armed");
    }

    fn ensure_warning_timer(&self) {
        let mut timers = self.timers.lock();
        if timers.warning.as_ref().is_some_and(|handle| !handle.is_cancelled()) {
            return;
        }
        let me = self.me.clone();
        timers.warning = Some(recurring(self.settings.warning_interval(), move || {
            if let Some(inner) = me.upgrade() {
                inner.check_session_warning();
            }
        }));
    }

    fn check_session_warning(&self) -> bool {
        let Some(credentials) = self.store.credentials() else {
            self.warning.store(false, Ordering::Release);
            return false;
        };
        let remaining = credentials.time_until_expiry(self.clock.now()).to_std().unwrap_or_default();
        let expiring = !remaining.is_zero() && remaining <= self.settings.warning_threshold();
        if self.warning.swap(expiring, Ordering::AcqRel) != expiring {
            if expiring {
                info!(remaining_secs = remaining.as_secs(), "session expiring soon");
            } else {
                debug!(remaining_secs = remaining.as_secs(), "session warning cleared");
            }
        }
        expiring
    }

    async fn terminate(&self, reason: Option<&str>, notify_server: bool) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.timers.lock().cancel_session();

        if notify_server && self.store.access_token().is_some() {
            if let Err(err) = self.api.logout().await {
                warn!(kind = %err.kind(), "logout call failed, clearing session locally");
            }
        }
        if let Err(e) = self.store.clear().await {
            error!(error = %e, "failed to clear stored credentials");
        }

        self.warning.store(false, Ordering::Release);
        self.state.send_replace(AuthSession::Unauthenticated);
        if let Some(reason) = reason {
            self.post_notice(format!("Logged out: {reason}"));
        }
        info!(reason = reason.unwrap_or("user request"), "session ended");
    }

    fn post_notice(&self, message: String) {
        *self.notice.lock() = Some(message);
        let me = self.me.clone();
        let handle = schedule(self.settings.notice_ttl(), async move {
            if let Some(inner) = me.upgrade() {
                inner.notice.lock().take();
            }
        });
        if let Some(previous) = self.timers.lock().notice.replace(handle) {
            previous.cancel();
        }
    }
}

/// The server's message when it sent one; `fallback` for unclassified
/// failures without one; the kind's message otherwise.
fn failure_message(err: &ClientError, fallback: &str) -> String {
    match err.kind() {
        ErrorKind::Unknown if !err.has_server_message() => fallback.to_string(),
        _ => err.message().to_string(),
    }
}

// Boxed to break the type cycle between the timer callback and scheduling.
fn refresh_timer_fired(me: Weak<ManagerInner>) -> BoxFuture<'static, ()> {
    async move {
        if let Some(inner) = me.upgrade() {
            inner.schedule_refresh().await;
        }
    }
    .boxed()
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.timers.get_mut().cancel_all();
    }
}

#[async_trait]
impl UnauthorizedHandler for ManagerInner {
    async fn refresh_credentials(&self, rejected: &str) -> Result<(), ClientError> {
        match self.store.access_token() {
            None => return Err(ClientError::new(ErrorKind::Unauthorized)),
            Some(current) if current != rejected => {
                debug!("token already replaced, resubmitting without refresh");
                return Ok(());
            }
            Some(_) => {}
        }
        let this = self.me.upgrade().ok_or_else(|| ClientError::new(ErrorKind::Unauthorized))?;
        this.refresh().await.map(|_| ())
    }

    async fn expire_session(&self) {
        self.terminate(Some(LOGOUT_REASON_SESSION_EXPIRED), false).await;
    }
}
