//! Accounts, sessions, profiles and the user administration screen.
//!
//! Sign-in is by bare email: the wiki trusts the address and creates the
//! account on first sight. The session cookie carries the session id and
//! a secret; only the secret's digest is stored server-side.

use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::access::AccessPolicy;
use crate::application::error::WikiError;
use crate::application::jobs::enqueue_purge_all;
use crate::application::repos::{JobQueue, UpdateAccessParams, UpdateProfileParams, UserStore};
use crate::domain::entities::{SessionRecord, UserRecord};
use crate::domain::types::Principal;
use crate::presentation::views::{ProfileView, UserRow, UsersView};
use crate::util::timezone;

/// Cookie holding the session token.
pub const SESSION_COOKIE: &str = "quaderno_session";

const SESSION_TTL: Duration = Duration::days(30);
const TOKEN_TAG: &str = "qs";

/// A freshly created session, with the cleartext token for the cookie.
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    access: Arc<dyn AccessPolicy>,
    jobs: Arc<dyn JobQueue>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserStore>,
        access: Arc<dyn AccessPolicy>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            users,
            access,
            jobs,
        }
    }

    /// Signs a visitor in, creating the account on first sight.
    pub async fn log_in(&self, email: &str) -> Result<IssuedSession, WikiError> {
        let email = email.trim().to_ascii_lowercase();
        if !looks_like_email(&email) {
            return Err(WikiError::bad_request(
                "That does not look like an email address.",
            ));
        }

        let user = self.users.get_or_create(&email).await?;
        let id = Uuid::new_v4();
        let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let now = OffsetDateTime::now_utc();
        let expires_at = now + SESSION_TTL;

        self.users
            .create_session(SessionRecord {
                id,
                secret_digest: hash_secret(&secret),
                user_id: user.id,
                created_at: now,
                expires_at,
            })
            .await?;
        info!(email = user.email, "User signed in");

        Ok(IssuedSession {
            token: format!("{TOKEN_TAG}_{}_{secret}", id.simple()),
            expires_at,
        })
    }

    /// Resolves a session cookie to its user. Any defect in the token
    /// (shape, unknown session, expiry, digest mismatch) yields an
    /// anonymous principal rather than an error.
    pub async fn authenticate(&self, token: &str) -> Result<Option<UserRecord>, WikiError> {
        let Some((id, secret)) = parse_token(token) else {
            return Ok(None);
        };
        let Some((session, user)) = self.users.find_session(id).await? else {
            return Ok(None);
        };

        let now = OffsetDateTime::now_utc();
        if session.expires_at <= now {
            // Sweep jobs also remove these; doing it here keeps the
            // table tidy between sweeps.
            let _ = self.users.delete_session(id).await;
            return Ok(None);
        }

        let presented = hash_secret(secret);
        if session.secret_digest.ct_eq(&presented).unwrap_u8() == 0 {
            warn!(session = %id, "Session secret mismatch");
            return Ok(None);
        }

        Ok(Some(user))
    }

    pub async fn log_out(&self, token: &str) -> Result<(), WikiError> {
        if let Some((id, _)) = parse_token(token) {
            self.users.delete_session(id).await?;
            info!(session = %id, "User signed out");
        }
        Ok(())
    }

    pub fn profile_view(&self, principal: &Principal) -> Result<ProfileView, WikiError> {
        let user = signed_in(principal)?;
        Ok(ProfileView {
            nickname: user.nickname.clone(),
            public_email: user.public_email.clone().unwrap_or_default(),
        })
    }

    pub async fn update_profile(
        &self,
        principal: &Principal,
        nickname: &str,
        public_email: &str,
    ) -> Result<(), WikiError> {
        let user = signed_in(principal)?;
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(WikiError::bad_request("Nickname must not be empty."));
        }
        let public_email = public_email.trim();
        self.users
            .update_profile(UpdateProfileParams {
                id: user.id,
                nickname: nickname.to_string(),
                public_email: (!public_email.is_empty()).then(|| public_email.to_string()),
            })
            .await?;
        Ok(())
    }

    /// The user list. Any signed-in user may look; only admins see live
    /// checkboxes.
    pub async fn users_screen(
        &self,
        principal: &Principal,
        tz: chrono_tz::Tz,
    ) -> Result<UsersView, WikiError> {
        signed_in(principal)?;
        let users = self
            .users
            .list_all()
            .await?
            .into_iter()
            .map(|user| UserRow {
                id: user.id.to_string(),
                nickname: user.nickname,
                email: user.email,
                joined_display: timezone::display_datetime(user.created_at, tz),
                editor_access: user.editor_access,
                staff_access: user.staff_access,
            })
            .collect();
        Ok(UsersView {
            users,
            can_manage: self.access.is_admin(principal),
        })
    }

    /// Applies the admin form: a checkbox absent from the submission
    /// means the flag is off. Flag changes shift what cached pages should
    /// show, so a full purge is queued afterwards.
    pub async fn apply_access_flags(
        &self,
        principal: &Principal,
        checked: &HashSet<String>,
    ) -> Result<(), WikiError> {
        if !self.access.is_admin(principal) {
            return Err(WikiError::forbidden("Only admins may change access."));
        }

        let mut changed = 0usize;
        for user in self.users.list_all().await? {
            let editor_access = checked.contains(&format!("edit_{}", user.id));
            let staff_access = checked.contains(&format!("staff_{}", user.id));
            if editor_access == user.editor_access && staff_access == user.staff_access {
                continue;
            }
            self.users
                .update_access(UpdateAccessParams {
                    id: user.id,
                    editor_access,
                    staff_access,
                })
                .await?;
            changed += 1;
        }

        if changed > 0 {
            info!(changed, "Updated user access flags");
            enqueue_purge_all(self.jobs.as_ref(), Some("user access changed".to_string()))
                .await?;
        }
        Ok(())
    }
}

fn signed_in(principal: &Principal) -> Result<&UserRecord, WikiError> {
    principal
        .user()
        .ok_or_else(|| WikiError::forbidden("You are not signed in."))
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

fn parse_token(token: &str) -> Option<(Uuid, &str)> {
    let mut parts = token.splitn(3, '_');
    if parts.next()? != TOKEN_TAG {
        return None;
    }
    let id = Uuid::try_parse(parts.next()?).ok()?;
    let secret = parts.next()?;
    if secret.is_empty() {
        return None;
    }
    Some((id, secret))
}
