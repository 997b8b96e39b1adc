//! Access decisions.
//!
//! All checks are pure functions over the loaded settings and the request
//! principal, so they are trivially testable and never touch storage.

use crate::application::settings::{RESERVED_PREFIX, WikiSettings};
use crate::domain::entities::PageRecord;
use crate::domain::types::Principal;

/// Access decisions consulted by every handler.
pub trait AccessPolicy: Send + Sync {
    fn is_admin(&self, principal: &Principal) -> bool;

    fn can_read_page(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        page: &PageRecord,
    ) -> bool;

    fn can_edit_page(&self, settings: &WikiSettings, principal: &Principal, title: &str) -> bool;

    /// Gate for the page index, feeds, the sitemap and the changes list.
    fn can_list_pages(&self, settings: &WikiSettings, principal: &Principal) -> bool;

    fn can_upload_images(&self, settings: &WikiSettings, principal: &Principal) -> bool;
}

/// Policy used in production: admins come from the deployment
/// configuration or the per-user staff flag.
pub struct DefaultAccessPolicy {
    admin_emails: Vec<String>,
}

impl DefaultAccessPolicy {
    pub fn new(admin_emails: Vec<String>) -> Self {
        Self { admin_emails }
    }

    fn is_editor(&self, settings: &WikiSettings, principal: &Principal) -> bool {
        let Some(user) = principal.user() else {
            return false;
        };
        user.editor_access
            || settings.open_editing()
            || settings.editors().iter().any(|email| email == &user.email)
    }
}

impl AccessPolicy for DefaultAccessPolicy {
    fn is_admin(&self, principal: &Principal) -> bool {
        let Some(user) = principal.user() else {
            return false;
        };
        user.staff_access || self.admin_emails.iter().any(|email| email == &user.email)
    }

    fn can_read_page(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        page: &PageRecord,
    ) -> bool {
        if self.is_admin(principal) {
            return true;
        }
        match page.is_public {
            // `public: yes` opens the page even on a closed wiki.
            Some(true) => true,
            // `private: yes` restricts to the author and editors.
            Some(false) => {
                let author_match = match (principal.email(), page.author_email.as_deref()) {
                    (Some(me), Some(author)) => me == author,
                    _ => false,
                };
                author_match || self.is_editor(settings, principal)
            }
            None => settings.open_reading() || !principal.is_anonymous(),
        }
    }

    fn can_edit_page(&self, settings: &WikiSettings, principal: &Principal, title: &str) -> bool {
        if self.is_admin(principal) {
            return true;
        }
        if principal.is_anonymous() || title.starts_with(RESERVED_PREFIX) {
            return false;
        }
        self.is_editor(settings, principal)
    }

    fn can_list_pages(&self, settings: &WikiSettings, principal: &Principal) -> bool {
        self.is_admin(principal) || settings.open_reading() || !principal.is_anonymous()
    }

    fn can_upload_images(&self, settings: &WikiSettings, principal: &Principal) -> bool {
        self.is_admin(principal) || self.is_editor(settings, principal)
    }
}
