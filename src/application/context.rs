//! Per-request template context assembly.
//!
//! Every rendered page shares the same chrome: the signed-in user, a
//! login or logout URL pointing back at the current path, the admin flag,
//! the rendered sidebar and footer, and the wiki settings snapshot. The
//! assembler fills each piece exactly once per request; handlers only
//! supply their own content.

use std::sync::Arc;

use crate::application::access::AccessPolicy;
use crate::application::render::ContentRenderer;
use crate::application::repos::{PageStore, RepoError};
use crate::application::settings::WikiSettings;
use crate::domain::source::PageSource;
use crate::domain::types::Principal;
use crate::presentation::views::{SiteChrome, UserView};
use crate::util::urls;

/// Sidebar shown on a wiki nobody has set up yet.
const SIDEBAR_FALLBACK: &str = "This is a good place for a brief introduction to your wiki, a logo and such things.\n\n[Edit this text](/w/edit?page={page})";

const FOOTER_FALLBACK: &str = "This wiki is built with [Quaderno](https://quaderno.wiki/).";

#[derive(Clone)]
pub struct ContextAssembler {
    pages: Arc<dyn PageStore>,
    access: Arc<dyn AccessPolicy>,
    renderer: Arc<dyn ContentRenderer>,
    base_url: String,
}

impl ContextAssembler {
    pub fn new(
        pages: Arc<dyn PageStore>,
        access: Arc<dyn AccessPolicy>,
        renderer: Arc<dyn ContentRenderer>,
        base_url: String,
    ) -> Self {
        Self {
            pages,
            access,
            renderer,
            base_url,
        }
    }

    pub async fn assemble(
        &self,
        settings: &WikiSettings,
        principal: &Principal,
        current_path: &str,
    ) -> Result<SiteChrome, RepoError> {
        let interwiki = settings.interwiki();

        let sidebar_html = {
            let body = self
                .chrome_page_body(settings.sidebar_page())
                .await?
                .unwrap_or_else(|| {
                    SIDEBAR_FALLBACK.replace("{page}", settings.sidebar_page())
                });
            self.renderer.render(&body, &interwiki).html
        };

        let footer_html = {
            let body = self
                .chrome_page_body(settings.footer_page())
                .await?
                .unwrap_or_else(|| FOOTER_FALLBACK.to_string());
            self.renderer.render(&body, &interwiki).html
        };

        let user = principal.user().map(|user| UserView {
            nickname: user.nickname.clone(),
            email: user.email.clone(),
        });
        let auth_url = match principal {
            Principal::Anonymous => urls::login_href(current_path),
            Principal::User(_) => urls::logout_href(current_path),
        };

        Ok(SiteChrome {
            site_title: settings.site_title().to_string(),
            signed_in: user.is_some(),
            user,
            auth_url,
            is_admin: self.access.is_admin(principal),
            sidebar_html,
            footer_html,
            base_url: self.base_url.clone(),
            map_enabled: settings.map_enabled(),
        })
    }

    /// Body of a sidebar/footer page, without its property header.
    async fn chrome_page_body(&self, title: &str) -> Result<Option<String>, RepoError> {
        let page = self.pages.find_by_title(title).await?;
        Ok(page.map(|page| PageSource::parse(&page.body).body().to_string()))
    }
}
