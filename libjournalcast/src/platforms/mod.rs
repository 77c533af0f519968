//! Platform adapters
//!
//! An adapter describes one site's publish surface as a [`FlowProfile`] and
//! supplies the parts of the flow that differ per site: building the draft
//! and filling the text fields. The shared state machine in [`flow`] does the
//! rest.

use async_trait::async_trait;

use crate::browser::Locator;
use crate::config::Config;
use crate::credentials::{CredentialStore, LoginSurface, LoginTarget};
use crate::driver::{Dismissal, UiDriver};
use crate::error::Result;
use crate::media::MediaResolver;
use crate::transform::TextTransformer;
use crate::types::{JournalRecord, PlatformKind, PostDraft};

pub mod flow;
pub mod rednote;
pub mod x;

pub use flow::run_flow;
pub use rednote::RednoteAdapter;
pub use x::XAdapter;

/// The DOM vocabulary of one publish surface
#[derive(Debug, Clone)]
pub struct FlowProfile {
    pub publish_url: String,
    pub login: LoginSurface,
    pub popups: Vec<Dismissal>,
    /// Authoring-mode control; empty when the site has a single mode
    pub mode: Vec<Locator>,
    pub requires_media: bool,
    pub file_inputs: Vec<Locator>,
    pub progress: Vec<Locator>,
    pub preview: Vec<Locator>,
    pub submit: Vec<Locator>,
    pub success_phrases: Vec<String>,
    pub failure_phrases: Vec<String>,
    /// Leaving a URL containing this counts as success
    pub publish_marker: Option<String>,
}

#[async_trait]
pub trait PublishAdapter: Send + Sync {
    fn kind(&self) -> PlatformKind;

    fn profile(&self) -> &FlowProfile;

    fn credentials(&self) -> &CredentialStore;

    /// Turn the journal record into this platform's draft
    async fn prepare(
        &self,
        record: &JournalRecord,
        transformer: &dyn TextTransformer,
        media: &MediaResolver,
    ) -> Result<PostDraft>;

    /// Fill title/caption and body. A missing required field is an error.
    async fn fill_fields(&self, driver: &UiDriver<'_>, draft: &PostDraft) -> Result<()>;
}

/// Build adapters for the configured platforms, in configured order
pub fn create_adapters(config: &Config) -> Result<Vec<Box<dyn PublishAdapter>>> {
    let mut adapters: Vec<Box<dyn PublishAdapter>> = Vec::new();
    for platform in &config.publish.platforms {
        let store = CredentialStore::new(config.auth_file(*platform)?);
        match platform {
            PlatformKind::X => adapters.push(Box::new(XAdapter::new(store))),
            PlatformKind::Rednote => {
                let (default_image, summarize_above) = config
                    .rednote
                    .as_ref()
                    .map(|c| (c.default_image.clone(), c.summarize_above))
                    .unwrap_or((None, 1000));
                adapters.push(Box::new(RednoteAdapter::new(
                    store,
                    default_image,
                    summarize_above,
                )));
            }
        }
    }
    Ok(adapters)
}

/// Where to send a person to log in for `platform`
///
/// X's login flow lands on the home timeline, whose composer only renders
/// for a signed-in account. RedNote's creator center shows its upload input
/// once logged in.
pub fn login_target(platform: PlatformKind) -> LoginTarget {
    match platform {
        PlatformKind::X => LoginTarget {
            url: x::LOGIN_URL.to_string(),
            marker: Locator::css(x::LOGGED_IN_MARKER),
        },
        PlatformKind::Rednote => LoginTarget {
            url: rednote::PUBLISH_URL.to_string(),
            marker: Locator::css(rednote::LOGGED_IN_MARKER),
        },
    }
}
