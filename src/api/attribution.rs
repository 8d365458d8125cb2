//! Photographer attribution with the application's referral tag

use super::PhotoCandidate;

/// Platform landing page linked from every attribution
pub const PLATFORM_URL: &str = "https://unsplash.com";

/// Platform name shown in attributions
pub const PLATFORM_NAME: &str = "Unsplash";

/// Referral tag identifying the consuming application to the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referral {
    query: String,
}

impl Referral {
    /// Build the referral tag for `application_name`
    pub fn new(application_name: &str) -> Self {
        Self {
            query: format!("utm_source={application_name}&utm_medium=referral"),
        }
    }

    /// Query-string form of the tag
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Platform landing page with the tag appended
    pub fn platform_link(&self) -> String {
        format!("{PLATFORM_URL}/?{}", self.query)
    }

    /// HTML attribution crediting the photographer and the platform
    pub fn attribute(&self, candidate: &PhotoCandidate) -> String {
        format!(
            "Photo by <a href=\"{}?{}\">{}</a> on <a href=\"{}\">{PLATFORM_NAME}</a>",
            candidate.photographer_profile,
            self.query,
            candidate.photographer_name,
            self.platform_link()
        )
    }
}
