//! Static per-provider configuration
//!
//! One `ProviderConfig` per supported platform: endpoint URLs, required
//! scopes, content limits and capability flags. Everything here is immutable
//! and process-wide; credentials and per-workspace state live elsewhere.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    X,
    Facebook,
    Linkedin,
    Instagram,
    Bluesky,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::X,
        ProviderKind::Facebook,
        ProviderKind::Linkedin,
        ProviderKind::Instagram,
        ProviderKind::Bluesky,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::X => "x",
            ProviderKind::Facebook => "facebook",
            ProviderKind::Linkedin => "linkedin",
            ProviderKind::Instagram => "instagram",
            ProviderKind::Bluesky => "bluesky",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x" | "twitter" => Ok(ProviderKind::X),
            "facebook" => Ok(ProviderKind::Facebook),
            "linkedin" => Ok(ProviderKind::Linkedin),
            "instagram" => Ok(ProviderKind::Instagram),
            "bluesky" => Ok(ProviderKind::Bluesky),
            _ => Err(format!(
                "Unknown provider: '{}'. Valid options: x, facebook, linkedin, instagram, bluesky",
                s
            )),
        }
    }
}

/// Immutable platform description.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Authorization endpoint the user's browser is sent to. Empty for
    /// direct-credential providers.
    pub authorize_url: &'static str,
    /// Token-exchange (or session-creation) endpoint.
    pub token_url: &'static str,
    pub scopes: &'static [&'static str],
    /// Maximum characters per post, `None` when the platform enforces none
    /// below the global cap.
    pub char_limit: Option<usize>,
    pub requires_media: bool,
    pub supports_links: bool,
    pub uses_oauth: bool,
}

impl ProviderConfig {
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

const X_CONFIG: ProviderConfig = ProviderConfig {
    kind: ProviderKind::X,
    authorize_url: "https://x.com/i/oauth2/authorize",
    token_url: "https://api.x.com/2/oauth2/token",
    scopes: &["tweet.read", "tweet.write", "users.read", "offline.access"],
    char_limit: Some(280),
    requires_media: false,
    supports_links: true,
    uses_oauth: true,
};

const FACEBOOK_CONFIG: ProviderConfig = ProviderConfig {
    kind: ProviderKind::Facebook,
    authorize_url: "https://www.facebook.com/v19.0/dialog/oauth",
    token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
    scopes: &["pages_manage_posts", "pages_read_engagement", "public_profile"],
    char_limit: Some(63_206),
    requires_media: false,
    supports_links: true,
    uses_oauth: true,
};

const LINKEDIN_CONFIG: ProviderConfig = ProviderConfig {
    kind: ProviderKind::Linkedin,
    authorize_url: "https://www.linkedin.com/oauth/v2/authorization",
    token_url: "https://www.linkedin.com/oauth/v2/accessToken",
    scopes: &["openid", "profile", "w_member_social"],
    char_limit: Some(3_000),
    requires_media: false,
    supports_links: true,
    uses_oauth: true,
};

const INSTAGRAM_CONFIG: ProviderConfig = ProviderConfig {
    kind: ProviderKind::Instagram,
    authorize_url: "https://www.facebook.com/v19.0/dialog/oauth",
    token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
    scopes: &[
        "instagram_basic",
        "instagram_content_publish",
        "pages_show_list",
    ],
    char_limit: Some(2_200),
    requires_media: true,
    supports_links: false,
    uses_oauth: true,
};

const BLUESKY_CONFIG: ProviderConfig = ProviderConfig {
    kind: ProviderKind::Bluesky,
    authorize_url: "",
    token_url: "https://bsky.social/xrpc/com.atproto.server.createSession",
    scopes: &[],
    char_limit: Some(300),
    requires_media: false,
    supports_links: true,
    uses_oauth: false,
};

/// Look up the static configuration for a platform.
///
/// Every `ProviderKind` has exactly one config, so this is total.
pub fn provider_config(kind: ProviderKind) -> &'static ProviderConfig {
    match kind {
        ProviderKind::X => &X_CONFIG,
        ProviderKind::Facebook => &FACEBOOK_CONFIG,
        ProviderKind::Linkedin => &LINKEDIN_CONFIG,
        ProviderKind::Instagram => &INSTAGRAM_CONFIG,
        ProviderKind::Bluesky => &BLUESKY_CONFIG,
    }
}
