//! Backend endpoint construction.
//!
//! Every URL the client talks to is derived from one backend base URL:
//!
//! - `{base}/ws/team/{team}/?access_token={token}` for the live connection,
//!   with `http` mapped to `ws` and `https` to `wss`
//! - `{base}/api/team/{team}/messages/?page={n}` for history pages
//! - `{base}/auth/refresh/` for rotating credentials
//!
//! The base may carry a path prefix (`https://host/chat/`); it is kept.

use url::Url;

use crate::{ProtocolError, TeamId};

/// URL factory rooted at a backend base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: Url,
}

impl Endpoints {
    /// Create from a parsed base URL.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidEndpoint` if the scheme is not one of `http`,
    ///   `https`, `ws`, `wss`, or the URL cannot carry a path.
    pub fn new(mut base: Url) -> Result<Self, ProtocolError> {
        let scheme = match base.scheme() {
            "http" | "ws" => "http",
            "https" | "wss" => "https",
            other => {
                return Err(ProtocolError::InvalidEndpoint(format!("unsupported scheme {other}")));
            },
        };

        if base.cannot_be_a_base() {
            return Err(ProtocolError::InvalidEndpoint(format!("{base} cannot be a base")));
        }

        base.set_scheme(scheme)
            .map_err(|()| ProtocolError::InvalidEndpoint(format!("cannot use {scheme} for {base}")))?;
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { base })
    }

    /// Parse and validate a base URL.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidEndpoint` if `base` does not parse or fails
    ///   the checks in [`Endpoints::new`].
    pub fn parse(base: &str) -> Result<Self, ProtocolError> {
        let url = Url::parse(base).map_err(|e| ProtocolError::InvalidEndpoint(e.to_string()))?;
        Self::new(url)
    }

    /// Normalized HTTP(S) base.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Live connection URL for a team, carrying the access token.
    pub fn channel(&self, team: &TeamId, access_token: &str) -> Url {
        let ws_scheme = if self.base.scheme() == "https" { "wss" } else { "ws" };
        let mut url = self.join(&["ws", "team", team.as_str(), ""]);

        // http(s) and ws(s) are all special schemes, switching never fails
        let _ = url.set_scheme(ws_scheme);
        url.query_pairs_mut().append_pair("access_token", access_token);
        url
    }

    /// History URL for a team page. Page 1 is the most recent.
    pub fn history(&self, team: &TeamId, page: u32) -> Url {
        let mut url = self.join(&["api", "team", team.as_str(), "messages", ""]);
        url.query_pairs_mut().append_pair("page", &page.to_string());
        url
    }

    /// Credential refresh URL.
    pub fn refresh(&self) -> Url {
        self.join(&["auth", "refresh", ""])
    }

    fn join(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Render a URL without its query, which may carry credentials.
pub fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
